//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Registry port, data model, and in-memory simulation double."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---

pub mod in_memory;
pub mod model;
pub mod port;

pub use in_memory::InMemoryRegistry;
pub use model::{Application, ApplicationStatus, Partition, Service, ServiceKind};
pub use port::{RegistryPort, ServiceChangeEvent};
