//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Resolver: orchestrates cache, registry, and resilience pipeline."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---

pub mod config;
pub mod keys;
pub mod resolver;
pub mod select;

pub use config::ResolverConfig;
pub use keys::ResolutionFamily;
pub use resolver::{Resolver, ResolutionRequest};
