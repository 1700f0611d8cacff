//! ---
//! ems_section: "02-data-model"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Data model for applications, services, partitions, and endpoints."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use serde::{Deserialize, Serialize};

/// Status of an [`Application`] as reported by the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplicationStatus {
    Ready,
    Upgrading,
    Deleting,
    Other,
}

/// A deployed application on the cluster; the unit of identifier resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub name: String,
    pub type_name: String,
    pub type_version: String,
    pub status: ApplicationStatus,
}

/// Whether a [`Service`] is stateless or stateful.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceKind {
    Stateless,
    Stateful,
}

/// A service scoped under exactly one application; the routing target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub name: String,
    pub type_name: String,
    pub kind: ServiceKind,
}

/// The ephemeral live location of a service at a moment in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    pub service_name: String,
    /// Raw endpoint address payload, either a bare URL or a JSON envelope.
    pub endpoint_address: String,
}
