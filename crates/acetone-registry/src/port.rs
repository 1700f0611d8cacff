//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Registry port: the interface the resolver depends on."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use acetone_common::ProxyError;
use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::model::{Application, Partition, Service};

/// A change notification for a subscribed service; fired whenever the
/// service's location (partition) may have moved.
#[derive(Debug, Clone)]
pub struct ServiceChangeEvent {
    pub service_name: String,
}

/// The interface the resolver depends on. Implementations talk to a real
/// cluster naming and discovery system; this crate ships only the
/// in-memory test/simulation double in [`crate::in_memory`].
#[async_trait]
pub trait RegistryPort: Send + Sync {
    async fn list_applications(&self) -> Result<Vec<Application>, ProxyError>;

    async fn list_services(&self, application_name: &str) -> Result<Vec<Service>, ProxyError>;

    async fn resolve_partition(&self, service_name: &str) -> Result<Partition, ProxyError>;

    /// Subscribe to change notifications for a service. Idempotent: calling
    /// this twice for the same service name is a no-op on the second call.
    async fn subscribe_service_changes(
        &self,
        service_name: &str,
        match_prefix: bool,
        include_children: bool,
    ) -> Result<(), ProxyError>;

    /// Obtain a receiver for the shared change-notification stream. Every
    /// call returns an independent receiver subscribed from "now".
    fn subscribe_changes(&self) -> broadcast::Receiver<ServiceChangeEvent>;
}
