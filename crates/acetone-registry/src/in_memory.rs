//! ---
//! ems_section: "15-testing-qa-runbook"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "In-memory registry double used for simulation mode and integration tests."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::collections::{HashMap, HashSet, VecDeque};

use acetone_common::ProxyError;
use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::broadcast;

use crate::model::{Application, Partition, Service};
use crate::port::{RegistryPort, ServiceChangeEvent};

const CHANGE_CHANNEL_CAPACITY: usize = 256;

#[derive(Default)]
struct Inner {
    applications: HashMap<String, Application>,
    services: HashMap<String, Vec<Service>>,
    partitions: HashMap<String, Partition>,
    subscriptions: HashSet<String>,
    scripted_faults: HashMap<String, VecDeque<ProxyError>>,
}

/// An in-memory [`RegistryPort`] implementation. Not a production cluster
/// client: it backs `--mode simulation` and every integration test in this
/// repository, and supports scripting faults per operation key so tests can
/// exercise the retry and circuit-breaker paths deterministically.
pub struct InMemoryRegistry {
    inner: RwLock<Inner>,
    changes: broadcast::Sender<ServiceChangeEvent>,
}

impl Default for InMemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            inner: RwLock::new(Inner::default()),
            changes,
        }
    }

    pub fn register_application(&self, application: Application) {
        self.inner
            .write()
            .applications
            .insert(application.name.clone(), application);
    }

    pub fn register_service(&self, application_name: &str, service: Service) {
        self.inner
            .write()
            .services
            .entry(application_name.to_owned())
            .or_default()
            .push(service);
    }

    pub fn set_partition(&self, partition: Partition) {
        self.inner
            .write()
            .partitions
            .insert(partition.service_name.clone(), partition);
    }

    /// Queue a fault to be returned the next N times `operation_key` is
    /// invoked ("list_applications", "list_services:<app>", or
    /// "resolve_partition:<service>"), before falling through to the real
    /// lookup.
    pub fn inject_fault(&self, operation_key: &str, error: ProxyError) {
        self.inner
            .write()
            .scripted_faults
            .entry(operation_key.to_owned())
            .or_default()
            .push_back(error);
    }

    /// Fire a change notification for `service_name` to every active
    /// subscriber.
    pub fn emit_change(&self, service_name: &str) {
        let _ = self.changes.send(ServiceChangeEvent {
            service_name: service_name.to_owned(),
        });
    }

    fn take_scripted_fault(&self, operation_key: &str) -> Option<ProxyError> {
        self.inner
            .write()
            .scripted_faults
            .get_mut(operation_key)
            .and_then(VecDeque::pop_front)
    }
}

#[async_trait]
impl RegistryPort for InMemoryRegistry {
    async fn list_applications(&self) -> Result<Vec<Application>, ProxyError> {
        if let Some(err) = self.take_scripted_fault("list_applications") {
            return Err(err);
        }
        Ok(self.inner.read().applications.values().cloned().collect())
    }

    async fn list_services(&self, application_name: &str) -> Result<Vec<Service>, ProxyError> {
        let key = format!("list_services:{}", application_name);
        if let Some(err) = self.take_scripted_fault(&key) {
            return Err(err);
        }
        Ok(self
            .inner
            .read()
            .services
            .get(application_name)
            .cloned()
            .unwrap_or_default())
    }

    async fn resolve_partition(&self, service_name: &str) -> Result<Partition, ProxyError> {
        let key = format!("resolve_partition:{}", service_name);
        if let Some(err) = self.take_scripted_fault(&key) {
            return Err(err);
        }
        self.inner
            .read()
            .partitions
            .get(service_name)
            .cloned()
            .ok_or_else(|| ProxyError::TransientFault(format!("no partition for {}", service_name)))
    }

    async fn subscribe_service_changes(
        &self,
        service_name: &str,
        _match_prefix: bool,
        _include_children: bool,
    ) -> Result<(), ProxyError> {
        self.inner
            .write()
            .subscriptions
            .insert(service_name.to_owned());
        Ok(())
    }

    fn subscribe_changes(&self) -> broadcast::Receiver<ServiceChangeEvent> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ApplicationStatus, ServiceKind};

    fn sample_application() -> Application {
        Application {
            name: "fabric:/Guard".to_owned(),
            type_name: "GuardType".to_owned(),
            type_version: "1.0.0".to_owned(),
            status: ApplicationStatus::Ready,
        }
    }

    #[tokio::test]
    async fn register_and_list_round_trips() {
        let registry = InMemoryRegistry::new();
        registry.register_application(sample_application());
        let apps = registry.list_applications().await.unwrap();
        assert_eq!(apps.len(), 1);
        assert_eq!(apps[0].name, "fabric:/Guard");
    }

    #[tokio::test]
    async fn scripted_fault_is_consumed_once() {
        let registry = InMemoryRegistry::new();
        registry.inject_fault("list_applications", ProxyError::TransientFault("boom".into()));
        let first = registry.list_applications().await;
        assert!(first.is_err());
        let second = registry.list_applications().await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn subscription_is_idempotent() {
        let registry = InMemoryRegistry::new();
        registry
            .subscribe_service_changes("fabric:/Guard/GuardApi", true, false)
            .await
            .unwrap();
        registry
            .subscribe_service_changes("fabric:/Guard/GuardApi", true, false)
            .await
            .unwrap();
        assert_eq!(registry.inner.read().subscriptions.len(), 1);
    }

    #[tokio::test]
    async fn change_notification_reaches_subscriber() {
        let registry = InMemoryRegistry::new();
        let mut rx = registry.subscribe_changes();
        registry.emit_change("fabric:/Guard/GuardApi");
        let event = rx.recv().await.unwrap();
        assert_eq!(event.service_name, "fabric:/Guard/GuardApi");
    }

    #[tokio::test]
    async fn unregistered_service_kind_round_trips() {
        let registry = InMemoryRegistry::new();
        registry.register_service(
            "fabric:/Guard",
            Service {
                name: "fabric:/Guard/GuardApi".to_owned(),
                type_name: "GuardApiType".to_owned(),
                kind: ServiceKind::Stateless,
            },
        );
        let services = registry.list_services("fabric:/Guard").await.unwrap();
        assert_eq!(services.len(), 1);
    }
}
