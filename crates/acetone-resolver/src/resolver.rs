//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Central orchestrator: application -> service -> partition -> endpoint."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Instant;

use acetone_cache::ResolutionCache;
use acetone_common::ProxyError;
use acetone_metrics::Telemetry;
use acetone_registry::{Application, Partition, RegistryPort, Service};
use acetone_resilience::ResiliencePipeline;
use acetone_url::endpoint::extract_endpoint;
use acetone_url::{normalize_address, sanitize_malformed};
use tracing::{error, warn};

use crate::config::ResolverConfig;
use crate::keys::{application_key, partition_key, service_key, ResolutionFamily};
use crate::select::{select_application, select_service};

/// Parameters for a single resolution call.
#[derive(Debug, Clone)]
pub struct ResolutionRequest {
    pub identifier: String,
    pub invocation_id: String,
    pub version: Option<String>,
    pub refresh: bool,
}

/// Central orchestrator mapping an application identifier to a live
/// endpoint URL via the three-tier cache and resilience pipeline.
pub struct Resolver {
    registry: Arc<dyn RegistryPort>,
    cache: Arc<ResolutionCache>,
    pipeline: Arc<ResiliencePipeline>,
    telemetry: Option<Telemetry>,
}

impl Resolver {
    pub fn new(
        registry: Arc<dyn RegistryPort>,
        config: ResolverConfig,
        telemetry: Option<Telemetry>,
    ) -> Self {
        let mut pipeline = ResiliencePipeline::new(config.pipeline_config());
        let mut cache = ResolutionCache::new(config.partition_cache_ttl, config.disable_partition_cache);
        if let Some(telemetry) = telemetry.clone() {
            pipeline = pipeline.with_telemetry(telemetry.clone());
            cache = cache.with_telemetry(telemetry);
        }
        Self {
            registry,
            cache: Arc::new(cache),
            pipeline: Arc::new(pipeline),
            telemetry,
        }
    }

    pub fn cache(&self) -> Arc<ResolutionCache> {
        self.cache.clone()
    }

    /// General resolution: the request's application identifier maps to its
    /// stateless API/service.
    pub async fn resolve_endpoint(&self, request: ResolutionRequest) -> Result<String, ProxyError> {
        self.resolve(request, ResolutionFamily::General).await
    }

    /// Function resolution: the same identifier maps to its stateless
    /// function service instead.
    pub async fn resolve_function_endpoint(
        &self,
        request: ResolutionRequest,
    ) -> Result<String, ProxyError> {
        self.resolve(request, ResolutionFamily::Function).await
    }

    async fn resolve(
        &self,
        request: ResolutionRequest,
        family: ResolutionFamily,
    ) -> Result<String, ProxyError> {
        let started = Instant::now();
        let result = self.resolve_inner(&request, family).await;
        if let Some(telemetry) = &self.telemetry {
            let status = match &result {
                Ok(_) => "success",
                Err(err) => err.kind(),
            };
            telemetry.record_resolution(status, started.elapsed());
        }
        result
    }

    async fn resolve_inner(
        &self,
        request: &ResolutionRequest,
        family: ResolutionFamily,
    ) -> Result<String, ProxyError> {
        let application = self
            .resolve_application(request, family)
            .await?;
        let service = self
            .resolve_service(&application, family)
            .await?;
        let partition = self.resolve_partition(&service).await?;
        self.endpoint_from_partition(&partition)
    }

    async fn resolve_application(
        &self,
        request: &ResolutionRequest,
        family: ResolutionFamily,
    ) -> Result<Application, ProxyError> {
        let key = application_key(&request.identifier, request.version.as_deref(), family);

        if !request.refresh {
            if let Some(application) = self.cache.application_hit(&key) {
                return Ok(application);
            }
        }

        let cache = self.cache.clone();
        let registry = self.registry.clone();
        let pipeline = self.pipeline.clone();
        let identifier = request.identifier.clone();
        let version = request.version.clone();
        let key_for_fill = key.clone();

        let application = cache
            .application_guard
            .run(&key, move || async move {
                if let Some(application) = cache.applications.get(&key_for_fill) {
                    return Ok(application);
                }
                let applications = pipeline
                    .call("list_applications", || {
                        let registry = registry.clone();
                        async move { registry.list_applications().await }
                    })
                    .await?;
                let selected = select_application(&applications, &identifier, version.as_deref())?;
                cache.applications.insert(key_for_fill, selected.clone());
                Ok(selected)
            })
            .await?;

        Ok(application)
    }

    async fn resolve_service(
        &self,
        application: &Application,
        family: ResolutionFamily,
    ) -> Result<Service, ProxyError> {
        let key = service_key(&application.name, family);

        if let Some(service) = self.cache.service_hit(&key) {
            return Ok(service);
        }

        let cache = self.cache.clone();
        let registry = self.registry.clone();
        let pipeline = self.pipeline.clone();
        let application_name = application.name.clone();
        let key_for_fill = key.clone();

        let selected = cache
            .service_guard
            .run(&key, move || async move {
                if let Some(service) = cache.services.get(&key_for_fill) {
                    return Ok(service);
                }
                let services = pipeline
                    .call("list_services", || {
                        let registry = registry.clone();
                        let application_name = application_name.clone();
                        async move { registry.list_services(&application_name).await }
                    })
                    .await?;
                // Selection runs inside the guard so an ambiguous or
                // missing result never reaches the cache: only a uniquely
                // selected Service is ever written to Tier 2.
                let selected = select_service(&services, family)?;
                cache.services.insert(key_for_fill, selected.clone());
                Ok(selected)
            })
            .await?;

        if let Err(err) = self
            .registry
            .subscribe_service_changes(&selected.name, true, false)
            .await
        {
            warn!(service = %selected.name, error = %err, "failed to subscribe to service change notifications");
        }
        Ok(selected)
    }

    async fn resolve_partition(&self, service: &Service) -> Result<Partition, ProxyError> {
        let key = partition_key(&service.name);

        if let Some(address) = self.cache.partition_hit(&key) {
            return Ok(Partition {
                service_name: service.name.clone(),
                endpoint_address: address,
            });
        }

        let cache = self.cache.clone();
        let registry = self.registry.clone();
        let pipeline = self.pipeline.clone();
        let service_name = service.name.clone();
        let key_for_fill = key.clone();
        let partition_cache_enabled = self.cache.partition_cache_enabled();

        let partition = cache
            .partition_guard
            .run(&key, move || async move {
                if partition_cache_enabled {
                    if let Some(address) = cache.partitions.get(&key_for_fill) {
                        return Ok(Partition {
                            service_name: service_name.clone(),
                            endpoint_address: address,
                        });
                    }
                }
                let partition = pipeline
                    .call("resolve_partition", || {
                        let registry = registry.clone();
                        let service_name = service_name.clone();
                        async move { registry.resolve_partition(&service_name).await }
                    })
                    .await?;
                if partition_cache_enabled {
                    cache
                        .partitions
                        .insert(key_for_fill, partition.endpoint_address.clone());
                }
                Ok(partition)
            })
            .await?;

        Ok(partition)
    }

    fn endpoint_from_partition(&self, partition: &Partition) -> Result<String, ProxyError> {
        let raw = sanitize_malformed(partition.endpoint_address.trim());
        let url = if raw.starts_with('{') {
            extract_endpoint(&raw)?
        } else {
            extract_endpoint(&raw).unwrap_or_else(|_| raw.clone())
        };
        Ok(normalize_address(&url))
    }

    /// React to a registry change notification: clear Tier 2/3 so the next
    /// resolution re-queries the registry. Tier 1 is untouched.
    pub fn handle_change_notification(&self) {
        self.cache.clear_service_and_partition_cache();
    }

    /// Spawn a background task that drains the registry's change stream and
    /// invalidates the cache on every event, until the registry drops its
    /// sender side.
    pub fn spawn_notification_task(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let resolver = self.clone();
        let mut receiver = self.registry.subscribe_changes();
        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(_event) => resolver.handle_change_notification(),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "change notification receiver lagged; clearing cache conservatively");
                        resolver.handle_change_notification();
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                        error!("registry change stream closed; notification task exiting");
                        break;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use acetone_registry::{ApplicationStatus, InMemoryRegistry, ServiceKind};

    fn seeded_registry() -> Arc<InMemoryRegistry> {
        let registry = InMemoryRegistry::new();
        registry.register_application(Application {
            name: "fabric:/Guard".to_owned(),
            type_name: "GuardType".to_owned(),
            type_version: "1.0.0".to_owned(),
            status: ApplicationStatus::Ready,
        });
        registry.register_service(
            "fabric:/Guard",
            Service {
                name: "fabric:/Guard/GuardApi".to_owned(),
                type_name: "GuardApiType".to_owned(),
                kind: ServiceKind::Stateless,
            },
        );
        registry.set_partition(Partition {
            service_name: "fabric:/Guard/GuardApi".to_owned(),
            endpoint_address: "http://10.0.0.5:8080/".to_owned(),
        });
        Arc::new(registry)
    }

    fn request(identifier: &str) -> ResolutionRequest {
        ResolutionRequest {
            identifier: identifier.to_owned(),
            invocation_id: "test-invocation".to_owned(),
            version: None,
            refresh: false,
        }
    }

    #[tokio::test]
    async fn happy_path_resolves_and_then_hits_cache() {
        let registry = seeded_registry();
        let resolver = Resolver::new(registry.clone(), ResolverConfig::default(), None);

        let url = resolver.resolve_endpoint(request("Guard")).await.unwrap();
        assert_eq!(url, "http://10.0.0.5:8080");

        // Second call should be served entirely from cache; inject a fault
        // that would only be hit if the resolver re-queried the registry.
        registry.inject_fault(
            "list_applications",
            ProxyError::PermanentFault("should not be called".into()),
        );
        let url_again = resolver.resolve_endpoint(request("Guard")).await.unwrap();
        assert_eq!(url_again, "http://10.0.0.5:8080");
    }

    #[tokio::test]
    async fn malformed_trailing_ipv6_tail_is_sanitized_before_extraction() {
        let registry = seeded_registry();
        registry.set_partition(Partition {
            service_name: "fabric:/Guard/GuardApi".to_owned(),
            endpoint_address: "http://10.0.0.5:8080:fe80::1".to_owned(),
        });
        let resolver = Resolver::new(registry, ResolverConfig::default(), None);
        let url = resolver.resolve_endpoint(request("Guard")).await.unwrap();
        assert_eq!(url, "http://10.0.0.5:8080");
    }

    #[tokio::test]
    async fn missing_application_surfaces_not_found() {
        let registry = seeded_registry();
        let resolver = Resolver::new(registry, ResolverConfig::default(), None);
        let err = resolver.resolve_endpoint(request("Unknown")).await.unwrap_err();
        assert!(matches!(err, ProxyError::ApplicationNotFound(_)));
    }

    #[tokio::test]
    async fn ambiguous_service_does_not_populate_service_cache() {
        let registry = seeded_registry();
        registry.register_service(
            "fabric:/Guard",
            Service {
                name: "fabric:/Guard/GuardApiTwo".to_owned(),
                type_name: "GuardApiTwoType".to_owned(),
                kind: ServiceKind::Stateless,
            },
        );
        let resolver = Resolver::new(registry, ResolverConfig::default(), None);
        let err = resolver.resolve_endpoint(request("Guard")).await.unwrap_err();
        assert!(matches!(err, ProxyError::AmbiguousService(_, 2)));
        assert!(resolver.cache().services.is_empty());
    }

    #[tokio::test]
    async fn change_notification_clears_service_and_partition_tiers_only() {
        let registry = seeded_registry();
        let resolver = Arc::new(Resolver::new(registry.clone(), ResolverConfig::default(), None));
        resolver.resolve_endpoint(request("Guard")).await.unwrap();
        assert!(!resolver.cache().applications.is_empty());
        assert!(!resolver.cache().partitions.is_empty());

        resolver.handle_change_notification();

        assert!(!resolver.cache().applications.is_empty());
        assert!(resolver.cache().partitions.is_empty());
    }

    #[tokio::test]
    async fn transient_failure_then_success_is_retried() {
        let registry = seeded_registry();
        registry.inject_fault("resolve_partition:fabric:/Guard/GuardApi", ProxyError::TransientFault("boom".into()));
        registry.inject_fault("resolve_partition:fabric:/Guard/GuardApi", ProxyError::TransientFault("boom".into()));
        let mut config = ResolverConfig::default();
        config.initial_retry_delay = std::time::Duration::from_millis(1);
        config.max_retry_delay = std::time::Duration::from_millis(2);
        let resolver = Resolver::new(registry, config, None);
        let url = resolver.resolve_endpoint(request("Guard")).await.unwrap();
        assert_eq!(url, "http://10.0.0.5:8080");
    }
}
