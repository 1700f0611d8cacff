//! ---
//! ems_section: "04-caching-invalidation"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Top-level cache: owns all three tiers plus their single-flight guards."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::time::Duration;

use acetone_metrics::Telemetry;
use tracing::debug;

use crate::guard::SingleFlight;
use crate::tier::{ApplicationCache, PartitionCache, ServiceCache};

/// Owns all three cache tiers and their independent per-key single-flight
/// guards. One instance is constructed at startup and shared across every
/// resolution.
pub struct ResolutionCache {
    pub applications: ApplicationCache,
    pub services: ServiceCache,
    pub partitions: PartitionCache,
    pub application_guard: SingleFlight<String>,
    pub service_guard: SingleFlight<String>,
    pub partition_guard: SingleFlight<String>,
    partition_cache_disabled: bool,
    telemetry: Option<Telemetry>,
}

impl ResolutionCache {
    pub fn new(partition_ttl: Duration, disable_partition_cache: bool) -> Self {
        Self {
            applications: ApplicationCache::new(),
            services: ServiceCache::new(),
            partitions: PartitionCache::new(partition_ttl),
            application_guard: SingleFlight::new(),
            service_guard: SingleFlight::new(),
            partition_guard: SingleFlight::new(),
            partition_cache_disabled: disable_partition_cache,
            telemetry: None,
        }
    }

    pub fn with_telemetry(mut self, telemetry: Telemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn partition_cache_enabled(&self) -> bool {
        !self.partition_cache_disabled
    }

    pub fn application_hit(&self, key: &str) -> Option<acetone_registry::Application> {
        let hit = self.applications.get(key);
        self.record(hit.is_some(), "application");
        hit
    }

    pub fn service_hit(&self, key: &str) -> Option<acetone_registry::Service> {
        let hit = self.services.get(key);
        self.record(hit.is_some(), "service");
        hit
    }

    pub fn partition_hit(&self, key: &str) -> Option<String> {
        if !self.partition_cache_enabled() {
            return None;
        }
        let hit = self.partitions.get(key);
        self.record(hit.is_some(), "partition");
        hit
    }

    fn record(&self, hit: bool, tier: &str) {
        if let Some(telemetry) = &self.telemetry {
            if hit {
                telemetry.record_cache_hit(tier);
            } else {
                telemetry.record_cache_miss(tier);
            }
        }
    }

    /// Invalidate Tier 2 and Tier 3 in response to a subscribed-service
    /// change notification. Tier 1 (Application) is untouched: application
    /// identity changes independently of where a service's partitions live.
    pub fn clear_service_and_partition_cache(&self) {
        self.services.clear();
        self.partitions.invalidate_all();
        debug!("service and partition cache cleared");
    }
}
