//! ---
//! ems_section: "04-caching-invalidation"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Application, service, and partition cache tiers."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::collections::HashMap;
use std::time::{Duration, Instant};

use acetone_registry::{Application, Service};
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Tier 1: applications, keyed by normalized application name. Long-lived;
/// entries never expire on their own and are only removed by an explicit
/// application-deleted notification.
#[derive(Default)]
pub struct ApplicationCache {
    entries: RwLock<HashMap<String, Application>>,
}

impl ApplicationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Application> {
        self.entries.read().get(key).cloned()
    }

    pub fn insert(&self, key: String, application: Application) {
        self.entries.write().insert(key, application);
    }

    pub fn remove(&self, key: &str) {
        self.entries.write().remove(key);
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Tier 2: services, keyed by normalized application name. Invalidated only
/// by a registry change notification naming the application, not by a TTL.
#[derive(Default)]
pub struct ServiceCache {
    entries: RwLock<HashMap<String, Service>>,
}

impl ServiceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, application_key: &str) -> Option<Service> {
        self.entries.read().get(application_key).cloned()
    }

    pub fn insert(&self, application_key: String, service: Service) {
        self.entries.write().insert(application_key, service);
    }

    pub fn remove(&self, application_key: &str) {
        self.entries.write().remove(application_key);
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct PartitionEntry {
    endpoint_address: String,
    expires_at: Instant,
    /// Clone of the generation token live at insert time. Checked on read
    /// instead of the live `current` token so a bulk invalidation that
    /// swaps `current` for a fresh token retroactively invalidates every
    /// entry inserted under the old generation, without having to walk and
    /// delete them individually.
    generation: CancellationToken,
}

/// Tier 3: partitions (live service locations), keyed by normalized service
/// name. Entries carry a short absolute TTL and are additionally subject to
/// bulk invalidation via a generation token: [`PartitionCache::invalidate_all`]
/// cancels the current generation and installs a fresh one, so every entry
/// captured under the old generation reads as expired on its next lookup
/// without requiring a scan of the map.
pub struct PartitionCache {
    entries: RwLock<HashMap<String, PartitionEntry>>,
    current: RwLock<CancellationToken>,
    ttl: Duration,
}

impl PartitionCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            current: RwLock::new(CancellationToken::new()),
            ttl,
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.read();
        let entry = entries.get(key)?;
        if entry.generation.is_cancelled() || entry.expires_at <= Instant::now() {
            return None;
        }
        Some(entry.endpoint_address.clone())
    }

    pub fn insert(&self, key: String, endpoint_address: String) {
        let generation = self.current.read().clone();
        self.entries.write().insert(
            key,
            PartitionEntry {
                endpoint_address,
                expires_at: Instant::now() + self.ttl,
                generation,
            },
        );
    }

    pub fn remove(&self, key: &str) {
        self.entries.write().remove(key);
    }

    /// Atomically invalidate every entry currently in the cache by rolling
    /// over to a fresh generation token and clearing the map. No entry
    /// present before the call can be observed as valid afterward: the
    /// cancel happens before the swap-in of a fresh token, and the clear
    /// happens under the same write lock, so a concurrent `insert` either
    /// lands before the clear (and is wiped) or after it (and carries the
    /// new generation).
    pub fn invalidate_all(&self) {
        let mut current = self.current.write();
        current.cancel();
        *current = CancellationToken::new();
        self.entries.write().clear();
        debug!("partition cache bulk-invalidated");
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use acetone_registry::{ApplicationStatus, ServiceKind};

    fn sample_application() -> Application {
        Application {
            name: "fabric:/guard".to_owned(),
            type_name: "guardtype".to_owned(),
            type_version: "1.0.0".to_owned(),
            status: ApplicationStatus::Ready,
        }
    }

    fn sample_service() -> Service {
        Service {
            name: "fabric:/guard/guardapi".to_owned(),
            type_name: "guardapitype".to_owned(),
            kind: ServiceKind::Stateless,
        }
    }

    #[test]
    fn application_tier_has_no_ttl() {
        let cache = ApplicationCache::new();
        cache.insert("fabric:/guard".to_owned(), sample_application());
        assert!(cache.get("fabric:/guard").is_some());
    }

    #[test]
    fn service_tier_round_trips() {
        let cache = ServiceCache::new();
        cache.insert("fabric:/guard".to_owned(), sample_service());
        assert_eq!(cache.get("fabric:/guard").unwrap().name, sample_service().name);
    }

    #[test]
    fn service_tier_remove_clears_entry() {
        let cache = ServiceCache::new();
        cache.insert("fabric:/guard".to_owned(), sample_service());
        cache.remove("fabric:/guard");
        assert!(cache.get("fabric:/guard").is_none());
    }

    #[test]
    fn partition_entry_expires_after_ttl() {
        let cache = PartitionCache::new(Duration::from_millis(1));
        cache.insert("fabric:/guard/guardapi".to_owned(), "http://10.0.0.1:80".to_owned());
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get("fabric:/guard/guardapi").is_none());
    }

    #[test]
    fn bulk_invalidation_clears_prior_entries_atomically() {
        let cache = PartitionCache::new(Duration::from_secs(60));
        cache.insert("fabric:/guard/guardapi".to_owned(), "http://10.0.0.1:80".to_owned());
        assert!(cache.get("fabric:/guard/guardapi").is_some());
        cache.invalidate_all();
        assert!(cache.get("fabric:/guard/guardapi").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn entries_inserted_after_bulk_invalidation_survive() {
        let cache = PartitionCache::new(Duration::from_secs(60));
        cache.invalidate_all();
        cache.insert("fabric:/guard/guardapi".to_owned(), "http://10.0.0.1:80".to_owned());
        assert!(cache.get("fabric:/guard/guardapi").is_some());
    }
}
