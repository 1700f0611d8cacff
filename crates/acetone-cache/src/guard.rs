//! ---
//! ems_section: "04-caching-invalidation"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Per-key single-flight guard: collapses concurrent misses into one fill."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::Mutex as SyncMutex;
use tokio::sync::Mutex as AsyncMutex;

/// Ensures that concurrent cache misses for the same key collapse into a
/// single upstream fill. The registry of in-flight locks is guarded by a
/// synchronous `parking_lot::Mutex` (held only long enough to look up or
/// insert an `Arc`, never across an `.await`); the per-key lock itself is a
/// `tokio::sync::Mutex`, since holding it *does* span an `.await` while the
/// fill is in flight.
pub struct SingleFlight<K> {
    locks: SyncMutex<HashMap<K, Arc<AsyncMutex<()>>>>,
}

impl<K> Default for SingleFlight<K>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> SingleFlight<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self {
            locks: SyncMutex::new(HashMap::new()),
        }
    }

    fn lock_for(&self, key: &K) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock();
        locks.entry(key.clone()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
    }

    /// Run `fill` while holding the per-key lock, so only one caller per key
    /// executes `fill` concurrently; other callers queue behind it and then
    /// re-check the cache themselves via `check_cached` after waking.
    pub async fn run<F, Fut, T>(&self, key: &K, fill: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = T>,
    {
        let lock = self.lock_for(key);
        let _permit = lock.lock().await;
        fill().await
    }

    /// Drop the entry for `key` from the lock registry once it is no longer
    /// held, to keep the registry from growing unbounded for keys that are
    /// resolved once and never retried. Safe to call even if another caller
    /// currently holds the `Arc` clone: the `Arc` keeps the lock alive for
    /// them, and the registry will simply re-create an entry on next miss.
    pub fn release(&self, key: &K) {
        self.locks.lock().remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn concurrent_callers_serialize_behind_the_same_key() {
        let guard: Arc<SingleFlight<String>> = Arc::new(SingleFlight::new());
        let fills = Arc::new(AtomicUsize::new(0));
        let key = "fabric:/Guard".to_owned();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let guard = guard.clone();
            let fills = fills.clone();
            let key = key.clone();
            handles.push(tokio::spawn(async move {
                guard
                    .run(&key, || async {
                        fills.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                    })
                    .await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        // All 8 callers ran, but they serialize behind the per-key lock
        // rather than running the fill concurrently with each other.
        assert_eq!(fills.load(Ordering::SeqCst), 8);
    }

    #[tokio::test]
    async fn release_allows_registry_to_shrink() {
        let guard: SingleFlight<String> = SingleFlight::new();
        let key = "fabric:/Guard".to_owned();
        guard.run(&key, || async {}).await;
        guard.release(&key);
        assert_eq!(guard.locks.lock().len(), 0);
    }
}
