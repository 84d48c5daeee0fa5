//! Snapshot caching and invalidation.

use std::sync::Arc;

use serde_json::Value;

use crate::clock::Clock;
use crate::observability::metrics;
use crate::snapshot::events::StateChange;
use crate::store::TransientStore;

const SNAPSHOT_KEY: &str = "snapshot";

/// A cached snapshot and when it was stored.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub payload: Arc<Value>,
    pub stored_at: u64,
}

/// Holds the last built snapshot until its ttl runs out or state changes.
pub struct SnapshotCache {
    store: Arc<TransientStore<CacheEntry>>,
    clock: Arc<dyn Clock>,
}

impl SnapshotCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            store: Arc::new(TransientStore::new(clock.clone())),
            clock,
        }
    }

    /// Backing store, exposed for the background sweeper.
    pub fn store(&self) -> Arc<TransientStore<CacheEntry>> {
        self.store.clone()
    }

    /// The cached payload, if one is live.
    pub fn get(&self) -> Option<Arc<Value>> {
        let hit = self.store.get(SNAPSHOT_KEY).map(|e| e.payload);
        metrics::record_cache_lookup(hit.is_some());
        hit
    }

    /// Cache `payload` for `ttl_secs`. A zero ttl stores nothing.
    pub fn set(&self, payload: Arc<Value>, ttl_secs: u64) {
        if ttl_secs == 0 {
            return;
        }
        let entry = CacheEntry {
            payload,
            stored_at: self.clock.now_secs(),
        };
        self.store.set(SNAPSHOT_KEY, entry, ttl_secs);
    }

    /// Evict the cached snapshot unconditionally.
    pub fn purge(&self) {
        self.store.delete(SNAPSHOT_KEY);
    }

    /// Entry point for host lifecycle events.
    pub fn on_state_change(&self, event: &StateChange) {
        self.purge();
        metrics::record_cache_purge(event.kind());
        tracing::info!(event = %event, "Snapshot cache purged");
    }
}
