//! Keyed in-memory store with per-entry expiry.
//!
//! Backs both the rate limiter counters and the snapshot cache. Expiry is
//! enforced here: an entry past its deadline is invisible to readers and is
//! dropped lazily on access or by the background sweeper.
//!
//! # Design Decisions
//! - `update` holds the per-key shard lock for the whole read-modify-write
//! - A ttl of zero never stores anything
//! - Time comes from the injected [`Clock`]

use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::clock::Clock;

struct Transient<V> {
    value: V,
    expires_at: u64,
}

impl<V> Transient<V> {
    fn new(value: V, now: u64, ttl_secs: u64) -> Self {
        Self {
            value,
            expires_at: now.saturating_add(ttl_secs),
        }
    }

    fn is_live(&self, now: u64) -> bool {
        now < self.expires_at
    }
}

/// Outcome of an [`TransientStore::update`] closure.
pub struct Update<V, R> {
    /// New value and its ttl in seconds, or `None` to delete the key.
    pub next: Option<(V, u64)>,
    /// Value handed back to the caller.
    pub output: R,
}

/// Concurrent string-keyed store whose entries expire.
pub struct TransientStore<V> {
    entries: DashMap<String, Transient<V>>,
    clock: Arc<dyn Clock>,
}

impl<V: Clone> TransientStore<V> {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    /// Fetch a live entry.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now_secs();
        if let Some(entry) = self.entries.get(key) {
            if entry.is_live(now) {
                return Some(entry.value.clone());
            }
        } else {
            return None;
        }
        self.entries.remove_if(key, |_, e| !e.is_live(now));
        None
    }

    /// Store `value` for `ttl_secs`. A zero ttl removes the key instead.
    pub fn set(&self, key: impl Into<String>, value: V, ttl_secs: u64) {
        let key = key.into();
        if ttl_secs == 0 {
            self.entries.remove(&key);
            return;
        }
        let now = self.clock.now_secs();
        self.entries.insert(key, Transient::new(value, now, ttl_secs));
    }

    /// Remove `key`. Returns whether a live entry was removed.
    pub fn delete(&self, key: &str) -> bool {
        let now = self.clock.now_secs();
        self.entries
            .remove(key)
            .map(|(_, e)| e.is_live(now))
            .unwrap_or(false)
    }

    /// Atomic read-modify-write of one key.
    ///
    /// `f` receives the live value (expired entries read as `None`) and the
    /// current time, and decides what to store next.
    pub fn update<R, F>(&self, key: &str, f: F) -> R
    where
        F: FnOnce(Option<V>, u64) -> Update<V, R>,
    {
        let now = self.clock.now_secs();
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let current = occupied
                    .get()
                    .is_live(now)
                    .then(|| occupied.get().value.clone());
                let Update { next, output } = f(current, now);
                match next {
                    Some((value, ttl)) if ttl > 0 => {
                        occupied.insert(Transient::new(value, now, ttl));
                    }
                    _ => {
                        occupied.remove();
                    }
                }
                output
            }
            Entry::Vacant(vacant) => {
                let Update { next, output } = f(None, now);
                if let Some((value, ttl)) = next {
                    if ttl > 0 {
                        vacant.insert(Transient::new(value, now, ttl));
                    }
                }
                output
            }
        }
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now_secs();
        let before = self.entries.len();
        self.entries.retain(|_, e| e.is_live(now));
        before.saturating_sub(self.entries.len())
    }

    /// Number of stored entries, expired ones included until swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Periodically sweep `store` until shutdown is signalled.
pub fn spawn_sweeper<V>(
    store: Arc<TransientStore<V>>,
    every: Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> tokio::task::JoinHandle<()>
where
    V: Clone + Send + Sync + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = store.sweep();
                    if removed > 0 {
                        tracing::debug!(removed, remaining = store.len(), "Swept expired entries");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::debug!("Store sweeper stopping");
                    break;
                }
            }
        }
    })
}
