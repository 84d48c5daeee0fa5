//! Fixed-window rate limiting per caller identity.
//!
//! A caller is identified by origin, client IP and authenticated user id, so
//! anonymous callers behind one IP and origin share a bucket while distinct
//! users never do.
//!
//! The window restarts on the first request after it has elapsed rather than
//! sliding. That favours a burst straddling a boundary, and it is what
//! determines the `Retry-After` value callers see.

use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::clock::Clock;
use crate::store::{TransientStore, Update};

/// Counter state for one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateRecord {
    pub count: u64,
    pub window_start: u64,
}

/// Outcome of a [`RateLimiter::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    /// Seconds until the window reopens. Zero when allowed.
    pub retry_after: u64,
}

impl RateDecision {
    const ALLOW: Self = Self {
        allowed: true,
        retry_after: 0,
    };
}

/// Shared fixed-window limiter.
pub struct RateLimiter {
    records: Arc<TransientStore<RateRecord>>,
}

impl RateLimiter {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            records: Arc::new(TransientStore::new(clock)),
        }
    }

    /// Backing store, exposed for the background sweeper.
    pub fn store(&self) -> Arc<TransientStore<RateRecord>> {
        self.records.clone()
    }

    /// Count one request against `key` and decide whether it may proceed.
    ///
    /// A zero `threshold` or `window_secs` disables limiting.
    pub fn check(&self, key: &str, threshold: u64, window_secs: u64) -> RateDecision {
        if threshold == 0 || window_secs == 0 {
            return RateDecision::ALLOW;
        }

        self.records.update(key, |current, now| match current {
            None => Update {
                next: Some((
                    RateRecord {
                        count: 1,
                        window_start: now,
                    },
                    window_secs,
                )),
                output: RateDecision::ALLOW,
            },
            Some(record) => {
                let elapsed = now.saturating_sub(record.window_start);
                if elapsed >= window_secs {
                    return Update {
                        next: Some((
                            RateRecord {
                                count: 1,
                                window_start: now,
                            },
                            window_secs,
                        )),
                        output: RateDecision::ALLOW,
                    };
                }

                let remaining = window_secs - elapsed;
                let record = RateRecord {
                    count: record.count.saturating_add(1),
                    ..record
                };
                let output = if record.count > threshold {
                    RateDecision {
                        allowed: false,
                        retry_after: remaining.max(1),
                    }
                } else {
                    RateDecision::ALLOW
                };
                Update {
                    next: Some((record, remaining)),
                    output,
                }
            }
        })
    }
}

/// Derive the limiter key for a request.
///
/// `user_id` is `None` for anonymous callers.
pub fn key_from_request(origin: &str, client_ip: &str, user_id: Option<u64>) -> String {
    let user = user_id.map_or_else(|| "-".to_string(), |id| id.to_string());
    let mut hasher = Sha256::new();
    hasher.update(origin.as_bytes());
    hasher.update(b"|");
    hasher.update(client_ip.as_bytes());
    hasher.update(b"|");
    hasher.update(user.as_bytes());
    format!("rl:{}", hex::encode(hasher.finalize()))
}
