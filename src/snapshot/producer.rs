//! Snapshot producer seam.

use serde_json::Value;
use thiserror::Error;

use crate::config::AccessPolicy;

/// Error type for snapshot building.
#[derive(Debug, Error)]
pub enum ProducerError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {message}")]
    Parse { path: String, message: String },
    #[error("snapshot source unavailable: {0}")]
    Unavailable(String),
}

/// Builds a fresh snapshot document on a cache miss.
///
/// The pipeline treats the returned value as opaque. `policy` is passed so
/// producers can honour disclosure switches such as `expose_updates`.
pub trait SnapshotProducer: Send + Sync {
    fn produce(&self, policy: &AccessPolicy) -> Result<Value, ProducerError>;
}

impl<F> SnapshotProducer for F
where
    F: Fn(&AccessPolicy) -> Result<Value, ProducerError> + Send + Sync,
{
    fn produce(&self, policy: &AccessPolicy) -> Result<Value, ProducerError> {
        self(policy)
    }
}
