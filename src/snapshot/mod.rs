//! Snapshot subsystem.
//!
//! # Data Flow
//! ```text
//! Pipeline cache lookup:
//!     → cache.rs (live entry? return it)
//!     → producer.rs (SnapshotProducer on miss)
//!         → manifest.rs (default producer, reads the site manifest)
//!     → cache.rs (store for cache_ttl seconds)
//!
//! Host lifecycle:
//!     events.rs (StateChange) → cache.rs on_state_change → purge
//! ```

pub mod cache;
pub mod events;
pub mod manifest;
pub mod producer;

pub use cache::SnapshotCache;
pub use events::StateChange;
pub use manifest::{ManifestProducer, SiteManifest};
pub use producer::{ProducerError, SnapshotProducer};
