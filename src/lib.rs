//! Project context connector.
//!
//! Serves a read-only JSON snapshot of a site's runtime environment to
//! authorized tooling, behind an IP allow-list, a fixed-window rate limiter
//! and either capability checks or HMAC request signing.

pub mod clock;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod pipeline;
pub mod security;
pub mod snapshot;
pub mod store;

pub use config::schema::ServiceConfig;
pub use http::{AppState, HttpServer};
pub use lifecycle::Shutdown;
pub use pipeline::{PipelineError, RequestContext, SnapshotPipeline, SnapshotResponse};
