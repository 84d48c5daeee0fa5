//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, request ID, tracing, timeout)
//!     → cors.rs (namespace CORS headers, preflight)
//!     → request.rs (client IP, origin, identity, signature headers)
//!     → pipeline (gates, cache, producer)
//!     → response.rs (JSON body, Cache-Control / Retry-After)
//!     → Send to client
//! ```

pub mod cors;
pub mod request;
pub mod response;
pub mod server;

pub use request::{UuidRequestId, X_REQUEST_ID};
pub use server::{build_router, AppState, Components, HttpServer, ServeError};
