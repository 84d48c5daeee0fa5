//! Network layer.
//!
//! Plain TCP is served by `axum::serve`; when `[listener.tls]` is set the
//! router is served through `axum-server` with the rustls config from tls.rs.

pub mod tls;

pub use tls::load_tls_config;
