//! Project context connector service.
//!
//! ```text
//!     Client ──▶ request id / trace ──▶ CORS ──▶ snapshot routes
//!                                                   │
//!                  ┌────────────────────────────────┘
//!                  ▼
//!     ip allow-list ─ rate limit ─ capability or HMAC ─ cache ─ producer
//!                                                          │
//!     config watcher ── policy / identity swap ── purge ───┘
//! ```
//!
//! Usage: `context-connector [CONFIG_PATH]` (default `connector.toml`).
//! Without a config file the built-in defaults are used.

use std::path::PathBuf;
use std::time::Duration;

use tokio::net::TcpListener;

use context_connector::config::{load_config, ConfigWatcher, ServiceConfig};
use context_connector::http::HttpServer;
use context_connector::lifecycle::{join_background, signals, Shutdown};
use context_connector::observability::{logging, metrics};

const DEFAULT_CONFIG_PATH: &str = "connector.toml";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

    let (config, loaded_from_file) = if config_path.exists() {
        (load_config(&config_path)?, true)
    } else {
        (ServiceConfig::default(), false)
    };

    logging::init(&config.observability);
    tracing::info!("context-connector v{} starting", env!("CARGO_PKG_VERSION"));
    if loaded_from_file {
        tracing::info!(path = %config_path.display(), "Configuration loaded");
    } else {
        tracing::warn!(path = %config_path.display(), "Config file not found, using defaults");
    }

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Shutdown::new();
    signals::spawn_signal_handler(shutdown.clone());

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let server = HttpServer::new(config);
    let state = server.state().clone();

    let sweepers = state.spawn_sweepers(
        Duration::from_secs(server.config().snapshot.sweep_interval_secs),
        &shutdown,
    );

    // Keep the watcher alive for the lifetime of the server.
    let _watcher = if loaded_from_file {
        let (watcher, updates) = ConfigWatcher::new(&config_path, server.manifest_path());
        match watcher.run() {
            Ok(handle) => {
                state.spawn_reload_loop(updates, &shutdown);
                Some(handle)
            }
            Err(e) => {
                tracing::error!(error = %e, "Config watcher failed to start; hot reload disabled");
                None
            }
        }
    } else {
        None
    };

    server.run(listener, shutdown.clone()).await?;

    shutdown.trigger();
    join_background(sweepers).await;

    tracing::info!("Shutdown complete");
    Ok(())
}
