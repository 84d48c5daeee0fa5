//! Shared utilities for the integration tests.

#![allow(dead_code)]

use std::io::Write;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::extract::connect_info::MockConnectInfo;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use context_connector::clock::ManualClock;
use context_connector::config::schema::{IdentityConfig, ServiceConfig};
use context_connector::config::AccessPolicy;
use context_connector::http::{build_router, AppState, Components};
use context_connector::security::credentials::StaticCredentials;
use context_connector::security::signature::sign;
use context_connector::snapshot::{ManifestProducer, SnapshotProducer};

pub const NOW: u64 = 1_760_000_000;
pub const ADMIN_TOKEN: &str = "admin-token";
pub const EDITOR_TOKEN: &str = "editor-token";
pub const KEY_ID: &str = "key_ci";
pub const SECRET: &str = "0123456789abcdef";
pub const SNAPSHOT: &str = "/wp-json/pcc/v1/snapshot";
pub const SIGNED: &str = "/wp-json/pcc/v1/snapshot/signed";

pub const MANIFEST: &str = r#"
[site]
home_url = "https://example.com/"
site_url = "https://example.com/"

[environment]
framework_version = "6.6.2"
runtime_version = "8.2.12"
db_server = "MariaDB"
db_version = "10.11.6"

[theme]
name = "Astra"
version = "4.8"
stylesheet = "astra"
template = "astra"

[plugins]
active = ["akismet/akismet.php"]

[[plugins.installed]]
name = "Akismet"
version = "5.3"
plugin_file = "akismet/akismet.php"
"#;

/// A router wired to a manual clock, static credentials and a temp manifest.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub clock: Arc<ManualClock>,
    pub builds: Arc<AtomicUsize>,
    pub manifest: tempfile::NamedTempFile,
}

impl TestApp {
    pub fn new(config: ServiceConfig) -> Self {
        Self::with_peer(config, "127.0.0.1:40000".parse().unwrap())
    }

    pub fn with_peer(config: ServiceConfig, peer: SocketAddr) -> Self {
        let mut manifest = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        manifest.write_all(MANIFEST.as_bytes()).unwrap();

        let clock = Arc::new(ManualClock::new(NOW));
        let builds = Arc::new(AtomicUsize::new(0));

        let inner = ManifestProducer::new(manifest.path(), clock.clone());
        let counter = builds.clone();
        let producer = move |policy: &AccessPolicy| {
            counter.fetch_add(1, Ordering::SeqCst);
            inner.produce(policy)
        };

        let components = Components {
            clock: clock.clone(),
            credentials: Arc::new(StaticCredentials::new().with_key(KEY_ID, SECRET)),
            producer: Arc::new(producer),
        };
        let state = AppState::assemble(&config, components);
        let router = build_router(state.clone(), Duration::from_secs(5)).layer(MockConnectInfo(peer));

        Self {
            router,
            state,
            clock,
            builds,
            manifest,
        }
    }

    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, HeaderMap, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, headers, body)
    }
}

/// Default config with an administrator (id 1) and an editor (id 2).
pub fn config() -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.identities = vec![
        IdentityConfig {
            id: 1,
            name: "admin".into(),
            token: ADMIN_TOKEN.into(),
            capabilities: vec!["manage_options".into(), "edit_posts".into()],
        },
        IdentityConfig {
            id: 2,
            name: "editor".into(),
            token: EDITOR_TOKEN.into(),
            capabilities: vec!["edit_posts".into()],
        },
    ];
    config
}

pub fn get(path: &str) -> axum::http::request::Builder {
    Request::builder().method("GET").uri(path)
}

pub fn as_admin(path: &str) -> Request<Body> {
    get(path)
        .header("x-api-token", ADMIN_TOKEN)
        .body(Body::empty())
        .unwrap()
}

/// A request to `path` signed at `timestamp` with the test secret.
pub fn signed(path: &str, timestamp: u64) -> axum::http::request::Builder {
    let ts = timestamp.to_string();
    let signature = sign(SECRET.as_bytes(), "GET", path.trim_end_matches('/'), &ts);
    get(path)
        .header("x-pcc-key", KEY_ID)
        .header("x-pcc-timestamp", ts)
        .header("x-pcc-signature", signature)
}
