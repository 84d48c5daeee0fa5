//! HTTP server setup and the composition root.
//!
//! # Responsibilities
//! - Build every shared component once (`AppState::build`)
//! - Create the Axum router for the two snapshot routes
//! - Wire up middleware (CORS, timeout, request ID, tracing)
//! - Serve over plain TCP or rustls with graceful shutdown
//! - Apply hot reloads to the shared policy and identity table

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::clock::{Clock, SystemClock};
use crate::config::{ReloadEvent, ServiceConfig, SharedPolicy};
use crate::http::cors::cors_middleware;
use crate::http::request::{self, UuidRequestId};
use crate::lifecycle::Shutdown;
use crate::net::load_tls_config;
use crate::observability::metrics;
use crate::pipeline::{RequestContext, SnapshotPipeline};
use crate::security::credentials::{CredentialProvider, EnvCredentials};
use crate::security::identity::{presents_bearer, IdentityResolver, StaticIdentityResolver};
use crate::security::rate_limit::RateLimiter;
use crate::security::signature::{
    SignatureValidator, SignedRequest, KEY_HEADER, SIGNATURE_HEADER, TIMESTAMP_HEADER,
};
use crate::snapshot::{ManifestProducer, SnapshotCache, SnapshotProducer, StateChange};
use crate::store::spawn_sweeper;

/// Errors that stop the server.
#[derive(Debug, Error)]
pub enum ServeError {
    #[error("failed to load TLS material: {0}")]
    Tls(std::io::Error),
    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// The pluggable parts of the service.
pub struct Components {
    pub clock: Arc<dyn Clock>,
    pub credentials: Arc<dyn CredentialProvider>,
    pub producer: Arc<dyn SnapshotProducer>,
}

impl Components {
    /// System clock, environment credentials and the manifest producer.
    pub fn from_config(config: &ServiceConfig) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        Self {
            producer: Arc::new(ManifestProducer::new(
                &config.snapshot.manifest_path,
                clock.clone(),
            )),
            credentials: Arc::new(EnvCredentials),
            clock,
        }
    }
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<SnapshotPipeline>,
    pub policy: Arc<SharedPolicy>,
    pub identities: Arc<StaticIdentityResolver>,
    pub rate_limiter: Arc<RateLimiter>,
    pub namespace: Arc<str>,
    pub trust_forwarded_for: bool,
    bind_address: Arc<str>,
}

impl AppState {
    /// Composition root for production use.
    pub fn build(config: &ServiceConfig) -> Self {
        Self::assemble(config, Components::from_config(config))
    }

    /// Wire the shared components around the given pluggable parts.
    pub fn assemble(config: &ServiceConfig, components: Components) -> Self {
        let Components {
            clock,
            credentials,
            producer,
        } = components;

        let policy = Arc::new(SharedPolicy::new(config.policy.clone()));
        let identities = Arc::new(StaticIdentityResolver::new(&config.identities));
        let rate_limiter = Arc::new(RateLimiter::new(clock.clone()));
        let signatures = Arc::new(SignatureValidator::new(credentials, clock.clone()));
        let cache = Arc::new(SnapshotCache::new(clock));

        let pipeline = Arc::new(SnapshotPipeline::new(
            policy.clone(),
            rate_limiter.clone(),
            signatures,
            cache,
            producer,
        ));

        Self {
            pipeline,
            policy,
            identities,
            rate_limiter,
            namespace: Arc::from(config.api.namespace.as_str()),
            trust_forwarded_for: config.listener.trust_forwarded_for,
            bind_address: Arc::from(config.listener.bind_address.as_str()),
        }
    }

    fn request_context(&self, request: &Request) -> RequestContext {
        let headers = request.headers();
        RequestContext {
            client_ip: request::client_ip(request, self.trust_forwarded_for),
            origin: request::origin(headers).to_string(),
            presented_bearer: presents_bearer(headers),
            identity: self.identities.resolve(headers),
        }
    }

    /// Apply a change picked up by the config watcher.
    pub fn apply_reload(&self, event: ReloadEvent) {
        match event {
            ReloadEvent::Config(config) => {
                if config.api.namespace != *self.namespace
                    || config.listener.bind_address != *self.bind_address
                {
                    tracing::warn!("Listener or namespace changes take effect after a restart");
                }
                self.policy.replace(config.policy.clone());
                self.identities.replace(&config.identities);
                tracing::info!(
                    identities = config.identities.len(),
                    "Access policy and identities reloaded"
                );
                self.pipeline.on_state_change(&StateChange::SettingsUpdated);
            }
            ReloadEvent::Manifest => {
                self.pipeline.on_state_change(&StateChange::ManifestReloaded);
            }
        }
    }

    /// Periodic eviction of expired rate-limit and cache entries.
    pub fn spawn_sweepers(&self, every: Duration, shutdown: &Shutdown) -> Vec<JoinHandle<()>> {
        vec![
            spawn_sweeper(self.rate_limiter.store(), every, shutdown.subscribe()),
            spawn_sweeper(self.pipeline.cache().store(), every, shutdown.subscribe()),
        ]
    }

    /// Drain reload events until the channel closes or shutdown.
    pub fn spawn_reload_loop(
        &self,
        mut updates: mpsc::UnboundedReceiver<ReloadEvent>,
        shutdown: &Shutdown,
    ) -> JoinHandle<()> {
        let state = self.clone();
        let stop = shutdown.wait();
        tokio::spawn(async move {
            tokio::pin!(stop);
            loop {
                tokio::select! {
                    event = updates.recv() => match event {
                        Some(event) => state.apply_reload(event),
                        None => break,
                    },
                    _ = &mut stop => break,
                }
            }
        })
    }
}

/// Requests still running after `request_timeout` are answered with 408.
fn timeout_layer(request_timeout: Duration) -> TimeoutLayer {
    TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, request_timeout)
}

/// Build the Axum router with all middleware layers.
pub fn build_router(state: AppState, request_timeout: Duration) -> Router {
    let snapshot = format!("{}/snapshot", state.namespace);
    let signed = format!("{}/snapshot/signed", state.namespace);

    Router::new()
        .route(&snapshot, get(snapshot_handler))
        .route(&format!("{snapshot}/"), get(snapshot_handler))
        .route(&signed, get(signed_snapshot_handler))
        .route(&format!("{signed}/"), get(signed_snapshot_handler))
        .layer(middleware::from_fn_with_state(state.clone(), cors_middleware))
        .with_state(state)
        .layer(timeout_layer(request_timeout))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
}

/// HTTP server for the snapshot API.
pub struct HttpServer {
    router: Router,
    config: ServiceConfig,
    state: AppState,
}

impl HttpServer {
    /// Create a server with the production components.
    pub fn new(config: ServiceConfig) -> Self {
        let state = AppState::build(&config);
        Self::with_state(config, state)
    }

    pub fn with_state(config: ServiceConfig, state: AppState) -> Self {
        let router = build_router(
            state.clone(),
            Duration::from_secs(config.api.request_timeout_secs),
        );
        Self {
            router,
            config,
            state,
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Manifest path to watch, if the built-in producer reads one from disk.
    pub fn manifest_path(&self) -> Option<&Path> {
        let path = Path::new(&self.config.snapshot.manifest_path);
        path.exists().then_some(path)
    }

    /// Serve on `listener` until `shutdown` fires.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), ServeError> {
        let addr = listener.local_addr()?;
        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        match &self.config.listener.tls {
            None => {
                tracing::info!(address = %addr, namespace = %self.state.namespace, "HTTP server starting");
                axum::serve(listener, app)
                    .with_graceful_shutdown(shutdown.wait())
                    .await?;
            }
            Some(tls) => {
                let rustls = load_tls_config(tls).await.map_err(ServeError::Tls)?;
                tracing::info!(address = %addr, namespace = %self.state.namespace, "HTTPS server starting");

                let handle = axum_server::Handle::new();
                let stopper = handle.clone();
                let stop = shutdown.wait();
                tokio::spawn(async move {
                    stop.await;
                    stopper.graceful_shutdown(Some(Duration::from_secs(10)));
                });

                axum_server::from_tcp_rustls(listener.into_std()?, rustls)
                    .handle(handle)
                    .serve(app)
                    .await?;
            }
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn snapshot_handler(State(state): State<AppState>, request: Request) -> Response {
    let start = Instant::now();
    let ctx = state.request_context(&request);

    tracing::debug!(
        request_id = %request::request_id(request.headers()),
        client_ip = %ctx.client_ip,
        "Snapshot requested"
    );

    let response = match state.pipeline.serve_capability(&ctx) {
        Ok(snapshot) => snapshot.into_response(),
        Err(rejection) => rejection.into_response(),
    };
    metrics::record_request("snapshot", response.status().as_u16(), start);
    response
}

async fn signed_snapshot_handler(State(state): State<AppState>, request: Request) -> Response {
    let start = Instant::now();
    let ctx = state.request_context(&request);
    let headers = request.headers();

    tracing::debug!(
        request_id = %request::request_id(headers),
        client_ip = %ctx.client_ip,
        key_id = %request::header_str(headers, KEY_HEADER),
        "Signed snapshot requested"
    );

    let signed = SignedRequest {
        key_id: request::header_str(headers, KEY_HEADER),
        timestamp: request::header_str(headers, TIMESTAMP_HEADER),
        signature: request::header_str(headers, SIGNATURE_HEADER),
        method: request.method().as_str(),
        path: request::signed_path(request.uri().path()),
    };

    let response = match state.pipeline.serve_signed(&ctx, &signed) {
        Ok(snapshot) => snapshot.into_response(),
        Err(rejection) => rejection.into_response(),
    };
    metrics::record_request("snapshot_signed", response.status().as_u16(), start);
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_slow_request_times_out() {
        let router = Router::new()
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    "done"
                }),
            )
            .layer(timeout_layer(Duration::from_millis(50)));

        let response = router
            .oneshot(axum::http::Request::builder().uri("/slow").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
    }
}
