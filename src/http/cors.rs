//! CORS for the snapshot namespace.
//!
//! Only paths under the configured namespace are touched, and only while
//! `cors_enabled` is set. Allowed origins are echoed back with the fixed
//! method and header lists; preflights are answered here and never reach the
//! pipeline.

use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, HeaderValue, Method};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::http::request;
use crate::http::server::AppState;
use crate::security::origin;

pub const ALLOW_METHODS: &str = "GET, OPTIONS";
pub const ALLOW_HEADERS: &str =
    "Authorization, X-WP-Nonce, X-PCC-Key, X-PCC-Timestamp, X-PCC-Signature";
pub const MAX_AGE_SECS: &str = "600";

/// Whether `path` is the namespace root or below it.
pub fn under_namespace(path: &str, namespace: &str) -> bool {
    path.strip_prefix(namespace)
        .map(|rest| rest.is_empty() || rest.starts_with('/'))
        .unwrap_or(false)
}

pub async fn cors_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if !under_namespace(request.uri().path(), &state.namespace) {
        return next.run(request).await;
    }

    let policy = state.pipeline.policy();
    if !policy.cors_enabled {
        return next.run(request).await;
    }

    let origin = request::origin(request.headers()).to_string();
    let mut response = if request.method() == Method::OPTIONS {
        tracing::debug!(origin = %origin, "Answering CORS preflight");
        Json(json!({ "success": true })).into_response()
    } else {
        next.run(request).await
    };

    if !origin.is_empty() && origin::matches(&origin, &policy.allowed_origins) {
        apply_headers(response.headers_mut(), &origin);
    }
    response
}

fn apply_headers(headers: &mut HeaderMap, origin: &str) {
    let Ok(origin) = HeaderValue::from_str(origin) else {
        return;
    };
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
    headers.append(header::VARY, HeaderValue::from_static("Origin"));
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(ALLOW_METHODS),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(ALLOW_HEADERS),
    );
    headers.insert(
        header::ACCESS_CONTROL_MAX_AGE,
        HeaderValue::from_static(MAX_AGE_SECS),
    );
}
