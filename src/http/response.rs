//! Response construction.
//!
//! Rejections use the `{code, message, data: {status}}` body, except
//! rate limiting which answers `{error, retry_after}` plus `Retry-After`.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::pipeline::{PipelineError, SnapshotResponse};

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if let PipelineError::RateLimited { retry_after } = self {
            return (
                status,
                [(header::RETRY_AFTER, retry_after.to_string())],
                Json(json!({
                    "error": "rate_limited",
                    "retry_after": retry_after,
                })),
            )
                .into_response();
        }

        (
            status,
            Json(json!({
                "code": self.code(),
                "message": self.to_string(),
                "data": { "status": status.as_u16() },
            })),
        )
            .into_response()
    }
}

impl IntoResponse for SnapshotResponse {
    fn into_response(self) -> Response {
        let mut response = Json(self.payload.as_ref()).into_response();
        if let Ok(value) = HeaderValue::from_str(&format!("public, max-age={}", self.max_age)) {
            response.headers_mut().insert(header::CACHE_CONTROL, value);
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use serde_json::Value;
    use std::sync::Arc;

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_rate_limited_response() {
        let response = PipelineError::RateLimited { retry_after: 30 }.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "30");
        assert_eq!(
            body_json(response).await,
            json!({"error": "rate_limited", "retry_after": 30})
        );
    }

    #[tokio::test]
    async fn test_error_body_shape() {
        let response = PipelineError::ForbiddenIp.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = body_json(response).await;
        assert_eq!(body["code"], "pcc_forbidden_ip");
        assert_eq!(body["data"]["status"], 403);
        assert!(body["message"].as_str().unwrap().contains("IP"));
    }

    #[tokio::test]
    async fn test_snapshot_response_headers() {
        let response = SnapshotResponse {
            payload: Arc::new(json!({"plugins": {}})),
            max_age: 120,
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CACHE_CONTROL], "public, max-age=120");
        assert_eq!(body_json(response).await, json!({"plugins": {}}));
    }
}
