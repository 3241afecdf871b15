//! Correlation and response-header middleware
//!
//! Assigns every request a correlation id (minting one when the supplied
//! value is absent or invalid), measures wall-clock time, and stamps the
//! response with correlation, timing, performance-tier, and cache-hint
//! headers. Also rewrites bare 413 rejections from the body-size layer
//! into the structured error envelope.

use crate::error::ApiError;
use axum::{
    extract::Request,
    http::{HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Instant;
use triage_core::PerformanceTier;
use uuid::Uuid;

/// Header carrying the correlation id in both directions.
pub const CORRELATION_HEADER: &str = "x-correlation-id";
pub const RESPONSE_TIME_HEADER: &str = "x-response-time-ms";
pub const PERFORMANCE_TIER_HEADER: &str = "x-performance-tier";
pub const CACHE_HINT_HEADER: &str = "x-cache-hint";

/// Valid correlation ids: 1-100 chars of alphanumerics, `_`, `-`.
static VALID_CORRELATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,100}$").expect("static regex"));

/// Request extension carrying the correlation id into handlers.
#[derive(Debug, Clone)]
pub struct CorrelationId(pub String);

/// Response extension a handler sets to drive the cache-hint header.
#[derive(Debug, Clone, Copy)]
pub struct CacheHint(pub bool);

/// Validate a caller-supplied correlation id.
pub fn is_valid_correlation_id(candidate: &str) -> bool {
    VALID_CORRELATION.is_match(candidate)
}

/// Extract or mint the correlation id for a request.
fn resolve_correlation_id(request: &Request) -> String {
    request
        .headers()
        .get(CORRELATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|candidate| is_valid_correlation_id(candidate))
        .map(|v| v.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// The middleware itself.
pub async fn correlation_middleware(mut request: Request, next: Next) -> Response {
    let correlation_id = resolve_correlation_id(&request);
    request
        .extensions_mut()
        .insert(CorrelationId(correlation_id.clone()));

    let started = Instant::now();
    let mut response = next.run(request).await;

    // The body-limit layer rejects with a bare 413; reshape it into the
    // structured envelope so callers always see the same error format.
    if response.status() == StatusCode::PAYLOAD_TOO_LARGE
        && response.extensions().get::<CacheHint>().is_none()
        && response
            .headers()
            .get(axum::http::header::CONTENT_TYPE)
            .map(|ct| ct != "application/json")
            .unwrap_or(true)
    {
        response = ApiError::request_too_large()
            .with_correlation_id(correlation_id.clone())
            .into_response();
    }

    let elapsed_ms = started.elapsed().as_millis() as u64;
    let tier = PerformanceTier::from_millis(elapsed_ms);
    let cached = response
        .extensions()
        .get::<CacheHint>()
        .map(|hint| hint.0)
        .unwrap_or(false);

    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        headers.insert(CORRELATION_HEADER, value);
    }
    if let Ok(value) = HeaderValue::from_str(&elapsed_ms.to_string()) {
        headers.insert(RESPONSE_TIME_HEADER, value);
    }
    headers.insert(
        PERFORMANCE_TIER_HEADER,
        HeaderValue::from_static(tier.as_str()),
    );
    headers.insert(
        CACHE_HINT_HEADER,
        HeaderValue::from_static(if cached { "hit" } else { "miss" }),
    );

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, middleware, routing::get, Router};
    use tower::ServiceExt;

    fn app() -> Router {
        Router::new()
            .route(
                "/echo",
                get(|axum::Extension(id): axum::Extension<CorrelationId>| async move { id.0 }),
            )
            .layer(middleware::from_fn(correlation_middleware))
    }

    #[test]
    fn test_correlation_id_validation() {
        assert!(is_valid_correlation_id("abc-123_XYZ"));
        assert!(!is_valid_correlation_id(""));
        assert!(!is_valid_correlation_id("bad id with spaces"));
        assert!(!is_valid_correlation_id(&"x".repeat(101)));
        assert!(is_valid_correlation_id(&"x".repeat(100)));
    }

    #[tokio::test]
    async fn test_valid_id_is_echoed() {
        let request = axum::http::Request::builder()
            .uri("/echo")
            .header(CORRELATION_HEADER, "my-correlation-1")
            .body(Body::empty())
            .unwrap();
        let response = app().oneshot(request).await.unwrap();

        assert_eq!(
            response.headers().get(CORRELATION_HEADER).unwrap(),
            "my-correlation-1"
        );
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(body, "my-correlation-1".as_bytes());
    }

    #[tokio::test]
    async fn test_invalid_id_is_replaced() {
        let request = axum::http::Request::builder()
            .uri("/echo")
            .header(CORRELATION_HEADER, "has spaces!")
            .body(Body::empty())
            .unwrap();
        let response = app().oneshot(request).await.unwrap();

        let echoed = response
            .headers()
            .get(CORRELATION_HEADER)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert_ne!(echoed, "has spaces!");
        assert!(is_valid_correlation_id(&echoed));
    }

    #[tokio::test]
    async fn test_timing_headers_present() {
        let request = axum::http::Request::builder()
            .uri("/echo")
            .body(Body::empty())
            .unwrap();
        let response = app().oneshot(request).await.unwrap();

        assert!(response.headers().contains_key(RESPONSE_TIME_HEADER));
        assert!(response.headers().contains_key(PERFORMANCE_TIER_HEADER));
        assert_eq!(response.headers().get(CACHE_HINT_HEADER).unwrap(), "miss");
    }
}
