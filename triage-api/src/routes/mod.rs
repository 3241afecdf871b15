//! REST API routes
//!
//! Eleven endpoints in a flat `/api/*` namespace mapping onto the tool
//! layer, plus the MCP tool-call routes. Every route shares the
//! correlation middleware, the body-size limit, and the backpressure
//! guard.

pub mod escalation;
pub mod feedback;
pub mod health;
pub mod performance;
pub mod procedures;
pub mod runbooks;
pub mod search;
pub mod sources;

use crate::correlation::{correlation_middleware, CacheHint, CorrelationId};
use crate::envelope::{ApiResponse, ResponseMetadata};
use crate::error::ApiError;
use crate::state::AppState;
use crate::tools::ToolOutcome;
use axum::{
    extract::{DefaultBodyLimit, Request, State},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Request body size cap.
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Build the full API router.
pub fn create_api_router(state: AppState) -> Router {
    Router::new()
        .route("/api/search", post(search::search_knowledge_base))
        .route("/api/runbooks/search", post(runbooks::search_runbooks))
        .route("/api/runbooks", get(runbooks::list_runbooks))
        .route("/api/runbooks/:id", get(runbooks::get_runbook))
        .route("/api/decision-tree", post(runbooks::get_decision_tree))
        .route("/api/procedures/:id", get(procedures::get_procedure))
        .route("/api/escalation", post(escalation::get_escalation_path))
        .route("/api/sources", get(sources::list_sources))
        .route("/api/feedback", post(feedback::record_feedback))
        .route("/api/health", get(health::health))
        .route("/api/performance", get(performance::performance))
        .merge(crate::mcp::create_router())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            backpressure_middleware,
        ))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(middleware::from_fn(correlation_middleware))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Reject requests beyond the configured concurrency budget with
/// `503 OVERLOADED` and a retry-after hint.
async fn backpressure_middleware(
    State(permits): State<Arc<Semaphore>>,
    request: Request,
    next: Next,
) -> Response {
    match permits.try_acquire() {
        Ok(_permit) => next.run(request).await,
        Err(_) => {
            let correlation_id = request
                .extensions()
                .get::<CorrelationId>()
                .map(|c| c.0.clone())
                .unwrap_or_default();
            let mut response = ApiError::overloaded()
                .with_correlation_id(correlation_id)
                .into_response();
            response.headers_mut().insert(
                axum::http::header::RETRY_AFTER,
                axum::http::HeaderValue::from_static("1"),
            );
            response
        }
    }
}

/// Wrap a tool outcome in the HTTP envelope, stamping the cache hint
/// extension for the correlation middleware.
pub(crate) fn ok_envelope<T: Serialize>(
    correlation_id: &str,
    started: Instant,
    outcome: ToolOutcome<T>,
) -> Response {
    let cached = outcome.cached;
    let metadata = ResponseMetadata::new(
        correlation_id,
        started.elapsed().as_millis() as u64,
        cached,
    );
    let mut response = axum::Json(ApiResponse::ok(outcome, metadata)).into_response();
    response.extensions_mut().insert(CacheHint(cached));
    response
}

/// Attach the correlation id to an error and convert it.
pub(crate) fn err_envelope(correlation_id: &str, error: ApiError) -> Response {
    error.with_correlation_id(correlation_id).into_response()
}
