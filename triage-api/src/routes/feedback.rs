//! Resolution feedback endpoint

use crate::correlation::CorrelationId;
use crate::routes::{err_envelope, ok_envelope};
use crate::tools::{FeedbackInput, ToolEngine};
use axum::{extract::State, response::Response, Extension, Json};
use std::sync::Arc;
use std::time::Instant;

/// POST /api/feedback
pub async fn record_feedback(
    State(tools): State<Arc<ToolEngine>>,
    Extension(correlation): Extension<CorrelationId>,
    Json(input): Json<FeedbackInput>,
) -> Response {
    let started = Instant::now();
    match tools.record_feedback(input).await {
        Ok(outcome) => ok_envelope(&correlation.0, started, outcome),
        Err(error) => err_envelope(&correlation.0, error),
    }
}
