//! Escalation-path endpoint

use crate::correlation::CorrelationId;
use crate::routes::{err_envelope, ok_envelope};
use crate::tools::{EscalationInput, ToolEngine};
use axum::{extract::State, response::Response, Extension, Json};
use std::sync::Arc;
use std::time::Instant;

/// POST /api/escalation
pub async fn get_escalation_path(
    State(tools): State<Arc<ToolEngine>>,
    Extension(correlation): Extension<CorrelationId>,
    Json(input): Json<EscalationInput>,
) -> Response {
    let started = Instant::now();
    match tools.get_escalation_path(input).await {
        Ok(outcome) => ok_envelope(&correlation.0, started, outcome),
        Err(error) => err_envelope(&correlation.0, error),
    }
}
