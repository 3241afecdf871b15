//! Source listing endpoint

use crate::correlation::CorrelationId;
use crate::routes::{err_envelope, ok_envelope};
use crate::tools::ToolEngine;
use axum::{extract::State, response::Response, Extension};
use std::sync::Arc;
use std::time::Instant;

/// GET /api/sources
pub async fn list_sources(
    State(tools): State<Arc<ToolEngine>>,
    Extension(correlation): Extension<CorrelationId>,
) -> Response {
    let started = Instant::now();
    match tools.list_sources().await {
        Ok(outcome) => ok_envelope(&correlation.0, started, outcome),
        Err(error) => err_envelope(&correlation.0, error),
    }
}
