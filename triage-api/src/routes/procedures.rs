//! Procedure retrieval endpoint

use crate::correlation::CorrelationId;
use crate::routes::{err_envelope, ok_envelope};
use crate::tools::ToolEngine;
use axum::{
    extract::{Path, State},
    response::Response,
    Extension,
};
use std::sync::Arc;
use std::time::Instant;

/// GET /api/procedures/{id}
///
/// The id format `<runbook-id>_<step-name>` is validated by the tool layer.
pub async fn get_procedure(
    State(tools): State<Arc<ToolEngine>>,
    Extension(correlation): Extension<CorrelationId>,
    Path(id): Path<String>,
) -> Response {
    let started = Instant::now();
    match tools.get_procedure(&id).await {
        Ok(outcome) => ok_envelope(&correlation.0, started, outcome),
        Err(error) => err_envelope(&correlation.0, error),
    }
}
