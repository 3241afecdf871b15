//! Knowledge-base search endpoint

use crate::correlation::CorrelationId;
use crate::routes::{err_envelope, ok_envelope};
use crate::tools::{KnowledgeSearchInput, ToolEngine};
use axum::{extract::State, response::Response, Extension, Json};
use std::sync::Arc;
use std::time::Instant;

/// POST /api/search
pub async fn search_knowledge_base(
    State(tools): State<Arc<ToolEngine>>,
    Extension(correlation): Extension<CorrelationId>,
    Json(input): Json<KnowledgeSearchInput>,
) -> Response {
    let started = Instant::now();
    match tools.search_knowledge_base(input).await {
        Ok(outcome) => ok_envelope(&correlation.0, started, outcome),
        Err(error) => err_envelope(&correlation.0, error),
    }
}
