//! Runbook endpoints: search, single retrieval, listing, decision trees

use crate::correlation::CorrelationId;
use crate::error::ApiError;
use crate::routes::{err_envelope, ok_envelope};
use crate::tools::{DecisionTreeInput, SearchRunbooksInput, ToolEngine, ToolOutcome};
use axum::{
    extract::{Path, Query, State},
    response::Response,
    Extension, Json,
};
use chrono::Utc;
use serde::Deserialize;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use triage_core::{Runbook, Severity};

/// POST /api/runbooks/search
pub async fn search_runbooks(
    State(tools): State<Arc<ToolEngine>>,
    Extension(correlation): Extension<CorrelationId>,
    Json(input): Json<SearchRunbooksInput>,
) -> Response {
    let started = Instant::now();
    match tools.search_runbooks(input).await {
        Ok(outcome) => ok_envelope(&correlation.0, started, outcome),
        Err(error) => err_envelope(&correlation.0, error),
    }
}

/// POST /api/decision-tree
pub async fn get_decision_tree(
    State(tools): State<Arc<ToolEngine>>,
    Extension(correlation): Extension<CorrelationId>,
    Json(input): Json<DecisionTreeInput>,
) -> Response {
    let started = Instant::now();
    match tools.get_decision_tree(input).await {
        Ok(outcome) => ok_envelope(&correlation.0, started, outcome),
        Err(error) => err_envelope(&correlation.0, error),
    }
}

/// Payload for single-runbook retrieval.
#[derive(Debug, serde::Serialize)]
pub struct RunbookPayload {
    pub runbook: Runbook,
}

/// GET /api/runbooks/{id}
pub async fn get_runbook(
    State(tools): State<Arc<ToolEngine>>,
    Extension(correlation): Extension<CorrelationId>,
    Path(id): Path<String>,
) -> Response {
    let started = Instant::now();
    match tools.lookup_runbook(&id).await {
        Ok(Some(runbook)) => {
            let outcome = ToolOutcome {
                success: true,
                message: None,
                retrieval_time_ms: started.elapsed().as_millis() as u64,
                timestamp: Utc::now(),
                cached: false,
                payload: RunbookPayload { runbook },
            };
            ok_envelope(&correlation.0, started, outcome)
        }
        Ok(None) => err_envelope(
            &correlation.0,
            ApiError::not_found(format!("Runbook {}", id)),
        ),
        Err(error) => err_envelope(&correlation.0, error),
    }
}

/// Query parameters for runbook listing.
#[derive(Debug, Default, Deserialize)]
pub struct ListRunbooksQuery {
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

/// GET /api/runbooks
pub async fn list_runbooks(
    State(tools): State<Arc<ToolEngine>>,
    Extension(correlation): Extension<CorrelationId>,
    Query(query): Query<ListRunbooksQuery>,
) -> Response {
    let started = Instant::now();

    // The listing only ever holds runbook-category documents; any other
    // category filter is an empty result, not an error.
    if let Some(category) = &query.category {
        if !category.eq_ignore_ascii_case("runbook") {
            let outcome = ToolOutcome {
                success: true,
                message: Some(format!("no runbooks in category {}", category)),
                retrieval_time_ms: started.elapsed().as_millis() as u64,
                timestamp: Utc::now(),
                cached: false,
                payload: crate::tools::RunbookListPayload {
                    runbooks: vec![],
                    total: 0,
                    limit_clamped: false,
                },
            };
            return ok_envelope(&correlation.0, started, outcome);
        }
    }

    let severity = match &query.severity {
        None => None,
        Some(raw) => match Severity::from_str(raw) {
            Ok(severity) => Some(severity),
            Err(e) => {
                return err_envelope(&correlation.0, ApiError::invalid_field("severity", e))
            }
        },
    };

    match tools.list_runbooks(severity, query.limit).await {
        Ok(outcome) => ok_envelope(&correlation.0, started, outcome),
        Err(error) => err_envelope(&correlation.0, error),
    }
}
