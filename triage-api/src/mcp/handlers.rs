//! MCP route handlers
//!
//! Initialize, list-tools, and call-tool. Tool output is a single text
//! content block holding the same JSON envelope the HTTP surface uses,
//! minus header-only fields.

use super::tools;
use super::types::*;
use crate::envelope::{ApiResponse, ResponseMetadata};
use crate::error::ApiError;
use crate::state::AppState;
use crate::tools::{
    DecisionTreeInput, EscalationInput, FeedbackInput, KnowledgeSearchInput, SearchRunbooksInput,
    ToolEngine, ToolOutcome,
};
use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// POST /mcp/initialize
pub async fn initialize(Json(request): Json<InitializeRequest>) -> Json<InitializeResponse> {
    tracing::info!(
        client = %request.client_info.name,
        version = %request.client_info.version,
        requested_protocol = %request.protocol_version,
        "mcp session initialized"
    );
    Json(InitializeResponse {
        protocol_version: MCP_PROTOCOL_VERSION.to_string(),
        capabilities: ServerCapabilities {
            tools: ToolsCapability {
                list_changed: false,
            },
        },
        server_info: ServerInfo {
            name: "triage".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
    })
}

/// GET /mcp/tools
pub async fn list_tools() -> Json<ListToolsResponse> {
    Json(ListToolsResponse {
        tools: tools::TOOLS.iter().map(|t| t.tool.clone()).collect(),
    })
}

/// POST /mcp/tools/call
pub async fn call_tool(
    State(state): State<AppState>,
    Json(request): Json<CallToolRequest>,
) -> Json<CallToolResponse> {
    let started = Instant::now();
    let correlation_id = Uuid::new_v4().to_string();

    let Some(registered) = tools::find(&request.name) else {
        let error = ApiError::invalid_field("name", format!("unknown tool {}", request.name))
            .with_correlation_id(correlation_id);
        return Json(error_block(error));
    };

    // Schema validation first so argument errors carry field paths.
    let schema_errors: Vec<String> = registered
        .validator
        .iter_errors(&request.arguments)
        .map(|e| format!("{} at {}", e, e.instance_path()))
        .collect();
    if !schema_errors.is_empty() {
        let error = ApiError::validation(schema_errors).with_correlation_id(correlation_id);
        return Json(error_block(error));
    }

    let outcome = dispatch(&state.tools, &request, started, &correlation_id).await;
    Json(match outcome {
        Ok(response) => response,
        Err(error) => error_block(error.with_correlation_id(correlation_id)),
    })
}

async fn dispatch(
    engine: &Arc<ToolEngine>,
    request: &CallToolRequest,
    started: Instant,
    correlation_id: &str,
) -> Result<CallToolResponse, ApiError> {
    let args = request.arguments.clone();
    match request.name.as_str() {
        "search-runbooks" => {
            let input: SearchRunbooksInput = parse_args(args)?;
            wrap(engine.search_runbooks(input).await?, started, correlation_id)
        }
        "get-decision-tree" => {
            let input: DecisionTreeInput = parse_args(args)?;
            wrap(engine.get_decision_tree(input).await?, started, correlation_id)
        }
        "get-procedure" => {
            let procedure_id = args
                .get("procedure_id")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            wrap(
                engine.get_procedure(&procedure_id).await?,
                started,
                correlation_id,
            )
        }
        "get-escalation-path" => {
            let input: EscalationInput = parse_args(args)?;
            wrap(
                engine.get_escalation_path(input).await?,
                started,
                correlation_id,
            )
        }
        "list-sources" => wrap(engine.list_sources().await?, started, correlation_id),
        "search-knowledge-base" => {
            let input: KnowledgeSearchInput = parse_args(args)?;
            wrap(
                engine.search_knowledge_base(input).await?,
                started,
                correlation_id,
            )
        }
        "record-resolution-feedback" => {
            let input: FeedbackInput = parse_args(args)?;
            wrap(engine.record_feedback(input).await?, started, correlation_id)
        }
        other => Err(ApiError::invalid_field(
            "name",
            format!("unknown tool {}", other),
        )),
    }
}

fn parse_args<T: serde::de::DeserializeOwned>(args: serde_json::Value) -> Result<T, ApiError> {
    serde_json::from_value(args)
        .map_err(|e| ApiError::validation(vec![format!("Invalid arguments: {}", e)]))
}

/// Wrap a tool outcome in the shared envelope and encode it as one text
/// block.
fn wrap<T: Serialize>(
    outcome: ToolOutcome<T>,
    started: Instant,
    correlation_id: &str,
) -> Result<CallToolResponse, ApiError> {
    let metadata = ResponseMetadata::new(
        correlation_id,
        started.elapsed().as_millis() as u64,
        outcome.cached,
    );
    let envelope = ApiResponse::ok(outcome, metadata);
    let text = serde_json::to_string(&envelope)?;
    Ok(CallToolResponse::text(text, false))
}

fn error_block(error: ApiError) -> CallToolResponse {
    let envelope = ApiResponse::<()>::from_error(error);
    let text = serde_json::to_string(&envelope)
        .unwrap_or_else(|_| r#"{"success":false}"#.to_string());
    CallToolResponse::text(text, true)
}
