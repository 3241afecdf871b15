//! MCP tool-call surface
//!
//! The second request surface: the same seven operations as the HTTP
//! endpoints, spoken over the MCP tool-call protocol. Both surfaces share
//! the tool layer; this module only adds protocol types, schema
//! validation, and dispatch.

pub mod handlers;
pub mod tools;
pub mod types;

use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};

/// Routes for the MCP surface.
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/mcp/initialize", post(handlers::initialize))
        .route("/mcp/tools", get(handlers::list_tools))
        .route("/mcp/tools/call", post(handlers::call_tool))
}
