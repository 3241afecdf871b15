//! TRIAGE API - HTTP and Tool-Call Surfaces
//!
//! This crate provides the two request surfaces of the TRIAGE engine:
//! eleven JSON endpoints under `/api/*` and the MCP tool-call protocol
//! under `/mcp/*`. Both wrap the same tool layer, which owns the seven
//! named operations and their cache/fan-out flow.

pub mod config;
pub mod correlation;
pub mod envelope;
pub mod error;
pub mod macros;
pub mod mcp;
pub mod metrics;
pub mod monitor;
pub mod routes;
pub mod state;
pub mod tools;
pub mod validation;

// Re-export commonly used types
pub use config::{init_tracing, load_config};
pub use correlation::{
    correlation_middleware, is_valid_correlation_id, CacheHint, CorrelationId,
    CACHE_HINT_HEADER, CORRELATION_HEADER, PERFORMANCE_TIER_HEADER, RESPONSE_TIME_HEADER,
};
pub use envelope::{ApiResponse, ResponseMetadata};
pub use error::{ApiError, ApiResult, ErrorCode, ErrorDetails};
pub use metrics::{PerformanceSnapshot, PerformanceTracker};
pub use monitor::{HealthMonitor, HealthSnapshot};
pub use routes::create_api_router;
pub use state::AppState;
pub use tools::{ToolEngine, ToolOutcome};
pub use validation::{FieldErrors, ValidateNonEmpty, ValidateRange};
