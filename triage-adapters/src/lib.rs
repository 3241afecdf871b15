//! TRIAGE Adapters - Source Federation Layer
//!
//! Uniform read-only access to heterogeneous documentation sources:
//! - `SourceAdapter` trait plus file/web/wiki/git-host/database variants
//! - A circuit breaker per source
//! - The adapter registry that owns lifecycle, fan-out, retries, and
//!   result aggregation
//!
//! The registry is the only component that may invoke an adapter.

mod adapter;
mod breaker;
mod database;
mod factory;
mod file;
mod github;
mod http;
mod registry;
mod scoring;
mod web;
mod wiki;

pub use adapter::{runbook_from_document, AdapterMetadata, AdapterStats, SourceAdapter};
pub use breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState, Guarded};
pub use database::DatabaseAdapter;
pub use factory::build_adapter;
pub use file::FileAdapter;
pub use github::GitHostAdapter;
pub use http::PacedClient;
pub use registry::{
    AdapterRegistry, AggregatedRunbooks, AggregatedSearch, SourceFailure, DEFAULT_RESULT_LIMIT,
    MAX_RESULT_LIMIT,
};
pub use scoring::{
    excerpt_around, score_document, score_runbook, token_overlap, tokenize, DocumentScore,
    RunbookScore,
};
pub use web::WebAdapter;
pub use wiki::WikiAdapter;
