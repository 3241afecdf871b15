//! Performance snapshot endpoint

use crate::correlation::CorrelationId;
use crate::envelope::{ApiResponse, ResponseMetadata};
use crate::metrics::{PerformanceSnapshot, PerformanceTracker};
use axum::{
    extract::State,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use triage_cache::{CacheStatsSnapshot, HybridCache};

#[derive(Debug, Serialize)]
pub struct PerformancePayload {
    #[serde(flatten)]
    pub engine: PerformanceSnapshot,
    pub cache: CacheStatsSnapshot,
}

/// GET /api/performance
pub async fn performance(
    State(metrics): State<Arc<PerformanceTracker>>,
    State(cache): State<Arc<HybridCache>>,
    Extension(correlation): Extension<CorrelationId>,
) -> Response {
    let started = Instant::now();
    let payload = PerformancePayload {
        engine: metrics.snapshot(),
        cache: cache.stats().await,
    };
    let metadata = ResponseMetadata::new(
        correlation.0,
        started.elapsed().as_millis() as u64,
        false,
    );
    Json(ApiResponse::ok(payload, metadata)).into_response()
}
