//! Aggregate health endpoint
//!
//! Healthy and degraded report 200; unhealthy reports 503 so load
//! balancers can rotate the instance out.

use crate::correlation::CorrelationId;
use crate::envelope::{ApiResponse, ResponseMetadata};
use crate::monitor::HealthMonitor;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use triage_cache::CacheHealth;
use triage_core::{HealthStatus, SourceHealth};

#[derive(Debug, Serialize)]
pub struct HealthPayload {
    pub api_status: HealthStatus,
    pub sources: HashMap<String, SourceHealth>,
    pub cache: CacheHealth,
    pub checked_at: DateTime<Utc>,
}

/// GET /api/health
pub async fn health(
    State(monitor): State<Arc<HealthMonitor>>,
    Extension(correlation): Extension<CorrelationId>,
) -> Response {
    let started = Instant::now();
    let snapshot = monitor.current().await;

    let status_code = match snapshot.status {
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    };

    let payload = HealthPayload {
        api_status: snapshot.status,
        sources: snapshot.sources,
        cache: snapshot.cache,
        checked_at: snapshot.checked_at,
    };
    let metadata = ResponseMetadata::new(
        correlation.0,
        started.elapsed().as_millis() as u64,
        false,
    );
    (status_code, Json(ApiResponse::ok(payload, metadata))).into_response()
}
