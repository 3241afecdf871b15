//! Shared application state for Axum routers.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use triage_adapters::AdapterRegistry;
use triage_cache::HybridCache;
use triage_core::AppConfig;

use crate::metrics::PerformanceTracker;
use crate::monitor::HealthMonitor;
use crate::tools::ToolEngine;

/// Application-wide state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    pub tools: Arc<ToolEngine>,
    pub registry: Arc<AdapterRegistry>,
    pub cache: Arc<HybridCache>,
    pub metrics: Arc<PerformanceTracker>,
    pub monitor: Arc<HealthMonitor>,
    /// Request-concurrency budget backing the overload rejection.
    pub request_permits: Arc<Semaphore>,
    pub config: Arc<AppConfig>,
    pub start_time: Instant,
}

// Use the macro to reduce boilerplate for FromRef implementations
crate::impl_from_ref!(Arc<ToolEngine>, tools);
crate::impl_from_ref!(Arc<AdapterRegistry>, registry);
crate::impl_from_ref!(Arc<HybridCache>, cache);
crate::impl_from_ref!(Arc<PerformanceTracker>, metrics);
crate::impl_from_ref!(Arc<HealthMonitor>, monitor);
crate::impl_from_ref!(Arc<Semaphore>, request_permits);
crate::impl_from_ref!(Arc<AppConfig>, config);
crate::impl_from_ref!(Instant, start_time);
