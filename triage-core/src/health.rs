//! Unified health types
//!
//! Shared across the adapter, cache, and API crates for consistent health
//! reporting.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Health status for a service or component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Component is fully operational
    Healthy,
    /// Component is operational but degraded
    Degraded,
    /// Component is not operational
    Unhealthy,
    /// Health status has not been determined yet
    Unknown,
}

/// Result of a single source health check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SourceHealth {
    pub healthy: bool,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl SourceHealth {
    pub fn healthy(latency_ms: u64) -> Self {
        Self {
            healthy: true,
            latency_ms,
            error: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn unhealthy(latency_ms: u64, error: impl Into<String>) -> Self {
        Self {
            healthy: false,
            latency_ms,
            error: Some(error.into()),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Health of a named component, used for aggregate reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ComponentHealth {
    pub component: String,
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

impl ComponentHealth {
    pub fn healthy(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            status: HealthStatus::Healthy,
            message: None,
            latency_ms: None,
        }
    }

    pub fn degraded(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            status: HealthStatus::Degraded,
            message: Some(message.into()),
            latency_ms: None,
        }
    }

    pub fn unhealthy(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            status: HealthStatus::Unhealthy,
            message: Some(message.into()),
            latency_ms: None,
        }
    }

    pub fn with_latency(mut self, ms: u64) -> Self {
        self.latency_ms = Some(ms);
        self
    }
}

/// Aggregate service status derived from per-source health plus cache health.
///
/// Healthy iff every enabled source is healthy and the cache is healthy;
/// degraded when some but not all sources are down; unhealthy when none are up.
pub fn aggregate_status(source_health: &[bool], cache_healthy: bool) -> HealthStatus {
    if source_health.is_empty() {
        return if cache_healthy {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        };
    }
    let healthy = source_health.iter().filter(|h| **h).count();
    if healthy == 0 {
        HealthStatus::Unhealthy
    } else if healthy == source_health.len() && cache_healthy {
        HealthStatus::Healthy
    } else {
        HealthStatus::Degraded
    }
}
