//! Background health monitor
//!
//! Polls every source on the configured interval, runs cache maintenance
//! (slow-tier reconnection), and caches the latest snapshot for the
//! health endpoint. Source health comes from the snapshot; cache health
//! is always re-read live because it is a cheap local check.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use triage_adapters::AdapterRegistry;
use triage_cache::{CacheHealth, HybridCache};
use triage_core::{aggregate_status, HealthStatus, SourceHealth};

/// Latest health view.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub status: HealthStatus,
    pub sources: HashMap<String, SourceHealth>,
    pub cache: CacheHealth,
    pub checked_at: DateTime<Utc>,
}

impl HealthSnapshot {
    fn empty() -> Self {
        Self {
            status: HealthStatus::Unknown,
            sources: HashMap::new(),
            cache: CacheHealth {
                overall_healthy: true,
                fast_tier_healthy: true,
                slow_tier_connected: None,
            },
            checked_at: Utc::now(),
        }
    }
}

/// Periodic poller over the registry and cache.
pub struct HealthMonitor {
    registry: Arc<AdapterRegistry>,
    cache: Arc<HybridCache>,
    interval: Duration,
    snapshot: RwLock<HealthSnapshot>,
}

impl HealthMonitor {
    pub fn new(registry: Arc<AdapterRegistry>, cache: Arc<HybridCache>, interval: Duration) -> Self {
        Self {
            registry,
            cache,
            interval,
            snapshot: RwLock::new(HealthSnapshot::empty()),
        }
    }

    /// Poll once and refresh the snapshot.
    pub async fn poll_now(&self) -> HealthSnapshot {
        self.cache.maintain().await;

        let sources = self.registry.health_check_all().await;
        let cache = self.cache.health().await;
        let source_flags: Vec<bool> = sources.values().map(|h| h.healthy).collect();
        let status = aggregate_status(&source_flags, cache.overall_healthy);

        let snapshot = HealthSnapshot {
            status,
            sources,
            cache,
            checked_at: Utc::now(),
        };
        *self.snapshot.write().await = snapshot.clone();
        snapshot
    }

    /// Latest snapshot with the cache portion refreshed live.
    pub async fn current(&self) -> HealthSnapshot {
        let mut snapshot = self.snapshot.read().await.clone();
        snapshot.cache = self.cache.health().await;
        let source_flags: Vec<bool> = snapshot.sources.values().map(|h| h.healthy).collect();
        snapshot.status = aggregate_status(&source_flags, snapshot.cache.overall_healthy);
        snapshot
    }

    /// Spawn the polling loop. The handle lives for the process lifetime.
    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let snapshot = self.poll_now().await;
                tracing::debug!(
                    status = ?snapshot.status,
                    sources = snapshot.sources.len(),
                    "health poll complete"
                );
            }
        })
    }
}

impl std::fmt::Debug for HealthMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthMonitor")
            .field("interval", &self.interval)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_registry_with_healthy_cache() {
        let registry = Arc::new(AdapterRegistry::new());
        let cache = Arc::new(HybridCache::disabled());
        let monitor = HealthMonitor::new(registry, cache, Duration::from_secs(60));

        let snapshot = monitor.poll_now().await;
        assert_eq!(snapshot.status, HealthStatus::Healthy);
        assert!(snapshot.sources.is_empty());
    }

    #[tokio::test]
    async fn test_current_before_first_poll_is_unknown_sources() {
        let registry = Arc::new(AdapterRegistry::new());
        let cache = Arc::new(HybridCache::disabled());
        let monitor = HealthMonitor::new(registry, cache, Duration::from_secs(60));

        let snapshot = monitor.current().await;
        assert!(snapshot.sources.is_empty());
    }
}
