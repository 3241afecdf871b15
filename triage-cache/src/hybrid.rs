//! Hybrid cache front
//!
//! Routes reads and writes across the fast and slow tiers according to the
//! configured strategy. Tier errors never surface to callers as request
//! failures; they downgrade the operation and the health report instead.

use crate::backend::{CacheBackend, CacheKey, CachedValue};
use crate::memory::MemoryCache;
use crate::redis_tier::RedisCache;
use crate::stats::{CacheStatsSnapshot, StatsTracker};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use triage_core::{CacheError, CacheSettings, CacheStrategy, ContentType};

/// Health view of the cache as a whole.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheHealth {
    pub overall_healthy: bool,
    pub fast_tier_healthy: bool,
    /// None when no slow tier is configured.
    pub slow_tier_connected: Option<bool>,
}

/// Two-level cache coordinator.
///
/// In hybrid mode reads consult fast first, then slow; a slow hit
/// repopulates fast within the same operation. Writes go to both tiers
/// with a single effective TTL decided from the content-type policy.
pub struct HybridCache {
    fast: Option<Arc<MemoryCache>>,
    slow: Option<Arc<RedisCache>>,
    settings: CacheSettings,
    stats: StatsTracker,
}

impl HybridCache {
    /// Build from settings. The slow tier is constructed but not yet
    /// connected; call [`HybridCache::maintain`] (the health cycle does)
    /// or rely on the first startup connection attempt.
    pub fn from_settings(settings: &CacheSettings) -> Result<Self, CacheError> {
        let fast = match settings.strategy {
            CacheStrategy::MemoryOnly | CacheStrategy::Hybrid => {
                Some(Arc::new(MemoryCache::new(settings.memory.max_keys)))
            }
            CacheStrategy::RedisOnly => None,
        };

        let slow = match settings.strategy {
            CacheStrategy::RedisOnly | CacheStrategy::Hybrid => {
                let redis_config =
                    settings
                        .redis
                        .as_ref()
                        .ok_or_else(|| CacheError::Backend {
                            reason: "redis strategy configured without redis settings".to_string(),
                        })?;
                Some(Arc::new(RedisCache::new(redis_config)?))
            }
            CacheStrategy::MemoryOnly => None,
        };

        Ok(Self {
            fast,
            slow,
            settings: settings.clone(),
            stats: StatsTracker::new(),
        })
    }

    /// A disabled cache: every read misses, every write is a no-op.
    pub fn disabled() -> Self {
        let mut settings = CacheSettings::default();
        settings.enabled = false;
        Self {
            fast: None,
            slow: None,
            settings,
            stats: StatsTracker::new(),
        }
    }

    /// Effective TTL for a tag from policy, falling back to built-ins.
    pub fn ttl_for(&self, tag: ContentType) -> Duration {
        Duration::from_secs(self.settings.policy_for(tag).ttl_seconds)
    }

    /// Tags flagged for warmup preloading.
    pub fn warmup_tags(&self) -> Vec<ContentType> {
        ContentType::all()
            .into_iter()
            .filter(|tag| self.settings.policy_for(*tag).warmup)
            .collect()
    }

    pub fn is_enabled(&self) -> bool {
        self.settings.enabled && (self.fast.is_some() || self.slow.is_some())
    }

    /// Read a raw cached value.
    pub async fn get(&self, key: &CacheKey) -> Option<CachedValue> {
        if !self.is_enabled() {
            return None;
        }

        if let Some(fast) = &self.fast {
            match fast.get(key).await {
                Ok(Some(value)) => {
                    self.stats.record_hit(key.content_type);
                    return Some(value);
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(key = %key, error = %e, "fast tier read failed"),
            }
        }

        if let Some(slow) = &self.slow {
            match slow.get(key).await {
                Ok(Some(value)) => {
                    // Repopulate the fast tier with the remaining TTL so the
                    // entry expires at the same instant in both tiers.
                    if let Some(fast) = &self.fast {
                        if let Err(e) = fast.set(key, value.clone()).await {
                            tracing::warn!(key = %key, error = %e, "fast tier repopulation failed");
                        }
                    }
                    self.stats.record_hit(key.content_type);
                    return Some(value);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::debug!(key = %key, error = %e, "slow tier read failed, degraded to fast-only");
                }
            }
        }

        self.stats.record_miss(key.content_type);
        None
    }

    /// Write a raw payload under the tag's effective TTL.
    pub async fn set(&self, key: &CacheKey, payload: String) -> Result<(), CacheError> {
        if !self.is_enabled() {
            return Ok(());
        }

        let value = CachedValue::new(payload, self.ttl_for(key.content_type));
        self.stats.record_set(key.content_type);

        if let Some(fast) = &self.fast {
            fast.set(key, value.clone()).await?;
        }
        if let Some(slow) = &self.slow {
            // Slow-tier write failures degrade silently; the fast tier
            // already holds the value.
            if let Err(e) = slow.set(key, value).await {
                tracing::debug!(key = %key, error = %e, "slow tier write skipped");
            }
        }
        Ok(())
    }

    /// Read and deserialize a cached JSON payload.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let value = self.get(key).await?;
        match serde_json::from_str(&value.payload) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "cached payload failed to decode, dropping");
                self.delete(key).await;
                None
            }
        }
    }

    /// Serialize and write a JSON payload.
    pub async fn set_json<T: Serialize>(&self, key: &CacheKey, value: &T) -> Result<(), CacheError> {
        let payload = serde_json::to_string(value).map_err(|e| CacheError::Serialization {
            reason: e.to_string(),
        })?;
        self.set(key, payload).await
    }

    /// Remove an entry from every tier.
    pub async fn delete(&self, key: &CacheKey) {
        if let Some(fast) = &self.fast {
            let _ = fast.delete(key).await;
        }
        if let Some(slow) = &self.slow {
            let _ = slow.delete(key).await;
        }
    }

    /// Drop everything from every tier.
    pub async fn clear(&self) {
        if let Some(fast) = &self.fast {
            let _ = fast.clear().await;
        }
        if let Some(slow) = &self.slow {
            let _ = slow.clear().await;
        }
    }

    /// Snapshot statistics.
    pub async fn stats(&self) -> CacheStatsSnapshot {
        let fast_keys = match &self.fast {
            Some(fast) => fast.key_count().await.unwrap_or(0),
            None => 0,
        };
        let memory_bytes = self.fast.as_ref().map(|f| f.memory_bytes()).unwrap_or(0);
        let slow_connected = match &self.slow {
            Some(slow) => slow.is_connected().await,
            None => false,
        };
        CacheStatsSnapshot::from_tracker(&self.stats, fast_keys, memory_bytes, slow_connected)
    }

    /// Current health. Overall healthy requires every configured tier to
    /// be usable; a configured-but-disconnected slow tier means degraded.
    pub async fn health(&self) -> CacheHealth {
        let fast_healthy = match &self.fast {
            Some(fast) => fast.is_healthy().await,
            None => true,
        };
        let slow_connected = match &self.slow {
            Some(slow) => Some(slow.is_healthy().await),
            None => None,
        };
        CacheHealth {
            overall_healthy: fast_healthy && slow_connected.unwrap_or(true),
            fast_tier_healthy: fast_healthy,
            slow_tier_connected: slow_connected,
        }
    }

    /// Health-cycle hook: re-arm the slow tier's reconnect backoff and
    /// attempt a reconnect if it is down.
    pub async fn maintain(&self) {
        if let Some(slow) = &self.slow {
            if !slow.is_connected().await {
                slow.reset_backoff();
                slow.try_connect().await;
            }
        }
    }
}

impl std::fmt::Debug for HybridCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HybridCache")
            .field("strategy", &self.settings.strategy)
            .field("enabled", &self.settings.enabled)
            .finish()
    }
}
