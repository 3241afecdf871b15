//! Redis slow tier
//!
//! Optional external tier. Every operation is bounded by the configured
//! connection timeout; any failure marks the tier disconnected and the
//! hybrid front keeps serving from memory. Reconnection follows an
//! exponential backoff (1s, x2, cap 30s) and gives up after 5 attempts
//! until the next health cycle resets it.

use crate::backend::{CacheBackend, CacheKey, CachedValue};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::time::timeout;
use triage_core::{CacheError, RedisCacheConfig};

const BACKOFF_INITIAL: Duration = Duration::from_secs(1);
const BACKOFF_CAP: Duration = Duration::from_secs(30);
const BACKOFF_MAX_ATTEMPTS: u32 = 5;

struct BackoffState {
    attempts: u32,
    next_allowed: Instant,
}

/// Redis-backed cache tier with a configurable key prefix.
pub struct RedisCache {
    client: redis::Client,
    conn: RwLock<Option<ConnectionManager>>,
    key_prefix: String,
    op_timeout: Duration,
    backoff: Mutex<BackoffState>,
}

impl RedisCache {
    /// Build the tier. This validates the URL but does not connect;
    /// call [`RedisCache::try_connect`] to establish the connection.
    pub fn new(config: &RedisCacheConfig) -> Result<Self, CacheError> {
        let client = redis::Client::open(config.url.as_str()).map_err(|e| {
            CacheError::SlowTierUnavailable {
                reason: format!("invalid redis url: {}", e),
            }
        })?;
        Ok(Self {
            client,
            conn: RwLock::new(None),
            key_prefix: config.key_prefix.clone(),
            op_timeout: Duration::from_millis(config.connection_timeout_ms.max(100)),
            backoff: Mutex::new(BackoffState {
                attempts: 0,
                next_allowed: Instant::now(),
            }),
        })
    }

    fn prefixed(&self, key: &CacheKey) -> String {
        format!("{}{}", self.key_prefix, key.as_string())
    }

    /// Attempt to establish the connection. Returns whether the tier is
    /// connected afterwards. Honors the backoff schedule.
    pub async fn try_connect(&self) -> bool {
        if self.conn.read().await.is_some() {
            return true;
        }

        {
            let Ok(backoff) = self.backoff.lock() else {
                return false;
            };
            if backoff.attempts >= BACKOFF_MAX_ATTEMPTS || Instant::now() < backoff.next_allowed {
                return false;
            }
        }

        match timeout(self.op_timeout, ConnectionManager::new(self.client.clone())).await {
            Ok(Ok(manager)) => {
                *self.conn.write().await = Some(manager);
                self.reset_backoff();
                tracing::info!("redis slow tier connected");
                true
            }
            Ok(Err(e)) => {
                self.record_failure(&format!("connect failed: {}", e));
                false
            }
            Err(_) => {
                self.record_failure("connect timed out");
                false
            }
        }
    }

    /// Allow reconnection attempts again. Called by the health cycle after
    /// the backoff budget is exhausted.
    pub fn reset_backoff(&self) {
        if let Ok(mut backoff) = self.backoff.lock() {
            backoff.attempts = 0;
            backoff.next_allowed = Instant::now();
        }
    }

    fn record_failure(&self, reason: &str) {
        tracing::warn!(reason, "redis slow tier unavailable");
        if let Ok(mut backoff) = self.backoff.lock() {
            backoff.attempts += 1;
            let exp = BACKOFF_INITIAL.saturating_mul(1u32 << (backoff.attempts - 1).min(5));
            backoff.next_allowed = Instant::now() + exp.min(BACKOFF_CAP);
        }
    }

    async fn connection(&self) -> Result<ConnectionManager, CacheError> {
        self.conn
            .read()
            .await
            .clone()
            .ok_or_else(|| CacheError::SlowTierUnavailable {
                reason: "not connected".to_string(),
            })
    }

    /// Drop the connection after an operation failure so future calls go
    /// through the backoff path.
    async fn mark_disconnected(&self, reason: &str) {
        *self.conn.write().await = None;
        self.record_failure(reason);
    }

    async fn run<T, F>(&self, fut: F, op: &str) -> Result<T, CacheError>
    where
        F: std::future::Future<Output = Result<T, redis::RedisError>>,
    {
        match timeout(self.op_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                self.mark_disconnected(&format!("{} failed: {}", op, e)).await;
                Err(CacheError::SlowTierUnavailable {
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                self.mark_disconnected(&format!("{} timed out", op)).await;
                Err(CacheError::SlowTierUnavailable {
                    reason: format!("{} timed out", op),
                })
            }
        }
    }

    /// Whether a live connection is currently held.
    pub async fn is_connected(&self) -> bool {
        self.conn.read().await.is_some()
    }
}

#[async_trait]
impl CacheBackend for RedisCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<CachedValue>, CacheError> {
        let mut conn = self.connection().await?;
        let flat = self.prefixed(key);
        let raw: Option<String> = self.run(conn.get(&flat), "GET").await?;

        match raw {
            Some(text) => {
                let value: CachedValue =
                    serde_json::from_str(&text).map_err(|e| CacheError::Serialization {
                        reason: format!("corrupt slow-tier entry for {}: {}", flat, e),
                    })?;
                if value.is_expired() {
                    Ok(None)
                } else {
                    Ok(Some(value))
                }
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &CacheKey, value: CachedValue) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        let flat = self.prefixed(key);
        let text = serde_json::to_string(&value).map_err(|e| CacheError::Serialization {
            reason: e.to_string(),
        })?;
        // Redis expiry mirrors the entry TTL so the tier self-cleans.
        let ttl = value.ttl_seconds.max(1);
        self.run(conn.set_ex::<_, _, ()>(&flat, text, ttl), "SETEX")
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> Result<bool, CacheError> {
        let mut conn = self.connection().await?;
        let flat = self.prefixed(key);
        let removed: i64 = self.run(conn.del(&flat), "DEL").await?;
        Ok(removed > 0)
    }

    async fn clear(&self) -> Result<(), CacheError> {
        let keys = self.scan_keys().await?;
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.connection().await?;
        self.run(conn.del::<_, i64>(keys), "DEL").await?;
        Ok(())
    }

    async fn key_count(&self) -> Result<usize, CacheError> {
        Ok(self.scan_keys().await?.len())
    }

    async fn is_healthy(&self) -> bool {
        let Ok(mut conn) = self.connection().await else {
            return false;
        };
        matches!(
            timeout(self.op_timeout, async {
                let pong: Result<String, _> = redis::cmd("PING").query_async(&mut conn).await;
                pong
            })
            .await,
            Ok(Ok(_))
        )
    }
}

impl RedisCache {
    async fn scan_keys(&self) -> Result<Vec<String>, CacheError> {
        let mut conn = self.connection().await?;
        let pattern = format!("{}*", self.key_prefix);
        let keys = self
            .run(
                async {
                    let mut keys = Vec::new();
                    let mut iter = conn.scan_match::<_, String>(&pattern).await?;
                    while let Some(key) = iter.next_item().await {
                        keys.push(key);
                    }
                    Ok(keys)
                },
                "SCAN",
            )
            .await?;
        Ok(keys)
    }
}

impl std::fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCache")
            .field("key_prefix", &self.key_prefix)
            .field("op_timeout", &self.op_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(url: &str) -> RedisCacheConfig {
        RedisCacheConfig {
            url: url.to_string(),
            key_prefix: "triage:".to_string(),
            connection_timeout_ms: 200,
        }
    }

    #[test]
    fn test_invalid_url_rejected() {
        assert!(RedisCache::new(&config("not a url")).is_err());
    }

    #[tokio::test]
    async fn test_disconnected_tier_errors_cleanly() {
        let cache = RedisCache::new(&config("redis://127.0.0.1:1/")).unwrap();
        let key = CacheKey::new(triage_core::ContentType::Runbooks, "rb1");
        let err = cache.get(&key).await.unwrap_err();
        assert!(matches!(err, CacheError::SlowTierUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_backoff_gives_up_after_budget() {
        let cache = RedisCache::new(&config("redis://127.0.0.1:1/")).unwrap();
        // Exhaust the backoff budget with forced failures.
        for _ in 0..BACKOFF_MAX_ATTEMPTS {
            cache.record_failure("test");
            if let Ok(mut backoff) = cache.backoff.lock() {
                backoff.next_allowed = Instant::now();
            }
        }
        assert!(!cache.try_connect().await);

        // The health cycle resets the budget and attempts resume.
        cache.reset_backoff();
        // Connection will still fail (nothing listening) but the attempt is made,
        // which re-arms the backoff state.
        let _ = cache.try_connect().await;
        let attempts = cache.backoff.lock().map(|b| b.attempts).unwrap_or(0);
        assert_eq!(attempts, 1);
    }
}
