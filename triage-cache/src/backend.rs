//! Cache backend trait and key/value types

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use triage_core::{CacheError, ContentType};

/// Key of a cached entry: content-type tag plus a logical identifier
/// (an entity id or a query fingerprint).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub content_type: ContentType,
    pub id: String,
}

impl CacheKey {
    pub fn new(content_type: ContentType, id: impl Into<String>) -> Self {
        Self {
            content_type,
            id: id.into(),
        }
    }

    /// Flat string form used by both tiers.
    pub fn as_string(&self) -> String {
        format!("{}:{}", self.content_type.as_str(), self.id)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_string())
    }
}

/// A cached value: serialized payload plus the write timestamp and the TTL
/// that was in effect when the entry was written. The TTL is decided once
/// per write, so a key never carries two different TTLs across tiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedValue {
    pub payload: String,
    pub stored_at: DateTime<Utc>,
    pub ttl_seconds: u64,
}

impl CachedValue {
    pub fn new(payload: impl Into<String>, ttl: Duration) -> Self {
        Self {
            payload: payload.into(),
            stored_at: Utc::now(),
            ttl_seconds: ttl.as_secs(),
        }
    }

    /// Whether the entry has outlived its TTL.
    pub fn is_expired(&self) -> bool {
        let age = Utc::now().signed_duration_since(self.stored_at);
        age.num_seconds() >= self.ttl_seconds as i64
    }

    /// Seconds of TTL remaining, clamped at zero.
    pub fn remaining_ttl_seconds(&self) -> u64 {
        let age = Utc::now().signed_duration_since(self.stored_at).num_seconds();
        (self.ttl_seconds as i64 - age).max(0) as u64
    }
}

/// One tier of the cache. Implementations must be safe for concurrent use
/// and must never surface a torn value: a reader observes a complete value
/// from some single prior write, or nothing.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Get a value. Expired entries are treated as absent.
    async fn get(&self, key: &CacheKey) -> Result<Option<CachedValue>, CacheError>;

    /// Store a value with the given TTL, replacing any previous value.
    async fn set(&self, key: &CacheKey, value: CachedValue) -> Result<(), CacheError>;

    /// Remove a value. Returns whether a value was present.
    async fn delete(&self, key: &CacheKey) -> Result<bool, CacheError>;

    /// Drop every entry.
    async fn clear(&self) -> Result<(), CacheError>;

    /// Number of live keys.
    async fn key_count(&self) -> Result<usize, CacheError>;

    /// Whether the tier is currently usable.
    async fn is_healthy(&self) -> bool;
}
