//! In-process fast tier: bounded-key LRU with per-entry TTL

use crate::backend::{CacheBackend, CacheKey, CachedValue};
use async_trait::async_trait;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use triage_core::CacheError;

/// Bounded LRU cache. Writers serialize behind the mutex, so a reader can
/// never observe a torn value; eviction is least-recently-used under
/// capacity pressure, TTL expiry is checked on read.
pub struct MemoryCache {
    entries: Mutex<LruCache<String, CachedValue>>,
    capacity: usize,
}

impl MemoryCache {
    pub fn new(max_keys: usize) -> Self {
        let capacity = max_keys.max(1);
        Self {
            entries: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
            )),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Estimated memory footprint of stored payloads in bytes.
    pub fn memory_bytes(&self) -> usize {
        self.entries
            .lock()
            .map(|entries| {
                entries
                    .iter()
                    .map(|(k, v)| k.len() + v.payload.len())
                    .sum()
            })
            .unwrap_or(0)
    }

    fn lock_poisoned() -> CacheError {
        CacheError::Backend {
            reason: "memory cache lock poisoned".to_string(),
        }
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<CachedValue>, CacheError> {
        let mut entries = self.entries.lock().map_err(|_| Self::lock_poisoned())?;
        let flat = key.as_string();
        let hit = entries.get(&flat).cloned();
        match hit {
            Some(value) if value.is_expired() => {
                entries.pop(&flat);
                Ok(None)
            }
            Some(value) => Ok(Some(value)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &CacheKey, value: CachedValue) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().map_err(|_| Self::lock_poisoned())?;
        entries.put(key.as_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> Result<bool, CacheError> {
        let mut entries = self.entries.lock().map_err(|_| Self::lock_poisoned())?;
        Ok(entries.pop(&key.as_string()).is_some())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().map_err(|_| Self::lock_poisoned())?;
        entries.clear();
        Ok(())
    }

    async fn key_count(&self) -> Result<usize, CacheError> {
        let entries = self.entries.lock().map_err(|_| Self::lock_poisoned())?;
        Ok(entries.len())
    }

    async fn is_healthy(&self) -> bool {
        true
    }
}

impl std::fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache")
            .field("capacity", &self.capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use triage_core::ContentType;

    fn key(id: &str) -> CacheKey {
        CacheKey::new(ContentType::Runbooks, id)
    }

    #[tokio::test]
    async fn test_set_get_roundtrip() {
        let cache = MemoryCache::new(10);
        let value = CachedValue::new(r#"{"id":"rb1"}"#, Duration::from_secs(60));
        cache.set(&key("rb1"), value.clone()).await.unwrap();

        let got = cache.get(&key("rb1")).await.unwrap().unwrap();
        assert_eq!(got.payload, value.payload);
    }

    #[tokio::test]
    async fn test_expired_entry_is_absent() {
        let cache = MemoryCache::new(10);
        let mut value = CachedValue::new("{}", Duration::from_secs(1));
        value.stored_at = chrono::Utc::now() - chrono::Duration::seconds(5);
        cache.set(&key("rb1"), value).await.unwrap();

        assert!(cache.get(&key("rb1")).await.unwrap().is_none());
        // The expired entry was also removed.
        assert_eq!(cache.key_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_lru_eviction_under_capacity_pressure() {
        let cache = MemoryCache::new(2);
        for id in ["a", "b", "c"] {
            cache
                .set(&key(id), CachedValue::new("{}", Duration::from_secs(60)))
                .await
                .unwrap();
        }
        assert_eq!(cache.key_count().await.unwrap(), 2);
        // "a" was least recently used.
        assert!(cache.get(&key("a")).await.unwrap().is_none());
        assert!(cache.get(&key("c")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let cache = MemoryCache::new(10);
        cache
            .set(&key("rb1"), CachedValue::new("first", Duration::from_secs(60)))
            .await
            .unwrap();
        cache
            .set(&key("rb1"), CachedValue::new("second", Duration::from_secs(60)))
            .await
            .unwrap();

        let got = cache.get(&key("rb1")).await.unwrap().unwrap();
        assert_eq!(got.payload, "second");
    }

    #[tokio::test]
    async fn test_delete_and_clear() {
        let cache = MemoryCache::new(10);
        cache
            .set(&key("rb1"), CachedValue::new("{}", Duration::from_secs(60)))
            .await
            .unwrap();
        assert!(cache.delete(&key("rb1")).await.unwrap());
        assert!(!cache.delete(&key("rb1")).await.unwrap());

        cache
            .set(&key("rb2"), CachedValue::new("{}", Duration::from_secs(60)))
            .await
            .unwrap();
        cache.clear().await.unwrap();
        assert_eq!(cache.key_count().await.unwrap(), 0);
    }
}
