//! TRIAGE Cache - Two-Level Content-Type-Aware Cache
//!
//! A fast in-process LRU tier plus an optional Redis slow tier, coordinated
//! by a hybrid front. Keys are `(content type, logical id)`; values are
//! JSON-compatible text at the tier boundary - the cache is schema-oblivious.
//!
//! Failure philosophy: the fast tier has no hard dependency on the slow
//! tier. When Redis is unreachable the cache degrades to fast-only, flags
//! itself degraded, and keeps serving.

mod backend;
mod hybrid;
mod memory;
mod redis_tier;
mod stats;

pub use backend::{CacheBackend, CacheKey, CachedValue};
pub use hybrid::{CacheHealth, HybridCache};
pub use memory::MemoryCache;
pub use redis_tier::RedisCache;
pub use stats::{CacheStatsSnapshot, StatsTracker, TagStats};
