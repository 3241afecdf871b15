//! Cache statistics
//!
//! Lock-free counters per content-type tag. Snapshots are monotonic
//! between resets.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use triage_core::ContentType;

#[derive(Default)]
struct TagCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
}

/// Per-tag hit/miss/set counters.
pub struct StatsTracker {
    counters: [TagCounters; 5],
}

fn tag_index(tag: ContentType) -> usize {
    match tag {
        ContentType::Runbooks => 0,
        ContentType::Procedures => 1,
        ContentType::DecisionTrees => 2,
        ContentType::KnowledgeBase => 3,
        ContentType::WebResponse => 4,
    }
}

impl StatsTracker {
    pub fn new() -> Self {
        Self {
            counters: Default::default(),
        }
    }

    pub fn record_hit(&self, tag: ContentType) {
        self.counters[tag_index(tag)]
            .hits
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self, tag: ContentType) {
        self.counters[tag_index(tag)]
            .misses
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_set(&self, tag: ContentType) {
        self.counters[tag_index(tag)]
            .sets
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn reset(&self) {
        for counters in &self.counters {
            counters.hits.store(0, Ordering::Relaxed);
            counters.misses.store(0, Ordering::Relaxed);
            counters.sets.store(0, Ordering::Relaxed);
        }
    }

    pub fn tag_stats(&self, tag: ContentType) -> TagStats {
        let counters = &self.counters[tag_index(tag)];
        let hits = counters.hits.load(Ordering::Relaxed);
        let misses = counters.misses.load(Ordering::Relaxed);
        let sets = counters.sets.load(Ordering::Relaxed);
        TagStats {
            hits,
            misses,
            sets,
            total_operations: hits + misses + sets,
            hit_rate: if hits + misses == 0 {
                0.0
            } else {
                hits as f64 / (hits + misses) as f64
            },
        }
    }
}

impl Default for StatsTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of one tag's counters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TagStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub total_operations: u64,
    pub hit_rate: f64,
}

/// Full cache statistics snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStatsSnapshot {
    pub by_content_type: HashMap<String, TagStats>,
    pub fast_tier_keys: usize,
    pub memory_bytes_estimate: usize,
    pub slow_tier_connected: bool,
    pub total_hits: u64,
    pub total_misses: u64,
    pub overall_hit_rate: f64,
}

impl CacheStatsSnapshot {
    pub fn from_tracker(
        tracker: &StatsTracker,
        fast_tier_keys: usize,
        memory_bytes_estimate: usize,
        slow_tier_connected: bool,
    ) -> Self {
        let mut by_content_type = HashMap::new();
        let mut total_hits = 0;
        let mut total_misses = 0;
        for tag in ContentType::all() {
            let stats = tracker.tag_stats(tag);
            total_hits += stats.hits;
            total_misses += stats.misses;
            by_content_type.insert(tag.as_str().to_string(), stats);
        }
        Self {
            by_content_type,
            fast_tier_keys,
            memory_bytes_estimate,
            slow_tier_connected,
            total_hits,
            total_misses,
            overall_hit_rate: if total_hits + total_misses == 0 {
                0.0
            } else {
                total_hits as f64 / (total_hits + total_misses) as f64
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate() {
        let tracker = StatsTracker::new();
        for _ in 0..8 {
            tracker.record_hit(ContentType::Runbooks);
        }
        for _ in 0..2 {
            tracker.record_miss(ContentType::Runbooks);
        }
        let stats = tracker.tag_stats(ContentType::Runbooks);
        assert!((stats.hit_rate - 0.8).abs() < 1e-9);
        assert_eq!(stats.total_operations, 10);
    }

    #[test]
    fn test_tags_are_independent() {
        let tracker = StatsTracker::new();
        tracker.record_hit(ContentType::Runbooks);
        tracker.record_miss(ContentType::WebResponse);

        assert_eq!(tracker.tag_stats(ContentType::Runbooks).hits, 1);
        assert_eq!(tracker.tag_stats(ContentType::Runbooks).misses, 0);
        assert_eq!(tracker.tag_stats(ContentType::WebResponse).misses, 1);
    }

    #[test]
    fn test_snapshot_aggregates() {
        let tracker = StatsTracker::new();
        tracker.record_hit(ContentType::Runbooks);
        tracker.record_miss(ContentType::Procedures);

        let snapshot = CacheStatsSnapshot::from_tracker(&tracker, 3, 1024, false);
        assert_eq!(snapshot.total_hits, 1);
        assert_eq!(snapshot.total_misses, 1);
        assert_eq!(snapshot.fast_tier_keys, 3);
        assert!((snapshot.overall_hit_rate - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_reset_clears_counters() {
        let tracker = StatsTracker::new();
        tracker.record_hit(ContentType::Runbooks);
        tracker.reset();
        assert_eq!(tracker.tag_stats(ContentType::Runbooks).hits, 0);
    }
}
