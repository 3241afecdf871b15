//! In-process performance tracking
//!
//! Per-operation call counters plus a bounded latency reservoir for
//! average/p95/p99 snapshots. Counters are lock-free; the reservoir takes
//! a short mutex only on record and snapshot.

use dashmap::DashMap;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Latency samples retained per operation.
const RESERVOIR_CAPACITY: usize = 512;

#[derive(Default)]
struct OpStats {
    calls: AtomicU64,
    successes: AtomicU64,
    total_ms: AtomicU64,
    samples: Mutex<VecDeque<u64>>,
}

/// Tracks per-operation latency and outcome counters.
pub struct PerformanceTracker {
    ops: DashMap<String, Arc<OpStats>>,
    started: Instant,
}

impl PerformanceTracker {
    pub fn new() -> Self {
        Self {
            ops: DashMap::new(),
            started: Instant::now(),
        }
    }

    /// Record one operation outcome.
    pub fn record(&self, operation: &str, latency_ms: u64, success: bool) {
        let stats = self
            .ops
            .entry(operation.to_string())
            .or_insert_with(|| Arc::new(OpStats::default()))
            .value()
            .clone();

        stats.calls.fetch_add(1, Ordering::Relaxed);
        stats.total_ms.fetch_add(latency_ms, Ordering::Relaxed);
        if success {
            stats.successes.fetch_add(1, Ordering::Relaxed);
        }
        if let Ok(mut samples) = stats.samples.lock() {
            if samples.len() >= RESERVOIR_CAPACITY {
                samples.pop_front();
            }
            samples.push_back(latency_ms);
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started.elapsed().as_secs()
    }

    /// Snapshot every operation's counters and percentiles.
    pub fn snapshot(&self) -> PerformanceSnapshot {
        let mut operations = HashMap::new();
        for entry in self.ops.iter() {
            let stats = entry.value();
            let calls = stats.calls.load(Ordering::Relaxed);
            let successes = stats.successes.load(Ordering::Relaxed);
            let total_ms = stats.total_ms.load(Ordering::Relaxed);

            let (p95, p99) = stats
                .samples
                .lock()
                .map(|samples| {
                    let mut sorted: Vec<u64> = samples.iter().copied().collect();
                    sorted.sort_unstable();
                    (percentile(&sorted, 0.95), percentile(&sorted, 0.99))
                })
                .unwrap_or((0, 0));

            operations.insert(
                entry.key().clone(),
                OperationSnapshot {
                    calls,
                    successes,
                    success_rate: if calls == 0 {
                        1.0
                    } else {
                        successes as f64 / calls as f64
                    },
                    avg_latency_ms: if calls == 0 { 0 } else { total_ms / calls },
                    p95_latency_ms: p95,
                    p99_latency_ms: p99,
                },
            );
        }

        PerformanceSnapshot {
            operations,
            uptime_seconds: self.uptime_seconds(),
            process_memory_bytes: process_memory_bytes(),
        }
    }
}

impl Default for PerformanceTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PerformanceTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PerformanceTracker")
            .field("operations", &self.ops.len())
            .finish()
    }
}

fn percentile(sorted: &[u64], q: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let rank = ((sorted.len() as f64) * q).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

/// Resident set size, best effort. Zero when unavailable.
#[cfg(target_os = "linux")]
fn process_memory_bytes() -> u64 {
    std::fs::read_to_string("/proc/self/statm")
        .ok()
        .and_then(|statm| {
            statm
                .split_whitespace()
                .nth(1)
                .and_then(|pages| pages.parse::<u64>().ok())
        })
        .map(|pages| pages * 4096)
        .unwrap_or(0)
}

#[cfg(not(target_os = "linux"))]
fn process_memory_bytes() -> u64 {
    0
}

/// Snapshot of one operation's counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationSnapshot {
    pub calls: u64,
    pub successes: u64,
    pub success_rate: f64,
    pub avg_latency_ms: u64,
    pub p95_latency_ms: u64,
    pub p99_latency_ms: u64,
}

/// Full performance snapshot served by `/api/performance`.
#[derive(Debug, Clone, Serialize)]
pub struct PerformanceSnapshot {
    pub operations: HashMap<String, OperationSnapshot>,
    pub uptime_seconds: u64,
    pub process_memory_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_snapshot() {
        let tracker = PerformanceTracker::new();
        tracker.record("search-runbooks", 10, true);
        tracker.record("search-runbooks", 30, true);
        tracker.record("search-runbooks", 20, false);

        let snapshot = tracker.snapshot();
        let op = &snapshot.operations["search-runbooks"];
        assert_eq!(op.calls, 3);
        assert_eq!(op.successes, 2);
        assert_eq!(op.avg_latency_ms, 20);
        assert!((op.success_rate - (2.0 / 3.0)).abs() < 1e-9);
    }

    #[test]
    fn test_percentiles() {
        let sorted: Vec<u64> = (1..=100).collect();
        assert_eq!(percentile(&sorted, 0.95), 95);
        assert_eq!(percentile(&sorted, 0.99), 99);
        assert_eq!(percentile(&[], 0.95), 0);
        assert_eq!(percentile(&[7], 0.99), 7);
    }

    #[test]
    fn test_reservoir_is_bounded() {
        let tracker = PerformanceTracker::new();
        for i in 0..(RESERVOIR_CAPACITY as u64 + 100) {
            tracker.record("op", i, true);
        }
        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.operations["op"].calls, RESERVOIR_CAPACITY as u64 + 100);
        // Percentiles come from the newest samples only.
        assert!(snapshot.operations["op"].p99_latency_ms > 100);
    }
}
