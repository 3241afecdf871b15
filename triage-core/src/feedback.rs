//! Resolution feedback ledger
//!
//! Append-only, bounded, in-memory. Rollups are running aggregates and are
//! not decremented when old entries are evicted.

use crate::ResolutionOutcome;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;

/// One recorded resolution outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct FeedbackEntry {
    pub runbook_id: String,
    pub procedure_id: String,
    pub outcome: ResolutionOutcome,
    pub resolution_minutes: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// Running aggregate for one runbook.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct RunbookRollup {
    pub total_count: u64,
    pub success_count: u64,
    pub avg_resolution_minutes: f64,
}

impl RunbookRollup {
    /// Success rate in [0, 1], or None before any feedback.
    pub fn success_rate(&self) -> Option<f64> {
        if self.total_count == 0 {
            None
        } else {
            Some(self.success_count as f64 / self.total_count as f64)
        }
    }
}

/// Bounded append-only feedback ledger with per-runbook rollups.
///
/// Recording is additive: N calls move the counters by exactly N regardless
/// of interleaving. Capacity pressure evicts the oldest entries but leaves
/// rollups untouched.
pub struct FeedbackLedger {
    entries: RwLock<VecDeque<FeedbackEntry>>,
    rollups: RwLock<HashMap<String, RunbookRollup>>,
    capacity: usize,
}

impl FeedbackLedger {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(VecDeque::new()),
            rollups: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Append an entry and update the runbook's rollup.
    pub fn record(&self, entry: FeedbackEntry) {
        if let Ok(mut rollups) = self.rollups.write() {
            let rollup = rollups.entry(entry.runbook_id.clone()).or_default();
            let prev_total = rollup.total_count as f64;
            rollup.total_count += 1;
            if entry.outcome.is_success() {
                rollup.success_count += 1;
            }
            rollup.avg_resolution_minutes = (rollup.avg_resolution_minutes * prev_total
                + entry.resolution_minutes)
                / rollup.total_count as f64;
        }

        if let Ok(mut entries) = self.entries.write() {
            if entries.len() >= self.capacity {
                entries.pop_front();
            }
            entries.push_back(entry);
        }
    }

    /// Rollup for one runbook, if any feedback was recorded.
    pub fn rollup(&self, runbook_id: &str) -> Option<RunbookRollup> {
        self.rollups
            .read()
            .ok()
            .and_then(|r| r.get(runbook_id).copied())
    }

    /// Number of retained entries (bounded by capacity).
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Most recent entries for a runbook, newest first.
    pub fn recent_for(&self, runbook_id: &str, limit: usize) -> Vec<FeedbackEntry> {
        self.entries
            .read()
            .map(|entries| {
                entries
                    .iter()
                    .rev()
                    .filter(|e| e.runbook_id == runbook_id)
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for FeedbackLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedbackLedger")
            .field("capacity", &self.capacity)
            .field("entries", &self.len())
            .finish()
    }
}
