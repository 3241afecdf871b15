//! Source adapter trait and shared adapter machinery

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use triage_core::{
    Document, Runbook, RunbookMatch, SearchFilters, SearchResult, Severity, SourceConfig,
    SourceError, SourceHealth, SourceType,
};

// ============================================================================
// ADAPTER TRAIT
// ============================================================================

/// Uniform read-only access to one documentation source.
///
/// Contract notes:
/// - Adapters never retry internally; the registry owns retry policy.
/// - Adapters never deduplicate against other sources.
/// - Results below `filters.min_confidence` must not be returned.
/// - Transient failures surface as `SourceError::Unavailable`/`Timeout`,
///   permanent ones as `SourceError::Permanent` with a code.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Unique source name from configuration.
    fn name(&self) -> &str;

    /// Source kind discriminator.
    fn source_type(&self) -> SourceType;

    /// The configuration this adapter was built from.
    fn config(&self) -> &SourceConfig;

    /// Validate credentials and prime any internal index.
    async fn initialize(&self) -> Result<(), SourceError>;

    /// Free-text search over the source's documents.
    async fn search(
        &self,
        query: &str,
        filters: &SearchFilters,
    ) -> Result<Vec<SearchResult>, SourceError>;

    /// Score candidate runbooks against an alert signature.
    async fn search_runbooks(
        &self,
        alert_type: &str,
        severity: Severity,
        affected_systems: &[String],
        context: Option<&serde_json::Value>,
    ) -> Result<Vec<RunbookMatch>, SourceError>;

    /// Fetch one document by its source-local id.
    async fn get_document(&self, local_id: &str) -> Result<Document, SourceError>;

    /// Probe the source.
    async fn health_check(&self) -> SourceHealth;

    /// Descriptive and statistical metadata about this adapter.
    async fn metadata(&self) -> AdapterMetadata;

    /// Re-read the source's index. Returns whether a refresh happened
    /// (`force = false` respects the configured refresh interval).
    async fn refresh_index(&self, force: bool) -> Result<bool, SourceError>;

    /// Release held resources. Called once, in reverse creation order.
    async fn shutdown(&self) -> Result<(), SourceError>;
}

// ============================================================================
// ADAPTER METADATA
// ============================================================================

/// Point-in-time description of an adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterMetadata {
    pub name: String,
    pub source_type: SourceType,
    pub document_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_indexed: Option<DateTime<Utc>>,
    pub avg_latency_ms: u64,
    /// Fraction of calls that succeeded, in [0, 1]. 1.0 before any call.
    pub success_rate: f64,
}

// ============================================================================
// ADAPTER STATS
// ============================================================================

/// Latency and success counters every adapter variant embeds.
pub struct AdapterStats {
    calls: AtomicU64,
    failures: AtomicU64,
    total_latency_ms: AtomicU64,
    last_indexed: RwLock<Option<DateTime<Utc>>>,
}

impl AdapterStats {
    pub fn new() -> Self {
        Self {
            calls: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            total_latency_ms: AtomicU64::new(0),
            last_indexed: RwLock::new(None),
        }
    }

    pub fn record(&self, latency_ms: u64, ok: bool) {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.total_latency_ms.fetch_add(latency_ms, Ordering::Relaxed);
        if !ok {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn mark_indexed(&self) {
        if let Ok(mut guard) = self.last_indexed.write() {
            *guard = Some(Utc::now());
        }
    }

    pub fn last_indexed(&self) -> Option<DateTime<Utc>> {
        self.last_indexed.read().ok().and_then(|g| *g)
    }

    pub fn avg_latency_ms(&self) -> u64 {
        let calls = self.calls.load(Ordering::Relaxed);
        if calls == 0 {
            0
        } else {
            self.total_latency_ms.load(Ordering::Relaxed) / calls
        }
    }

    pub fn success_rate(&self) -> f64 {
        let calls = self.calls.load(Ordering::Relaxed);
        if calls == 0 {
            1.0
        } else {
            1.0 - self.failures.load(Ordering::Relaxed) as f64 / calls as f64
        }
    }
}

impl Default for AdapterStats {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// SHARED HELPERS
// ============================================================================

/// Interpret a document as a runbook when it claims to be one.
///
/// Runbook-category documents carry the runbook JSON as their content;
/// anything that fails to parse or validate is skipped with a warning
/// rather than failing the whole search.
pub fn runbook_from_document(doc: &Document) -> Option<Runbook> {
    if doc.category != Some(triage_core::DocCategory::Runbook) {
        return None;
    }
    match serde_json::from_str::<Runbook>(&doc.content) {
        Ok(runbook) => match runbook.validate() {
            Ok(()) => Some(runbook),
            Err(e) => {
                tracing::warn!(document = %doc.id, error = %e, "invalid runbook skipped");
                None
            }
        },
        Err(e) => {
            tracing::warn!(document = %doc.id, error = %e, "unparseable runbook skipped");
            None
        }
    }
}
