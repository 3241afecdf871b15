//! TRIAGE Test Utilities
//!
//! Centralized test infrastructure for the TRIAGE workspace:
//! - Builders for runbooks, decision trees, and search results
//! - A scriptable mock source adapter
//! - Re-exports of the core types test code touches most

pub use triage_adapters::{AdapterMetadata, SourceAdapter};
pub use triage_core::{
    DecisionBranch, DecisionTree, DocCategory, Document, DocumentId, ProcedureStep, Runbook,
    RunbookMatch, RunbookMetadata, SearchFilters, SearchResult, Severity, SourceConfig,
    SourceError, SourceHealth, SourceType,
};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

// ============================================================================
// BUILDERS
// ============================================================================

/// A small but complete runbook for tests: one trigger chain, a two-branch
/// decision tree, and two procedure steps.
pub fn sample_runbook(id: &str, trigger: &str, severity: Severity) -> Runbook {
    Runbook {
        id: id.to_string(),
        title: format!("Handling {} on web hosts", trigger.replace('_', " ")),
        version: "2".to_string(),
        triggers: vec![trigger.to_string()],
        severity_mapping: BTreeMap::from([(trigger.to_string(), severity)]),
        decision_tree: DecisionTree {
            id: format!("{}-tree", id),
            name: trigger.to_string(),
            description: format!("triage flow for {} incidents on web-01", trigger),
            branches: vec![
                DecisionBranch {
                    id: "assess".to_string(),
                    condition: "alert is still firing".to_string(),
                    description: "confirm the alert is live".to_string(),
                    action: "run the first procedure".to_string(),
                    next_step: Some("verify".to_string()),
                    confidence: 0.9,
                    rollback_step: None,
                },
                DecisionBranch {
                    id: "verify".to_string(),
                    condition: "metrics back to baseline".to_string(),
                    description: "confirm recovery".to_string(),
                    action: "close the incident".to_string(),
                    next_step: None,
                    confidence: 0.85,
                    rollback_step: Some("assess".to_string()),
                },
            ],
            default_action: "escalate to on-call".to_string(),
        },
        procedures: vec![
            ProcedureStep {
                id: "p1".to_string(),
                name: "mitigate".to_string(),
                description: "apply the immediate mitigation".to_string(),
                command: Some("systemctl restart app".to_string()),
                expected_outcome: "service responds again".to_string(),
                timeout_seconds: Some(120),
                prerequisites: vec![],
                rollback: None,
                tools_required: vec!["ssh".to_string()],
            },
            ProcedureStep {
                id: "p2".to_string(),
                name: "verify".to_string(),
                description: "verify the mitigation held".to_string(),
                command: None,
                expected_outcome: "dashboards show baseline".to_string(),
                timeout_seconds: None,
                prerequisites: vec!["p1".to_string()],
                rollback: None,
                tools_required: vec![],
            },
        ],
        escalation_path: Some("page the on-call".to_string()),
        metadata: RunbookMetadata {
            author: "ops".to_string(),
            confidence: 0.9,
            success_rate: None,
            avg_resolution_minutes: None,
            success_count: 0,
        },
        last_updated: Utc.with_ymd_and_hms(2026, 1, 5, 10, 0, 0).unwrap(),
    }
}

/// A search result with sensible defaults.
pub fn sample_result(source: &str, local_id: &str, confidence: f64) -> SearchResult {
    SearchResult {
        id: format!("{}:{}", source, local_id),
        title: local_id.replace('-', " "),
        excerpt: "matching excerpt".to_string(),
        source_name: source.to_string(),
        source_type: SourceType::Web,
        category: Some(DocCategory::Guide),
        confidence,
        match_reasons: vec!["test fixture".to_string()],
        retrieval_time_ms: 1,
        last_updated: Utc.with_ymd_and_hms(2026, 1, 5, 10, 0, 0).unwrap(),
        url: None,
        metadata: BTreeMap::new(),
    }
}

// ============================================================================
// MOCK ADAPTER
// ============================================================================

/// Scriptable in-memory source adapter.
///
/// Serves canned runbooks and search results; can be told to fail
/// transiently or permanently, and counts calls for assertions.
pub struct MockAdapter {
    config: SourceConfig,
    runbooks: Vec<Runbook>,
    results: Vec<SearchResult>,
    documents: Vec<Document>,
    fail_transiently: AtomicBool,
    fail_permanently: AtomicBool,
    calls: AtomicU32,
}

impl MockAdapter {
    pub fn new(name: &str, source_type: SourceType) -> Self {
        Self {
            config: SourceConfig::new(name, source_type).with_max_retries(1),
            runbooks: Vec::new(),
            results: Vec::new(),
            documents: Vec::new(),
            fail_transiently: AtomicBool::new(false),
            fail_permanently: AtomicBool::new(false),
            calls: AtomicU32::new(0),
        }
    }

    pub fn with_config(mut self, config: SourceConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_runbook(mut self, runbook: Runbook) -> Self {
        // Also expose the runbook as a document so discovery works.
        let doc = Document {
            id: DocumentId::new(&self.config.name, format!("runbooks/{}.json", runbook.id)),
            title: runbook.title.clone(),
            content: serde_json::to_string(&runbook).unwrap_or_default(),
            category: Some(DocCategory::Runbook),
            last_updated: runbook.last_updated,
            url: None,
            metadata: BTreeMap::new(),
        };
        self.documents.push(doc);
        self.runbooks.push(runbook);
        self
    }

    pub fn with_result(mut self, result: SearchResult) -> Self {
        self.results.push(result);
        self
    }

    pub fn with_document(mut self, document: Document) -> Self {
        self.documents.push(document);
        self
    }

    /// Make every subsequent call fail transiently (or recover).
    pub fn set_transient_failure(&self, failing: bool) {
        self.fail_transiently.store(failing, Ordering::SeqCst);
    }

    /// Make every subsequent call fail permanently (or recover).
    pub fn set_permanent_failure(&self, failing: bool) {
        self.fail_permanently.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn gate(&self) -> Result<(), SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_permanently.load(Ordering::SeqCst) {
            return Err(SourceError::Permanent {
                source_name: self.config.name.clone(),
                code: "auth".to_string(),
                reason: "credentials rejected".to_string(),
            });
        }
        if self.fail_transiently.load(Ordering::SeqCst) {
            return Err(SourceError::Unavailable {
                source_name: self.config.name.clone(),
                reason: "connection refused".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl SourceAdapter for MockAdapter {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn source_type(&self) -> SourceType {
        self.config.source_type
    }

    fn config(&self) -> &SourceConfig {
        &self.config
    }

    async fn initialize(&self) -> Result<(), SourceError> {
        Ok(())
    }

    async fn search(
        &self,
        query: &str,
        filters: &SearchFilters,
    ) -> Result<Vec<SearchResult>, SourceError> {
        self.gate()?;
        let query_lower = query.to_lowercase();
        let mut results: Vec<SearchResult> = self
            .results
            .iter()
            .filter(|r| filters.allows_category(r.category))
            .filter(|r| r.confidence >= filters.min_confidence)
            .cloned()
            .collect();
        // Runbook documents surface in category-filtered discovery scans.
        for doc in &self.documents {
            if !filters.allows_category(doc.category) {
                continue;
            }
            if doc.title.to_lowercase().contains(&query_lower)
                || doc.content.to_lowercase().contains(&query_lower)
            {
                results.push(SearchResult {
                    id: doc.id.to_string(),
                    title: doc.title.clone(),
                    excerpt: doc.content.chars().take(100).collect(),
                    source_name: self.config.name.clone(),
                    source_type: self.config.source_type,
                    category: doc.category,
                    confidence: 0.7,
                    match_reasons: vec!["document match".to_string()],
                    retrieval_time_ms: 1,
                    last_updated: doc.last_updated,
                    url: doc.url.clone(),
                    metadata: doc.metadata.clone(),
                });
            }
        }
        results.truncate(filters.limit);
        Ok(results)
    }

    async fn search_runbooks(
        &self,
        alert_type: &str,
        severity: Severity,
        affected_systems: &[String],
        _context: Option<&serde_json::Value>,
    ) -> Result<Vec<RunbookMatch>, SourceError> {
        self.gate()?;
        let mut matches = Vec::new();
        for runbook in &self.runbooks {
            if let Some(score) =
                triage_adapters::score_runbook(runbook, alert_type, severity, affected_systems)
            {
                matches.push(RunbookMatch {
                    runbook: runbook.clone(),
                    confidence: score.confidence,
                    match_reasons: score.match_reasons,
                    source_name: self.config.name.clone(),
                });
            }
        }
        Ok(matches)
    }

    async fn get_document(&self, local_id: &str) -> Result<Document, SourceError> {
        self.gate()?;
        self.documents
            .iter()
            .find(|d| d.id.local_id == local_id)
            .cloned()
            .ok_or_else(|| SourceError::NotFound {
                id: format!("{}:{}", self.config.name, local_id),
            })
    }

    async fn health_check(&self) -> SourceHealth {
        if self.fail_transiently.load(Ordering::SeqCst)
            || self.fail_permanently.load(Ordering::SeqCst)
        {
            SourceHealth::unhealthy(1, "scripted failure")
        } else {
            SourceHealth::healthy(1)
        }
    }

    async fn metadata(&self) -> AdapterMetadata {
        AdapterMetadata {
            name: self.config.name.clone(),
            source_type: self.config.source_type,
            document_count: self.documents.len() + self.results.len(),
            last_indexed: None,
            avg_latency_ms: 1,
            success_rate: 1.0,
        }
    }

    async fn refresh_index(&self, _force: bool) -> Result<bool, SourceError> {
        Ok(true)
    }

    async fn shutdown(&self) -> Result<(), SourceError> {
        Ok(())
    }
}

impl std::fmt::Debug for MockAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockAdapter")
            .field("name", &self.config.name)
            .field("runbooks", &self.runbooks.len())
            .finish()
    }
}
