//! Tool layer
//!
//! The seven named operations shared by the HTTP surface and the MCP
//! tool-call surface. Every operation follows the same flow: validate,
//! consult the cache, fan out through the registry on a miss, fuse and
//! truncate, repopulate the cache, and wrap the payload in the tool
//! envelope with performance metadata.

pub mod escalation;

use crate::error::{ApiError, ApiResult};
use crate::metrics::PerformanceTracker;
use crate::validation::FieldErrors;
use chrono::{DateTime, Datelike, Local, Timelike, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use triage_adapters::{AdapterRegistry, SourceFailure};
use triage_cache::{CacheKey, HybridCache};
use triage_core::{
    ContentType, DecisionTree, DocCategory, DocumentId, EscalationPlan, FeedbackEntry,
    FeedbackLedger, ProcedureStep, ResolutionOutcome, Runbook, RunbookRollup, SearchFilters,
    SearchResult, Severity, SourceType,
};
use triage_query::{QueryProcessor, ScoringWeights};

/// Alert types probed during cache warmup, drawn from the incident-flow
/// catalogue's trigger sets.
const WARMUP_ALERTS: &[&str] = &[
    "disk_space",
    "oom_killer",
    "db_down",
    "ssl_expiry",
    "service_down",
];

// ============================================================================
// ENVELOPE
// ============================================================================

/// Envelope wrapped around every tool payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutcome<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub retrieval_time_ms: u64,
    pub timestamp: DateTime<Utc>,
    pub cached: bool,
    #[serde(flatten)]
    pub payload: T,
}

impl<T> ToolOutcome<T> {
    fn fresh(payload: T, started: Instant) -> Self {
        Self {
            success: true,
            message: None,
            retrieval_time_ms: started.elapsed().as_millis() as u64,
            timestamp: Utc::now(),
            cached: false,
            payload,
        }
    }

    fn from_cache(payload: T, started: Instant) -> Self {
        Self {
            success: true,
            message: None,
            retrieval_time_ms: started.elapsed().as_millis() as u64,
            timestamp: Utc::now(),
            cached: true,
            payload,
        }
    }

    fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

// ============================================================================
// INPUTS
// ============================================================================

/// Input to `search-runbooks`. Fields are optional at parse time so the
/// validator can report every missing field at once.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchRunbooksInput {
    pub alert_type: Option<String>,
    pub severity: Option<String>,
    pub affected_systems: Option<Vec<String>>,
    #[serde(default)]
    pub context: Option<serde_json::Value>,
}

/// Input to `get-decision-tree`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DecisionTreeInput {
    pub runbook_id: Option<String>,
    #[serde(default)]
    pub scenario: Option<String>,
}

/// Input to `get-escalation-path`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EscalationInput {
    pub severity: Option<String>,
    #[serde(default)]
    pub system: Option<String>,
    #[serde(default)]
    pub business_hours: Option<bool>,
    #[serde(default)]
    pub failed_attempts: Option<u32>,
}

/// Input to `search-knowledge-base`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct KnowledgeSearchInput {
    pub query: Option<String>,
    #[serde(default)]
    pub categories: Option<Vec<String>>,
    #[serde(default)]
    pub max_results: Option<usize>,
}

/// Input to `record-resolution-feedback`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedbackInput {
    pub runbook_id: Option<String>,
    pub procedure_id: Option<String>,
    pub outcome: Option<String>,
    pub resolution_time_minutes: Option<f64>,
    #[serde(default)]
    pub notes: Option<String>,
}

// ============================================================================
// PAYLOADS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunbookSearchPayload {
    pub runbooks: Vec<Runbook>,
    pub confidence_scores: Vec<f64>,
    pub match_reasons: Vec<Vec<String>>,
    pub sources_failed: Vec<SourceFailure>,
    pub total_matches: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTreePayload {
    pub runbook_id: String,
    pub decision_tree: DecisionTree,
    pub confidence: f64,
    pub context_applied: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcedurePayload {
    pub runbook_id: String,
    pub procedure: ProcedureStep,
    pub related_steps: Vec<ProcedureStep>,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationPayload {
    #[serde(flatten)]
    pub plan: EscalationPlan,
    pub business_hours: bool,
    pub severity_escalated: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceStatus {
    pub name: String,
    pub source_type: SourceType,
    pub enabled: bool,
    pub priority: i32,
    pub healthy: bool,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub circuit_state: Option<triage_adapters::CircuitState>,
    pub document_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_indexed: Option<DateTime<Utc>>,
    pub avg_latency_ms: u64,
    pub success_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListSourcesPayload {
    pub sources: Vec<SourceStatus>,
    pub total_sources: usize,
    pub healthy_sources: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeSearchPayload {
    pub results: Vec<SearchResult>,
    pub total_results: usize,
    pub aggregate_confidence: f64,
    pub sources_failed: Vec<SourceFailure>,
    pub limit_clamped: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackPayload {
    pub recorded: bool,
    pub runbook_id: String,
    pub rollup: RunbookRollup,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunbookListPayload {
    pub runbooks: Vec<Runbook>,
    pub total: usize,
    pub limit_clamped: bool,
}

// ============================================================================
// TOOL ENGINE
// ============================================================================

struct CatalogEntry {
    runbook: Runbook,
    source_name: String,
}

/// The tool engine: owns the operation implementations and the runbook
/// catalog built up from warmup probes and past searches.
pub struct ToolEngine {
    registry: Arc<AdapterRegistry>,
    cache: Arc<HybridCache>,
    processor: Arc<QueryProcessor>,
    ledger: Arc<FeedbackLedger>,
    metrics: Arc<PerformanceTracker>,
    catalog: DashMap<String, CatalogEntry>,
}

impl ToolEngine {
    pub fn new(
        registry: Arc<AdapterRegistry>,
        cache: Arc<HybridCache>,
        processor: Arc<QueryProcessor>,
        ledger: Arc<FeedbackLedger>,
        metrics: Arc<PerformanceTracker>,
    ) -> Self {
        Self {
            registry,
            cache,
            processor,
            ledger,
            metrics,
            catalog: DashMap::new(),
        }
    }

    pub fn ledger(&self) -> &FeedbackLedger {
        &self.ledger
    }

    /// Preload warmup-flagged content by probing the flow catalogue's
    /// alert types. Failures are logged and skipped; warmup never blocks
    /// startup on a bad source.
    pub async fn warmup(&self) {
        if !self
            .cache
            .warmup_tags()
            .contains(&ContentType::Runbooks)
        {
            return;
        }
        for alert in WARMUP_ALERTS {
            match self
                .registry
                .aggregate_runbook_search(alert, Severity::High, &[], None)
                .await
            {
                Ok(agg) => {
                    for m in agg.matches {
                        self.remember_runbook(&m.runbook, &m.source_name).await;
                    }
                }
                Err(e) => {
                    tracing::warn!(alert, error = %e, "warmup probe failed");
                }
            }
        }
        tracing::info!(runbooks = self.catalog.len(), "cache warmup complete");
    }

    /// Record a runbook in the catalog and both cache tags.
    async fn remember_runbook(&self, runbook: &Runbook, source_name: &str) {
        self.catalog.insert(
            runbook.id.clone(),
            CatalogEntry {
                runbook: runbook.clone(),
                source_name: source_name.to_string(),
            },
        );
        let runbook_key = CacheKey::new(ContentType::Runbooks, format!("runbook:{}", runbook.id));
        if let Err(e) = self.cache.set_json(&runbook_key, runbook).await {
            tracing::debug!(error = %e, "runbook cache write skipped");
        }
        let tree_key = CacheKey::new(ContentType::DecisionTrees, runbook.id.clone());
        if let Err(e) = self.cache.set_json(&tree_key, &runbook.decision_tree).await {
            tracing::debug!(error = %e, "decision tree cache write skipped");
        }
    }

    /// Fold feedback rollups into a runbook's metadata.
    fn apply_rollup(&self, runbook: &mut Runbook) {
        if let Some(rollup) = self.ledger.rollup(&runbook.id) {
            runbook.metadata.success_count = rollup.success_count;
            runbook.metadata.success_rate = rollup.success_rate();
            runbook.metadata.avg_resolution_minutes = Some(rollup.avg_resolution_minutes);
        }
    }

    // ========================================================================
    // search-runbooks
    // ========================================================================

    pub async fn search_runbooks(
        &self,
        input: SearchRunbooksInput,
    ) -> ApiResult<ToolOutcome<RunbookSearchPayload>> {
        let started = Instant::now();

        let mut errors = FieldErrors::new();
        errors.require_non_empty("alert_type", input.alert_type.as_deref());
        let severity = match &input.severity {
            None => {
                errors.missing("severity");
                None
            }
            Some(raw) => match Severity::from_str(raw) {
                Ok(severity) => Some(severity),
                Err(e) => {
                    errors.invalid("severity", e);
                    None
                }
            },
        };
        if input.affected_systems.is_none() {
            errors.missing("affected_systems");
        }
        errors.finish()?;

        let alert_type = input.alert_type.unwrap_or_default();
        let severity = severity.unwrap_or(Severity::Medium);
        let affected_systems = input.affected_systems.unwrap_or_default();

        let key = CacheKey::new(
            ContentType::Runbooks,
            fingerprint(&[
                "search",
                &alert_type,
                &severity.to_string(),
                &sorted_join(&affected_systems),
                &context_hash(input.context.as_ref()),
            ]),
        );

        if let Some(payload) = self.cache.get_json::<RunbookSearchPayload>(&key).await {
            self.metrics.record("search-runbooks", elapsed_ms(started), true);
            return Ok(ToolOutcome::from_cache(payload, started));
        }

        let aggregated = match self
            .registry
            .aggregate_runbook_search(&alert_type, severity, &affected_systems, input.context.as_ref())
            .await
        {
            Ok(aggregated) => aggregated,
            Err(e) => {
                self.metrics.record("search-runbooks", elapsed_ms(started), false);
                return Err(ApiError::from(e));
            }
        };

        let mut runbooks = Vec::new();
        let mut confidence_scores = Vec::new();
        let mut match_reasons = Vec::new();
        for m in &aggregated.matches {
            self.remember_runbook(&m.runbook, &m.source_name).await;
            let mut runbook = m.runbook.clone();
            self.apply_rollup(&mut runbook);
            runbooks.push(runbook);
            confidence_scores.push(m.confidence.clamp(0.0, 1.0));
            match_reasons.push(m.match_reasons.clone());
        }

        let payload = RunbookSearchPayload {
            total_matches: runbooks.len(),
            runbooks,
            confidence_scores,
            match_reasons,
            sources_failed: aggregated.failed_sources,
        };

        if let Err(e) = self.cache.set_json(&key, &payload).await {
            tracing::debug!(error = %e, "runbook search cache write skipped");
        }
        self.metrics.record("search-runbooks", elapsed_ms(started), true);
        Ok(ToolOutcome::fresh(payload, started))
    }

    // ========================================================================
    // get-decision-tree
    // ========================================================================

    pub async fn get_decision_tree(
        &self,
        input: DecisionTreeInput,
    ) -> ApiResult<ToolOutcome<DecisionTreePayload>> {
        let started = Instant::now();

        let mut errors = FieldErrors::new();
        errors.require_non_empty("runbook_id", input.runbook_id.as_deref());
        errors.finish()?;
        let runbook_id = input.runbook_id.unwrap_or_default();

        let key = CacheKey::new(
            ContentType::DecisionTrees,
            fingerprint(&[
                "tree",
                &runbook_id,
                input.scenario.as_deref().unwrap_or(""),
            ]),
        );
        if let Some(payload) = self.cache.get_json::<DecisionTreePayload>(&key).await {
            self.metrics.record("get-decision-tree", elapsed_ms(started), true);
            return Ok(ToolOutcome::from_cache(payload, started));
        }

        let runbook = match self.lookup_runbook(&runbook_id).await? {
            Some(runbook) => runbook,
            None => {
                self.metrics.record("get-decision-tree", elapsed_ms(started), false);
                return Err(ApiError::not_found(format!("Runbook {}", runbook_id)));
            }
        };

        let (decision_tree, context_applied) =
            apply_scenario(runbook.decision_tree.clone(), input.scenario.as_deref());

        let payload = DecisionTreePayload {
            runbook_id: runbook.id.clone(),
            confidence: runbook.metadata.confidence,
            decision_tree,
            context_applied,
        };
        if let Err(e) = self.cache.set_json(&key, &payload).await {
            tracing::debug!(error = %e, "decision tree cache write skipped");
        }
        self.metrics.record("get-decision-tree", elapsed_ms(started), true);
        Ok(ToolOutcome::fresh(payload, started))
    }

    // ========================================================================
    // get-procedure
    // ========================================================================

    pub async fn get_procedure(
        &self,
        procedure_id: &str,
    ) -> ApiResult<ToolOutcome<ProcedurePayload>> {
        let started = Instant::now();

        if !procedure_id.contains('_') {
            return Err(ApiError::invalid_field(
                "procedure_id",
                "expected <runbook-id>_<step-name>",
            ));
        }

        let key = CacheKey::new(ContentType::Procedures, procedure_id.to_string());
        if let Some(payload) = self.cache.get_json::<ProcedurePayload>(&key).await {
            self.metrics.record("get-procedure", elapsed_ms(started), true);
            return Ok(ToolOutcome::from_cache(payload, started));
        }

        let resolved = self.resolve_procedure(procedure_id).await?;
        let Some((runbook, step)) = resolved else {
            self.metrics.record("get-procedure", elapsed_ms(started), false);
            return Err(ApiError::not_found(format!("Procedure {}", procedure_id)));
        };

        let related_steps: Vec<ProcedureStep> = runbook
            .procedures
            .iter()
            .filter(|candidate| {
                candidate.id != step.id
                    && (step.prerequisites.contains(&candidate.id)
                        || candidate.prerequisites.contains(&step.id))
            })
            .cloned()
            .collect();

        let payload = ProcedurePayload {
            runbook_id: runbook.id.clone(),
            confidence: runbook.metadata.confidence,
            procedure: step,
            related_steps,
        };
        if let Err(e) = self.cache.set_json(&key, &payload).await {
            tracing::debug!(error = %e, "procedure cache write skipped");
        }
        self.metrics.record("get-procedure", elapsed_ms(started), true);
        Ok(ToolOutcome::fresh(payload, started))
    }

    /// Resolve `<runbook-id>_<step-name>` trying split points right to
    /// left, catalog first, then discovery.
    async fn resolve_procedure(
        &self,
        procedure_id: &str,
    ) -> ApiResult<Option<(Runbook, ProcedureStep)>> {
        let split_points: Vec<usize> = procedure_id
            .char_indices()
            .filter(|(_, c)| *c == '_')
            .map(|(i, _)| i)
            .rev()
            .collect();

        // Pass 1: catalog-only, cheap.
        for &i in &split_points {
            let (runbook_id, step_name) = (&procedure_id[..i], &procedure_id[i + 1..]);
            if let Some(entry) = self.catalog.get(runbook_id) {
                if let Some(step) = entry.runbook.step_by_name(step_name) {
                    return Ok(Some((entry.runbook.clone(), step.clone())));
                }
            }
        }

        // Pass 2: full lookup per candidate prefix.
        for &i in &split_points {
            let (runbook_id, step_name) = (&procedure_id[..i], &procedure_id[i + 1..]);
            if let Some(runbook) = self.lookup_runbook(runbook_id).await? {
                if let Some(step) = runbook.step_by_name(step_name) {
                    let step = step.clone();
                    return Ok(Some((runbook, step)));
                }
            }
        }

        Ok(None)
    }

    // ========================================================================
    // get-escalation-path
    // ========================================================================

    pub async fn get_escalation_path(
        &self,
        input: EscalationInput,
    ) -> ApiResult<ToolOutcome<EscalationPayload>> {
        let started = Instant::now();

        let mut errors = FieldErrors::new();
        let severity = match &input.severity {
            None => {
                errors.missing("severity");
                None
            }
            Some(raw) => match Severity::from_str(raw) {
                Ok(severity) => Some(severity),
                Err(e) => {
                    errors.invalid("severity", e);
                    None
                }
            },
        };
        errors.finish()?;
        let severity = severity.unwrap_or(Severity::Medium);

        let business_hours = input.business_hours.unwrap_or_else(business_hours_now);
        let effective = escalation::effective_severity(severity, input.failed_attempts);
        let plan = escalation::plan_for(effective, business_hours);

        let payload = EscalationPayload {
            plan,
            business_hours,
            severity_escalated: effective != severity,
        };
        self.metrics
            .record("get-escalation-path", elapsed_ms(started), true);
        let outcome = match &input.system {
            Some(system) => ToolOutcome::fresh(payload, started)
                .with_message(format!("escalation path for {}", system)),
            None => ToolOutcome::fresh(payload, started),
        };
        Ok(outcome)
    }

    // ========================================================================
    // list-sources
    // ========================================================================

    pub async fn list_sources(&self) -> ApiResult<ToolOutcome<ListSourcesPayload>> {
        let started = Instant::now();

        let health = self.registry.health_check_all().await;
        let adapters = self.registry.all().await;

        let mut sources = Vec::with_capacity(adapters.len());
        for adapter in &adapters {
            let metadata = adapter.metadata().await;
            let source_health = health.get(adapter.name());
            sources.push(SourceStatus {
                name: metadata.name,
                source_type: metadata.source_type,
                enabled: adapter.config().enabled,
                priority: adapter.config().priority,
                healthy: source_health.map(|h| h.healthy).unwrap_or(false),
                latency_ms: source_health.map(|h| h.latency_ms).unwrap_or(0),
                error: source_health.and_then(|h| h.error.clone()),
                circuit_state: self.registry.breaker_state(adapter.name()),
                document_count: metadata.document_count,
                last_indexed: metadata.last_indexed,
                avg_latency_ms: metadata.avg_latency_ms,
                success_rate: metadata.success_rate,
            });
        }
        sources.sort_by(|a, b| a.name.cmp(&b.name));

        let healthy_sources = sources.iter().filter(|s| s.healthy).count();
        let payload = ListSourcesPayload {
            total_sources: sources.len(),
            healthy_sources,
            sources,
        };
        self.metrics.record("list-sources", elapsed_ms(started), true);
        Ok(ToolOutcome::fresh(payload, started))
    }

    // ========================================================================
    // search-knowledge-base
    // ========================================================================

    pub async fn search_knowledge_base(
        &self,
        input: KnowledgeSearchInput,
    ) -> ApiResult<ToolOutcome<KnowledgeSearchPayload>> {
        let started = Instant::now();

        let mut errors = FieldErrors::new();
        errors.require_non_empty("query", input.query.as_deref());
        let categories = match parse_categories(input.categories.as_deref()) {
            Ok(categories) => categories,
            Err(reason) => {
                errors.invalid("categories", reason);
                None
            }
        };
        if let Some(max_results) = input.max_results {
            // Zero is meaningless; the upper bound is clamped later, not rejected.
            if max_results == 0 {
                errors.invalid("max_results", "must be at least 1");
            }
        }
        errors.finish()?;
        let query = input.query.unwrap_or_default();

        let analysis = self.processor.process(&query, None);
        let limit = input.max_results.unwrap_or(analysis.strategy.max_results);

        let key = CacheKey::new(
            ContentType::KnowledgeBase,
            fingerprint(&[
                "kb",
                &query.trim().to_lowercase(),
                &categories
                    .as_ref()
                    .map(|c| {
                        let mut names: Vec<String> =
                            c.iter().map(|cat| cat.to_string()).collect();
                        names.sort();
                        names.join(",")
                    })
                    .unwrap_or_default(),
                &limit.to_string(),
            ]),
        );
        if let Some(payload) = self.cache.get_json::<KnowledgeSearchPayload>(&key).await {
            self.metrics
                .record("search-knowledge-base", elapsed_ms(started), true);
            return Ok(ToolOutcome::from_cache(payload, started));
        }

        let mut filters = SearchFilters::default();
        filters.categories = categories;

        let aggregated = match self
            .registry
            .aggregate_search(&query, &filters, Some(limit))
            .await
        {
            Ok(aggregated) => aggregated,
            Err(e) => {
                self.metrics
                    .record("search-knowledge-base", elapsed_ms(started), false);
                return Err(ApiError::from(e));
            }
        };

        let mut results = aggregated.results;
        fuse_scores(&mut results, &analysis.strategy.weights);

        let aggregate_confidence = if results.is_empty() {
            0.0
        } else {
            results.iter().map(|r| r.confidence).sum::<f64>() / results.len() as f64
        };

        let payload = KnowledgeSearchPayload {
            total_results: results.len(),
            results,
            aggregate_confidence,
            sources_failed: aggregated.failed_sources,
            limit_clamped: aggregated.limit_clamped,
        };
        if let Err(e) = self.cache.set_json(&key, &payload).await {
            tracing::debug!(error = %e, "knowledge search cache write skipped");
        }
        self.metrics
            .record("search-knowledge-base", elapsed_ms(started), true);
        Ok(ToolOutcome::fresh(payload, started))
    }

    // ========================================================================
    // record-resolution-feedback
    // ========================================================================

    pub async fn record_feedback(
        &self,
        input: FeedbackInput,
    ) -> ApiResult<ToolOutcome<FeedbackPayload>> {
        let started = Instant::now();

        let mut errors = FieldErrors::new();
        errors.require_non_empty("runbook_id", input.runbook_id.as_deref());
        errors.require_non_empty("procedure_id", input.procedure_id.as_deref());
        let outcome = match &input.outcome {
            None => {
                errors.missing("outcome");
                None
            }
            Some(raw) => match serde_json::from_value::<ResolutionOutcome>(
                serde_json::Value::String(raw.clone()),
            ) {
                Ok(outcome) => Some(outcome),
                Err(_) => {
                    errors.invalid(
                        "outcome",
                        "expected one of: success, partial_success, failure, escalated",
                    );
                    None
                }
            },
        };
        match input.resolution_time_minutes {
            None => errors.missing("resolution_time_minutes"),
            Some(minutes) if minutes < 0.0 => {
                errors.invalid("resolution_time_minutes", "must be non-negative")
            }
            Some(_) => {}
        }
        errors.finish()?;

        let runbook_id = input.runbook_id.unwrap_or_default();
        let entry = FeedbackEntry {
            runbook_id: runbook_id.clone(),
            procedure_id: input.procedure_id.unwrap_or_default(),
            outcome: outcome.unwrap_or(ResolutionOutcome::Success),
            resolution_minutes: input.resolution_time_minutes.unwrap_or(0.0),
            notes: input.notes,
            recorded_at: Utc::now(),
        };
        self.ledger.record(entry);

        let rollup = self.ledger.rollup(&runbook_id).unwrap_or_default();

        // Keep the cached single-runbook view in step with the rollup.
        if let Some(mut catalog_entry) = self.catalog.get_mut(&runbook_id) {
            catalog_entry.runbook.metadata.success_count = rollup.success_count;
            catalog_entry.runbook.metadata.success_rate = rollup.success_rate();
            catalog_entry.runbook.metadata.avg_resolution_minutes =
                Some(rollup.avg_resolution_minutes);
            let updated = catalog_entry.runbook.clone();
            drop(catalog_entry);
            let key = CacheKey::new(ContentType::Runbooks, format!("runbook:{}", runbook_id));
            if let Err(e) = self.cache.set_json(&key, &updated).await {
                tracing::debug!(error = %e, "runbook cache refresh skipped");
            }
        }

        let payload = FeedbackPayload {
            recorded: true,
            runbook_id,
            rollup,
        };
        self.metrics
            .record("record-resolution-feedback", elapsed_ms(started), true);
        Ok(ToolOutcome::fresh(payload, started))
    }

    // ========================================================================
    // Runbook retrieval (GET /api/runbooks, GET /api/runbooks/{id})
    // ========================================================================

    /// Look a runbook up by id: catalog, then cache, then discovery scan
    /// across the sources.
    pub async fn lookup_runbook(&self, runbook_id: &str) -> ApiResult<Option<Runbook>> {
        if let Some(entry) = self.catalog.get(runbook_id) {
            let mut runbook = entry.runbook.clone();
            drop(entry);
            self.apply_rollup(&mut runbook);
            return Ok(Some(runbook));
        }

        let key = CacheKey::new(ContentType::Runbooks, format!("runbook:{}", runbook_id));
        if let Some(mut runbook) = self.cache.get_json::<Runbook>(&key).await {
            self.catalog.insert(
                runbook.id.clone(),
                CatalogEntry {
                    runbook: runbook.clone(),
                    source_name: String::new(),
                },
            );
            self.apply_rollup(&mut runbook);
            return Ok(Some(runbook));
        }

        // Discovery: search runbook-category documents for the id, fetch
        // the full documents, and parse them.
        let filters = SearchFilters::default()
            .with_categories(vec![DocCategory::Runbook])
            .with_limit(25);
        let aggregated = self
            .registry
            .aggregate_search(runbook_id, &filters, Some(25))
            .await
            .map_err(ApiError::from)?;

        for result in &aggregated.results {
            let Ok(doc_id) = result.id.parse::<DocumentId>() else {
                continue;
            };
            let Ok(document) = self.registry.get_document(&doc_id).await else {
                continue;
            };
            if let Some(runbook) = triage_adapters::runbook_from_document(&document) {
                if runbook.id == runbook_id {
                    self.remember_runbook(&runbook, &doc_id.source).await;
                    let mut runbook = runbook;
                    self.apply_rollup(&mut runbook);
                    return Ok(Some(runbook));
                }
            }
        }

        Ok(None)
    }

    /// List the runbooks known to the engine (warmed or previously
    /// matched), optionally filtered by severity.
    pub async fn list_runbooks(
        &self,
        severity: Option<Severity>,
        limit: Option<usize>,
    ) -> ApiResult<ToolOutcome<RunbookListPayload>> {
        let started = Instant::now();

        let (limit, limit_clamped) = match limit {
            Some(requested) if requested > 100 => (100, true),
            Some(requested) => (requested.max(1), false),
            None => (50, false),
        };

        let mut runbooks: Vec<Runbook> = self
            .catalog
            .iter()
            .map(|entry| entry.runbook.clone())
            .filter(|runbook| match severity {
                Some(severity) => runbook
                    .severity_mapping
                    .values()
                    .any(|mapped| *mapped == severity),
                None => true,
            })
            .collect();

        for runbook in &mut runbooks {
            self.apply_rollup(runbook);
        }
        runbooks.sort_by(|a, b| a.id.cmp(&b.id));
        runbooks.truncate(limit);

        let payload = RunbookListPayload {
            total: runbooks.len(),
            runbooks,
            limit_clamped,
        };
        self.metrics.record("list-runbooks", elapsed_ms(started), true);
        Ok(ToolOutcome::fresh(payload, started))
    }
}

impl std::fmt::Debug for ToolEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolEngine")
            .field("catalog", &self.catalog.len())
            .finish()
    }
}

// ============================================================================
// HELPERS
// ============================================================================

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

fn sorted_join(items: &[String]) -> String {
    let mut sorted: Vec<&str> = items.iter().map(|s| s.as_str()).collect();
    sorted.sort_unstable();
    sorted.join(",")
}

fn context_hash(context: Option<&serde_json::Value>) -> String {
    match context {
        Some(value) => fingerprint(&[&value.to_string()]),
        None => String::new(),
    }
}

/// Stable fingerprint of the given parts for cache keys.
fn fingerprint(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    let digest = hasher.finalize();
    let mut hex = String::with_capacity(32);
    for byte in &digest[..16] {
        hex.push_str(&format!("{:02x}", byte));
    }
    hex
}

fn parse_categories(raw: Option<&[String]>) -> Result<Option<Vec<DocCategory>>, String> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    let mut categories = Vec::with_capacity(raw.len());
    for name in raw {
        let category = match name.to_ascii_lowercase().as_str() {
            "runbook" => DocCategory::Runbook,
            "procedure" => DocCategory::Procedure,
            "guide" => DocCategory::Guide,
            "general" => DocCategory::General,
            other => return Err(format!("unknown category: {}", other)),
        };
        if !categories.contains(&category) {
            categories.push(category);
        }
    }
    Ok(Some(categories))
}

fn business_hours_now() -> bool {
    let now = Local::now();
    let weekend = matches!(
        now.weekday(),
        chrono::Weekday::Sat | chrono::Weekday::Sun
    );
    !weekend && (9..17).contains(&now.hour())
}

/// Reorder branches by scenario relevance. The flag reports whether the
/// scenario actually changed anything.
fn apply_scenario(mut tree: DecisionTree, scenario: Option<&str>) -> (DecisionTree, bool) {
    let Some(scenario) = scenario.filter(|s| !s.trim().is_empty()) else {
        return (tree, false);
    };
    let scenario_tokens = triage_adapters::tokenize(scenario);
    let mut any_match = false;
    let mut scored: Vec<(f64, usize)> = tree
        .branches
        .iter()
        .enumerate()
        .map(|(idx, branch)| {
            let text = format!("{} {}", branch.condition, branch.description);
            let overlap =
                triage_adapters::token_overlap(&scenario_tokens, &triage_adapters::tokenize(&text));
            if overlap > 0.0 {
                any_match = true;
            }
            (overlap, idx)
        })
        .collect();

    if !any_match {
        return (tree, false);
    }

    scored.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.1.cmp(&b.1))
    });
    let branches = tree.branches.clone();
    tree.branches = scored
        .into_iter()
        .map(|(_, idx)| branches[idx].clone())
        .collect();
    (tree, true)
}

/// Apply the strategy's scoring weights: the lexical score carries the
/// semantic/fuzzy/metadata share, recency the rest.
fn fuse_scores(results: &mut Vec<SearchResult>, weights: &ScoringWeights) {
    let now = Utc::now();
    for result in results.iter_mut() {
        let age_days = now
            .signed_duration_since(result.last_updated)
            .num_days()
            .max(0) as f64;
        let recency = 1.0 / (1.0 + age_days / 30.0);
        let lexical = result.confidence;
        result.confidence = (lexical * (weights.semantic + weights.fuzzy + weights.metadata)
            + recency * weights.recency)
            .clamp(0.0, 1.0);
    }
    results.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_stable_and_distinct() {
        let a = fingerprint(&["search", "disk_space", "critical"]);
        let b = fingerprint(&["search", "disk_space", "critical"]);
        let c = fingerprint(&["search", "disk_space", "high"]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn test_fingerprint_separator_prevents_collisions() {
        assert_ne!(fingerprint(&["ab", "c"]), fingerprint(&["a", "bc"]));
    }

    #[test]
    fn test_sorted_join_is_order_insensitive() {
        assert_eq!(
            sorted_join(&["web-01".to_string(), "db-02".to_string()]),
            sorted_join(&["db-02".to_string(), "web-01".to_string()])
        );
    }

    #[test]
    fn test_parse_categories() {
        let parsed = parse_categories(Some(&["runbook".to_string(), "guide".to_string()]))
            .unwrap()
            .unwrap();
        assert_eq!(parsed, vec![DocCategory::Runbook, DocCategory::Guide]);
        assert!(parse_categories(Some(&["bogus".to_string()])).is_err());
        assert!(parse_categories(None).unwrap().is_none());
    }

    #[test]
    fn test_apply_scenario_reorders_matching_branch() {
        let tree = DecisionTree {
            id: "dt".to_string(),
            name: "t".to_string(),
            description: "d".to_string(),
            branches: vec![
                triage_core::DecisionBranch {
                    id: "a".to_string(),
                    condition: "memory exhausted".to_string(),
                    description: "check memory".to_string(),
                    action: "restart".to_string(),
                    next_step: None,
                    confidence: 0.8,
                    rollback_step: None,
                },
                triage_core::DecisionBranch {
                    id: "b".to_string(),
                    condition: "disk full".to_string(),
                    description: "check disk".to_string(),
                    action: "clean".to_string(),
                    next_step: None,
                    confidence: 0.8,
                    rollback_step: None,
                },
            ],
            default_action: "escalate".to_string(),
        };

        let (reordered, applied) = apply_scenario(tree.clone(), Some("disk full on web-01"));
        assert!(applied);
        assert_eq!(reordered.branches[0].id, "b");

        let (unchanged, applied) = apply_scenario(tree.clone(), Some("zebra unicorns"));
        assert!(!applied);
        assert_eq!(unchanged.branches[0].id, "a");

        let (untouched, applied) = apply_scenario(tree, None);
        assert!(!applied);
        assert_eq!(untouched.branches[0].id, "a");
    }

    #[test]
    fn test_fuse_scores_rewards_recency() {
        let mut results = vec![
            SearchResult {
                id: "a:old".to_string(),
                title: "old".to_string(),
                excerpt: String::new(),
                source_name: "a".to_string(),
                source_type: SourceType::File,
                category: None,
                confidence: 0.8,
                match_reasons: vec![],
                retrieval_time_ms: 1,
                last_updated: Utc::now() - chrono::Duration::days(365),
                url: None,
                metadata: Default::default(),
            },
            SearchResult {
                id: "a:new".to_string(),
                title: "new".to_string(),
                excerpt: String::new(),
                source_name: "a".to_string(),
                source_type: SourceType::File,
                category: None,
                confidence: 0.8,
                match_reasons: vec![],
                retrieval_time_ms: 1,
                last_updated: Utc::now(),
                url: None,
                metadata: Default::default(),
            },
        ];
        fuse_scores(&mut results, &ScoringWeights::balanced());
        assert_eq!(results[0].id, "a:new");
        assert!(results.iter().all(|r| (0.0..=1.0).contains(&r.confidence)));
    }

    #[test]
    fn test_business_hours_logic_is_pure() {
        // Just exercise it; wall-clock dependent.
        let _ = business_hours_now();
    }
}
