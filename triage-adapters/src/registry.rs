//! Adapter registry
//!
//! Owns every adapter's lifetime and is the only component that invokes
//! one. Fan-out is concurrent under a semaphore; each call is wrapped in
//! the source's per-call timeout, its circuit breaker, and the retry
//! policy (transient failures only, exponential backoff 100ms doubling to
//! a 5s cap). Rejections from an open circuit consume no retry budget.

use crate::adapter::SourceAdapter;
use crate::breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
use dashmap::DashMap;
use futures_util::future::join_all;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, Semaphore};
use triage_core::{
    RunbookMatch, SearchFilters, SearchResult, Severity, SourceConfig, SourceError, SourceHealth,
};

const RETRY_BACKOFF_INITIAL: Duration = Duration::from_millis(100);
const RETRY_BACKOFF_CAP: Duration = Duration::from_secs(5);

/// Default result limit for aggregated queries.
pub const DEFAULT_RESULT_LIMIT: usize = 10;
/// Hard cap on aggregated result limits; larger requests are clamped.
pub const MAX_RESULT_LIMIT: usize = 100;

/// One source's failure within an aggregated call.
#[derive(Debug, Clone, PartialEq, Serialize, serde::Deserialize)]
pub struct SourceFailure {
    pub name: String,
    pub code: String,
    pub reason: String,
    #[serde(skip)]
    pub transient: bool,
}

impl SourceFailure {
    fn from_error(name: &str, error: &SourceError) -> Self {
        Self {
            name: name.to_string(),
            code: error.code().to_string(),
            reason: error.to_string(),
            // Circuit-open counts as transient for aggregation purposes.
            transient: error.is_transient()
                || matches!(error, SourceError::CircuitOpen { .. }),
        }
    }
}

/// Aggregated search output: merged results plus partial-failure evidence.
#[derive(Debug, Clone, Serialize)]
pub struct AggregatedSearch {
    pub results: Vec<SearchResult>,
    pub failed_sources: Vec<SourceFailure>,
    pub limit_clamped: bool,
}

/// Aggregated runbook-search output.
#[derive(Debug, Clone, Serialize)]
pub struct AggregatedRunbooks {
    pub matches: Vec<RunbookMatch>,
    pub failed_sources: Vec<SourceFailure>,
}

/// Registry of source adapters.
pub struct AdapterRegistry {
    /// Creation order is preserved; shutdown walks it in reverse.
    adapters: RwLock<Vec<Arc<dyn SourceAdapter>>>,
    /// Circuit breakers, created lazily on first call to a source.
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    breaker_config: CircuitBreakerConfig,
    /// Fan-out concurrency cap; defaults to the adapter count per call.
    fan_out_limit: Option<usize>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self {
            adapters: RwLock::new(Vec::new()),
            breakers: DashMap::new(),
            breaker_config: CircuitBreakerConfig::default(),
            fan_out_limit: None,
        }
    }

    pub fn with_fan_out_limit(mut self, limit: usize) -> Self {
        self.fan_out_limit = Some(limit.max(1));
        self
    }

    pub fn with_breaker_config(mut self, config: CircuitBreakerConfig) -> Self {
        self.breaker_config = config;
        self
    }

    /// Register an adapter, initializing it first. Initialization failure
    /// leaves the registry unchanged.
    pub async fn register(&self, adapter: Arc<dyn SourceAdapter>) -> Result<(), SourceError> {
        {
            let adapters = self.adapters.read().await;
            if adapters.iter().any(|a| a.name() == adapter.name()) {
                return Err(SourceError::Permanent {
                    source_name: adapter.name().to_string(),
                    code: "duplicate".to_string(),
                    reason: "adapter already registered".to_string(),
                });
            }
        }

        adapter.initialize().await?;
        tracing::info!(source = adapter.name(), "adapter registered");
        self.adapters.write().await.push(adapter);
        Ok(())
    }

    /// Remove an adapter, shutting it down. Returns whether it existed.
    pub async fn unregister(&self, name: &str) -> bool {
        let removed = {
            let mut adapters = self.adapters.write().await;
            match adapters.iter().position(|a| a.name() == name) {
                Some(idx) => Some(adapters.remove(idx)),
                None => None,
            }
        };
        match removed {
            Some(adapter) => {
                if let Err(e) = adapter.shutdown().await {
                    tracing::warn!(source = name, error = %e, "adapter shutdown failed");
                }
                self.breakers.remove(name);
                true
            }
            None => false,
        }
    }

    pub async fn get(&self, name: &str) -> Option<Arc<dyn SourceAdapter>> {
        self.adapters
            .read()
            .await
            .iter()
            .find(|a| a.name() == name)
            .cloned()
    }

    pub async fn all(&self) -> Vec<Arc<dyn SourceAdapter>> {
        self.adapters.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.adapters.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.adapters.read().await.is_empty()
    }

    /// The circuit breaker for a source, created lazily on first use.
    pub fn breaker(&self, name: &str) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::new(name, self.breaker_config.clone()))
            })
            .value()
            .clone()
    }

    /// Breaker state for health reporting; None before the first call.
    pub fn breaker_state(&self, name: &str) -> Option<CircuitState> {
        self.breakers.get(name).map(|b| b.state())
    }

    /// Shut every adapter down in reverse creation order.
    pub async fn shutdown_all(&self) {
        let adapters: Vec<_> = {
            let mut guard = self.adapters.write().await;
            guard.drain(..).collect()
        };
        for adapter in adapters.into_iter().rev() {
            if let Err(e) = adapter.shutdown().await {
                tracing::warn!(source = adapter.name(), error = %e, "adapter shutdown failed");
            }
        }
        self.breakers.clear();
    }

    /// Replace the adapter set from a freshly loaded configuration.
    /// Existing adapters are shut down first (reverse order), then the new
    /// set is built and registered in declaration order.
    pub async fn reload(&self, sources: &[SourceConfig]) -> Result<(), SourceError> {
        self.shutdown_all().await;
        for config in sources.iter().filter(|s| s.enabled) {
            let adapter = crate::factory::build_adapter(config)?;
            self.register(adapter).await?;
        }
        Ok(())
    }

    /// Probe every adapter concurrently.
    pub async fn health_check_all(&self) -> HashMap<String, SourceHealth> {
        let adapters = self.all().await;
        let probes = adapters.iter().map(|adapter| async {
            let health = tokio::time::timeout(adapter.config().timeout(), adapter.health_check())
                .await
                .unwrap_or_else(|_| {
                    SourceHealth::unhealthy(
                        adapter.config().timeout_ms,
                        "health check timed out",
                    )
                });
            (adapter.name().to_string(), health)
        });
        join_all(probes).await.into_iter().collect()
    }

    /// Refresh every adapter's index.
    pub async fn refresh_all(&self, force: bool) -> HashMap<String, Result<bool, SourceError>> {
        let adapters = self.all().await;
        let refreshes = adapters.iter().map(|adapter| async move {
            (adapter.name().to_string(), adapter.refresh_index(force).await)
        });
        join_all(refreshes).await.into_iter().collect()
    }

    /// One guarded call: per-call timeout, circuit breaker, retry policy.
    async fn guarded_call<T, F, Fut>(
        &self,
        adapter: &Arc<dyn SourceAdapter>,
        op: F,
    ) -> Result<T, SourceError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, SourceError>>,
    {
        let name = adapter.name().to_string();
        let per_call_timeout = adapter.config().timeout();
        let max_retries = adapter.config().max_retries;
        let breaker = self.breaker(&name);

        let mut attempt: u32 = 0;
        loop {
            let operation = async {
                match tokio::time::timeout(per_call_timeout, op()).await {
                    Ok(result) => result,
                    Err(_) => Err(SourceError::Timeout {
                        source_name: name.clone(),
                        timeout_ms: per_call_timeout.as_millis() as u64,
                    }),
                }
            };

            match breaker.guard(operation, None).await {
                Ok(guarded) => return Ok(guarded.value),
                // Open-circuit rejections never consume retry budget.
                Err(e @ SourceError::CircuitOpen { .. }) => return Err(e),
                Err(e) if e.is_transient() && attempt < max_retries => {
                    let backoff = RETRY_BACKOFF_INITIAL
                        .saturating_mul(1u32 << attempt.min(6))
                        .min(RETRY_BACKOFF_CAP);
                    let delay = match &e {
                        SourceError::RateLimited { retry_after_ms, .. } => {
                            backoff.max(Duration::from_millis(*retry_after_ms))
                        }
                        _ => backoff,
                    };
                    tracing::debug!(
                        source = %name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "retrying transient source failure"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Fetch one document by its engine-wide id, guarded like any other
    /// adapter call.
    pub async fn get_document(
        &self,
        id: &triage_core::DocumentId,
    ) -> Result<triage_core::Document, SourceError> {
        let adapter = self.get(&id.source).await.ok_or_else(|| {
            SourceError::NotFound {
                id: id.to_string(),
            }
        })?;
        let local_id = id.local_id.clone();
        self.guarded_call(&adapter, || {
            let adapter = Arc::clone(&adapter);
            let local_id = local_id.clone();
            async move { adapter.get_document(&local_id).await }
        })
        .await
    }

    /// Adapters eligible for a search under the filter's source-type
    /// restriction. Disabled sources never make the list.
    async fn eligible(&self, filters: &SearchFilters) -> Vec<Arc<dyn SourceAdapter>> {
        self.adapters
            .read()
            .await
            .iter()
            .filter(|a| a.config().enabled && filters.allows_source_type(a.source_type()))
            .cloned()
            .collect()
    }

    /// Fan a query out to every eligible adapter and merge the results.
    pub async fn aggregate_search(
        &self,
        query: &str,
        filters: &SearchFilters,
        limit: Option<usize>,
    ) -> Result<AggregatedSearch, SourceError> {
        let eligible = self.eligible(filters).await;
        let (requested, limit_clamped) = clamp_limit(limit);

        if eligible.is_empty() {
            return Ok(AggregatedSearch {
                results: Vec::new(),
                failed_sources: Vec::new(),
                limit_clamped,
            });
        }

        let semaphore = Arc::new(Semaphore::new(
            self.fan_out_limit.unwrap_or(eligible.len()).max(1),
        ));

        let calls = eligible.iter().map(|adapter| {
            let semaphore = Arc::clone(&semaphore);
            let query = query.to_string();
            let filters = filters.clone();
            async move {
                let _permit = semaphore.acquire().await;
                let result = self
                    .guarded_call(adapter, || {
                        let adapter = Arc::clone(adapter);
                        let query = query.clone();
                        let filters = filters.clone();
                        async move { adapter.search(&query, &filters).await }
                    })
                    .await;
                (adapter.name().to_string(), result)
            }
        });

        let outcomes = join_all(calls).await;

        let mut merged: Vec<SearchResult> = Vec::new();
        let mut failed_sources = Vec::new();
        for (name, outcome) in outcomes {
            match outcome {
                Ok(results) => merged.extend(results),
                Err(e) => {
                    tracing::warn!(source = %name, error = %e, "source failed during aggregation");
                    failed_sources.push(SourceFailure::from_error(&name, &e));
                }
            }
        }

        self.check_total_failure(merged.len(), &failed_sources)?;

        let priorities = self.priorities().await;
        let mut results = dedupe_results(merged);
        sort_results(&mut results, &priorities);
        results.truncate(requested);

        Ok(AggregatedSearch {
            results,
            failed_sources,
            limit_clamped,
        })
    }

    /// Fan a runbook search out to every eligible adapter.
    pub async fn aggregate_runbook_search(
        &self,
        alert_type: &str,
        severity: Severity,
        affected_systems: &[String],
        context: Option<&serde_json::Value>,
    ) -> Result<AggregatedRunbooks, SourceError> {
        let filters = SearchFilters::default();
        let eligible = self.eligible(&filters).await;

        if eligible.is_empty() {
            return Ok(AggregatedRunbooks {
                matches: Vec::new(),
                failed_sources: Vec::new(),
            });
        }

        let semaphore = Arc::new(Semaphore::new(
            self.fan_out_limit.unwrap_or(eligible.len()).max(1),
        ));

        let calls = eligible.iter().map(|adapter| {
            let semaphore = Arc::clone(&semaphore);
            let alert_type = alert_type.to_string();
            let affected_systems = affected_systems.to_vec();
            let context = context.cloned();
            async move {
                let _permit = semaphore.acquire().await;
                let result = self
                    .guarded_call(adapter, || {
                        let adapter = Arc::clone(adapter);
                        let alert_type = alert_type.clone();
                        let affected_systems = affected_systems.clone();
                        let context = context.clone();
                        async move {
                            adapter
                                .search_runbooks(
                                    &alert_type,
                                    severity,
                                    &affected_systems,
                                    context.as_ref(),
                                )
                                .await
                        }
                    })
                    .await;
                (adapter.name().to_string(), result)
            }
        });

        let outcomes = join_all(calls).await;

        let mut merged: Vec<RunbookMatch> = Vec::new();
        let mut failed_sources = Vec::new();
        for (name, outcome) in outcomes {
            match outcome {
                Ok(matches) => merged.extend(matches),
                Err(e) => {
                    tracing::warn!(source = %name, error = %e, "source failed during runbook aggregation");
                    failed_sources.push(SourceFailure::from_error(&name, &e));
                }
            }
        }

        self.check_total_failure(merged.len(), &failed_sources)?;

        let priorities = self.priorities().await;
        let mut matches = dedupe_runbooks(merged);
        sort_runbooks(&mut matches, &priorities);

        Ok(AggregatedRunbooks {
            matches,
            failed_sources,
        })
    }

    /// The whole call fails only when nothing was usable and every failure
    /// was permanent.
    fn check_total_failure(
        &self,
        result_count: usize,
        failures: &[SourceFailure],
    ) -> Result<(), SourceError> {
        if result_count == 0
            && !failures.is_empty()
            && failures.iter().all(|f| !f.transient)
        {
            return Err(SourceError::Permanent {
                source_name: failures
                    .iter()
                    .map(|f| f.name.as_str())
                    .collect::<Vec<_>>()
                    .join(","),
                code: "all-sources-failed".to_string(),
                reason: "every eligible source failed permanently".to_string(),
            });
        }
        Ok(())
    }

    async fn priorities(&self) -> HashMap<String, i32> {
        self.adapters
            .read()
            .await
            .iter()
            .map(|a| (a.name().to_string(), a.config().priority))
            .collect()
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("fan_out_limit", &self.fan_out_limit)
            .finish()
    }
}

// ============================================================================
// MERGE HELPERS
// ============================================================================

fn clamp_limit(limit: Option<usize>) -> (usize, bool) {
    match limit {
        Some(requested) if requested > MAX_RESULT_LIMIT => (MAX_RESULT_LIMIT, true),
        Some(requested) => (requested.max(1), false),
        None => (DEFAULT_RESULT_LIMIT, false),
    }
}

/// Two results are duplicates when they share `(source type, local id)`.
/// Keep the higher-confidence copy; break ties by newer `last_updated`.
fn dedupe_results(results: Vec<SearchResult>) -> Vec<SearchResult> {
    let mut by_key: HashMap<(String, String), SearchResult> = HashMap::new();
    for result in results {
        let key = (
            result.source_type.to_string(),
            result.local_id().to_string(),
        );
        let keep_existing = by_key
            .get(&key)
            .map(|existing| {
                existing.confidence > result.confidence
                    || (existing.confidence == result.confidence
                        && existing.last_updated >= result.last_updated)
            })
            .unwrap_or(false);
        if !keep_existing {
            by_key.insert(key, result);
        }
    }
    by_key.into_values().collect()
}

/// Merged order: confidence desc, source priority asc (lower number is
/// preferred), last-updated desc.
fn sort_results(results: &mut [SearchResult], priorities: &HashMap<String, i32>) {
    results.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                let pa = priorities.get(&a.source_name).copied().unwrap_or(i32::MAX);
                let pb = priorities.get(&b.source_name).copied().unwrap_or(i32::MAX);
                pa.cmp(&pb)
            })
            .then_with(|| b.last_updated.cmp(&a.last_updated))
    });
}

fn dedupe_runbooks(matches: Vec<RunbookMatch>) -> Vec<RunbookMatch> {
    let mut by_key: HashMap<String, RunbookMatch> = HashMap::new();
    for m in matches {
        let key = m.runbook.id.clone();
        let keep_existing = by_key
            .get(&key)
            .map(|existing| {
                existing.confidence > m.confidence
                    || (existing.confidence == m.confidence
                        && existing.runbook.last_updated >= m.runbook.last_updated)
            })
            .unwrap_or(false);
        if !keep_existing {
            by_key.insert(key, m);
        }
    }
    by_key.into_values().collect()
}

fn sort_runbooks(matches: &mut [RunbookMatch], priorities: &HashMap<String, i32>) {
    matches.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                let pa = priorities.get(&a.source_name).copied().unwrap_or(i32::MAX);
                let pb = priorities.get(&b.source_name).copied().unwrap_or(i32::MAX);
                pa.cmp(&pb)
            })
            .then_with(|| b.runbook.last_updated.cmp(&a.runbook.last_updated))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap as StdHashMap;
    use triage_core::SourceType;

    fn result(source: &str, source_type: SourceType, local_id: &str, confidence: f64) -> SearchResult {
        SearchResult {
            id: format!("{}:{}", source, local_id),
            title: local_id.to_string(),
            excerpt: String::new(),
            source_name: source.to_string(),
            source_type,
            category: None,
            confidence,
            match_reasons: vec![],
            retrieval_time_ms: 1,
            last_updated: Utc::now(),
            url: None,
            metadata: std::collections::BTreeMap::new(),
        }
    }

    #[test]
    fn test_clamp_limit() {
        assert_eq!(clamp_limit(None), (DEFAULT_RESULT_LIMIT, false));
        assert_eq!(clamp_limit(Some(25)), (25, false));
        assert_eq!(clamp_limit(Some(500)), (MAX_RESULT_LIMIT, true));
    }

    #[test]
    fn test_dedupe_keeps_higher_confidence() {
        let merged = dedupe_results(vec![
            result("a", SourceType::Wiki, "doc-1", 0.5),
            result("b", SourceType::Wiki, "doc-1", 0.9),
            result("c", SourceType::File, "doc-1", 0.4),
        ]);
        // wiki/doc-1 deduped, file/doc-1 is a different source type.
        assert_eq!(merged.len(), 2);
        let wiki = merged
            .iter()
            .find(|r| r.source_type == SourceType::Wiki)
            .unwrap();
        assert_eq!(wiki.confidence, 0.9);
        assert_eq!(wiki.source_name, "b");
    }

    #[test]
    fn test_sort_priority_breaks_confidence_ties() {
        let mut results = vec![
            result("low-priority", SourceType::Wiki, "a", 0.8),
            result("high-priority", SourceType::File, "b", 0.8),
        ];
        let priorities = StdHashMap::from([
            ("low-priority".to_string(), 50),
            ("high-priority".to_string(), 1),
        ]);
        sort_results(&mut results, &priorities);
        assert_eq!(results[0].source_name, "high-priority");
    }

    #[test]
    fn test_sort_confidence_dominates_priority() {
        let mut results = vec![
            result("high-priority", SourceType::File, "b", 0.5),
            result("low-priority", SourceType::Wiki, "a", 0.9),
        ];
        let priorities = StdHashMap::from([
            ("low-priority".to_string(), 50),
            ("high-priority".to_string(), 1),
        ]);
        sort_results(&mut results, &priorities);
        assert_eq!(results[0].source_name, "low-priority");
    }
}
