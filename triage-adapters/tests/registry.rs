//! Registry fan-out, retry, and aggregation behavior

use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use triage_adapters::{
    AdapterMetadata, AdapterRegistry, CircuitBreakerConfig, SourceAdapter,
};
use triage_core::{
    Document, DocumentId, RunbookMatch, SearchFilters, SearchResult, Severity, SourceConfig,
    SourceError, SourceHealth, SourceType,
};

/// Scripted adapter: returns canned results or fails a set number of
/// times before succeeding.
struct MockAdapter {
    config: SourceConfig,
    results: Vec<SearchResult>,
    fail_first: u32,
    permanent: bool,
    calls: AtomicU32,
}

impl MockAdapter {
    fn healthy(name: &str, source_type: SourceType, results: Vec<SearchResult>) -> Self {
        Self {
            config: SourceConfig::new(name, source_type).with_max_retries(2),
            results,
            fail_first: 0,
            permanent: false,
            calls: AtomicU32::new(0),
        }
    }

    fn flaky(name: &str, fail_first: u32, results: Vec<SearchResult>) -> Self {
        Self {
            config: SourceConfig::new(name, SourceType::Web).with_max_retries(3),
            results,
            fail_first,
            permanent: false,
            calls: AtomicU32::new(0),
        }
    }

    fn broken(name: &str, permanent: bool) -> Self {
        Self {
            config: SourceConfig::new(name, SourceType::Web).with_max_retries(1),
            results: vec![],
            fail_first: u32::MAX,
            permanent,
            calls: AtomicU32::new(0),
        }
    }

    fn with_priority(mut self, priority: i32) -> Self {
        self.config = self.config.with_priority(priority);
        self
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn maybe_fail(&self) -> Result<(), SourceError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.fail_first {
            if self.permanent {
                Err(SourceError::Permanent {
                    source_name: self.config.name.clone(),
                    code: "auth".to_string(),
                    reason: "forbidden".to_string(),
                })
            } else {
                Err(SourceError::Unavailable {
                    source_name: self.config.name.clone(),
                    reason: "connect refused".to_string(),
                })
            }
        } else {
            Ok(())
        }
    }
}

fn make_result(source: &str, local_id: &str, confidence: f64) -> SearchResult {
    SearchResult {
        id: format!("{}:{}", source, local_id),
        title: local_id.to_string(),
        excerpt: "excerpt".to_string(),
        source_name: source.to_string(),
        source_type: SourceType::Web,
        category: None,
        confidence,
        match_reasons: vec!["test".to_string()],
        retrieval_time_ms: 1,
        last_updated: Utc::now(),
        url: None,
        metadata: BTreeMap::new(),
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
        _query: &str,
        _filters: &SearchFilters,
    ) -> Result<Vec<SearchResult>, SourceError> {
        self.maybe_fail()?;
        Ok(self.results.clone())
    }

    async fn search_runbooks(
        &self,
        _alert_type: &str,
        _severity: Severity,
        _affected_systems: &[String],
        _context: Option<&serde_json::Value>,
    ) -> Result<Vec<RunbookMatch>, SourceError> {
        self.maybe_fail()?;
        Ok(vec![])
    }

    async fn get_document(&self, local_id: &str) -> Result<Document, SourceError> {
        self.maybe_fail()?;
        self.results
            .iter()
            .find(|r| r.id.ends_with(local_id))
            .map(|r| {
                Document::new(
                    DocumentId::new(&self.config.name, local_id),
                    r.title.clone(),
                    "content",
                )
            })
            .ok_or_else(|| SourceError::NotFound {
                id: local_id.to_string(),
            })
    }

    async fn health_check(&self) -> SourceHealth {
        SourceHealth::healthy(1)
    }

    async fn metadata(&self) -> AdapterMetadata {
        AdapterMetadata {
            name: self.config.name.clone(),
            source_type: self.config.source_type,
            document_count: self.results.len(),
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

#[tokio::test]
async fn empty_registry_returns_empty_success() {
    let registry = AdapterRegistry::new();
    let agg = registry
        .aggregate_search("disk space", &SearchFilters::default(), None)
        .await
        .unwrap();
    assert!(agg.results.is_empty());
    assert!(agg.failed_sources.is_empty());
}

#[tokio::test]
async fn merges_and_ranks_across_sources() {
    let registry = AdapterRegistry::new();
    registry
        .register(Arc::new(
            MockAdapter::healthy("a", SourceType::Web, vec![make_result("a", "doc-1", 0.6)])
                .with_priority(10),
        ))
        .await
        .unwrap();
    registry
        .register(Arc::new(
            MockAdapter::healthy("b", SourceType::Wiki, vec![make_result("b", "doc-2", 0.9)])
                .with_priority(5),
        ))
        .await
        .unwrap();

    let agg = registry
        .aggregate_search("query", &SearchFilters::default(), None)
        .await
        .unwrap();
    assert_eq!(agg.results.len(), 2);
    assert_eq!(agg.results[0].confidence, 0.9);
    assert!(agg.failed_sources.is_empty());
}

#[tokio::test]
async fn source_type_filter_restricts_fan_out() {
    let registry = AdapterRegistry::new();
    let wiki = Arc::new(MockAdapter::healthy(
        "wiki",
        SourceType::Wiki,
        vec![make_result("wiki", "w", 0.5)],
    ));
    let web = Arc::new(MockAdapter::healthy(
        "web",
        SourceType::Web,
        vec![make_result("web", "x", 0.5)],
    ));
    registry.register(wiki.clone()).await.unwrap();
    registry.register(web.clone()).await.unwrap();

    let filters = SearchFilters::default().with_source_types(vec![SourceType::Wiki]);
    let agg = registry
        .aggregate_search("query", &filters, None)
        .await
        .unwrap();

    assert_eq!(agg.results.len(), 1);
    assert_eq!(agg.results[0].source_name, "wiki");
    // The web adapter was never called.
    assert_eq!(web.calls(), 0);
    assert_eq!(wiki.calls(), 1);
}

#[tokio::test]
async fn transient_failures_are_retried_until_success() {
    let registry = AdapterRegistry::new();
    let flaky = Arc::new(MockAdapter::flaky(
        "flaky",
        2,
        vec![make_result("flaky", "doc", 0.7)],
    ));
    registry.register(flaky.clone()).await.unwrap();

    let agg = registry
        .aggregate_search("query", &SearchFilters::default(), None)
        .await
        .unwrap();
    assert_eq!(agg.results.len(), 1);
    assert!(agg.failed_sources.is_empty());
    // Two failures plus the succeeding attempt.
    assert_eq!(flaky.calls(), 3);
}

#[tokio::test]
async fn partial_failure_reports_failed_sources() {
    let registry = AdapterRegistry::new();
    registry
        .register(Arc::new(MockAdapter::healthy(
            "good",
            SourceType::Web,
            vec![make_result("good", "doc", 0.8)],
        )))
        .await
        .unwrap();
    registry
        .register(Arc::new(MockAdapter::broken("bad", false)))
        .await
        .unwrap();

    let agg = registry
        .aggregate_search("query", &SearchFilters::default(), None)
        .await
        .unwrap();
    assert_eq!(agg.results.len(), 1);
    assert_eq!(agg.failed_sources.len(), 1);
    assert_eq!(agg.failed_sources[0].name, "bad");
    assert_eq!(agg.failed_sources[0].code, "source-unavailable");
}

#[tokio::test]
async fn all_transient_failures_still_succeed_with_empty_results() {
    let registry = AdapterRegistry::new();
    registry
        .register(Arc::new(MockAdapter::broken("bad-1", false)))
        .await
        .unwrap();
    registry
        .register(Arc::new(MockAdapter::broken("bad-2", false)))
        .await
        .unwrap();

    let agg = registry
        .aggregate_search("query", &SearchFilters::default(), None)
        .await
        .unwrap();
    assert!(agg.results.is_empty());
    assert_eq!(agg.failed_sources.len(), 2);
}

#[tokio::test]
async fn all_permanent_failures_fail_the_call() {
    let registry = AdapterRegistry::new();
    registry
        .register(Arc::new(MockAdapter::broken("bad", true)))
        .await
        .unwrap();

    let result = registry
        .aggregate_search("query", &SearchFilters::default(), None)
        .await;
    assert!(matches!(result, Err(SourceError::Permanent { .. })));
}

#[tokio::test]
async fn permanent_failures_are_not_retried() {
    let registry = AdapterRegistry::new();
    let bad = Arc::new(MockAdapter::broken("bad", true));
    registry.register(bad.clone()).await.unwrap();

    let _ = registry
        .aggregate_search("query", &SearchFilters::default(), None)
        .await;
    assert_eq!(bad.calls(), 1);
}

#[tokio::test]
async fn open_circuit_skips_source_without_retries() {
    let registry = AdapterRegistry::new().with_breaker_config(CircuitBreakerConfig {
        failure_threshold: 1,
        cooldown: std::time::Duration::from_secs(600),
        half_open_probes: 1,
        success_threshold: 2,
    });
    let good = Arc::new(MockAdapter::healthy(
        "good",
        SourceType::Web,
        vec![make_result("good", "doc", 0.8)],
    ));
    let bad = Arc::new(MockAdapter::broken("bad", false));
    registry.register(good.clone()).await.unwrap();
    registry.register(bad.clone()).await.unwrap();

    // First call trips the breaker for "bad" (threshold 1, retry budget 1).
    let _ = registry
        .aggregate_search("query", &SearchFilters::default(), None)
        .await
        .unwrap();
    let calls_after_trip = bad.calls();

    // Second call: "bad" is rejected without being contacted.
    let agg = registry
        .aggregate_search("query", &SearchFilters::default(), None)
        .await
        .unwrap();
    assert_eq!(bad.calls(), calls_after_trip);
    assert_eq!(agg.results.len(), 1);
    assert!(agg
        .failed_sources
        .iter()
        .any(|f| f.name == "bad" && f.code == "circuit-open"));
}

#[tokio::test]
async fn limit_above_cap_is_clamped_and_flagged() {
    let registry = AdapterRegistry::new();
    registry
        .register(Arc::new(MockAdapter::healthy(
            "a",
            SourceType::Web,
            vec![make_result("a", "doc", 0.5)],
        )))
        .await
        .unwrap();

    let agg = registry
        .aggregate_search("query", &SearchFilters::default(), Some(1000))
        .await
        .unwrap();
    assert!(agg.limit_clamped);
}

#[tokio::test]
async fn unregister_shuts_down_and_removes() {
    let registry = AdapterRegistry::new();
    registry
        .register(Arc::new(MockAdapter::healthy("a", SourceType::Web, vec![])))
        .await
        .unwrap();
    assert!(registry.get("a").await.is_some());
    assert!(registry.unregister("a").await);
    assert!(registry.get("a").await.is_none());
    assert!(!registry.unregister("a").await);
}

#[tokio::test]
async fn duplicate_registration_rejected() {
    let registry = AdapterRegistry::new();
    registry
        .register(Arc::new(MockAdapter::healthy("a", SourceType::Web, vec![])))
        .await
        .unwrap();
    let dup = registry
        .register(Arc::new(MockAdapter::healthy("a", SourceType::Web, vec![])))
        .await;
    assert!(dup.is_err());
}

#[tokio::test]
async fn health_check_all_covers_every_adapter() {
    let registry = AdapterRegistry::new();
    registry
        .register(Arc::new(MockAdapter::healthy("a", SourceType::Web, vec![])))
        .await
        .unwrap();
    registry
        .register(Arc::new(MockAdapter::healthy("b", SourceType::Wiki, vec![])))
        .await
        .unwrap();

    let health = registry.health_check_all().await;
    assert_eq!(health.len(), 2);
    assert!(health.values().all(|h| h.healthy));
}

#[tokio::test]
async fn reload_replaces_the_adapter_set() {
    let registry = AdapterRegistry::new();
    registry
        .register(Arc::new(MockAdapter::healthy("old", SourceType::Web, vec![])))
        .await
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("guide.md"), "# Disk guide\ncontent").unwrap();

    let mut file_source = SourceConfig::new("docs", SourceType::File);
    file_source.paths.push(dir.path().to_path_buf());
    let disabled = SourceConfig::new("ignored", SourceType::Web).disabled();

    registry.reload(&[file_source, disabled]).await.unwrap();

    assert!(registry.get("old").await.is_none());
    assert!(registry.get("docs").await.is_some());
    // Disabled sources are never built.
    assert!(registry.get("ignored").await.is_none());
    assert_eq!(registry.len().await, 1);
}
