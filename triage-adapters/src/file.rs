//! Filesystem source adapter
//!
//! Indexes markdown and JSON documents under the configured roots.
//! Markdown files become general documents (category inferred from the
//! directory they sit in); JSON files are parsed as runbooks.

use crate::adapter::{AdapterMetadata, AdapterStats, SourceAdapter};
use crate::scoring;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::Instant;
use tokio::sync::Mutex;
use triage_core::{
    DocCategory, Document, DocumentId, Runbook, RunbookMatch, SearchFilters, SearchResult,
    Severity, SourceConfig, SourceError, SourceHealth, SourceType,
};

/// Adapter over one or more documentation directories.
pub struct FileAdapter {
    config: SourceConfig,
    documents: RwLock<Vec<Document>>,
    runbooks: RwLock<Vec<Runbook>>,
    stats: AdapterStats,
    /// Serializes refreshes so concurrent callers do not walk twice.
    refresh_lock: Mutex<()>,
}

impl FileAdapter {
    pub fn new(config: SourceConfig) -> Self {
        Self {
            config,
            documents: RwLock::new(Vec::new()),
            runbooks: RwLock::new(Vec::new()),
            stats: AdapterStats::new(),
            refresh_lock: Mutex::new(()),
        }
    }

    fn err_unavailable(&self, reason: impl Into<String>) -> SourceError {
        SourceError::Unavailable {
            source_name: self.config.name.clone(),
            reason: reason.into(),
        }
    }

    /// Walk the configured roots and rebuild the in-memory index.
    async fn rebuild_index(&self) -> Result<(), SourceError> {
        let _guard = self.refresh_lock.lock().await;

        let mut files = Vec::new();
        for root in &self.config.paths {
            collect_files(root, &mut files)
                .await
                .map_err(|e| self.err_unavailable(format!("walk {}: {}", root.display(), e)))?;
        }

        let mut documents = Vec::new();
        let mut runbooks = Vec::new();

        for path in files {
            let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
                continue;
            };
            match ext {
                "md" | "markdown" => {
                    if let Some(doc) = self.load_markdown(&path).await {
                        documents.push(doc);
                    }
                }
                "json" => {
                    if let Some((doc, runbook)) = self.load_runbook(&path).await {
                        documents.push(doc);
                        runbooks.push(runbook);
                    }
                }
                _ => {}
            }
        }

        tracing::debug!(
            source = %self.config.name,
            documents = documents.len(),
            runbooks = runbooks.len(),
            "file index rebuilt"
        );

        if let Ok(mut guard) = self.documents.write() {
            *guard = documents;
        }
        if let Ok(mut guard) = self.runbooks.write() {
            *guard = runbooks;
        }
        self.stats.mark_indexed();
        Ok(())
    }

    async fn load_markdown(&self, path: &Path) -> Option<Document> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping unreadable file");
                return None;
            }
        };

        let title = content
            .lines()
            .find(|l| l.starts_with("# "))
            .map(|l| l.trim_start_matches("# ").trim().to_string())
            .unwrap_or_else(|| {
                path.file_stem()
                    .map(|s| s.to_string_lossy().to_string())
                    .unwrap_or_else(|| "untitled".to_string())
            });

        let last_updated = file_mtime(path).await;
        let local_id = self.local_id_for(path);

        Some(Document {
            id: DocumentId::new(&self.config.name, local_id),
            title,
            content,
            category: infer_category(path),
            last_updated,
            url: None,
            metadata: BTreeMap::from([(
                "path".to_string(),
                serde_json::Value::String(path.display().to_string()),
            )]),
        })
    }

    async fn load_runbook(&self, path: &Path) -> Option<(Document, Runbook)> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping unreadable file");
                return None;
            }
        };

        let runbook: Runbook = match serde_json::from_str(&content) {
            Ok(rb) => rb,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping unparseable runbook");
                return None;
            }
        };
        if let Err(e) = runbook.validate() {
            tracing::warn!(path = %path.display(), error = %e, "skipping invalid runbook");
            return None;
        }

        let doc = Document {
            id: DocumentId::new(&self.config.name, self.local_id_for(path)),
            title: runbook.title.clone(),
            content,
            category: Some(DocCategory::Runbook),
            last_updated: runbook.last_updated,
            url: None,
            metadata: BTreeMap::from([(
                "runbook_id".to_string(),
                serde_json::Value::String(runbook.id.clone()),
            )]),
        };
        Some((doc, runbook))
    }

    /// Local id is the path relative to the first root that contains it.
    fn local_id_for(&self, path: &Path) -> String {
        for root in &self.config.paths {
            if let Ok(rel) = path.strip_prefix(root) {
                return rel.to_string_lossy().replace('\\', "/");
            }
        }
        path.to_string_lossy().to_string()
    }

    fn index_is_fresh(&self) -> bool {
        match self.stats.last_indexed() {
            Some(at) => {
                let age = Utc::now().signed_duration_since(at);
                (age.num_seconds() as u64) < self.config.refresh_interval_seconds
            }
            None => false,
        }
    }
}

fn infer_category(path: &Path) -> Option<DocCategory> {
    for component in path.components() {
        let name = component.as_os_str().to_string_lossy().to_lowercase();
        match name.as_str() {
            "runbooks" => return Some(DocCategory::Runbook),
            "procedures" => return Some(DocCategory::Procedure),
            "guides" => return Some(DocCategory::Guide),
            _ => {}
        }
    }
    Some(DocCategory::General)
}

async fn file_mtime(path: &Path) -> DateTime<Utc> {
    match tokio::fs::metadata(path).await.and_then(|m| m.modified()) {
        Ok(modified) => DateTime::<Utc>::from(modified),
        Err(_) => Utc::now(),
    }
}

/// Iterative directory walk; avoids recursion in async context.
async fn collect_files(root: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_file() {
                out.push(path);
            }
        }
    }
    Ok(())
}

#[async_trait]
impl SourceAdapter for FileAdapter {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn source_type(&self) -> SourceType {
        SourceType::File
    }

    fn config(&self) -> &SourceConfig {
        &self.config
    }

    async fn initialize(&self) -> Result<(), SourceError> {
        for root in &self.config.paths {
            if !root.is_dir() {
                return Err(SourceError::Permanent {
                    source_name: self.config.name.clone(),
                    code: "config".to_string(),
                    reason: format!("{} is not a directory", root.display()),
                });
            }
        }
        self.rebuild_index().await
    }

    async fn search(
        &self,
        query: &str,
        filters: &SearchFilters,
    ) -> Result<Vec<SearchResult>, SourceError> {
        let started = Instant::now();
        let documents = self
            .documents
            .read()
            .map_err(|_| self.err_unavailable("index lock poisoned"))?
            .clone();

        let mut results = Vec::new();
        for doc in &documents {
            if !filters.allows_category(doc.category) || !filters.allows_age(doc.last_updated) {
                continue;
            }
            if let Some(allowed) = &self.config.categories {
                match doc.category {
                    Some(cat) if allowed.contains(&cat) => {}
                    _ => continue,
                }
            }

            let score = scoring::score_document(query, &doc.title, &doc.content);
            if score.confidence < filters.min_confidence || score.confidence <= 0.0 {
                continue;
            }
            results.push(
                SearchResult {
                    id: doc.id.to_string(),
                    title: doc.title.clone(),
                    excerpt: score.excerpt,
                    source_name: self.config.name.clone(),
                    source_type: SourceType::File,
                    category: doc.category,
                    confidence: score.confidence,
                    match_reasons: score.match_reasons,
                    retrieval_time_ms: started.elapsed().as_millis() as u64,
                    last_updated: doc.last_updated,
                    url: doc.url.clone(),
                    metadata: doc.metadata.clone(),
                }
                .clamped(),
            );
        }

        results.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(filters.limit);

        self.stats.record(started.elapsed().as_millis() as u64, true);
        Ok(results)
    }

    async fn search_runbooks(
        &self,
        alert_type: &str,
        severity: Severity,
        affected_systems: &[String],
        _context: Option<&serde_json::Value>,
    ) -> Result<Vec<RunbookMatch>, SourceError> {
        let started = Instant::now();
        let runbooks = self
            .runbooks
            .read()
            .map_err(|_| self.err_unavailable("index lock poisoned"))?
            .clone();

        let mut matches = Vec::new();
        for runbook in runbooks {
            if let Some(score) =
                scoring::score_runbook(&runbook, alert_type, severity, affected_systems)
            {
                matches.push(RunbookMatch {
                    runbook,
                    confidence: score.confidence.clamp(0.0, 1.0),
                    match_reasons: score.match_reasons,
                    source_name: self.config.name.clone(),
                });
            }
        }

        self.stats.record(started.elapsed().as_millis() as u64, true);
        Ok(matches)
    }

    async fn get_document(&self, local_id: &str) -> Result<Document, SourceError> {
        let documents = self
            .documents
            .read()
            .map_err(|_| self.err_unavailable("index lock poisoned"))?;
        documents
            .iter()
            .find(|d| d.id.local_id == local_id)
            .cloned()
            .ok_or_else(|| SourceError::NotFound {
                id: format!("{}:{}", self.config.name, local_id),
            })
    }

    async fn health_check(&self) -> SourceHealth {
        let started = Instant::now();
        for root in &self.config.paths {
            if tokio::fs::metadata(root).await.is_err() {
                return SourceHealth::unhealthy(
                    started.elapsed().as_millis() as u64,
                    format!("root {} is unreadable", root.display()),
                );
            }
        }
        let count = self.documents.read().map(|d| d.len()).unwrap_or(0);
        SourceHealth::healthy(started.elapsed().as_millis() as u64)
            .with_metadata("document_count", serde_json::json!(count))
    }

    async fn metadata(&self) -> AdapterMetadata {
        AdapterMetadata {
            name: self.config.name.clone(),
            source_type: SourceType::File,
            document_count: self.documents.read().map(|d| d.len()).unwrap_or(0),
            last_indexed: self.stats.last_indexed(),
            avg_latency_ms: self.stats.avg_latency_ms(),
            success_rate: self.stats.success_rate(),
        }
    }

    async fn refresh_index(&self, force: bool) -> Result<bool, SourceError> {
        if !force && self.index_is_fresh() {
            return Ok(false);
        }
        self.rebuild_index().await?;
        Ok(true)
    }

    async fn shutdown(&self) -> Result<(), SourceError> {
        Ok(())
    }
}

impl std::fmt::Debug for FileAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileAdapter")
            .field("name", &self.config.name)
            .field("paths", &self.config.paths)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn sample_runbook_json() -> String {
        serde_json::json!({
            "id": "rb-disk-space",
            "title": "Disk space exhaustion on web hosts",
            "version": "3",
            "triggers": ["disk_space", "disk_full"],
            "severity_mapping": { "disk_space": "critical" },
            "decision_tree": {
                "id": "dt-disk",
                "name": "disk",
                "description": "triage full disks",
                "branches": [
                    {
                        "id": "check-logs",
                        "condition": "log partition above 90%",
                        "description": "look at /var/log growth",
                        "action": "rotate logs",
                        "next_step": "verify",
                        "confidence": 0.9
                    },
                    {
                        "id": "verify",
                        "condition": "disk below 80%",
                        "description": "confirm recovery on web-01",
                        "action": "close incident",
                        "confidence": 0.8
                    }
                ],
                "default_action": "escalate to on-call"
            },
            "procedures": [
                {
                    "id": "p1",
                    "name": "rotate-logs",
                    "description": "force a logrotate run",
                    "command": "logrotate -f /etc/logrotate.conf",
                    "expected_outcome": "disk usage drops below 80%"
                }
            ],
            "metadata": {
                "author": "ops",
                "confidence": 0.9
            },
            "last_updated": "2026-01-05T10:00:00Z"
        })
        .to_string()
    }

    async fn adapter_over(dir: &Path) -> FileAdapter {
        let mut config = SourceConfig::new("local-docs", SourceType::File);
        config.paths.push(dir.to_path_buf());
        let adapter = FileAdapter::new(config);
        adapter.initialize().await.unwrap();
        adapter
    }

    #[tokio::test]
    async fn test_indexes_markdown_and_runbooks() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("runbooks")).unwrap();
        fs::write(
            dir.path().join("guide.md"),
            "# SSL renewal guide\nRenew certificates with certbot.",
        )
        .unwrap();
        fs::write(
            dir.path().join("runbooks/disk.json"),
            sample_runbook_json(),
        )
        .unwrap();

        let adapter = adapter_over(dir.path()).await;
        let meta = adapter.metadata().await;
        assert_eq!(meta.document_count, 2);
        assert!(meta.last_indexed.is_some());
    }

    #[tokio::test]
    async fn test_search_scores_and_filters() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("ssl.md"),
            "# SSL renewal guide\nRenew certificates with certbot.",
        )
        .unwrap();
        fs::write(dir.path().join("other.md"), "# Unrelated\nNothing here.").unwrap();

        let adapter = adapter_over(dir.path()).await;
        let results = adapter
            .search("ssl renewal", &SearchFilters::default())
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].confidence > 0.5);
        assert!(results[0].id.starts_with("local-docs:"));

        let strict = SearchFilters::default().with_min_confidence(0.99);
        let none = adapter.search("ssl renewal", &strict).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_runbook_search_matches_trigger() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("disk.json"), sample_runbook_json()).unwrap();

        let adapter = adapter_over(dir.path()).await;
        let matches = adapter
            .search_runbooks(
                "disk_space",
                Severity::Critical,
                &["web-01".to_string()],
                None,
            )
            .await
            .unwrap();
        assert_eq!(matches.len(), 1);
        assert!(matches[0].confidence >= 0.8);
        assert!(matches[0]
            .match_reasons
            .iter()
            .any(|r| r.contains("trigger")));
    }

    #[tokio::test]
    async fn test_get_document_roundtrips_search() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("ssl.md"), "# SSL guide\ncertbot renew").unwrap();

        let adapter = adapter_over(dir.path()).await;
        let results = adapter
            .search("ssl", &SearchFilters::default())
            .await
            .unwrap();
        let id: DocumentId = results[0].id.parse().unwrap();
        let doc = adapter.get_document(&id.local_id).await.unwrap();
        assert_eq!(doc.title, results[0].title);

        assert!(matches!(
            adapter.get_document("missing.md").await,
            Err(SourceError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_invalid_runbook_skipped() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("bad.json"), "{ not json").unwrap();
        fs::write(dir.path().join("good.json"), sample_runbook_json()).unwrap();

        let adapter = adapter_over(dir.path()).await;
        let matches = adapter
            .search_runbooks("disk_space", Severity::Critical, &[], None)
            .await
            .unwrap();
        assert_eq!(matches.len(), 1);
    }

    #[tokio::test]
    async fn test_initialize_rejects_missing_root() {
        let mut config = SourceConfig::new("local-docs", SourceType::File);
        config.paths.push(PathBuf::from("/nonexistent/docs"));
        let adapter = FileAdapter::new(config);
        assert!(matches!(
            adapter.initialize().await,
            Err(SourceError::Permanent { .. })
        ));
    }

    #[tokio::test]
    async fn test_refresh_respects_interval() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.md"), "# A\nbody").unwrap();

        let adapter = adapter_over(dir.path()).await;
        // Fresh index: non-forced refresh is a no-op.
        assert!(!adapter.refresh_index(false).await.unwrap());
        assert!(adapter.refresh_index(true).await.unwrap());
    }
}
