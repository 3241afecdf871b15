//! Git-host source adapter
//!
//! Mirrors a repository's documentation tree through the contents API
//! (GitHub dialect) into an in-memory index, then searches locally. This
//! keeps query latency off the git host and inside its rate limits.

use crate::adapter::{AdapterMetadata, AdapterStats, SourceAdapter};
use crate::http::PacedClient;
use crate::scoring;
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::RwLock;
use std::time::Instant;
use tokio::sync::Mutex;
use triage_core::{
    DocCategory, Document, DocumentId, Runbook, RunbookMatch, SearchFilters, SearchResult,
    Severity, SourceConfig, SourceError, SourceHealth, SourceType,
};

const GIT_REQUESTS_PER_MINUTE: u32 = 30;
/// Upper bound on mirrored files per repository.
const MAX_INDEXED_FILES: usize = 500;

#[derive(Debug, Deserialize)]
struct ContentEntry {
    name: String,
    path: String,
    #[serde(rename = "type")]
    entry_type: String,
    #[serde(default)]
    download_url: Option<String>,
    #[serde(default)]
    html_url: Option<String>,
}

/// Adapter over one repository on a GitHub-dialect host.
pub struct GitHostAdapter {
    config: SourceConfig,
    base_url: String,
    client: PacedClient,
    documents: RwLock<Vec<Document>>,
    runbooks: RwLock<Vec<Runbook>>,
    stats: AdapterStats,
    refresh_lock: Mutex<()>,
}

impl GitHostAdapter {
    pub fn new(config: SourceConfig) -> Result<Self, SourceError> {
        let base_url = config
            .base_url
            .clone()
            .ok_or_else(|| SourceError::Permanent {
                source_name: config.name.clone(),
                code: "config".to_string(),
                reason: "git-host source requires base_url (repo API root)".to_string(),
            })?
            .trim_end_matches('/')
            .to_string();

        let credentials = match &config.auth {
            Some(auth) => Some(auth.resolve(&config.name).map_err(|e| {
                SourceError::Permanent {
                    source_name: config.name.clone(),
                    code: "auth".to_string(),
                    reason: e.to_string(),
                }
            })?),
            None => None,
        };

        let client = PacedClient::new(
            config.name.clone(),
            config.timeout(),
            GIT_REQUESTS_PER_MINUTE,
            credentials,
        )?;

        Ok(Self {
            config,
            base_url,
            client,
            documents: RwLock::new(Vec::new()),
            runbooks: RwLock::new(Vec::new()),
            stats: AdapterStats::new(),
            refresh_lock: Mutex::new(()),
        })
    }

    fn err_unavailable(&self, reason: impl Into<String>) -> SourceError {
        SourceError::Unavailable {
            source_name: self.config.name.clone(),
            reason: reason.into(),
        }
    }

    async fn rebuild_index(&self) -> Result<(), SourceError> {
        let _guard = self.refresh_lock.lock().await;

        let mut files = Vec::new();
        let mut pending = vec![String::new()];
        while let Some(dir) = pending.pop() {
            let url = if dir.is_empty() {
                format!("{}/contents", self.base_url)
            } else {
                format!("{}/contents/{}", self.base_url, dir)
            };
            let entries: Vec<ContentEntry> = self.client.get_json(&url).await?;
            for entry in entries {
                match entry.entry_type.as_str() {
                    "dir" => pending.push(entry.path.clone()),
                    "file" => {
                        if entry.name.ends_with(".md") || entry.name.ends_with(".json") {
                            files.push(entry);
                        }
                    }
                    _ => {}
                }
                if files.len() >= MAX_INDEXED_FILES {
                    tracing::warn!(
                        source = %self.config.name,
                        cap = MAX_INDEXED_FILES,
                        "repository index truncated at file cap"
                    );
                    pending.clear();
                    break;
                }
            }
        }

        let mut documents = Vec::new();
        let mut runbooks = Vec::new();
        for entry in files {
            let Some(download_url) = entry.download_url.clone() else {
                continue;
            };
            let content = match self.client.get_text(&download_url).await {
                Ok(content) => content,
                Err(e) => {
                    tracing::warn!(path = %entry.path, error = %e, "skipping unfetchable file");
                    continue;
                }
            };

            if entry.name.ends_with(".json") {
                match serde_json::from_str::<Runbook>(&content) {
                    Ok(runbook) if runbook.validate().is_ok() => {
                        documents.push(self.to_document(
                            &entry,
                            runbook.title.clone(),
                            content,
                            Some(DocCategory::Runbook),
                        ));
                        runbooks.push(runbook);
                    }
                    _ => {
                        tracing::warn!(path = %entry.path, "skipping invalid runbook json");
                    }
                }
            } else {
                let title = content
                    .lines()
                    .find(|l| l.starts_with("# "))
                    .map(|l| l.trim_start_matches("# ").trim().to_string())
                    .unwrap_or_else(|| entry.name.clone());
                let category = if entry.path.contains("runbooks/") {
                    Some(DocCategory::Runbook)
                } else if entry.path.contains("procedures/") {
                    Some(DocCategory::Procedure)
                } else if entry.path.contains("guides/") {
                    Some(DocCategory::Guide)
                } else {
                    Some(DocCategory::General)
                };
                documents.push(self.to_document(&entry, title, content, category));
            }
        }

        tracing::debug!(
            source = %self.config.name,
            documents = documents.len(),
            runbooks = runbooks.len(),
            "git-host index rebuilt"
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

    fn to_document(
        &self,
        entry: &ContentEntry,
        title: String,
        content: String,
        category: Option<DocCategory>,
    ) -> Document {
        Document {
            id: DocumentId::new(&self.config.name, entry.path.clone()),
            title,
            content,
            category,
            last_updated: Utc::now(),
            url: entry.html_url.clone(),
            metadata: BTreeMap::new(),
        }
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

#[async_trait]
impl SourceAdapter for GitHostAdapter {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn source_type(&self) -> SourceType {
        SourceType::GitHost
    }

    fn config(&self) -> &SourceConfig {
        &self.config
    }

    async fn initialize(&self) -> Result<(), SourceError> {
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
                    source_type: SourceType::GitHost,
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
                    confidence: score.confidence,
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
        match self
            .client
            .get_json::<serde_json::Value>(&self.base_url)
            .await
        {
            Ok(_) => {
                let count = self.documents.read().map(|d| d.len()).unwrap_or(0);
                SourceHealth::healthy(started.elapsed().as_millis() as u64)
                    .with_metadata("document_count", serde_json::json!(count))
            }
            Err(e) => SourceHealth::unhealthy(started.elapsed().as_millis() as u64, e.to_string()),
        }
    }

    async fn metadata(&self) -> AdapterMetadata {
        AdapterMetadata {
            name: self.config.name.clone(),
            source_type: SourceType::GitHost,
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

impl std::fmt::Debug for GitHostAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHostAdapter")
            .field("name", &self.config.name)
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_base_url() {
        let config = SourceConfig::new("repo", SourceType::GitHost);
        assert!(GitHostAdapter::new(config).is_err());
    }

    #[test]
    fn test_content_entry_decoding() {
        let entries: Vec<ContentEntry> = serde_json::from_str(
            r#"[
                {"name": "runbooks", "path": "runbooks", "type": "dir"},
                {"name": "disk.md", "path": "runbooks/disk.md", "type": "file",
                 "download_url": "https://raw.local/disk.md",
                 "html_url": "https://git.local/disk.md"}
            ]"#,
        )
        .unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].entry_type, "dir");
        assert!(entries[1].download_url.is_some());
    }
}
