//! Generic web knowledge-base adapter
//!
//! Speaks a plain JSON search dialect: `GET {base}/search?q=...` returning
//! a result list, `GET {base}/documents/{id}` for single documents, and
//! `GET {base}/health` for probes. Runbook-category documents carry the
//! runbook JSON as their content.

use crate::adapter::{runbook_from_document, AdapterMetadata, AdapterStats, SourceAdapter};
use crate::http::PacedClient;
use crate::scoring;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Instant;
use triage_core::{
    DocCategory, Document, DocumentId, RunbookMatch, SearchFilters, SearchResult, Severity,
    SourceConfig, SourceError, SourceHealth, SourceType,
};

const WEB_REQUESTS_PER_MINUTE: u32 = 120;

#[derive(Debug, Deserialize)]
struct WebDocument {
    id: String,
    title: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    category: Option<DocCategory>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct WebSearchResponse {
    results: Vec<WebDocument>,
}

/// Adapter over a generic JSON documentation service.
pub struct WebAdapter {
    config: SourceConfig,
    base_url: String,
    client: PacedClient,
    stats: AdapterStats,
}

impl WebAdapter {
    pub fn new(config: SourceConfig) -> Result<Self, SourceError> {
        let base_url = config
            .base_url
            .clone()
            .ok_or_else(|| SourceError::Permanent {
                source_name: config.name.clone(),
                code: "config".to_string(),
                reason: "web source requires base_url".to_string(),
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
            WEB_REQUESTS_PER_MINUTE,
            credentials,
        )?;

        Ok(Self {
            config,
            base_url,
            client,
            stats: AdapterStats::new(),
        })
    }

    fn to_document(&self, raw: WebDocument) -> Document {
        Document {
            id: DocumentId::new(&self.config.name, raw.id),
            title: raw.title,
            content: raw.content,
            category: raw.category,
            last_updated: raw.updated_at.unwrap_or_else(Utc::now),
            url: raw.url,
            metadata: BTreeMap::new(),
        }
    }

    async fn remote_search(&self, query: &str, limit: usize) -> Result<Vec<Document>, SourceError> {
        let url = format!(
            "{}/search?q={}&limit={}",
            self.base_url,
            urlencoding::encode(query),
            limit
        );
        let response: WebSearchResponse = self.client.get_json(&url).await?;
        Ok(response
            .results
            .into_iter()
            .map(|raw| self.to_document(raw))
            .collect())
    }
}

#[async_trait]
impl SourceAdapter for WebAdapter {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn source_type(&self) -> SourceType {
        SourceType::Web
    }

    fn config(&self) -> &SourceConfig {
        &self.config
    }

    async fn initialize(&self) -> Result<(), SourceError> {
        let health = self.health_check().await;
        if health.healthy {
            Ok(())
        } else {
            Err(SourceError::Unavailable {
                source_name: self.config.name.clone(),
                reason: health
                    .error
                    .unwrap_or_else(|| "health probe failed".to_string()),
            })
        }
    }

    async fn search(
        &self,
        query: &str,
        filters: &SearchFilters,
    ) -> Result<Vec<SearchResult>, SourceError> {
        let started = Instant::now();
        let documents = match self.remote_search(query, filters.limit).await {
            Ok(docs) => docs,
            Err(e) => {
                self.stats.record(started.elapsed().as_millis() as u64, false);
                return Err(e);
            }
        };

        let mut results = Vec::new();
        for doc in documents {
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
                    title: doc.title,
                    excerpt: score.excerpt,
                    source_name: self.config.name.clone(),
                    source_type: SourceType::Web,
                    category: doc.category,
                    confidence: score.confidence,
                    match_reasons: score.match_reasons,
                    retrieval_time_ms: started.elapsed().as_millis() as u64,
                    last_updated: doc.last_updated,
                    url: doc.url,
                    metadata: doc.metadata,
                }
                .clamped(),
            );
        }

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
        let documents = match self.remote_search(alert_type, 50).await {
            Ok(docs) => docs,
            Err(e) => {
                self.stats.record(started.elapsed().as_millis() as u64, false);
                return Err(e);
            }
        };

        let mut matches = Vec::new();
        for doc in &documents {
            let Some(runbook) = runbook_from_document(doc) else {
                continue;
            };
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
        let url = format!(
            "{}/documents/{}",
            self.base_url,
            urlencoding::encode(local_id)
        );
        let raw: WebDocument = self.client.get_json(&url).await.map_err(|e| match e {
            SourceError::NotFound { .. } => SourceError::NotFound {
                id: format!("{}:{}", self.config.name, local_id),
            },
            other => other,
        })?;
        Ok(self.to_document(raw))
    }

    async fn health_check(&self) -> SourceHealth {
        let started = Instant::now();
        let url = format!("{}/health", self.base_url);
        match self.client.get_json::<serde_json::Value>(&url).await {
            Ok(_) => SourceHealth::healthy(started.elapsed().as_millis() as u64),
            Err(e) => SourceHealth::unhealthy(started.elapsed().as_millis() as u64, e.to_string()),
        }
    }

    async fn metadata(&self) -> AdapterMetadata {
        AdapterMetadata {
            name: self.config.name.clone(),
            source_type: SourceType::Web,
            document_count: 0,
            last_indexed: self.stats.last_indexed(),
            avg_latency_ms: self.stats.avg_latency_ms(),
            success_rate: self.stats.success_rate(),
        }
    }

    async fn refresh_index(&self, _force: bool) -> Result<bool, SourceError> {
        // The source is queried live; there is no local index to refresh.
        Ok(false)
    }

    async fn shutdown(&self) -> Result<(), SourceError> {
        Ok(())
    }
}

impl std::fmt::Debug for WebAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebAdapter")
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
        let config = SourceConfig::new("kb", SourceType::Web);
        assert!(matches!(
            WebAdapter::new(config),
            Err(SourceError::Permanent { .. })
        ));
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let config =
            SourceConfig::new("kb", SourceType::Web).with_base_url("https://kb.example.com/");
        let adapter = WebAdapter::new(config).unwrap();
        assert_eq!(adapter.base_url, "https://kb.example.com");
    }

    #[test]
    fn test_web_document_decoding() {
        let raw: WebSearchResponse = serde_json::from_str(
            r#"{"results":[{"id":"kb-1","title":"Disk guide","content":"full disks",
                "url":"https://kb/1","category":"guide","updated_at":"2026-01-01T00:00:00Z"}]}"#,
        )
        .unwrap();
        assert_eq!(raw.results.len(), 1);
        assert_eq!(raw.results[0].category, Some(DocCategory::Guide));
    }
}
