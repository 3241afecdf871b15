//! Wiki (Confluence-dialect) source adapter
//!
//! Uses the content search REST endpoint with CQL, expanding page bodies
//! and versions. Pages labelled `runbook` carry runbook JSON bodies.

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

const WIKI_REQUESTS_PER_MINUTE: u32 = 60;

#[derive(Debug, Deserialize)]
struct WikiPage {
    id: String,
    title: String,
    #[serde(default)]
    body: Option<WikiBody>,
    #[serde(default)]
    version: Option<WikiVersion>,
    #[serde(default, rename = "_links")]
    links: Option<WikiLinks>,
    #[serde(default)]
    metadata: Option<WikiMetadata>,
}

#[derive(Debug, Deserialize)]
struct WikiBody {
    storage: WikiStorage,
}

#[derive(Debug, Deserialize)]
struct WikiStorage {
    value: String,
}

#[derive(Debug, Deserialize)]
struct WikiVersion {
    when: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct WikiLinks {
    #[serde(default)]
    webui: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WikiMetadata {
    #[serde(default)]
    labels: Option<WikiLabels>,
}

#[derive(Debug, Deserialize)]
struct WikiLabels {
    #[serde(default)]
    results: Vec<WikiLabel>,
}

#[derive(Debug, Deserialize)]
struct WikiLabel {
    name: String,
}

#[derive(Debug, Deserialize)]
struct WikiSearchResponse {
    results: Vec<WikiPage>,
}

/// Adapter over a Confluence-style wiki.
pub struct WikiAdapter {
    config: SourceConfig,
    base_url: String,
    client: PacedClient,
    stats: AdapterStats,
}

impl WikiAdapter {
    pub fn new(config: SourceConfig) -> Result<Self, SourceError> {
        let base_url = config
            .base_url
            .clone()
            .ok_or_else(|| SourceError::Permanent {
                source_name: config.name.clone(),
                code: "config".to_string(),
                reason: "wiki source requires base_url".to_string(),
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
            WIKI_REQUESTS_PER_MINUTE,
            credentials,
        )?;

        Ok(Self {
            config,
            base_url,
            client,
            stats: AdapterStats::new(),
        })
    }

    fn to_document(&self, page: WikiPage) -> Document {
        let category = page
            .metadata
            .as_ref()
            .and_then(|m| m.labels.as_ref())
            .map(|labels| {
                labels
                    .results
                    .iter()
                    .find_map(|label| match label.name.as_str() {
                        "runbook" => Some(DocCategory::Runbook),
                        "procedure" => Some(DocCategory::Procedure),
                        "guide" => Some(DocCategory::Guide),
                        _ => None,
                    })
            })
            .flatten()
            .or(Some(DocCategory::General));

        let url = page
            .links
            .and_then(|l| l.webui)
            .map(|path| format!("{}{}", self.base_url, path));

        Document {
            id: DocumentId::new(&self.config.name, page.id),
            title: page.title,
            content: page.body.map(|b| strip_markup(&b.storage.value)).unwrap_or_default(),
            category,
            last_updated: page.version.map(|v| v.when).unwrap_or_else(Utc::now),
            url,
            metadata: BTreeMap::new(),
        }
    }

    async fn cql_search(&self, cql: &str, limit: usize) -> Result<Vec<Document>, SourceError> {
        let url = format!(
            "{}/rest/api/content/search?cql={}&limit={}&expand=body.storage,version,metadata.labels",
            self.base_url,
            urlencoding::encode(cql),
            limit
        );
        let response: WikiSearchResponse = self.client.get_json(&url).await?;
        Ok(response
            .results
            .into_iter()
            .map(|page| self.to_document(page))
            .collect())
    }
}

/// Strip storage-format markup down to searchable text.
fn strip_markup(value: &str) -> String {
    let mut text = String::with_capacity(value.len());
    let mut in_tag = false;
    for c in value.chars() {
        match c {
            '<' => in_tag = true,
            '>' => {
                in_tag = false;
                text.push(' ');
            }
            c if !in_tag => text.push(c),
            _ => {}
        }
    }
    text
}

#[async_trait]
impl SourceAdapter for WikiAdapter {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn source_type(&self) -> SourceType {
        SourceType::Wiki
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
        let cql = format!("siteSearch ~ \"{}\"", query.replace('"', " "));
        let documents = match self.cql_search(&cql, filters.limit).await {
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
                    source_type: SourceType::Wiki,
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
        let cql = format!(
            "label = \"runbook\" and siteSearch ~ \"{}\"",
            alert_type.replace('"', " ")
        );
        let documents = match self.cql_search(&cql, 50).await {
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
            "{}/rest/api/content/{}?expand=body.storage,version,metadata.labels",
            self.base_url,
            urlencoding::encode(local_id)
        );
        let page: WikiPage = self.client.get_json(&url).await.map_err(|e| match e {
            SourceError::NotFound { .. } => SourceError::NotFound {
                id: format!("{}:{}", self.config.name, local_id),
            },
            other => other,
        })?;
        Ok(self.to_document(page))
    }

    async fn health_check(&self) -> SourceHealth {
        let started = Instant::now();
        let url = format!("{}/rest/api/space?limit=1", self.base_url);
        match self.client.get_json::<serde_json::Value>(&url).await {
            Ok(_) => SourceHealth::healthy(started.elapsed().as_millis() as u64),
            Err(e) => SourceHealth::unhealthy(started.elapsed().as_millis() as u64, e.to_string()),
        }
    }

    async fn metadata(&self) -> AdapterMetadata {
        AdapterMetadata {
            name: self.config.name.clone(),
            source_type: SourceType::Wiki,
            document_count: 0,
            last_indexed: self.stats.last_indexed(),
            avg_latency_ms: self.stats.avg_latency_ms(),
            success_rate: self.stats.success_rate(),
        }
    }

    async fn refresh_index(&self, _force: bool) -> Result<bool, SourceError> {
        Ok(false)
    }

    async fn shutdown(&self) -> Result<(), SourceError> {
        Ok(())
    }
}

impl std::fmt::Debug for WikiAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WikiAdapter")
            .field("name", &self.config.name)
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_markup() {
        assert_eq!(
            strip_markup("<p>disk <b>space</b></p>").trim(),
            "disk  space"
        );
    }

    #[test]
    fn test_page_decoding_with_labels() {
        let page: WikiPage = serde_json::from_str(
            r#"{
                "id": "12345",
                "title": "Disk runbook",
                "body": {"storage": {"value": "<p>content</p>"}},
                "version": {"when": "2026-01-01T00:00:00Z"},
                "_links": {"webui": "/spaces/OPS/pages/12345"},
                "metadata": {"labels": {"results": [{"name": "runbook"}]}}
            }"#,
        )
        .unwrap();

        let config =
            SourceConfig::new("ops-wiki", SourceType::Wiki).with_base_url("https://wiki.local");
        let adapter = WikiAdapter::new(config).unwrap();
        let doc = adapter.to_document(page);
        assert_eq!(doc.category, Some(DocCategory::Runbook));
        assert_eq!(
            doc.url.as_deref(),
            Some("https://wiki.local/spaces/OPS/pages/12345")
        );
        assert_eq!(doc.id.to_string(), "ops-wiki:12345");
    }

    #[test]
    fn test_unlabelled_page_is_general() {
        let page: WikiPage = serde_json::from_str(
            r#"{"id": "1", "title": "Notes"}"#,
        )
        .unwrap();
        let config =
            SourceConfig::new("ops-wiki", SourceType::Wiki).with_base_url("https://wiki.local");
        let adapter = WikiAdapter::new(config).unwrap();
        assert_eq!(adapter.to_document(page).category, Some(DocCategory::General));
    }
}
