//! Database source adapter
//!
//! Reads documents from a Postgres `documents` table through a connection
//! pool. Row shape: id TEXT, title TEXT, content TEXT, category TEXT,
//! updated_at TIMESTAMPTZ, url TEXT. Runbook-category rows carry runbook
//! JSON in `content`.

use crate::adapter::{AdapterMetadata, AdapterStats, SourceAdapter};
use crate::scoring;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use std::collections::BTreeMap;
use std::time::Instant;
use tokio_postgres::NoTls;
use triage_core::{
    DocCategory, Document, DocumentId, RunbookMatch, SearchFilters, SearchResult, Severity,
    SourceConfig, SourceError, SourceHealth, SourceType,
};

const POOL_SIZE: usize = 8;

/// Adapter over a Postgres-backed documentation store.
pub struct DatabaseAdapter {
    config: SourceConfig,
    pool: Pool,
    stats: AdapterStats,
}

impl DatabaseAdapter {
    pub fn new(config: SourceConfig) -> Result<Self, SourceError> {
        let url = config
            .base_url
            .clone()
            .ok_or_else(|| SourceError::Permanent {
                source_name: config.name.clone(),
                code: "config".to_string(),
                reason: "database source requires base_url (postgres connection string)"
                    .to_string(),
            })?;

        let pg_config: tokio_postgres::Config =
            url.parse().map_err(|e| SourceError::Permanent {
                source_name: config.name.clone(),
                code: "config".to_string(),
                reason: format!("invalid connection string: {}", e),
            })?;

        let manager = Manager::from_config(
            pg_config,
            NoTls,
            ManagerConfig {
                recycling_method: RecyclingMethod::Fast,
            },
        );
        let pool = Pool::builder(manager)
            .max_size(POOL_SIZE)
            .build()
            .map_err(|e| SourceError::Permanent {
                source_name: config.name.clone(),
                code: "config".to_string(),
                reason: format!("pool build failed: {}", e),
            })?;

        Ok(Self {
            config,
            pool,
            stats: AdapterStats::new(),
        })
    }

    async fn client(&self) -> Result<deadpool_postgres::Object, SourceError> {
        self.pool
            .get()
            .await
            .map_err(|e| SourceError::Unavailable {
                source_name: self.config.name.clone(),
                reason: format!("pool acquire failed: {}", e),
            })
    }

    fn map_db_error(&self, e: tokio_postgres::Error) -> SourceError {
        if e.as_db_error().is_some() {
            SourceError::Permanent {
                source_name: self.config.name.clone(),
                code: "schema".to_string(),
                reason: e.to_string(),
            }
        } else {
            SourceError::Unavailable {
                source_name: self.config.name.clone(),
                reason: e.to_string(),
            }
        }
    }

    fn row_to_document(&self, row: &tokio_postgres::Row) -> Document {
        let category: Option<String> = row.get("category");
        let category = category.as_deref().map(|c| match c {
            "runbook" => DocCategory::Runbook,
            "procedure" => DocCategory::Procedure,
            "guide" => DocCategory::Guide,
            _ => DocCategory::General,
        });
        let updated_at: DateTime<Utc> = row.get("updated_at");

        Document {
            id: DocumentId::new(&self.config.name, row.get::<_, String>("id")),
            title: row.get("title"),
            content: row.get("content"),
            category,
            last_updated: updated_at,
            url: row.get("url"),
            metadata: BTreeMap::new(),
        }
    }
}

#[async_trait]
impl SourceAdapter for DatabaseAdapter {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn source_type(&self) -> SourceType {
        SourceType::Database
    }

    fn config(&self) -> &SourceConfig {
        &self.config
    }

    async fn initialize(&self) -> Result<(), SourceError> {
        let client = self.client().await?;
        client
            .query_one("SELECT 1", &[])
            .await
            .map_err(|e| self.map_db_error(e))?;
        Ok(())
    }

    async fn search(
        &self,
        query: &str,
        filters: &SearchFilters,
    ) -> Result<Vec<SearchResult>, SourceError> {
        let started = Instant::now();
        let client = match self.client().await {
            Ok(client) => client,
            Err(e) => {
                self.stats.record(started.elapsed().as_millis() as u64, false);
                return Err(e);
            }
        };

        let pattern = format!("%{}%", query);
        let rows = match client
            .query(
                "SELECT id, title, content, category, updated_at, url \
                 FROM documents \
                 WHERE title ILIKE $1 OR content ILIKE $1 \
                 ORDER BY updated_at DESC \
                 LIMIT $2",
                &[&pattern, &(filters.limit as i64)],
            )
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                self.stats.record(started.elapsed().as_millis() as u64, false);
                return Err(self.map_db_error(e));
            }
        };

        let mut results = Vec::new();
        for row in &rows {
            let doc = self.row_to_document(row);
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
                    source_type: SourceType::Database,
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
        let client = match self.client().await {
            Ok(client) => client,
            Err(e) => {
                self.stats.record(started.elapsed().as_millis() as u64, false);
                return Err(e);
            }
        };

        let rows = match client
            .query(
                "SELECT id, title, content, category, updated_at, url \
                 FROM documents WHERE category = 'runbook'",
                &[],
            )
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                self.stats.record(started.elapsed().as_millis() as u64, false);
                return Err(self.map_db_error(e));
            }
        };

        let mut matches = Vec::new();
        for row in &rows {
            let doc = self.row_to_document(row);
            let Some(runbook) = crate::adapter::runbook_from_document(&doc) else {
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
        let client = self.client().await?;
        let row = client
            .query_opt(
                "SELECT id, title, content, category, updated_at, url \
                 FROM documents WHERE id = $1",
                &[&local_id],
            )
            .await
            .map_err(|e| self.map_db_error(e))?;

        match row {
            Some(row) => Ok(self.row_to_document(&row)),
            None => Err(SourceError::NotFound {
                id: format!("{}:{}", self.config.name, local_id),
            }),
        }
    }

    async fn health_check(&self) -> SourceHealth {
        let started = Instant::now();
        match self.client().await {
            Ok(client) => match client.query_one("SELECT 1", &[]).await {
                Ok(_) => SourceHealth::healthy(started.elapsed().as_millis() as u64),
                Err(e) => {
                    SourceHealth::unhealthy(started.elapsed().as_millis() as u64, e.to_string())
                }
            },
            Err(e) => SourceHealth::unhealthy(started.elapsed().as_millis() as u64, e.to_string()),
        }
    }

    async fn metadata(&self) -> AdapterMetadata {
        let document_count = match self.client().await {
            Ok(client) => client
                .query_one("SELECT COUNT(*) FROM documents", &[])
                .await
                .map(|row| row.get::<_, i64>(0) as usize)
                .unwrap_or(0),
            Err(_) => 0,
        };
        AdapterMetadata {
            name: self.config.name.clone(),
            source_type: SourceType::Database,
            document_count,
            last_indexed: self.stats.last_indexed(),
            avg_latency_ms: self.stats.avg_latency_ms(),
            success_rate: self.stats.success_rate(),
        }
    }

    async fn refresh_index(&self, _force: bool) -> Result<bool, SourceError> {
        // Queries hit the table live; nothing to refresh.
        Ok(false)
    }

    async fn shutdown(&self) -> Result<(), SourceError> {
        self.pool.close();
        Ok(())
    }
}

impl std::fmt::Debug for DatabaseAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseAdapter")
            .field("name", &self.config.name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_connection_string() {
        let config = SourceConfig::new("docs-db", SourceType::Database);
        assert!(DatabaseAdapter::new(config).is_err());
    }

    #[test]
    fn test_rejects_malformed_connection_string() {
        let config = SourceConfig::new("docs-db", SourceType::Database)
            .with_base_url("not-a-connection-string");
        assert!(DatabaseAdapter::new(config).is_err());
    }

    #[test]
    fn test_accepts_postgres_url() {
        let config = SourceConfig::new("docs-db", SourceType::Database)
            .with_base_url("postgres://triage:pw@localhost:5432/docs");
        assert!(DatabaseAdapter::new(config).is_ok());
    }
}
