//! Document, search result, and filter types

use crate::{DocCategory, Severity, SourceType, ValidationError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// DOCUMENT IDENTITY
// ============================================================================

/// Identity of a document: the owning source plus a source-local id.
///
/// The wire form is `<source-name>:<local-id>`. The colon is reserved as the
/// separator; occurrences inside the local id are escaped as `%3A` when
/// formatting and restored when parsing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct DocumentId {
    /// Name of the source that owns the document.
    pub source: String,
    /// Source-local identifier (unescaped).
    pub local_id: String,
}

impl DocumentId {
    pub fn new(source: impl Into<String>, local_id: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            local_id: local_id.into(),
        }
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source, self.local_id.replace(':', "%3A"))
    }
}

impl FromStr for DocumentId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((source, local)) if !source.is_empty() && !local.is_empty() => Ok(Self {
                source: source.to_string(),
                local_id: local.replace("%3A", ":"),
            }),
            _ => Err(ValidationError::InvalidValue {
                field: "document_id".to_string(),
                reason: format!("expected <source>:<local-id>, got {:?}", s),
            }),
        }
    }
}

// ============================================================================
// DOCUMENT
// ============================================================================

/// A documentation item as seen by the engine. Immutable once surfaced;
/// a source refresh replaces the document, it never mutates in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Document {
    pub id: DocumentId,
    pub title: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<DocCategory>,
    pub last_updated: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Source-supplied metadata, passed through untouched.
    #[serde(default)]
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl Document {
    pub fn new(id: DocumentId, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            content: content.into(),
            category: None,
            last_updated: Utc::now(),
            url: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_category(mut self, category: DocCategory) -> Self {
        self.category = Some(category);
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_last_updated(mut self, at: DateTime<Utc>) -> Self {
        self.last_updated = at;
        self
    }
}

// ============================================================================
// SEARCH RESULT
// ============================================================================

/// One ranked item returned by a search. Every result surfaced to a caller
/// carries a confidence in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SearchResult {
    /// Engine-wide identity in `<source>:<local-id>` form.
    pub id: String,
    pub title: String,
    /// Content excerpt around the strongest match.
    pub excerpt: String,
    pub source_name: String,
    pub source_type: SourceType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<DocCategory>,
    pub confidence: f64,
    /// Human-readable descriptions of the signals that fired.
    pub match_reasons: Vec<String>,
    pub retrieval_time_ms: u64,
    pub last_updated: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl SearchResult {
    /// Clamp confidence into [0, 1]. Adapters call this before surfacing
    /// results so the invariant holds regardless of scoring arithmetic.
    pub fn clamped(mut self) -> Self {
        self.confidence = self.confidence.clamp(0.0, 1.0);
        self
    }

    /// Source-local id extracted from the engine-wide id, used by the
    /// registry for cross-source duplicate detection.
    pub fn local_id(&self) -> &str {
        self.id
            .split_once(':')
            .map(|(_, local)| local)
            .unwrap_or(&self.id)
    }
}

// ============================================================================
// SEARCH FILTERS
// ============================================================================

/// Filters applied by adapters during search. An adapter must not return
/// results below `min_confidence`; the registry enforces source-type
/// restriction before the call is ever made.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SearchFilters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_types: Option<Vec<SourceType>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_age_days: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<DocCategory>>,
    /// Minimum confidence threshold; results below are dropped at the adapter.
    #[serde(default)]
    pub min_confidence: f64,
    /// Maximum results per adapter.
    #[serde(default = "default_filter_limit")]
    pub limit: usize,
}

fn default_filter_limit() -> usize {
    50
}

impl Default for SearchFilters {
    fn default() -> Self {
        Self {
            source_types: None,
            max_age_days: None,
            severity: None,
            categories: None,
            min_confidence: 0.0,
            limit: default_filter_limit(),
        }
    }
}

impl SearchFilters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source_types(mut self, types: Vec<SourceType>) -> Self {
        self.source_types = Some(types);
        self
    }

    pub fn with_max_age_days(mut self, days: u32) -> Self {
        self.max_age_days = Some(days);
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn with_categories(mut self, categories: Vec<DocCategory>) -> Self {
        self.categories = Some(categories);
        self
    }

    pub fn with_min_confidence(mut self, threshold: f64) -> Self {
        self.min_confidence = threshold;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Whether a source of the given type is eligible under this filter.
    pub fn allows_source_type(&self, source_type: SourceType) -> bool {
        match &self.source_types {
            Some(types) => types.contains(&source_type),
            None => true,
        }
    }

    /// Whether a document category passes the category whitelist.
    pub fn allows_category(&self, category: Option<DocCategory>) -> bool {
        match (&self.categories, category) {
            (Some(allowed), Some(cat)) => allowed.contains(&cat),
            (Some(_), None) => false,
            (None, _) => true,
        }
    }

    /// Whether a document of the given age passes the max-age filter.
    pub fn allows_age(&self, last_updated: DateTime<Utc>) -> bool {
        match self.max_age_days {
            Some(days) => {
                let age = Utc::now().signed_duration_since(last_updated);
                age.num_days() <= days as i64
            }
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_document_id_roundtrip() {
        let id = DocumentId::new("confluence-ops", "SPACE/page-42");
        let s = id.to_string();
        assert_eq!(s, "confluence-ops:SPACE/page-42");
        let parsed: DocumentId = s.parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_document_id_escapes_colon() {
        let id = DocumentId::new("wiki", "ns:page");
        let s = id.to_string();
        assert_eq!(s, "wiki:ns%3Apage");
        let parsed: DocumentId = s.parse().unwrap();
        assert_eq!(parsed.local_id, "ns:page");
    }

    #[test]
    fn test_document_id_rejects_malformed() {
        assert!("no-separator".parse::<DocumentId>().is_err());
        assert!(":leading".parse::<DocumentId>().is_err());
        assert!("trailing:".parse::<DocumentId>().is_err());
    }

    #[test]
    fn test_search_result_clamps_confidence() {
        let result = SearchResult {
            id: "a:b".into(),
            title: "t".into(),
            excerpt: "e".into(),
            source_name: "a".into(),
            source_type: SourceType::File,
            category: None,
            confidence: 1.7,
            match_reasons: vec![],
            retrieval_time_ms: 1,
            last_updated: Utc::now(),
            url: None,
            metadata: BTreeMap::new(),
        };
        assert_eq!(result.clamped().confidence, 1.0);
    }

    #[test]
    fn test_filters_source_type_restriction() {
        let filters = SearchFilters::new().with_source_types(vec![SourceType::Wiki]);
        assert!(filters.allows_source_type(SourceType::Wiki));
        assert!(!filters.allows_source_type(SourceType::File));

        let open = SearchFilters::new();
        assert!(open.allows_source_type(SourceType::File));
    }

    #[test]
    fn test_filters_age() {
        let filters = SearchFilters::new().with_max_age_days(7);
        assert!(filters.allows_age(Utc::now() - Duration::days(3)));
        assert!(!filters.allows_age(Utc::now() - Duration::days(30)));
    }

    #[test]
    fn test_filters_category_whitelist() {
        let filters = SearchFilters::new().with_categories(vec![DocCategory::Runbook]);
        assert!(filters.allows_category(Some(DocCategory::Runbook)));
        assert!(!filters.allows_category(Some(DocCategory::Guide)));
        assert!(!filters.allows_category(None));
    }
}
