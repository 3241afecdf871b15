//! Enum types for TRIAGE entities

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

// ============================================================================
// CORE ENUMS
// ============================================================================

/// Incident severity, ordered from least to most severe.
///
/// Variant order matters: `Ord` is derived, so `Severity::Info < Severity::Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Numeric rank used for adjacency scoring.
    fn rank(self) -> i8 {
        match self {
            Severity::Info => 0,
            Severity::Low => 1,
            Severity::Medium => 2,
            Severity::High => 3,
            Severity::Critical => 4,
        }
    }

    /// Scoring weight for severity matching: exact match 1.0, adjacent 0.5, else 0.0.
    pub fn match_weight(self, other: Severity) -> f64 {
        match (self.rank() - other.rank()).abs() {
            0 => 1.0,
            1 => 0.5,
            _ => 0.0,
        }
    }

    /// All severities, ascending.
    pub fn all() -> [Severity; 5] {
        [
            Severity::Info,
            Severity::Low,
            Severity::Medium,
            Severity::High,
            Severity::Critical,
        ]
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Info => "info",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "info" => Ok(Severity::Info),
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(format!("unknown severity: {}", other)),
        }
    }
}

/// Kind of documentation source. Closed set; adapters are created from this
/// discriminator by the adapter factory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "kebab-case")]
pub enum SourceType {
    File,
    Web,
    GitHost,
    Wiki,
    Database,
    Other,
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SourceType::File => "file",
            SourceType::Web => "web",
            SourceType::GitHost => "git-host",
            SourceType::Wiki => "wiki",
            SourceType::Database => "database",
            SourceType::Other => "other",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for SourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "file" => Ok(SourceType::File),
            "web" => Ok(SourceType::Web),
            "git-host" | "github" | "gitlab" => Ok(SourceType::GitHost),
            "wiki" | "confluence" => Ok(SourceType::Wiki),
            "database" => Ok(SourceType::Database),
            "other" => Ok(SourceType::Other),
            other => Err(format!("unknown source type: {}", other)),
        }
    }
}

/// Document category hint carried by documents and usable as a search filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum DocCategory {
    Runbook,
    Procedure,
    Guide,
    General,
}

impl fmt::Display for DocCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DocCategory::Runbook => "runbook",
            DocCategory::Procedure => "procedure",
            DocCategory::Guide => "guide",
            DocCategory::General => "general",
        };
        write!(f, "{}", s)
    }
}

// ============================================================================
// CACHE CONTENT TYPES
// ============================================================================

/// Tag classifying a cached payload. Each tag carries its own default TTL
/// and warmup policy; the cache key is `(ContentType, logical id)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "kebab-case")]
pub enum ContentType {
    Runbooks,
    Procedures,
    DecisionTrees,
    KnowledgeBase,
    WebResponse,
}

impl ContentType {
    /// Default TTL applied when the configuration does not override it.
    pub fn default_ttl(self) -> Duration {
        match self {
            ContentType::Runbooks => Duration::from_secs(3600),
            ContentType::Procedures => Duration::from_secs(1800),
            ContentType::DecisionTrees => Duration::from_secs(1800),
            ContentType::KnowledgeBase => Duration::from_secs(900),
            ContentType::WebResponse => Duration::from_secs(300),
        }
    }

    /// Whether entries of this tag should be preloaded at startup.
    pub fn default_warmup(self) -> bool {
        matches!(self, ContentType::Runbooks | ContentType::DecisionTrees)
    }

    /// Stable string form used in cache keys and stats.
    pub fn as_str(self) -> &'static str {
        match self {
            ContentType::Runbooks => "runbooks",
            ContentType::Procedures => "procedures",
            ContentType::DecisionTrees => "decision-trees",
            ContentType::KnowledgeBase => "knowledge-base",
            ContentType::WebResponse => "web-response",
        }
    }

    /// All content-type tags.
    pub fn all() -> [ContentType; 5] {
        [
            ContentType::Runbooks,
            ContentType::Procedures,
            ContentType::DecisionTrees,
            ContentType::KnowledgeBase,
            ContentType::WebResponse,
        ]
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// QUERY PROCESSING ENUMS
// ============================================================================

/// Classified intent of an inbound query. Closed set; the classifier may be
/// replaced, the label set may not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "kebab-case")]
pub enum QueryIntent {
    FindRunbook,
    GetProcedure,
    Troubleshoot,
    EmergencyResponse,
    EscalationPath,
    GeneralSearch,
}

impl fmt::Display for QueryIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            QueryIntent::FindRunbook => "find-runbook",
            QueryIntent::GetProcedure => "get-procedure",
            QueryIntent::Troubleshoot => "troubleshoot",
            QueryIntent::EmergencyResponse => "emergency-response",
            QueryIntent::EscalationPath => "escalation-path",
            QueryIntent::GeneralSearch => "general-search",
        };
        write!(f, "{}", s)
    }
}

/// Search approach chosen by strategy selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "kebab-case")]
pub enum SearchApproach {
    SemanticHeavy,
    FuzzyHeavy,
    HybridBalanced,
}

// ============================================================================
// FEEDBACK ENUMS
// ============================================================================

/// Outcome of applying a runbook procedure during incident resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum ResolutionOutcome {
    Success,
    PartialSuccess,
    Failure,
    Escalated,
}

impl ResolutionOutcome {
    /// Whether this outcome counts toward the success rollup.
    pub fn is_success(self) -> bool {
        matches!(self, ResolutionOutcome::Success)
    }
}

// ============================================================================
// PERFORMANCE TIER
// ============================================================================

/// Response-latency bucket surfaced in response metadata and headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum PerformanceTier {
    Fast,
    Medium,
    Slow,
}

impl PerformanceTier {
    /// Bucket a wall-clock duration: fast < 100 ms, medium < 300 ms, slow otherwise.
    pub fn from_millis(ms: u64) -> Self {
        if ms < 100 {
            PerformanceTier::Fast
        } else if ms < 300 {
            PerformanceTier::Medium
        } else {
            PerformanceTier::Slow
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PerformanceTier::Fast => "fast",
            PerformanceTier::Medium => "medium",
            PerformanceTier::Slow => "slow",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Info < Severity::Low);
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
    }

    #[test]
    fn test_severity_match_weight() {
        assert_eq!(Severity::High.match_weight(Severity::High), 1.0);
        assert_eq!(Severity::High.match_weight(Severity::Critical), 0.5);
        assert_eq!(Severity::High.match_weight(Severity::Medium), 0.5);
        assert_eq!(Severity::Info.match_weight(Severity::Critical), 0.0);
    }

    #[test]
    fn test_severity_roundtrip() {
        for sev in Severity::all() {
            let parsed: Severity = sev.to_string().parse().unwrap();
            assert_eq!(parsed, sev);
        }
    }

    #[test]
    fn test_source_type_serde_kebab() {
        let json = serde_json::to_string(&SourceType::GitHost).unwrap();
        assert_eq!(json, "\"git-host\"");
        let back: SourceType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, SourceType::GitHost);
    }

    #[test]
    fn test_content_type_defaults() {
        assert!(ContentType::Runbooks.default_warmup());
        assert!(!ContentType::WebResponse.default_warmup());
        assert_eq!(
            ContentType::WebResponse.default_ttl(),
            Duration::from_secs(300)
        );
    }

    #[test]
    fn test_performance_tier_buckets() {
        assert_eq!(PerformanceTier::from_millis(0), PerformanceTier::Fast);
        assert_eq!(PerformanceTier::from_millis(99), PerformanceTier::Fast);
        assert_eq!(PerformanceTier::from_millis(100), PerformanceTier::Medium);
        assert_eq!(PerformanceTier::from_millis(299), PerformanceTier::Medium);
        assert_eq!(PerformanceTier::from_millis(300), PerformanceTier::Slow);
    }
}
