//! Error types for TRIAGE operations

use thiserror::Error;

/// Source adapter errors.
///
/// The transient/permanent split drives retry policy: the registry retries
/// transient failures with backoff, permanent failures surface immediately.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SourceError {
    #[error("Source {source_name} unavailable: {reason}")]
    Unavailable { source_name: String, reason: String },

    #[error("Source {source_name} call timed out after {timeout_ms}ms")]
    Timeout { source_name: String, timeout_ms: u64 },

    #[error("Source {source_name} failed permanently ({code}): {reason}")]
    Permanent {
        source_name: String,
        code: String,
        reason: String,
    },

    #[error("Source {source_name} rate limited, retry after {retry_after_ms}ms")]
    RateLimited {
        source_name: String,
        retry_after_ms: u64,
    },

    #[error("Circuit open for source {source_name}")]
    CircuitOpen { source_name: String },

    #[error("Document not found: {id}")]
    NotFound { id: String },
}

impl SourceError {
    /// Whether this failure should be retried by the registry.
    ///
    /// Circuit-open rejections are treated as source-unavailable for
    /// aggregation purposes but never consume retry budget.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SourceError::Unavailable { .. }
                | SourceError::Timeout { .. }
                | SourceError::RateLimited { .. }
        )
    }

    /// Stable code surfaced to callers.
    pub fn code(&self) -> &'static str {
        match self {
            SourceError::Unavailable { .. } => "source-unavailable",
            SourceError::Timeout { .. } => "source-timeout",
            SourceError::Permanent { .. } => "source-error",
            SourceError::RateLimited { .. } => "rate-limited",
            SourceError::CircuitOpen { .. } => "circuit-open",
            SourceError::NotFound { .. } => "not-found",
        }
    }

    /// Name of the source involved, when known.
    pub fn source_name(&self) -> Option<&str> {
        match self {
            SourceError::Unavailable { source_name, .. }
            | SourceError::Timeout { source_name, .. }
            | SourceError::Permanent { source_name, .. }
            | SourceError::RateLimited { source_name, .. }
            | SourceError::CircuitOpen { source_name } => Some(source_name),
            SourceError::NotFound { .. } => None,
        }
    }
}

/// Cache layer errors. Slow-tier failures are non-fatal; the hybrid
/// cache degrades to fast-only and surfaces them via health.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache serialization failed: {reason}")]
    Serialization { reason: String },

    #[error("Slow cache tier unreachable: {reason}")]
    SlowTierUnavailable { reason: String },

    #[error("Cache backend error: {reason}")]
    Backend { reason: String },
}

/// Query processor errors. These never surface to callers directly; the
/// processor falls back to a general-search analysis instead.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("Query processing failed in {stage}: {reason}")]
    Processing { stage: String, reason: String },

    #[error("Query processing exceeded budget: {elapsed_ms}ms")]
    BudgetExceeded { elapsed_ms: u64 },
}

/// Configuration errors. Any of these at startup is fatal (exit code 1).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to read config file {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Failed to parse config: {reason}")]
    Parse { reason: String },

    #[error("Credential env var {var} for source {source_name} is not set")]
    CredentialMissing { var: String, source_name: String },

    #[error("Duplicate source name: {name}")]
    DuplicateSource { name: String },
}

/// Input validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Field {field} out of range [{min}, {max}]")]
    OutOfRange {
        field: String,
        min: String,
        max: String,
    },

    #[error("Decision tree {tree_id} contains a cycle through branch {branch_id}")]
    CyclicDecisionTree { tree_id: String, branch_id: String },
}

/// Master error type for all TRIAGE errors.
#[derive(Debug, Clone, Error)]
pub enum TriageError {
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

/// Result type alias for TRIAGE operations.
pub type TriageResult<T> = Result<T, TriageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        let unavailable = SourceError::Unavailable {
            source_name: "wiki".into(),
            reason: "connect refused".into(),
        };
        let permanent = SourceError::Permanent {
            source_name: "wiki".into(),
            code: "auth".into(),
            reason: "401".into(),
        };
        let open = SourceError::CircuitOpen {
            source_name: "wiki".into(),
        };

        assert!(unavailable.is_transient());
        assert!(!permanent.is_transient());
        assert!(!open.is_transient());
    }

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(
            SourceError::CircuitOpen {
                source_name: "a".into()
            }
            .code(),
            "circuit-open"
        );
        assert_eq!(
            SourceError::Unavailable {
                source_name: "a".into(),
                reason: "x".into()
            }
            .code(),
            "source-unavailable"
        );
    }

    #[test]
    fn test_master_error_conversion() {
        let err: TriageError = CacheError::SlowTierUnavailable {
            reason: "refused".into(),
        }
        .into();
        assert!(matches!(err, TriageError::Cache(_)));
    }
}
