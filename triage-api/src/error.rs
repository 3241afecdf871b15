//! Error types for the TRIAGE API
//!
//! Defines the structured error surface shared by the HTTP and tool-call
//! layers: an `ErrorCode` enum mapped to HTTP status codes, an `ApiError`
//! carrying correlation id, per-field validation errors, and recovery
//! actions, and the Axum `IntoResponse` integration.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use triage_core::SourceError;

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Error codes for API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Request validation failed (missing/invalid fields, bad enums)
    ValidationError,

    /// Identity-keyed lookup returned nothing
    NotFound,

    /// Request body exceeded the size limit
    RequestTooLarge,

    /// Max in-flight requests exceeded; retry later
    Overloaded,

    /// Every eligible source failed permanently
    AllSourcesFailed,

    /// A source failed transiently; partial results may be present
    SourceUnavailable,

    /// Internal server error
    InternalError,

    /// Operation timed out
    Timeout,
}

impl ErrorCode {
    /// HTTP status code for this error code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::ValidationError => StatusCode::BAD_REQUEST,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::RequestTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ErrorCode::Overloaded => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::AllSourcesFailed => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::SourceUnavailable => StatusCode::BAD_GATEWAY,
            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::Timeout => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    /// Whether retrying the same request can plausibly succeed.
    pub fn retry_recommended(&self) -> bool {
        matches!(
            self,
            ErrorCode::Overloaded
                | ErrorCode::SourceUnavailable
                | ErrorCode::Timeout
                | ErrorCode::AllSourcesFailed
        )
    }

    /// Default recovery actions surfaced to callers.
    pub fn recovery_actions(&self) -> Vec<String> {
        let actions: &[&str] = match self {
            ErrorCode::ValidationError => &[
                "Check the request body against the endpoint schema",
                "Supply every required field with a valid value",
            ],
            ErrorCode::NotFound => &[
                "Verify the identifier",
                "Search first to discover valid identifiers",
            ],
            ErrorCode::RequestTooLarge => &["Reduce the request body below 10 MiB"],
            ErrorCode::Overloaded => &["Retry after the interval in the retry-after header"],
            ErrorCode::AllSourcesFailed => &[
                "Check source credentials and connectivity",
                "Inspect /api/sources for per-source health",
            ],
            ErrorCode::SourceUnavailable => &["Retry; the source may recover shortly"],
            ErrorCode::InternalError => &["Retry once; report with the correlation id if it persists"],
            ErrorCode::Timeout => &["Retry with a narrower query"],
        };
        actions.iter().map(|s| s.to_string()).collect()
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// ERROR DETAILS
// ============================================================================

/// Structured details attached to every error response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetails {
    #[serde(default)]
    pub correlation_id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validation_errors: Vec<String>,
    #[serde(default)]
    pub recovery_actions: Vec<String>,
    #[serde(default)]
    pub retry_recommended: bool,
}

// ============================================================================
// API ERROR
// ============================================================================

/// Structured error returned by every endpoint and tool operation.
///
/// Messages never carry credentials or internal paths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    pub details: ErrorDetails,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: ErrorDetails {
                correlation_id: String::new(),
                validation_errors: Vec::new(),
                recovery_actions: code.recovery_actions(),
                retry_recommended: code.retry_recommended(),
            },
        }
    }

    /// Attach the request's correlation id.
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.details.correlation_id = correlation_id.into();
        self
    }

    /// Attach per-field validation messages.
    pub fn with_validation_errors(mut self, errors: Vec<String>) -> Self {
        self.details.validation_errors = errors;
        self
    }

    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    // ========================================================================
    // Convenience constructors
    // ========================================================================

    pub fn validation(errors: Vec<String>) -> Self {
        Self::new(ErrorCode::ValidationError, "Request validation failed")
            .with_validation_errors(errors)
    }

    pub fn missing_field(field: &str) -> Self {
        Self::validation(vec![format!("Missing required field: {}", field)])
    }

    pub fn invalid_field(field: &str, reason: impl fmt::Display) -> Self {
        Self::validation(vec![format!("Invalid field {}: {}", field, reason)])
    }

    pub fn not_found(what: impl fmt::Display) -> Self {
        Self::new(ErrorCode::NotFound, format!("{} not found", what))
    }

    pub fn overloaded() -> Self {
        Self::new(ErrorCode::Overloaded, "Too many concurrent requests")
    }

    pub fn request_too_large() -> Self {
        Self::new(ErrorCode::RequestTooLarge, "Request body exceeds 10 MiB")
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

/// Map source-layer failures into API errors.
impl From<SourceError> for ApiError {
    fn from(err: SourceError) -> Self {
        match &err {
            SourceError::NotFound { id } => ApiError::not_found(id),
            SourceError::Permanent { code, .. } if code == "all-sources-failed" => {
                ApiError::new(ErrorCode::AllSourcesFailed, err.to_string())
            }
            SourceError::Timeout { .. } => ApiError::new(ErrorCode::Timeout, err.to_string()),
            SourceError::Permanent { .. } => {
                ApiError::new(ErrorCode::InternalError, err.to_string())
            }
            _ => ApiError::new(ErrorCode::SourceUnavailable, err.to_string()),
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        tracing::error!(error = %err, "JSON serialization error");
        ApiError::internal("Response serialization failed")
    }
}

// ============================================================================
// AXUM INTEGRATION
// ============================================================================

/// Error body nested inside the response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
    pub details: ErrorDetails,
}

impl From<ApiError> for ErrorBody {
    fn from(err: ApiError) -> Self {
        Self {
            code: err.code,
            message: err.message,
            details: err.details,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let envelope = crate::envelope::ApiResponse::<()>::from_error(self);
        (status, Json(envelope)).into_response()
    }
}

/// Result type alias for API operations.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ErrorCode::ValidationError.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ErrorCode::NotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            ErrorCode::RequestTooLarge.status_code(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            ErrorCode::Overloaded.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ErrorCode::AllSourcesFailed.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_error_code_serializes_screaming() {
        let json = serde_json::to_string(&ErrorCode::ValidationError).unwrap();
        assert_eq!(json, "\"VALIDATION_ERROR\"");
    }

    #[test]
    fn test_validation_error_carries_fields() {
        let err = ApiError::missing_field("severity").with_correlation_id("abc-123");
        assert_eq!(err.code, ErrorCode::ValidationError);
        assert_eq!(
            err.details.validation_errors,
            vec!["Missing required field: severity"]
        );
        assert_eq!(err.details.correlation_id, "abc-123");
        assert!(!err.details.recovery_actions.is_empty());
        assert!(!err.details.retry_recommended);
    }

    #[test]
    fn test_source_error_mapping() {
        let err: ApiError = SourceError::NotFound {
            id: "wiki:42".to_string(),
        }
        .into();
        assert_eq!(err.code, ErrorCode::NotFound);

        let err: ApiError = SourceError::Permanent {
            source_name: "a,b".to_string(),
            code: "all-sources-failed".to_string(),
            reason: "everything failed".to_string(),
        }
        .into();
        assert_eq!(err.code, ErrorCode::AllSourcesFailed);

        let err: ApiError = SourceError::Unavailable {
            source_name: "wiki".to_string(),
            reason: "connect refused".to_string(),
        }
        .into();
        assert_eq!(err.code, ErrorCode::SourceUnavailable);
        assert!(err.details.retry_recommended);
    }
}
