//! Response envelope shared by the HTTP and tool-call surfaces

use crate::error::{ApiError, ErrorBody};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use triage_core::PerformanceTier;

/// Metadata block carried by every response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMetadata {
    pub correlation_id: String,
    pub execution_time_ms: u64,
    pub performance_tier: PerformanceTier,
    pub cached: bool,
}

impl ResponseMetadata {
    pub fn new(correlation_id: impl Into<String>, execution_time_ms: u64, cached: bool) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            execution_time_ms,
            performance_tier: PerformanceTier::from_millis(execution_time_ms),
            cached,
        }
    }
}

/// The uniform response envelope:
/// `{ success, data|error, metadata, timestamp }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    pub metadata: ResponseMetadata,
    pub timestamp: DateTime<Utc>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T, metadata: ResponseMetadata) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            metadata,
            timestamp: Utc::now(),
        }
    }

    /// An error envelope. Metadata falls back to the error's correlation id.
    pub fn from_error(error: ApiError) -> Self {
        let metadata = ResponseMetadata::new(error.details.correlation_id.clone(), 0, false);
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            metadata,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_envelope_shape() {
        let envelope = ApiResponse::ok(
            serde_json::json!({"results": []}),
            ResponseMetadata::new("corr-1", 42, true),
        );
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["metadata"]["correlation_id"], "corr-1");
        assert_eq!(json["metadata"]["performance_tier"], "fast");
        assert_eq!(json["metadata"]["cached"], true);
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_error_envelope_shape() {
        let envelope = ApiResponse::<()>::from_error(
            ApiError::missing_field("severity").with_correlation_id("corr-2"),
        );
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"]["code"], "VALIDATION_ERROR");
        assert_eq!(json["error"]["details"]["correlation_id"], "corr-2");
        assert!(json.get("data").is_none());
    }

    #[test]
    fn test_tier_buckets_in_metadata() {
        let medium = ResponseMetadata::new("c", 150, false);
        assert_eq!(medium.performance_tier, PerformanceTier::Medium);
        let slow = ResponseMetadata::new("c", 500, false);
        assert_eq!(slow.performance_tier, PerformanceTier::Slow);
    }
}
