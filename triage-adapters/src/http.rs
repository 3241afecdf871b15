//! Paced HTTP client shared by the web, wiki, and git-host adapters
//!
//! Wraps reqwest with request pacing, credential application, and a status
//! mapping into the source failure model. Pacing keeps each adapter inside
//! its source's rate limits without retrying; retries belong to the registry.

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use triage_core::{ResolvedCredentials, SourceError};

/// HTTP client with minimum-interval pacing between requests.
pub struct PacedClient {
    client: Client,
    source: String,
    credentials: Option<ResolvedCredentials>,
    rate_limiter: Arc<Semaphore>,
    epoch: Instant,
    last_request_ms: AtomicU64,
    min_request_interval_ms: u64,
}

impl PacedClient {
    /// Build a client for one source.
    ///
    /// `requests_per_minute` bounds the pace; the per-call timeout comes
    /// from the source configuration.
    pub fn new(
        source: impl Into<String>,
        timeout: Duration,
        requests_per_minute: u32,
        credentials: Option<ResolvedCredentials>,
    ) -> Result<Self, SourceError> {
        let source = source.into();
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SourceError::Permanent {
                source_name: source.clone(),
                code: "client-init".to_string(),
                reason: e.to_string(),
            })?;

        let permits = (requests_per_minute as usize).max(1);
        let min_interval_ms = (60_000 / requests_per_minute.max(1) as u64).max(10);

        Ok(Self {
            client,
            source,
            credentials,
            rate_limiter: Arc::new(Semaphore::new(permits)),
            epoch: Instant::now(),
            last_request_ms: AtomicU64::new(0),
            min_request_interval_ms: min_interval_ms,
        })
    }

    fn apply_auth(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.credentials {
            None => request,
            Some(ResolvedCredentials::Bearer { token })
            | Some(ResolvedCredentials::PersonalToken { token })
            | Some(ResolvedCredentials::AppToken { token }) => request.bearer_auth(token),
            Some(ResolvedCredentials::Basic { username, password }) => {
                request.basic_auth(username, Some(password))
            }
            Some(ResolvedCredentials::ApiKey { key, header }) => request.header(header, key),
            Some(ResolvedCredentials::Cookie { cookie }) => {
                request.header(reqwest::header::COOKIE, cookie)
            }
            Some(ResolvedCredentials::Oauth2 { client_id, .. }) => {
                // Static OAuth2 access tokens are not minted here; the
                // client id rides along for sources that accept it.
                request.header("X-Client-Id", client_id)
            }
        }
    }

    /// GET a JSON payload.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, SourceError> {
        self.pace().await?;

        let response = self
            .apply_auth(self.client.get(url))
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        self.decode(response).await
    }

    /// GET a plain-text payload.
    pub async fn get_text(&self, url: &str) -> Result<String, SourceError> {
        self.pace().await?;

        let response = self
            .apply_auth(self.client.get(url))
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.map_status(status, &response.headers().clone()));
        }
        response.text().await.map_err(|e| SourceError::Unavailable {
            source_name: self.source.clone(),
            reason: format!("body read failed: {}", e),
        })
    }

    async fn decode<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, SourceError> {
        let status = response.status();
        if !status.is_success() {
            return Err(self.map_status(status, &response.headers().clone()));
        }
        response.json().await.map_err(|e| SourceError::Permanent {
            source_name: self.source.clone(),
            code: "schema".to_string(),
            reason: format!("response decode failed: {}", e),
        })
    }

    /// Enforce the minimum interval between requests.
    async fn pace(&self) -> Result<(), SourceError> {
        let _permit =
            self.rate_limiter
                .acquire()
                .await
                .map_err(|e| SourceError::Unavailable {
                    source_name: self.source.clone(),
                    reason: format!("rate limiter closed: {}", e),
                })?;

        let now_ms = self.epoch.elapsed().as_millis() as u64;
        let last_ms = self.last_request_ms.load(Ordering::Relaxed);
        let elapsed = now_ms.saturating_sub(last_ms);

        if last_ms > 0 && elapsed < self.min_request_interval_ms {
            tokio::time::sleep(Duration::from_millis(self.min_request_interval_ms - elapsed))
                .await;
        }

        self.last_request_ms
            .store(self.epoch.elapsed().as_millis() as u64, Ordering::Relaxed);
        Ok(())
    }

    fn map_transport_error(&self, e: reqwest::Error) -> SourceError {
        if e.is_timeout() {
            SourceError::Timeout {
                source_name: self.source.clone(),
                timeout_ms: 0,
            }
        } else {
            SourceError::Unavailable {
                source_name: self.source.clone(),
                reason: e.to_string(),
            }
        }
    }

    fn map_status(&self, status: StatusCode, headers: &reqwest::header::HeaderMap) -> SourceError {
        match status {
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after_ms = headers
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .map(|secs| secs * 1000)
                    .unwrap_or(1000);
                SourceError::RateLimited {
                    source_name: self.source.clone(),
                    retry_after_ms,
                }
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => SourceError::Permanent {
                source_name: self.source.clone(),
                code: "auth".to_string(),
                reason: format!("HTTP {}", status),
            },
            StatusCode::NOT_FOUND => SourceError::NotFound {
                id: "requested resource".to_string(),
            },
            s if s.is_server_error() => SourceError::Unavailable {
                source_name: self.source.clone(),
                reason: format!("HTTP {}", s),
            },
            s => SourceError::Permanent {
                source_name: self.source.clone(),
                code: "http".to_string(),
                reason: format!("HTTP {}", s),
            },
        }
    }
}

impl std::fmt::Debug for PacedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacedClient")
            .field("source", &self.source)
            .field("min_request_interval_ms", &self.min_request_interval_ms)
            .field("credentials", &self.credentials.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let client = PacedClient::new("kb", Duration::from_secs(1), 60, None).unwrap();
        let headers = reqwest::header::HeaderMap::new();

        assert!(matches!(
            client.map_status(StatusCode::INTERNAL_SERVER_ERROR, &headers),
            SourceError::Unavailable { .. }
        ));
        assert!(matches!(
            client.map_status(StatusCode::UNAUTHORIZED, &headers),
            SourceError::Permanent { .. }
        ));
        assert!(matches!(
            client.map_status(StatusCode::NOT_FOUND, &headers),
            SourceError::NotFound { .. }
        ));
    }

    #[test]
    fn test_rate_limit_reads_retry_after() {
        let client = PacedClient::new("kb", Duration::from_secs(1), 60, None).unwrap();
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(reqwest::header::RETRY_AFTER, "7".parse().unwrap());

        match client.map_status(StatusCode::TOO_MANY_REQUESTS, &headers) {
            SourceError::RateLimited { retry_after_ms, .. } => {
                assert_eq!(retry_after_ms, 7000)
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_debug_redacts_credentials() {
        let client = PacedClient::new(
            "kb",
            Duration::from_secs(1),
            60,
            Some(ResolvedCredentials::Bearer {
                token: "secret-token".to_string(),
            }),
        )
        .unwrap();
        let debug = format!("{:?}", client);
        assert!(!debug.contains("secret-token"));
    }
}
