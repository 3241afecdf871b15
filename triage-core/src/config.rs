//! Configuration types
//!
//! The YAML schema for the engine. Loading (file I/O, env overlay, path
//! resolution) lives in the server crate; this module owns the shape and
//! its validation.

use crate::{ConfigError, ContentType, DocCategory, SourceType};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

// ============================================================================
// SERVER
// ============================================================================

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Default cache TTL in seconds when a content-type policy does not override it.
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_seconds: u64,
    /// Requests beyond this cap are rejected with 503 OVERLOADED.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_requests: usize,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_health_interval")]
    pub health_check_interval_ms: u64,
}

fn default_port() -> u16 {
    3000
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_cache_ttl() -> u64 {
    3600
}
fn default_max_concurrent() -> usize {
    100
}
fn default_request_timeout() -> u64 {
    30_000
}
fn default_health_interval() -> u64 {
    60_000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            log_level: default_log_level(),
            cache_ttl_seconds: default_cache_ttl(),
            max_concurrent_requests: default_max_concurrent(),
            request_timeout_ms: default_request_timeout(),
            health_check_interval_ms: default_health_interval(),
        }
    }
}

// ============================================================================
// SOURCE AUTH
// ============================================================================

/// Credential descriptor for a source. Carries names of environment
/// variables, never literal secrets; values are resolved at load time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum AuthDescriptor {
    Bearer {
        token_env: String,
    },
    Basic {
        username_env: String,
        password_env: String,
    },
    ApiKey {
        key_env: String,
        /// Header the key is sent in; defaults to `X-API-Key`.
        #[serde(skip_serializing_if = "Option::is_none")]
        header: Option<String>,
    },
    Oauth2 {
        client_id_env: String,
        client_secret_env: String,
        token_url: String,
    },
    PersonalToken {
        token_env: String,
    },
    AppToken {
        token_env: String,
    },
    Cookie {
        cookie_env: String,
    },
}

/// Resolved credential material. Debug output never prints secret values.
#[derive(Clone, PartialEq, Eq)]
pub enum ResolvedCredentials {
    Bearer { token: String },
    Basic { username: String, password: String },
    ApiKey { key: String, header: String },
    Oauth2 { client_id: String, client_secret: String, token_url: String },
    PersonalToken { token: String },
    AppToken { token: String },
    Cookie { cookie: String },
}

impl std::fmt::Debug for ResolvedCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            ResolvedCredentials::Bearer { .. } => "Bearer",
            ResolvedCredentials::Basic { .. } => "Basic",
            ResolvedCredentials::ApiKey { .. } => "ApiKey",
            ResolvedCredentials::Oauth2 { .. } => "Oauth2",
            ResolvedCredentials::PersonalToken { .. } => "PersonalToken",
            ResolvedCredentials::AppToken { .. } => "AppToken",
            ResolvedCredentials::Cookie { .. } => "Cookie",
        };
        f.debug_struct("ResolvedCredentials")
            .field("kind", &kind)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

impl AuthDescriptor {
    /// Resolve the descriptor against the process environment.
    pub fn resolve(&self, source: &str) -> Result<ResolvedCredentials, ConfigError> {
        let read = |var: &str| {
            std::env::var(var).map_err(|_| ConfigError::CredentialMissing {
                var: var.to_string(),
                source_name: source.to_string(),
            })
        };

        match self {
            AuthDescriptor::Bearer { token_env } => Ok(ResolvedCredentials::Bearer {
                token: read(token_env)?,
            }),
            AuthDescriptor::Basic {
                username_env,
                password_env,
            } => Ok(ResolvedCredentials::Basic {
                username: read(username_env)?,
                password: read(password_env)?,
            }),
            AuthDescriptor::ApiKey { key_env, header } => Ok(ResolvedCredentials::ApiKey {
                key: read(key_env)?,
                header: header.clone().unwrap_or_else(|| "X-API-Key".to_string()),
            }),
            AuthDescriptor::Oauth2 {
                client_id_env,
                client_secret_env,
                token_url,
            } => Ok(ResolvedCredentials::Oauth2 {
                client_id: read(client_id_env)?,
                client_secret: read(client_secret_env)?,
                token_url: token_url.clone(),
            }),
            AuthDescriptor::PersonalToken { token_env } => {
                Ok(ResolvedCredentials::PersonalToken {
                    token: read(token_env)?,
                })
            }
            AuthDescriptor::AppToken { token_env } => Ok(ResolvedCredentials::AppToken {
                token: read(token_env)?,
            }),
            AuthDescriptor::Cookie { cookie_env } => Ok(ResolvedCredentials::Cookie {
                cookie: read(cookie_env)?,
            }),
        }
    }
}

// ============================================================================
// SOURCES
// ============================================================================

/// Configuration for one documentation source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SourceConfig {
    /// Unique source name; the primary key within a configuration.
    pub name: String,
    #[serde(rename = "type")]
    pub source_type: SourceType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Filesystem roots for file sources.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub paths: Vec<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthDescriptor>,
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_seconds: u64,
    /// Tie-break preference: LOWER numbers are preferred. Two sources
    /// returning equal-confidence results rank by ascending priority.
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_source_timeout")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// When set, only documents in these categories are surfaced.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<DocCategory>>,
}

fn default_refresh_interval() -> u64 {
    3600
}
fn default_priority() -> i32 {
    100
}
fn default_enabled() -> bool {
    true
}
fn default_source_timeout() -> u64 {
    10_000
}
fn default_max_retries() -> u32 {
    2
}

impl SourceConfig {
    /// Minimal config for tests and programmatic construction.
    pub fn new(name: impl Into<String>, source_type: SourceType) -> Self {
        Self {
            name: name.into(),
            source_type,
            base_url: None,
            paths: Vec::new(),
            auth: None,
            refresh_interval_seconds: default_refresh_interval(),
            priority: default_priority(),
            enabled: default_enabled(),
            timeout_ms: default_source_timeout(),
            max_retries: default_max_retries(),
            categories: None,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

// ============================================================================
// CACHE
// ============================================================================

/// Which tiers the cache runs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "kebab-case")]
pub enum CacheStrategy {
    MemoryOnly,
    RedisOnly,
    Hybrid,
}

/// Fast-tier settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct MemoryCacheConfig {
    #[serde(default = "default_max_keys")]
    pub max_keys: usize,
}

fn default_max_keys() -> usize {
    1000
}

impl Default for MemoryCacheConfig {
    fn default() -> Self {
        Self {
            max_keys: default_max_keys(),
        }
    }
}

/// Slow-tier (Redis) settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct RedisCacheConfig {
    pub url: String,
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    #[serde(default = "default_redis_timeout")]
    pub connection_timeout_ms: u64,
}

fn default_key_prefix() -> String {
    "triage:".to_string()
}
fn default_redis_timeout() -> u64 {
    2_000
}

/// Per-content-type TTL and warmup policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ContentTypePolicy {
    pub ttl_seconds: u64,
    #[serde(default)]
    pub warmup: bool,
}

/// Cache section of the configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CacheSettings {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_strategy")]
    pub strategy: CacheStrategy,
    #[serde(default)]
    pub memory: MemoryCacheConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redis: Option<RedisCacheConfig>,
    /// Overrides of the built-in per-content-type defaults.
    #[serde(default)]
    pub content_types: HashMap<ContentType, ContentTypePolicy>,
}

fn default_strategy() -> CacheStrategy {
    CacheStrategy::MemoryOnly
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            strategy: default_strategy(),
            memory: MemoryCacheConfig::default(),
            redis: None,
            content_types: HashMap::new(),
        }
    }
}

impl CacheSettings {
    /// Effective policy for a tag: configured override or built-in default.
    pub fn policy_for(&self, content_type: ContentType) -> ContentTypePolicy {
        self.content_types
            .get(&content_type)
            .copied()
            .unwrap_or(ContentTypePolicy {
                ttl_seconds: content_type.default_ttl().as_secs(),
                warmup: content_type.default_warmup(),
            })
    }
}

// ============================================================================
// EMBEDDING
// ============================================================================

/// Embedding settings. Parsed and validated; scoring remains lexical when
/// disabled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_embedding_cache")]
    pub cache_size: usize,
}

fn default_embedding_model() -> String {
    "all-MiniLM-L6-v2".to_string()
}
fn default_embedding_cache() -> usize {
    1000
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            model: default_embedding_model(),
            cache_size: default_embedding_cache(),
        }
    }
}

// ============================================================================
// TOP-LEVEL CONFIG
// ============================================================================

/// Master configuration struct, the shape of the YAML config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            sources: Vec::new(),
            cache: CacheSettings::default(),
            embedding: EmbeddingConfig::default(),
        }
    }
}

impl AppConfig {
    /// Validate the configuration. Source names must be unique; numeric
    /// fields must be in range; redis settings must be present when the
    /// strategy needs them.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = std::collections::HashSet::new();
        for source in &self.sources {
            if source.name.trim().is_empty() {
                return Err(ConfigError::MissingRequired {
                    field: "sources[].name".to_string(),
                });
            }
            if !seen.insert(source.name.as_str()) {
                return Err(ConfigError::DuplicateSource {
                    name: source.name.clone(),
                });
            }
            if source.timeout_ms == 0 {
                return Err(ConfigError::InvalidValue {
                    field: format!("sources[{}].timeout_ms", source.name),
                    value: "0".to_string(),
                    reason: "per-call timeout must be positive".to_string(),
                });
            }
            match source.source_type {
                SourceType::File => {
                    if source.paths.is_empty() {
                        return Err(ConfigError::MissingRequired {
                            field: format!("sources[{}].paths", source.name),
                        });
                    }
                }
                SourceType::Other => {}
                _ => {
                    if source.base_url.is_none() {
                        return Err(ConfigError::MissingRequired {
                            field: format!("sources[{}].base_url", source.name),
                        });
                    }
                }
            }
        }

        if self.server.max_concurrent_requests == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.max_concurrent_requests".to_string(),
                value: "0".to_string(),
                reason: "must be positive".to_string(),
            });
        }

        if matches!(
            self.cache.strategy,
            CacheStrategy::RedisOnly | CacheStrategy::Hybrid
        ) && self.cache.redis.is_none()
        {
            return Err(ConfigError::MissingRequired {
                field: "cache.redis".to_string(),
            });
        }

        Ok(())
    }

    /// Enabled sources in declaration order.
    pub fn enabled_sources(&self) -> impl Iterator<Item = &SourceConfig> {
        self.sources.iter().filter(|s| s.enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_source_names_rejected() {
        let mut config = AppConfig::default();
        config
            .sources
            .push(SourceConfig::new("ops", SourceType::File));
        config.sources[0].paths.push(PathBuf::from("/docs"));
        let mut dup = SourceConfig::new("ops", SourceType::Web);
        dup.base_url = Some("https://kb.example.com".to_string());
        config.sources.push(dup);

        assert!(matches!(
            config.validate(),
            Err(ConfigError::DuplicateSource { .. })
        ));
    }

    #[test]
    fn test_hybrid_requires_redis() {
        let mut config = AppConfig::default();
        config.cache.strategy = CacheStrategy::Hybrid;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingRequired { .. })
        ));

        config.cache.redis = Some(RedisCacheConfig {
            url: "redis://localhost:6379".to_string(),
            key_prefix: default_key_prefix(),
            connection_timeout_ms: default_redis_timeout(),
        });
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_web_source_requires_base_url() {
        let mut config = AppConfig::default();
        config.sources.push(SourceConfig::new("kb", SourceType::Web));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_policy_fallback_to_builtin() {
        let settings = CacheSettings::default();
        let policy = settings.policy_for(ContentType::Runbooks);
        assert_eq!(policy.ttl_seconds, 3600);
        assert!(policy.warmup);
    }

    #[test]
    fn test_auth_descriptor_resolution() {
        std::env::set_var("TRIAGE_TEST_TOKEN_XYZ", "s3cret");
        let auth = AuthDescriptor::Bearer {
            token_env: "TRIAGE_TEST_TOKEN_XYZ".to_string(),
        };
        match auth.resolve("wiki").unwrap() {
            ResolvedCredentials::Bearer { token } => assert_eq!(token, "s3cret"),
            other => panic!("unexpected credentials: {:?}", other),
        }

        let missing = AuthDescriptor::Bearer {
            token_env: "TRIAGE_TEST_TOKEN_UNSET".to_string(),
        };
        assert!(missing.resolve("wiki").is_err());
    }

    #[test]
    fn test_redacted_debug() {
        let creds = ResolvedCredentials::Bearer {
            token: "very-secret".to_string(),
        };
        let debug = format!("{:?}", creds);
        assert!(!debug.contains("very-secret"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn test_yaml_deserialization_defaults() {
        let yaml = r#"
server:
  port: 8080
sources:
  - name: ops-wiki
    type: wiki
    base_url: https://wiki.example.com
"#;
        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.max_concurrent_requests, 100);
        assert_eq!(config.sources[0].priority, 100);
        assert!(config.sources[0].enabled);
        assert_eq!(config.sources[0].max_retries, 2);
    }
}
