//! Configuration management for the gateway.
//!
//! Values are layered with the `config` crate: built-in defaults, then an
//! optional YAML file, then `MAP__`-prefixed environment variables
//! (`MAP__RATE_LIMIT__REQUESTS=10` overrides `rate_limit.requests`).
//! Everything is read once at startup and treated as immutable afterwards.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use uuid::Uuid;

use crate::error::{PlatformError, Result};

/// Environment variable prefix for configuration overrides.
pub const ENV_PREFIX: &str = "MAP";

/// Main configuration for the gateway.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Agent execution settings
    #[serde(default)]
    pub execution: ExecutionConfig,

    /// Log output settings
    #[serde(default)]
    pub logging: LoggingConfig,

    /// API keys accepted by the gateway and the tenant each one belongs to
    #[serde(default)]
    pub api_keys: Vec<ApiKeyConfig>,

    /// Agents available for execution
    #[serde(default)]
    pub agents: Vec<AgentConfig>,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_http_addr")]
    pub http_addr: SocketAddr,

    /// Service name reported by the health endpoint
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
            service_name: default_service_name(),
        }
    }
}

fn default_http_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8000))
}

fn default_service_name() -> String {
    "Mini Agent Platform".to_string()
}

/// Which store holds the per-tenant request windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Process-local map, for tests and single-instance deployments
    Memory,
    /// Shared Redis sorted sets
    Redis,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Requests admitted per tenant within one window
    #[serde(default = "default_requests")]
    pub requests: u32,

    /// Window length in seconds
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,

    /// Storage backend for request windows
    #[serde(default = "default_backend")]
    pub backend: BackendKind,

    /// Redis connection URL, used when `backend` is `redis`
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// Upper bound on establishing the Redis connection
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Upper bound on a single Redis round trip
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests: default_requests(),
            window_seconds: default_window_seconds(),
            backend: default_backend(),
            redis_url: default_redis_url(),
            connect_timeout_ms: default_connect_timeout_ms(),
            command_timeout_ms: default_command_timeout_ms(),
        }
    }
}

fn default_requests() -> u32 {
    100
}

fn default_window_seconds() -> u64 {
    60
}

fn default_backend() -> BackendKind {
    BackendKind::Redis
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_connect_timeout_ms() -> u64 {
    2000
}

fn default_command_timeout_ms() -> u64 {
    1000
}

/// Agent execution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Models an execution request may name
    #[serde(default = "default_allowed_models")]
    pub allowed_models: Vec<String>,

    /// Maximum prompt length in characters
    #[serde(default = "default_max_prompt_length")]
    pub max_prompt_length: usize,

    /// Page size for history listings when the client gives none
    #[serde(default = "default_page_limit")]
    pub default_page_limit: usize,

    /// Largest page size a client may request
    #[serde(default = "default_max_page_limit")]
    pub max_page_limit: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            allowed_models: default_allowed_models(),
            max_prompt_length: default_max_prompt_length(),
            default_page_limit: default_page_limit(),
            max_page_limit: default_max_page_limit(),
        }
    }
}

fn default_allowed_models() -> Vec<String> {
    [
        "gpt-5",
        "gpt-4o-mini",
        "gpt-3.5-turbo",
        "claude-4-opus",
        "claude-4.5-sonnet",
        "gemini-2.5 pro",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_max_prompt_length() -> usize {
    10_000
}

fn default_page_limit() -> usize {
    20
}

fn default_max_page_limit() -> usize {
    100
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Output format
    #[serde(default)]
    pub format: LogFormat,
}

/// An API key and the tenant it authenticates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyConfig {
    pub key: String,
    pub tenant_id: Uuid,
}

/// An agent that tenants can execute.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub role: String,
    #[serde(default)]
    pub tools: Vec<String>,
}

impl PlatformConfig {
    /// Load configuration from an optional YAML file plus environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            if !path.exists() {
                return Err(PlatformError::Config(format!(
                    "configuration file not found: {}",
                    path.display()
                )));
            }
            builder = builder.add_source(config::File::from(path).format(config::FileFormat::Yaml));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        Self::build(builder)
    }

    /// Load configuration from a YAML string, without environment overrides.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let builder = config::Config::builder()
            .add_source(config::File::from_str(yaml, config::FileFormat::Yaml));
        Self::build(builder)
    }

    fn build(builder: config::ConfigBuilder<config::builder::DefaultState>) -> Result<Self> {
        let config: PlatformConfig = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| PlatformError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the rate limiter meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.rate_limit.requests == 0 {
            return Err(PlatformError::Config(
                "rate_limit.requests must be greater than zero".to_string(),
            ));
        }
        if self.rate_limit.window_seconds == 0 {
            return Err(PlatformError::Config(
                "rate_limit.window_seconds must be greater than zero".to_string(),
            ));
        }
        if self.execution.max_page_limit == 0 {
            return Err(PlatformError::Config(
                "execution.max_page_limit must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Render the effective configuration as YAML.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| PlatformError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PlatformConfig::default();

        assert_eq!(config.rate_limit.requests, 100);
        assert_eq!(config.rate_limit.window_seconds, 60);
        assert_eq!(config.rate_limit.backend, BackendKind::Redis);
        assert_eq!(config.rate_limit.command_timeout_ms, 1000);
        assert_eq!(config.server.http_addr.port(), 8000);
        assert!(config.execution.allowed_models.contains(&"gpt-4o-mini".to_string()));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_yaml_overrides_defaults() {
        let yaml = r#"
rate_limit:
  requests: 5
  window_seconds: 30
  backend: memory
api_keys:
  - key: "Key-With-Caps"
    tenant_id: "6f1d8c1e-8a4b-4c58-9f3e-2d7a5b1c0e11"
"#;
        let config = PlatformConfig::from_yaml(yaml).unwrap();

        assert_eq!(config.rate_limit.requests, 5);
        assert_eq!(config.rate_limit.window_seconds, 30);
        assert_eq!(config.rate_limit.backend, BackendKind::Memory);
        assert_eq!(config.rate_limit.redis_url, "redis://localhost:6379");
        assert_eq!(config.api_keys.len(), 1);
        assert_eq!(config.api_keys[0].key, "Key-With-Caps");
    }

    #[test]
    fn test_zero_limit_rejected() {
        let yaml = "rate_limit:\n  requests: 0\n";
        let err = PlatformConfig::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, PlatformError::Config(_)));
    }

    #[test]
    fn test_zero_window_rejected() {
        let mut config = PlatformConfig::default();
        config.rate_limit.window_seconds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = PlatformConfig::load(Some(Path::new("/nonexistent/miniagent.yaml"))).unwrap_err();
        assert!(matches!(err, PlatformError::Config(_)));
    }

    #[test]
    fn test_to_yaml_contains_rate_limit_section() {
        let yaml = PlatformConfig::default().to_yaml().unwrap();
        assert!(yaml.contains("rate_limit:"));
        assert!(yaml.contains("window_seconds: 60"));
    }
}
