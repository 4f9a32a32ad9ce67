//! Configuration management for Audience Forge services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config.toml, config.yaml)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::extraction::TermRole;

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Search index configuration
    #[serde(default)]
    pub index: IndexConfig,

    /// Candidate extraction service configuration
    #[serde(default)]
    pub extraction: ExtractionConfig,

    /// Term reconciliation tuning
    #[serde(default)]
    pub reconcile: ReconcileConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Shutdown timeout in seconds
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IndexConfig {
    /// Backend: elasticsearch, memory
    #[serde(default = "default_index_backend")]
    pub backend: String,

    /// Base URL of the search cluster
    #[serde(default = "default_index_url")]
    pub url: String,

    /// Index (or alias) holding the records
    #[serde(default = "default_index_name")]
    pub index: String,

    /// Suffix of the unanalyzed sub-field used for counts and buckets
    #[serde(default = "default_exact_suffix")]
    pub exact_suffix: String,

    /// Basic auth credentials (optional)
    pub username: Option<String>,
    pub password: Option<String>,

    /// Per-call timeout in milliseconds
    #[serde(default = "default_index_timeout")]
    pub timeout_ms: u64,

    /// JSON array of records loaded by the memory backend
    pub seed_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExtractionConfig {
    /// Extraction provider: openai, mock
    #[serde(default = "default_extraction_provider")]
    pub provider: String,

    /// API key for the extraction service
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Model to use
    #[serde(default = "default_extraction_model")]
    pub model: String,

    /// Request timeout in seconds
    #[serde(default = "default_extraction_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries for transient failures
    #[serde(default = "default_extraction_retries")]
    pub max_retries: u32,

    /// Maximum candidate terms kept per role
    #[serde(default = "default_max_terms")]
    pub max_terms: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReconcileConfig {
    /// Distinct values aggregated by the ranked search
    #[serde(default = "default_candidate_pool")]
    pub candidate_pool_size: usize,

    /// Below this many candidates the fuzzy fallback query runs
    #[serde(default = "default_fallback_threshold")]
    pub fallback_threshold: usize,

    /// Alternates kept per reconciliation result
    #[serde(default = "default_max_alternates")]
    pub max_alternates: usize,

    /// Location token that is dropped instead of searched
    #[serde(default = "default_country_literal")]
    pub country_literal: String,

    /// Default target column per term role
    #[serde(default = "default_role_columns")]
    pub columns: HashMap<TermRole, String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Requests per second (global)
    #[serde(default = "default_rate_limit")]
    pub requests_per_second: u32,

    /// Burst capacity
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// Enable rate limiting
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_request_timeout() -> u64 { 60 }
fn default_shutdown_timeout() -> u64 { 30 }
fn default_index_backend() -> String { "elasticsearch".to_string() }
fn default_index_url() -> String { "http://localhost:9200".to_string() }
fn default_index_name() -> String { "people".to_string() }
fn default_exact_suffix() -> String { ".keyword".to_string() }
fn default_index_timeout() -> u64 { 3000 }
fn default_extraction_provider() -> String { "openai".to_string() }
fn default_extraction_model() -> String { "gpt-4o-mini".to_string() }
fn default_extraction_timeout() -> u64 { 20 }
fn default_extraction_retries() -> u32 { 2 }
fn default_max_terms() -> usize { 10 }
fn default_candidate_pool() -> usize { 15 }
fn default_fallback_threshold() -> usize { 5 }
fn default_max_alternates() -> usize { 5 }
fn default_country_literal() -> String { "United States".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "audience-forge".to_string() }
fn default_rate_limit() -> u32 { 50 }
fn default_burst() -> u32 { 100 }
fn default_enabled() -> bool { true }

fn default_role_columns() -> HashMap<TermRole, String> {
    HashMap::from([
        (TermRole::Title, "job_title".to_string()),
        (TermRole::Industry, "industry".to_string()),
        (TermRole::Location, "location".to_string()),
        (TermRole::Category, "category".to_string()),
    ])
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables with APP__ prefix
            // e.g., APP__INDEX__URL=http://search:9200
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_secs)
    }

    /// Get the per-call index timeout as Duration
    pub fn index_timeout(&self) -> Duration {
        Duration::from_millis(self.index.timeout_ms)
    }
}

impl ReconcileConfig {
    /// Column a role reconciles against when the caller does not name one
    pub fn column_for(&self, role: TermRole) -> String {
        self.columns
            .get(&role)
            .cloned()
            .unwrap_or_else(|| role.as_str().to_string())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            backend: default_index_backend(),
            url: default_index_url(),
            index: default_index_name(),
            exact_suffix: default_exact_suffix(),
            username: None,
            password: None,
            timeout_ms: default_index_timeout(),
            seed_path: None,
        }
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            provider: default_extraction_provider(),
            api_key: None,
            api_base: None,
            model: default_extraction_model(),
            timeout_secs: default_extraction_timeout(),
            max_retries: default_extraction_retries(),
            max_terms: default_max_terms(),
        }
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            candidate_pool_size: default_candidate_pool(),
            fallback_threshold: default_fallback_threshold(),
            max_alternates: default_max_alternates(),
            country_literal: default_country_literal(),
            columns: default_role_columns(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: default_metrics_port(),
            service_name: default_service_name(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_rate_limit(),
            burst: default_burst(),
            enabled: default_enabled(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.index.exact_suffix, ".keyword");
        assert_eq!(config.reconcile.candidate_pool_size, 15);
        assert_eq!(config.reconcile.fallback_threshold, 5);
        assert_eq!(config.reconcile.max_alternates, 5);
        assert_eq!(config.index_timeout(), Duration::from_secs(3));
    }

    #[test]
    fn test_role_columns() {
        let mut reconcile = ReconcileConfig::default();
        assert_eq!(reconcile.column_for(TermRole::Title), "job_title");

        reconcile.columns.remove(&TermRole::Category);
        assert_eq!(reconcile.column_for(TermRole::Category), "category");
    }

    #[test]
    fn test_partial_sections_fill_defaults() {
        let config: AppConfig = serde_json::from_value(serde_json::json!({
            "index": { "backend": "memory" },
            "reconcile": { "country_literal": "Australia" }
        }))
        .unwrap();

        assert_eq!(config.index.backend, "memory");
        assert_eq!(config.index.url, "http://localhost:9200");
        assert_eq!(config.reconcile.country_literal, "Australia");
        assert_eq!(config.reconcile.max_alternates, 5);
        assert_eq!(config.rate_limit.burst, 100);
    }

    #[test]
    fn test_from_file() {
        let path = std::env::temp_dir().join(format!("audience-forge-{}.toml", std::process::id()));
        std::fs::write(
            &path,
            "[server]\nport = 9001\nshutdown_timeout_secs = 5\n\n[observability]\nservice_name = \"audience-forge-staging\"\n",
        )
        .unwrap();

        let config = AppConfig::from_file(path.to_str().unwrap());
        std::fs::remove_file(&path).unwrap();
        let config = config.unwrap();

        assert_eq!(config.server.port, 9001);
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(5));
        assert_eq!(config.observability.service_name, "audience-forge-staging");
        assert_eq!(config.server.request_timeout_secs, 60);
    }
}
