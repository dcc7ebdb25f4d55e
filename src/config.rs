use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

use crate::error::{Result, SearchError};

/// Main search-layer configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
pub struct Config {
    /// Physical index naming
    #[serde(default)]
    #[validate(nested)]
    pub index: IndexConfig,

    /// Query compilation tunables
    #[serde(default)]
    #[validate(nested)]
    pub search: SearchConfig,

    /// Result and doc-count caches
    #[serde(default)]
    #[validate(nested)]
    pub cache: CacheConfig,

    /// Lineage traversal bounds
    #[serde(default)]
    #[validate(nested)]
    pub lineage: LineageConfig,

    /// Deadlines and retry for index/graph calls
    #[serde(default)]
    #[validate(nested)]
    pub upstream: UpstreamConfig,

    /// Remote Elasticsearch-compatible engine
    #[serde(default)]
    #[validate(nested)]
    pub elasticsearch: ElasticsearchConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from file and environment
    pub fn load() -> std::result::Result<Self, config::ConfigError> {
        let config_path = std::env::var("LINEAGE_SEARCH_CONFIG")
            .unwrap_or_else(|_| "config/lineage-search.toml".to_string());
        Self::load_from(&config_path)
    }

    /// Load configuration layering defaults, `path` (optional) and `LINEAGE_SEARCH__*` env vars
    pub fn load_from(path: &str) -> std::result::Result<Self, config::ConfigError> {
        config::Config::builder()
            // Start with default values
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            // Override with config file if it exists
            .add_source(config::File::with_name(path).required(false))
            // Override with environment variables (prefix: LINEAGE_SEARCH__)
            .add_source(
                config::Environment::with_prefix("LINEAGE_SEARCH")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Load and validate in one step
    pub fn load_validated() -> Result<Self> {
        let config = Self::load()?;
        config.validate_all()?;
        Ok(config)
    }

    /// Derive validation plus cross-field checks
    pub fn validate_all(&self) -> Result<()> {
        self.validate()?;

        let exact = &self.search.exact_match;
        if exact.with_prefix && exact.prefix_factor > exact.exact_factor {
            return Err(SearchError::Configuration(format!(
                "prefix_factor ({}) must not exceed exact_factor ({})",
                exact.prefix_factor, exact.exact_factor
            )));
        }
        if self.cache.lineage.lightning_threshold == 0 {
            return Err(SearchError::Configuration(
                "lightning_threshold must be negative (always) or positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
pub struct IndexConfig {
    /// Tenant prefix prepended to every physical index name
    #[serde(default)]
    #[validate(length(min = 1, max = 64))]
    pub prefix: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SearchConfig {
    /// Bucket size of every terms aggregation
    #[serde(default = "default_max_term_bucket_size")]
    #[validate(range(min = 1, max = 1000))]
    pub max_term_bucket_size: usize,

    /// Largest page a caller may request
    #[serde(default = "default_max_page_size")]
    #[validate(range(min = 1))]
    pub max_page_size: usize,

    #[serde(default)]
    #[validate(nested)]
    pub exact_match: ExactMatchConfig,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_term_bucket_size: default_max_term_bucket_size(),
            max_page_size: default_max_page_size(),
            exact_match: ExactMatchConfig::default(),
        }
    }
}

/// Exact-match boosting coefficients
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct ExactMatchConfig {
    #[serde(default = "default_exact_factor")]
    #[validate(range(min = 0.0))]
    pub exact_factor: f32,

    #[serde(default = "default_true")]
    pub with_prefix: bool,

    #[serde(default = "default_prefix_factor")]
    #[validate(range(min = 0.0))]
    pub prefix_factor: f32,

    #[serde(default = "default_case_sensitivity_factor")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub case_sensitivity_factor: f32,

    /// Add the exact-match group to structured queries too
    #[serde(default = "default_true")]
    pub enable_structured: bool,

    /// Exact matches replace fuzzy matching instead of boosting above it
    #[serde(default)]
    pub exclusive: bool,
}

impl Default for ExactMatchConfig {
    fn default() -> Self {
        Self {
            exact_factor: default_exact_factor(),
            with_prefix: true,
            prefix_factor: default_prefix_factor(),
            case_sensitivity_factor: default_case_sensitivity_factor(),
            enable_structured: true,
            exclusive: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
pub struct CacheConfig {
    #[serde(default)]
    #[validate(nested)]
    pub entity_search: CacheSettings,

    #[serde(default)]
    #[validate(nested)]
    pub doc_count: CacheSettings,

    #[serde(default)]
    #[validate(nested)]
    pub lineage: LineageCacheConfig,
}

/// TTL cache sizing
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CacheSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_cache_ttl")]
    #[validate(range(min = 1))]
    pub ttl_secs: u64,

    #[serde(default = "default_cache_capacity")]
    #[validate(range(min = 1))]
    pub max_capacity: u64,
}

impl CacheSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: default_cache_ttl(),
            max_capacity: default_cache_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LineageCacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_cache_ttl")]
    #[validate(range(min = 1))]
    pub ttl_secs: u64,

    #[serde(default = "default_cache_capacity")]
    #[validate(range(min = 1))]
    pub max_capacity: u64,

    /// Skip the index for small candidate sets
    #[serde(default = "default_true")]
    pub lightning_enabled: bool,

    /// Candidate-count cutoff for lightning mode; negative means always
    #[serde(default = "default_lightning_threshold")]
    pub lightning_threshold: i64,
}

impl LineageCacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// Whether a candidate set of `count` entities qualifies for lightning mode
    pub fn lightning_applies(&self, count: usize) -> bool {
        self.lightning_enabled
            && (self.lightning_threshold < 0 || count as i64 <= self.lightning_threshold)
    }
}

impl Default for LineageCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: default_cache_ttl(),
            max_capacity: default_cache_capacity(),
            lightning_enabled: true,
            lightning_threshold: default_lightning_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LineageConfig {
    /// Hop bound used when the request leaves `max_hops` unset
    #[serde(default = "default_max_hops")]
    #[validate(range(min = 1))]
    pub default_max_hops: u32,

    /// Maximum relationships fetched from the graph per traversal
    #[serde(default = "default_max_relationships")]
    #[validate(range(min = 1))]
    pub max_relationships: usize,
}

impl Default for LineageConfig {
    fn default() -> Self {
        Self {
            default_max_hops: default_max_hops(),
            max_relationships: default_max_relationships(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct UpstreamConfig {
    /// Deadline for index calls (ms)
    #[serde(default = "default_index_timeout")]
    #[validate(range(min = 1))]
    pub index_timeout_ms: u64,

    /// Deadline for graph traversal calls (ms)
    #[serde(default = "default_graph_timeout")]
    #[validate(range(min = 1))]
    pub graph_timeout_ms: u64,

    /// Retry idempotent reads once after a retryable failure
    #[serde(default = "default_true")]
    pub retry_reads: bool,

    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,
}

impl UpstreamConfig {
    pub fn index_timeout(&self) -> Duration {
        Duration::from_millis(self.index_timeout_ms)
    }

    pub fn graph_timeout(&self) -> Duration {
        Duration::from_millis(self.graph_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            index_timeout_ms: default_index_timeout(),
            graph_timeout_ms: default_graph_timeout(),
            retry_reads: true,
            retry_backoff_ms: default_retry_backoff(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ElasticsearchConfig {
    #[serde(default = "default_es_url")]
    #[validate(url)]
    pub url: String,

    pub username: Option<String>,

    pub password: Option<String>,

    /// HTTP client timeout (seconds)
    #[serde(default = "default_request_timeout")]
    #[validate(range(min = 1))]
    pub request_timeout_secs: u64,
}

impl Default for ElasticsearchConfig {
    fn default() -> Self {
        Self {
            url: default_es_url(),
            username: None,
            password: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
        }
    }
}

// Default value functions
fn default_max_term_bucket_size() -> usize {
    20
}

fn default_max_page_size() -> usize {
    10000
}

fn default_exact_factor() -> f32 {
    10.0
}

fn default_prefix_factor() -> f32 {
    6.0
}

fn default_case_sensitivity_factor() -> f32 {
    0.7
}

fn default_cache_ttl() -> u64 {
    600
}

fn default_cache_capacity() -> u64 {
    10000
}

fn default_lightning_threshold() -> i64 {
    300
}

fn default_max_hops() -> u32 {
    1000
}

fn default_max_relationships() -> usize {
    10000
}

fn default_index_timeout() -> u64 {
    5000
}

fn default_graph_timeout() -> u64 {
    5000
}

fn default_retry_backoff() -> u64 {
    50
}

fn default_es_url() -> String {
    "http://localhost:9200".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}
