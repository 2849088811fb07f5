//! Configuration Module
//!
//! Handles loading and managing client configuration from environment variables.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Runtime environment; controls whether log entries are echoed to the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn is_development(&self) -> bool {
        matches!(self, Environment::Development)
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" | "local" => Ok(Environment::Development),
            "production" | "prod" | "staging" => Ok(Environment::Production),
            other => Err(format!("unknown environment '{}'", other)),
        }
    }
}

/// Client configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL prepended to relative endpoints
    pub api_base_url: String,
    /// Retries after the first failed attempt (total attempts = max_retries + 1)
    pub max_retries: u32,
    /// TTL applied to cached GET responses without an explicit TTL
    pub default_cache_ttl: Duration,
    /// Per-attempt transport timeout (advisory; the retry loop has no deadline)
    pub request_timeout: Duration,
    /// Base delay of the exponential backoff
    pub retry_base_delay: Duration,
    /// Interval between cache cleanup sweeps
    pub cleanup_interval: Duration,
    /// Interval between telemetry and log flushes
    pub flush_interval: Duration,
    /// Prefix of every cache key written to the durable tier
    pub cache_key_prefix: String,
    /// File backing the durable tier; None keeps it in process memory
    pub cache_storage_path: Option<PathBuf>,
    /// Remote collector base URL; None discards flushed telemetry
    pub collector_url: Option<String>,
    /// Capacity of the log ring buffer
    pub log_buffer_size: usize,
    /// Capacity of the metrics buffer
    pub metrics_buffer_size: usize,
    /// Capacity of the interaction ring buffer
    pub interaction_buffer_size: usize,
    /// Runtime environment
    pub environment: Environment,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `API_BASE_URL` - Base URL of the API (default: http://localhost:3000)
    /// - `MAX_RETRIES` - Retries after the first attempt (default: 3)
    /// - `DEFAULT_CACHE_TTL_MS` - Default cache TTL in ms (default: 300000)
    /// - `REQUEST_TIMEOUT_MS` - Per-attempt timeout in ms (default: 30000)
    /// - `RETRY_BASE_DELAY_MS` - Backoff base delay in ms (default: 1000)
    /// - `CLEANUP_INTERVAL_SECS` - Cache sweep frequency (default: 60)
    /// - `FLUSH_INTERVAL_SECS` - Telemetry flush frequency (default: 60)
    /// - `CACHE_KEY_PREFIX` - Durable key prefix (default: cache_)
    /// - `CACHE_STORAGE_PATH` - Durable tier file (default: unset)
    /// - `COLLECTOR_URL` - Remote collector base URL (default: unset)
    /// - `LOG_BUFFER_SIZE` - Log buffer capacity (default: 100)
    /// - `METRICS_BUFFER_SIZE` - Metrics buffer capacity (default: 1000)
    /// - `INTERACTION_BUFFER_SIZE` - Interaction buffer capacity (default: 100)
    /// - `APP_ENV` - development or production (default: development)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            api_base_url: env::var("API_BASE_URL")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.api_base_url),
            max_retries: parse_var("MAX_RETRIES").unwrap_or(defaults.max_retries),
            default_cache_ttl: parse_var("DEFAULT_CACHE_TTL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.default_cache_ttl),
            request_timeout: parse_var("REQUEST_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.request_timeout),
            retry_base_delay: parse_var("RETRY_BASE_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry_base_delay),
            cleanup_interval: parse_var("CLEANUP_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.cleanup_interval),
            flush_interval: parse_var("FLUSH_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.flush_interval),
            cache_key_prefix: env::var("CACHE_KEY_PREFIX")
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.cache_key_prefix),
            cache_storage_path: env::var("CACHE_STORAGE_PATH")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
            collector_url: env::var("COLLECTOR_URL")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            log_buffer_size: parse_var("LOG_BUFFER_SIZE").unwrap_or(defaults.log_buffer_size),
            metrics_buffer_size: parse_var("METRICS_BUFFER_SIZE")
                .unwrap_or(defaults.metrics_buffer_size),
            interaction_buffer_size: parse_var("INTERACTION_BUFFER_SIZE")
                .unwrap_or(defaults.interaction_buffer_size),
            environment: parse_var("APP_ENV").unwrap_or(defaults.environment),
        }
    }
}

fn parse_var<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:3000".to_string(),
            max_retries: 3,
            default_cache_ttl: Duration::from_secs(300),
            request_timeout: Duration::from_secs(30),
            retry_base_delay: Duration::from_millis(1000),
            cleanup_interval: Duration::from_secs(60),
            flush_interval: Duration::from_secs(60),
            cache_key_prefix: crate::cache::DEFAULT_KEY_PREFIX.to_string(),
            cache_storage_path: None,
            collector_url: None,
            log_buffer_size: 100,
            metrics_buffer_size: 1000,
            interaction_buffer_size: 100,
            environment: Environment::Development,
        }
    }
}
