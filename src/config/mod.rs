//! Configuration management for the trawler crawler
//!
//! Configuration is layered: defaults, then an optional TOML file, then
//! `TRAWLER_*` environment variables. Every knob the pipeline honors is
//! enumerated here; nothing reads the environment elsewhere.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Crawler behavior
    pub crawler: CrawlerConfig,

    /// PostgreSQL metadata store
    pub database: DatabaseConfig,

    /// Redis shared rate-limiter state
    pub redis: RedisConfig,

    /// OpenSearch full-text index
    pub search: SearchConfig,

    /// Logging
    pub logging: LoggingConfig,
}

/// Crawler-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Concurrent crawl handlers per worker
    pub max_concurrent: usize,

    /// HTTP and browser-navigation timeout in milliseconds
    pub request_timeout_ms: u64,

    /// Maximum response body size in bytes
    pub max_page_size: usize,

    /// Default per-host minimum delay in milliseconds
    pub delay_between_requests_ms: u64,

    /// Hard ceiling on traversal depth
    pub max_depth: i32,

    /// User-Agent sent on all outbound HTTP
    pub user_agent: String,

    /// When false, robots checks always allow with zero delay
    pub respect_robots_txt: bool,

    /// MIME allow-list for the plain HTTP phase
    pub allowed_content_types: Vec<String>,

    /// Extra wait after navigation in the rendered phase, milliseconds
    pub render_wait_ms: u64,

    /// Records claimed from the frontier per pump cycle
    pub claim_batch_size: i64,

    /// Frontier pump interval in milliseconds
    pub poll_interval_ms: u64,

    /// Pages crawled within this window are skipped, hours
    pub recency_window_hours: i64,

    /// Delay applied when failed records are rescheduled, seconds
    pub retry_delay_secs: u64,

    /// Age after which processing records are considered abandoned, seconds
    pub stall_timeout_secs: u64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 5,
            request_timeout_ms: 30_000,
            max_page_size: 5 * 1024 * 1024,
            delay_between_requests_ms: 1_000,
            max_depth: 10,
            user_agent: format!("trawler/{}", env!("CARGO_PKG_VERSION")),
            respect_robots_txt: true,
            allowed_content_types: vec![
                String::from("text/html"),
                String::from("text/plain"),
                String::from("application/pdf"),
                String::from("application/json"),
            ],
            render_wait_ms: 2_000,
            claim_batch_size: 10,
            poll_interval_ms: 5_000,
            recency_window_hours: 24,
            retry_delay_secs: 3_600,
            stall_timeout_secs: 900,
        }
    }
}

/// PostgreSQL configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Connection string
    pub url: String,

    /// Maximum pool size
    pub pool_size: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::from("postgresql://localhost/trawler"),
            pool_size: 10,
        }
    }
}

/// Redis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    /// Redis URL (e.g., redis://localhost:6379)
    pub url: String,

    /// Connection pool size
    pub pool_size: usize,

    /// Key prefix for namespacing
    pub key_prefix: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: String::from("redis://localhost:6379"),
            pool_size: 10,
            key_prefix: String::from("trawler"),
        }
    }
}

/// OpenSearch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Endpoint URL
    pub url: String,

    /// Index name
    pub index_name: String,

    /// Username (optional)
    pub username: Option<String>,

    /// Password (optional)
    pub password: Option<String>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            url: String::from("http://localhost:9200"),
            index_name: String::from("trawler-pages"),
            username: None,
            password: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

impl Config {
    /// Load configuration: file named by `TRAWLER_CONFIG` (if any), then
    /// environment overrides
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var("TRAWLER_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Overlay `TRAWLER_*` environment variables
    pub fn apply_env(&mut self) {
        if let Some(v) = env_parse("TRAWLER_MAX_CONCURRENT") {
            self.crawler.max_concurrent = v;
        }
        if let Some(v) = env_parse("TRAWLER_REQUEST_TIMEOUT_MS") {
            self.crawler.request_timeout_ms = v;
        }
        if let Some(v) = env_parse("TRAWLER_MAX_PAGE_SIZE") {
            self.crawler.max_page_size = v;
        }
        if let Some(v) = env_parse("TRAWLER_DELAY_BETWEEN_REQUESTS_MS") {
            self.crawler.delay_between_requests_ms = v;
        }
        if let Some(v) = env_parse("TRAWLER_MAX_DEPTH") {
            self.crawler.max_depth = v;
        }
        if let Ok(v) = std::env::var("TRAWLER_USER_AGENT") {
            self.crawler.user_agent = v;
        }
        if let Some(v) = env_parse("TRAWLER_RESPECT_ROBOTS_TXT") {
            self.crawler.respect_robots_txt = v;
        }
        if let Ok(v) = std::env::var("TRAWLER_ALLOWED_CONTENT_TYPES") {
            self.crawler.allowed_content_types = v
                .split(',')
                .map(|s| s.trim().to_ascii_lowercase())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(v) = env_parse("TRAWLER_RENDER_WAIT_MS") {
            self.crawler.render_wait_ms = v;
        }
        if let Some(v) = env_parse("TRAWLER_CLAIM_BATCH_SIZE") {
            self.crawler.claim_batch_size = v;
        }
        if let Some(v) = env_parse("TRAWLER_POLL_INTERVAL_MS") {
            self.crawler.poll_interval_ms = v;
        }
        if let Some(v) = env_parse("TRAWLER_RECENCY_WINDOW_HOURS") {
            self.crawler.recency_window_hours = v;
        }
        if let Some(v) = env_parse("TRAWLER_RETRY_DELAY_SECS") {
            self.crawler.retry_delay_secs = v;
        }
        if let Some(v) = env_parse("TRAWLER_STALL_TIMEOUT_SECS") {
            self.crawler.stall_timeout_secs = v;
        }
        if let Ok(v) = std::env::var("DATABASE_URL").or_else(|_| std::env::var("POSTGRES_URL")) {
            self.database.url = v;
        }
        if let Some(v) = env_parse("TRAWLER_DB_POOL_SIZE") {
            self.database.pool_size = v;
        }
        if let Ok(v) = std::env::var("REDIS_URL") {
            self.redis.url = v;
        }
        if let Ok(v) = std::env::var("OPENSEARCH_URL") {
            self.search.url = v;
        }
        if let Ok(v) = std::env::var("OPENSEARCH_INDEX") {
            self.search.index_name = v;
        }
        if let Ok(v) = std::env::var("OPENSEARCH_USERNAME") {
            self.search.username = Some(v);
        }
        if let Ok(v) = std::env::var("OPENSEARCH_PASSWORD") {
            self.search.password = Some(v);
        }
        if let Ok(v) = std::env::var("TRAWLER_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Ok(v) = std::env::var("TRAWLER_LOG_FORMAT") {
            self.logging.format = v;
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.crawler.max_concurrent == 0 {
            anyhow::bail!("max_concurrent must be greater than 0");
        }
        if self.crawler.max_page_size == 0 {
            anyhow::bail!("max_page_size must be greater than 0");
        }
        if self.crawler.claim_batch_size <= 0 {
            anyhow::bail!("claim_batch_size must be greater than 0");
        }
        if self.crawler.allowed_content_types.is_empty() {
            anyhow::bail!("allowed_content_types must not be empty");
        }
        if self.database.pool_size == 0 {
            anyhow::bail!("database pool_size must be greater than 0");
        }
        Ok(())
    }

    /// HTTP and navigation timeout as a Duration
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.crawler.request_timeout_ms)
    }

    /// Rendered-phase settle wait as a Duration
    #[must_use]
    pub fn render_wait(&self) -> Duration {
        Duration::from_millis(self.crawler.render_wait_ms)
    }

    /// Frontier pump interval as a Duration
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.crawler.poll_interval_ms)
    }

    /// Recency window as a chrono Duration
    #[must_use]
    pub fn recency_window(&self) -> chrono::Duration {
        chrono::Duration::hours(self.crawler.recency_window_hours)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.crawler.max_concurrent, 5);
        assert_eq!(config.crawler.max_page_size, 5 * 1024 * 1024);
        assert_eq!(config.crawler.max_depth, 10);
        assert!(config.crawler.respect_robots_txt);
    }

    #[test]
    fn test_default_mime_allow_list() {
        let config = Config::default();
        let types = &config.crawler.allowed_content_types;
        for expected in ["text/html", "text/plain", "application/pdf", "application/json"] {
            assert!(types.iter().any(|t| t == expected), "missing {expected}");
        }
    }

    #[test]
    fn test_invalid_concurrency_rejected() {
        let mut config = Config::default();
        config.crawler.max_concurrent = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_timeout_conversion() {
        let config = Config::default();
        assert_eq!(config.request_timeout(), Duration::from_millis(30_000));
        assert_eq!(config.render_wait(), Duration::from_millis(2_000));
        assert_eq!(config.recency_window(), chrono::Duration::hours(24));
    }

    #[test]
    fn test_env_overlay_applies() {
        std::env::set_var("TRAWLER_STALL_TIMEOUT_SECS", "120");
        std::env::set_var("TRAWLER_CLAIM_BATCH_SIZE", "25");

        let mut config = Config::default();
        config.apply_env();

        assert_eq!(config.crawler.stall_timeout_secs, 120);
        assert_eq!(config.crawler.claim_batch_size, 25);

        std::env::remove_var("TRAWLER_STALL_TIMEOUT_SECS");
        std::env::remove_var("TRAWLER_CLAIM_BATCH_SIZE");
    }

    #[test]
    fn test_partial_toml() {
        let parsed: Config = toml::from_str(
            r#"
            [crawler]
            max_concurrent = 8
            user_agent = "testbot/0.1"

            [search]
            index_name = "test-pages"
            "#,
        )
        .unwrap();

        assert_eq!(parsed.crawler.max_concurrent, 8);
        assert_eq!(parsed.crawler.user_agent, "testbot/0.1");
        // Untouched sections keep defaults
        assert_eq!(parsed.crawler.max_depth, 10);
        assert_eq!(parsed.search.index_name, "test-pages");
        assert_eq!(parsed.database.pool_size, 10);
    }
}
