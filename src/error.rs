//! Unified error handling for the trawler crate
//!
//! Domain-specific errors ([`FetchError`]) are wrapped by the unified
//! [`Error`] enum so they can cross module boundaries without losing
//! detail. [`ErrorCategory`] classifies failures the way the worker
//! treats them: policy rejections and origin client errors are terminal,
//! network failures are retryable, infrastructure failures surface but
//! never wedge the pipeline.

use std::io;
use thiserror::Error;

/// Errors that can occur while acquiring a page
#[derive(Error, Debug)]
pub enum FetchError {
    /// HTTP transport error (connect, DNS, protocol)
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Origin returned a non-success status
    #[error("HTTP status {0}")]
    Status(u16),

    /// Content-Type outside the configured allow-list
    #[error("Unsupported content type: {0}")]
    UnsupportedContentType(String),

    /// Response body exceeded the configured cap
    #[error("Response too large: {size} bytes (limit {limit})")]
    TooLarge { size: usize, limit: usize },

    /// Request or navigation timed out
    #[error("Request timeout")]
    Timeout,

    /// Headless-browser rendering failed
    #[error("Browser rendering failed: {0}")]
    Browser(String),

    /// Response body could not be decoded to text
    #[error("Decoding error: {0}")]
    Decode(String),

    /// URL rejected before any request was made
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl FetchError {
    /// Whether retrying the same URL later could succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            FetchError::Http(_) | FetchError::Timeout | FetchError::Browser(_) => true,
            FetchError::Status(code) => *code >= 500,
            FetchError::UnsupportedContentType(_)
            | FetchError::TooLarge { .. }
            | FetchError::Decode(_)
            | FetchError::InvalidUrl(_) => false,
        }
    }
}

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Robots disallow, domain filter, unsupported MIME
    Policy,
    /// DNS, connection reset, 5xx, timeout
    Network,
    /// Origin 4xx
    Client,
    /// Parse or extraction failure
    Parse,
    /// Metadata store, limiter state, index sink unavailable
    Infrastructure,
    /// Everything else
    Other,
}

/// Unified error type for the trawler crate
#[derive(Error, Debug)]
pub enum Error {
    /// Page acquisition errors
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Crawl refused by policy (robots, domain filter)
    #[error("{0}")]
    Policy(String),

    /// Content extraction produced nothing usable
    #[error("{0}")]
    Extraction(String),

    /// PostgreSQL errors
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    /// Connection pool errors
    #[error("Pool error: {0}")]
    Pool(String),

    /// Redis errors
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// OpenSearch errors
    #[error("Index error: {0}")]
    Index(#[from] opensearch::Error),

    /// Index sink rejected a request
    #[error("Index rejected request: status {0}")]
    IndexStatus(u16),

    /// HTTP client errors outside the fetcher
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    /// Generic error with context
    #[error("{context}")]
    Other {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a generic error with context
    pub fn other(context: impl Into<String>) -> Self {
        Self::Other {
            context: context.into(),
            source: None,
        }
    }

    /// Whether the failed operation is worth retrying
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Fetch(e) => e.is_recoverable(),
            Self::Policy(_) | Self::Extraction(_) => false,
            Self::Database(_) | Self::Pool(_) | Self::Redis(_) => true,
            Self::Index(_) | Self::IndexStatus(_) => true,
            Self::Http(_) | Self::Io(_) => true,
            Self::Json(_) | Self::Config(_) | Self::Other { .. } => false,
        }
    }

    /// Get the error category for handling strategies
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Policy(_) => ErrorCategory::Policy,
            Self::Fetch(e) => match e {
                FetchError::Status(code) if *code < 500 => ErrorCategory::Client,
                FetchError::UnsupportedContentType(_) => ErrorCategory::Policy,
                FetchError::Decode(_) | FetchError::InvalidUrl(_) => ErrorCategory::Parse,
                _ => ErrorCategory::Network,
            },
            Self::Extraction(_) | Self::Json(_) => ErrorCategory::Parse,
            Self::Http(_) => ErrorCategory::Network,
            Self::Database(_)
            | Self::Pool(_)
            | Self::Redis(_)
            | Self::Index(_)
            | Self::IndexStatus(_)
            | Self::Io(_) => ErrorCategory::Infrastructure,
            Self::Config(_) | Self::Other { .. } => ErrorCategory::Other,
        }
    }
}

impl From<deadpool_postgres::PoolError> for Error {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        Self::Pool(err.to_string())
    }
}

impl From<deadpool_redis::PoolError> for Error {
    fn from(err: deadpool_redis::PoolError) -> Self {
        Self::Pool(err.to_string())
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other {
            context: err.to_string(),
            source: None,
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_recoverability() {
        assert!(FetchError::Timeout.is_recoverable());
        assert!(FetchError::Status(503).is_recoverable());
        assert!(!FetchError::Status(404).is_recoverable());
        assert!(!FetchError::UnsupportedContentType("image/png".into()).is_recoverable());
        assert!(!FetchError::TooLarge { size: 1, limit: 0 }.is_recoverable());
    }

    #[test]
    fn test_error_category() {
        let policy = Error::Policy("Disallowed by robots.txt".into());
        assert_eq!(policy.category(), ErrorCategory::Policy);
        assert!(!policy.is_recoverable());

        let client = Error::Fetch(FetchError::Status(404));
        assert_eq!(client.category(), ErrorCategory::Client);

        let network = Error::Fetch(FetchError::Timeout);
        assert_eq!(network.category(), ErrorCategory::Network);
        assert!(network.is_recoverable());

        let parse = Error::Extraction("Content extraction failed".into());
        assert_eq!(parse.category(), ErrorCategory::Parse);
        assert!(!parse.is_recoverable());
    }

    #[test]
    fn test_unsupported_mime_is_policy() {
        let err = Error::Fetch(FetchError::UnsupportedContentType("image/png".into()));
        assert_eq!(err.category(), ErrorCategory::Policy);
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_infrastructure_recoverable() {
        let err = Error::Pool("timed out waiting for connection".into());
        assert_eq!(err.category(), ErrorCategory::Infrastructure);
        assert!(err.is_recoverable());
    }
}
