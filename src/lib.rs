//! trawler - distributed web crawler feeding a full-text search index
//!
//! Given one or more seed URLs, trawler performs a bounded breadth-first
//! traversal of the reachable web, extracts structured content from each
//! page, and publishes documents to an OpenSearch index.
//!
//! # Architecture
//!
//! - [`url_utils`] - URL canonicalization and domain validation
//! - [`frontier`] - durable, priority-ordered URL queue (PostgreSQL)
//! - [`robots`] - robots.txt acquisition and two-tier caching
//! - [`limiter`] - per-host rate limiting shared through Redis
//! - [`fetcher`] - dual-mode page acquisition (HTTP, then headless browser)
//! - [`extract`] - structured content extraction from HTML/text/JSON
//! - [`worker`] - the job-processing loop tying the pipeline together
//! - [`storage`] - PostgreSQL metadata store
//! - [`index`] - OpenSearch document sink
//!
//! # Example
//!
//! ```no_run
//! use trawler::config::Config;
//! use trawler::worker::Worker;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let worker = Worker::connect(config).await?;
//!     worker.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod extract;
pub mod fetcher;
pub mod frontier;
pub mod index;
pub mod limiter;
pub mod metrics;
pub mod models;
pub mod queue;
pub mod robots;
pub mod storage;
pub mod url_utils;
pub mod utils;
pub mod worker;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, ErrorCategory, FetchError, Result};
    pub use crate::extract::{ContentExtractor, ExtractedContent};
    pub use crate::fetcher::{FetchedPage, PageFetcher};
    pub use crate::frontier::{EnqueueOutcome, Frontier, UrlOutcome};
    pub use crate::index::{DocumentSink, SearchIndex};
    pub use crate::models::{CrawlJob, CrawledPage, IndexedDocument, UrlRecord};
    pub use crate::worker::{CrawlContext, CrawlOutcome, Worker};
}

// Direct re-exports for convenience
pub use models::{document_id, CrawlJob, CrawledPage, IndexedDocument, UrlRecord};
