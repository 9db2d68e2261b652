//! PostgreSQL metadata store
//!
//! The store is the single serialization point for the pipeline's durable
//! state: crawl jobs, crawled pages (the recency oracle), the frontier's
//! `url_queue` table (operated on by [`crate::frontier::Frontier`] through
//! a shared pool), and persisted robots policies.

use chrono::{DateTime, Utc};
use deadpool_postgres::{Config as PoolConfig, ManagerConfig, Pool, RecyclingMethod, Runtime};
use tokio_postgres::{NoTls, Row};
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::error::{Error, Result};
use crate::models::{CrawlJob, CrawledPage, JobStatus, RobotsRecord};

/// Fields persisted for a successfully crawled page
#[derive(Debug, Clone)]
pub struct PageUpsert {
    pub url: String,
    pub title: Option<String>,
    pub content_hash: String,
    pub last_modified: Option<DateTime<Utc>>,
    pub status_code: i32,
    pub content_type: String,
    pub word_count: i32,
    pub domain: String,
}

/// Handle to the PostgreSQL metadata store
pub struct MetadataStore {
    pool: Pool,
}

impl MetadataStore {
    /// Connect and verify the database is reachable
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let mut pool_config = PoolConfig::new();
        pool_config.url = Some(config.url.clone());
        pool_config.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let pool = pool_config
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| Error::Pool(format!("failed to create PostgreSQL pool: {e}")))?;

        let client = pool.get().await?;
        client.simple_query("SELECT 1").await?;

        tracing::info!("Connected to PostgreSQL metadata store");

        Ok(Self { pool })
    }

    /// Shared pool handle for collaborators operating on the same database
    pub fn pool(&self) -> Pool {
        self.pool.clone()
    }

    /// Create tables and indices if they do not exist
    pub async fn init_schema(&self) -> Result<()> {
        let client = self.pool.get().await?;

        client
            .batch_execute(
                r#"
                CREATE TABLE IF NOT EXISTS crawl_jobs (
                    id UUID PRIMARY KEY,
                    url TEXT NOT NULL,
                    status TEXT NOT NULL DEFAULT 'pending',
                    priority INT NOT NULL DEFAULT 5,
                    depth INT NOT NULL DEFAULT 0,
                    max_depth INT NOT NULL DEFAULT 3,
                    domain_filter TEXT[] NOT NULL DEFAULT '{}',
                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    started_at TIMESTAMPTZ,
                    completed_at TIMESTAMPTZ,
                    error_message TEXT,
                    pages_crawled INT NOT NULL DEFAULT 0,
                    pages_indexed INT NOT NULL DEFAULT 0
                );

                CREATE TABLE IF NOT EXISTS crawled_pages (
                    id UUID PRIMARY KEY,
                    url TEXT NOT NULL UNIQUE,
                    title TEXT,
                    content_hash VARCHAR(64),
                    last_crawled TIMESTAMPTZ,
                    last_modified TIMESTAMPTZ,
                    status_code INT,
                    content_type VARCHAR(100),
                    word_count INT,
                    domain VARCHAR(255),
                    indexed BOOLEAN NOT NULL DEFAULT FALSE,
                    error_count INT NOT NULL DEFAULT 0
                );

                CREATE TABLE IF NOT EXISTS url_queue (
                    id UUID PRIMARY KEY,
                    url TEXT NOT NULL UNIQUE,
                    parent_url TEXT,
                    depth INT NOT NULL DEFAULT 0,
                    priority INT NOT NULL DEFAULT 5,
                    job_id UUID REFERENCES crawl_jobs(id),
                    status TEXT NOT NULL DEFAULT 'pending',
                    attempts INT NOT NULL DEFAULT 0,
                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    scheduled_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    error_message TEXT
                );

                CREATE TABLE IF NOT EXISTS robots_cache (
                    domain VARCHAR(255) PRIMARY KEY,
                    robots_txt TEXT NOT NULL DEFAULT '',
                    last_updated TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    crawl_delay INT NOT NULL DEFAULT 1
                );

                CREATE INDEX IF NOT EXISTS idx_crawl_jobs_status
                    ON crawl_jobs(status);

                CREATE INDEX IF NOT EXISTS idx_crawled_pages_domain
                    ON crawled_pages(domain);

                CREATE INDEX IF NOT EXISTS idx_url_queue_status
                    ON url_queue(status);

                CREATE INDEX IF NOT EXISTS idx_url_queue_scheduled_at
                    ON url_queue(scheduled_at);

                CREATE INDEX IF NOT EXISTS idx_url_queue_job
                    ON url_queue(job_id);
                "#,
            )
            .await?;

        tracing::info!("Metadata store schema initialized");
        Ok(())
    }

    // =========================================================================
    // Crawled pages
    // =========================================================================

    /// Insert or refresh the page record for a successful crawl
    ///
    /// Resets the error count and marks the page indexed.
    pub async fn upsert_page(&self, page: &PageUpsert) -> Result<()> {
        let client = self.pool.get().await?;

        client
            .execute(
                r#"
                INSERT INTO crawled_pages
                    (id, url, title, content_hash, last_crawled, last_modified,
                     status_code, content_type, word_count, domain, indexed, error_count)
                VALUES ($1, $2, $3, $4, NOW(), $5, $6, $7, $8, $9, TRUE, 0)
                ON CONFLICT (url) DO UPDATE SET
                    title = EXCLUDED.title,
                    content_hash = EXCLUDED.content_hash,
                    last_crawled = EXCLUDED.last_crawled,
                    last_modified = EXCLUDED.last_modified,
                    status_code = EXCLUDED.status_code,
                    content_type = EXCLUDED.content_type,
                    word_count = EXCLUDED.word_count,
                    domain = EXCLUDED.domain,
                    indexed = TRUE,
                    error_count = 0
                "#,
                &[
                    &Uuid::new_v4(),
                    &page.url,
                    &page.title,
                    &page.content_hash,
                    &page.last_modified,
                    &page.status_code,
                    &page.content_type,
                    &page.word_count,
                    &page.domain,
                ],
            )
            .await?;

        Ok(())
    }

    /// Record a failed crawl attempt against an existing page record
    pub async fn record_page_error(&self, url: &str) -> Result<()> {
        let client = self.pool.get().await?;
        client
            .execute(
                "UPDATE crawled_pages SET error_count = error_count + 1 WHERE url = $1",
                &[&url],
            )
            .await?;
        Ok(())
    }

    /// Fetch a page record by normalized URL
    pub async fn get_page(&self, url: &str) -> Result<Option<CrawledPage>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                r#"
                SELECT id, url, title, content_hash, last_crawled, last_modified,
                       status_code, content_type, word_count, domain, indexed, error_count
                FROM crawled_pages WHERE url = $1
                "#,
                &[&url],
            )
            .await?;

        Ok(row.map(row_to_page))
    }

    /// Has this URL been crawled successfully within the window?
    pub async fn recently_crawled(&self, url: &str, window: chrono::Duration) -> Result<bool> {
        let cutoff = Utc::now() - window;
        let client = self.pool.get().await?;
        let row = client
            .query_one(
                "SELECT EXISTS(SELECT 1 FROM crawled_pages WHERE url = $1 AND last_crawled > $2)",
                &[&url, &cutoff],
            )
            .await?;
        Ok(row.get(0))
    }

    /// Is there any page record for this URL at all?
    pub async fn page_known(&self, url: &str) -> Result<bool> {
        let client = self.pool.get().await?;
        let row = client
            .query_one(
                "SELECT EXISTS(SELECT 1 FROM crawled_pages WHERE url = $1)",
                &[&url],
            )
            .await?;
        Ok(row.get(0))
    }

    // =========================================================================
    // Crawl jobs
    // =========================================================================

    /// Create a new crawl job for a seed URL
    pub async fn create_job(
        &self,
        url: &str,
        max_depth: i32,
        domain_filter: &[String],
        priority: i32,
    ) -> Result<CrawlJob> {
        let id = Uuid::new_v4();
        let filter: Vec<String> = domain_filter.to_vec();
        let client = self.pool.get().await?;

        let row = client
            .query_one(
                r#"
                INSERT INTO crawl_jobs (id, url, status, priority, max_depth, domain_filter)
                VALUES ($1, $2, 'pending', $3, $4, $5)
                RETURNING id, url, status, priority, depth, max_depth, domain_filter,
                          created_at, started_at, completed_at, error_message,
                          pages_crawled, pages_indexed
                "#,
                &[&id, &url, &priority, &max_depth, &filter],
            )
            .await?;

        Ok(row_to_job(row))
    }

    /// Fetch a job by id
    pub async fn get_job(&self, id: Uuid) -> Result<Option<CrawlJob>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                r#"
                SELECT id, url, status, priority, depth, max_depth, domain_filter,
                       created_at, started_at, completed_at, error_message,
                       pages_crawled, pages_indexed
                FROM crawl_jobs WHERE id = $1
                "#,
                &[&id],
            )
            .await?;

        Ok(row.map(row_to_job))
    }

    /// Transition a pending job to in_progress; no-op if already started
    pub async fn mark_job_started(&self, id: Uuid) -> Result<()> {
        let client = self.pool.get().await?;
        client
            .execute(
                r#"
                UPDATE crawl_jobs
                SET status = 'in_progress', started_at = NOW()
                WHERE id = $1 AND status = 'pending'
                "#,
                &[&id],
            )
            .await?;
        Ok(())
    }

    /// Bump the crawled/indexed counters for a job
    pub async fn record_job_progress(&self, id: Uuid, crawled: i32, indexed: i32) -> Result<()> {
        let client = self.pool.get().await?;
        client
            .execute(
                r#"
                UPDATE crawl_jobs
                SET pages_crawled = pages_crawled + $2,
                    pages_indexed = pages_indexed + $3
                WHERE id = $1
                "#,
                &[&id, &crawled, &indexed],
            )
            .await?;
        Ok(())
    }

    /// Record the most recent per-URL failure reason on the owning job
    pub async fn note_job_error(&self, id: Uuid, message: &str) -> Result<()> {
        let client = self.pool.get().await?;
        client
            .execute(
                "UPDATE crawl_jobs SET error_message = $2 WHERE id = $1",
                &[&id, &message],
            )
            .await?;
        Ok(())
    }

    /// Move a job to a terminal status
    pub async fn complete_job(&self, id: Uuid, status: JobStatus) -> Result<()> {
        let client = self.pool.get().await?;
        client
            .execute(
                r#"
                UPDATE crawl_jobs
                SET status = $2, completed_at = NOW()
                WHERE id = $1 AND status IN ('pending', 'in_progress')
                "#,
                &[&id, &status.as_str()],
            )
            .await?;
        Ok(())
    }

    // =========================================================================
    // Robots persistence
    // =========================================================================

    /// Fetch the persisted robots policy for a host
    pub async fn get_robots(&self, domain: &str) -> Result<Option<RobotsRecord>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                "SELECT domain, robots_txt, crawl_delay, last_updated FROM robots_cache WHERE domain = $1",
                &[&domain],
            )
            .await?;

        Ok(row.map(|r| RobotsRecord {
            domain: r.get(0),
            robots_txt: r.get(1),
            crawl_delay: r.get(2),
            last_updated: r.get(3),
        }))
    }

    /// Persist a freshly fetched robots policy
    pub async fn upsert_robots(&self, domain: &str, robots_txt: &str, crawl_delay: i32) -> Result<()> {
        let client = self.pool.get().await?;
        client
            .execute(
                r#"
                INSERT INTO robots_cache (domain, robots_txt, crawl_delay, last_updated)
                VALUES ($1, $2, $3, NOW())
                ON CONFLICT (domain) DO UPDATE SET
                    robots_txt = EXCLUDED.robots_txt,
                    crawl_delay = EXCLUDED.crawl_delay,
                    last_updated = EXCLUDED.last_updated
                "#,
                &[&domain, &robots_txt, &crawl_delay],
            )
            .await?;
        Ok(())
    }
}

fn row_to_page(row: Row) -> CrawledPage {
    CrawledPage {
        id: row.get(0),
        url: row.get(1),
        title: row.get(2),
        content_hash: row.get(3),
        last_crawled: row.get(4),
        last_modified: row.get(5),
        status_code: row.get(6),
        content_type: row.get(7),
        word_count: row.get(8),
        domain: row.get(9),
        indexed: row.get(10),
        error_count: row.get(11),
    }
}

fn row_to_job(row: Row) -> CrawlJob {
    let status: String = row.get(2);
    CrawlJob {
        id: row.get(0),
        url: row.get(1),
        status: JobStatus::parse(&status).unwrap_or(JobStatus::Pending),
        priority: row.get(3),
        depth: row.get(4),
        max_depth: row.get(5),
        domain_filter: row.get(6),
        created_at: row.get(7),
        started_at: row.get(8),
        completed_at: row.get(9),
        error_message: row.get(10),
        pages_crawled: row.get(11),
        pages_indexed: row.get(12),
    }
}

// Integration tests that exercise SQL against a live database live in
// tests/ and are ignored by default, following the pattern used for the
// Redis-backed limiter.
