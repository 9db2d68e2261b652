//! The crawl worker: frontier pump plus a bounded pool of crawl handlers
//!
//! The pump claims due frontier records on an interval and feeds them to
//! the handler pool through the bounded dispatch queue; claimed records
//! stay `processing` until their handler moves them to a terminal state.
//! A maintenance task periodically reschedules retryable failures and
//! recovers records abandoned by crashed workers. All collaborators are
//! constructed services owned by the worker — there are no process-wide
//! singletons.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{watch, Mutex};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::extract::ContentExtractor;
use crate::fetcher::PageFetcher;
use crate::frontier::{EnqueueOutcome, Frontier, UrlOutcome};
use crate::index::{DocumentSink, SearchIndex};
use crate::limiter::RateLimiter;
use crate::metrics;
use crate::models::{document_id, IndexedDocument, JobStatus, UrlRecord};
use crate::queue::{CrawlTask, DispatchQueue, QueueStats};
use crate::robots::RobotsCache;
use crate::storage::{MetadataStore, PageUpsert};
use crate::url_utils;
use crate::utils::retry::{with_retry, RetryConfig};

/// How long handlers get to finish their current URL after shutdown
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Cadence of the reschedule/recovery sweep
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(60);

/// Result of one crawl procedure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlOutcome {
    /// Page fetched, extracted, persisted, and indexed
    Indexed { links_enqueued: usize },
    /// Page was crawled within the recency window; nothing fetched
    Skipped,
}

/// Shared collaborators for the crawl procedure
///
/// The worker assembles one in [`Worker::connect`]; tests wire their own
/// from mock-backed collaborators to drive the procedure directly.
pub struct CrawlContext {
    config: Arc<Config>,
    store: Arc<MetadataStore>,
    frontier: Arc<Frontier>,
    robots: Arc<RobotsCache>,
    limiter: Arc<RateLimiter>,
    fetcher: Arc<PageFetcher>,
    extractor: ContentExtractor,
    sink: Arc<dyn DocumentSink>,
}

impl CrawlContext {
    /// Assemble a context from already-connected collaborators
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<Config>,
        store: Arc<MetadataStore>,
        frontier: Arc<Frontier>,
        robots: Arc<RobotsCache>,
        limiter: Arc<RateLimiter>,
        fetcher: Arc<PageFetcher>,
        sink: Arc<dyn DocumentSink>,
    ) -> Self {
        Self {
            config,
            store,
            frontier,
            robots,
            limiter,
            fetcher,
            extractor: ContentExtractor::new(),
            sink,
        }
    }
}

/// A worker process: N crawl handlers plus the frontier pump
pub struct Worker {
    ctx: Arc<CrawlContext>,
    shutdown: watch::Sender<bool>,
}

impl Worker {
    /// Connect every collaborator and bootstrap durable state
    pub async fn connect(config: Config) -> Result<Self> {
        let config = Arc::new(config);

        let store = Arc::new(MetadataStore::connect(&config.database).await?);
        store.init_schema().await?;

        let frontier = Arc::new(Frontier::new(store.pool()));

        let robots = Arc::new(RobotsCache::new(
            Some(Arc::clone(&store)),
            &config.crawler.user_agent,
            config.crawler.respect_robots_txt,
        )?);

        let limiter = Arc::new(
            RateLimiter::connect(&config.redis, config.crawler.delay_between_requests_ms).await,
        );

        let fetcher = Arc::new(PageFetcher::new(&config.crawler).map_err(Error::Fetch)?);

        let sink: Arc<dyn DocumentSink> = Arc::new(SearchIndex::new(&config.search)?);
        sink.ensure_index().await?;

        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            ctx: Arc::new(CrawlContext::new(
                config, store, frontier, robots, limiter, fetcher, sink,
            )),
            shutdown,
        })
    }

    /// Signal the worker to stop; `run` drains and returns
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// A handle that can trigger shutdown from another task
    pub fn shutdown_handle(&self) -> watch::Sender<bool> {
        self.shutdown.clone()
    }

    /// Run until shutdown is signaled
    pub async fn run(&self) -> Result<()> {
        let max_concurrent = self.ctx.config.crawler.max_concurrent;
        let (queue, rx, stats) = DispatchQueue::new(max_concurrent * 2);
        let rx = Arc::new(Mutex::new(rx));

        tracing::info!(
            handlers = max_concurrent,
            batch = self.ctx.config.crawler.claim_batch_size,
            "Worker starting"
        );

        let mut handler_handles = Vec::with_capacity(max_concurrent);
        for handler_id in 0..max_concurrent {
            handler_handles.push(self.spawn_handler(handler_id, Arc::clone(&rx), Arc::clone(&stats)));
        }

        let pump_handle = self.spawn_pump(queue);
        let maintenance_handle = self.spawn_maintenance();

        // Block until shutdown is requested
        let mut shutdown_rx = self.shutdown.subscribe();
        while !*shutdown_rx.borrow() {
            if shutdown_rx.changed().await.is_err() {
                break;
            }
        }

        tracing::info!("Shutdown requested; draining active handlers");

        // Pump and maintenance observe the same signal; when the pump
        // exits it drops the queue sender and the handlers drain out
        let _ = pump_handle.await;
        let _ = maintenance_handle.await;

        let drain = async {
            for handle in handler_handles {
                let _ = handle.await;
            }
        };
        if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
            // Abandoned records stay `processing` and come back through
            // recover_stalled on the next worker
            tracing::warn!("Grace period elapsed with handlers still active");
        }

        self.ctx.fetcher.shutdown().await;

        let snapshot = stats.snapshot();
        tracing::info!(%snapshot, "Worker stopped");
        Ok(())
    }

    fn spawn_handler(
        &self,
        handler_id: usize,
        rx: Arc<Mutex<tokio::sync::mpsc::Receiver<CrawlTask>>>,
        stats: Arc<QueueStats>,
    ) -> tokio::task::JoinHandle<()> {
        let ctx = Arc::clone(&self.ctx);

        tokio::spawn(async move {
            loop {
                let task = {
                    let mut rx = rx.lock().await;
                    rx.recv().await
                };
                let Some(task) = task else { break };

                stats.task_started();
                metrics::ACTIVE_HANDLERS.inc();
                let success = ctx.handle(&task).await;
                metrics::ACTIVE_HANDLERS.dec();
                stats.task_finished(success);
            }

            tracing::debug!(handler_id, "Crawl handler shutting down");
        })
    }

    fn spawn_pump(&self, queue: DispatchQueue) -> tokio::task::JoinHandle<()> {
        let ctx = Arc::clone(&self.ctx);
        let mut shutdown_rx = self.shutdown.subscribe();
        let poll_interval = ctx.config.poll_interval();
        let error_interval = poll_interval * 2;
        let batch_size = ctx.config.crawler.claim_batch_size;

        tokio::spawn(async move {
            let mut delay = poll_interval;

            loop {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shutdown_rx.changed() => {}
                }
                if *shutdown_rx.borrow() {
                    break;
                }

                match ctx.frontier.claim_batch(batch_size).await {
                    Ok(records) => {
                        delay = poll_interval;
                        if !records.is_empty() {
                            tracing::debug!(count = records.len(), "Dispatching claimed URLs");
                        }
                        for record in records {
                            if !queue.dispatch(to_task(record)).await {
                                tracing::info!("Dispatch queue closed; pump exiting");
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Frontier claim failed");
                        delay = error_interval;
                    }
                }
            }

            tracing::info!("Frontier pump stopped");
        })
    }

    fn spawn_maintenance(&self) -> tokio::task::JoinHandle<()> {
        let ctx = Arc::clone(&self.ctx);
        let mut shutdown_rx = self.shutdown.subscribe();
        let retry_delay = chrono::Duration::seconds(ctx.config.crawler.retry_delay_secs as i64);
        let stall_timeout = chrono::Duration::seconds(ctx.config.crawler.stall_timeout_secs as i64);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(MAINTENANCE_INTERVAL) => {}
                    _ = shutdown_rx.changed() => {}
                }
                if *shutdown_rx.borrow() {
                    break;
                }

                if let Err(e) = ctx.frontier.reschedule_failed(retry_delay).await {
                    tracing::warn!(error = %e, "Reschedule sweep failed");
                }
                if let Err(e) = ctx.frontier.recover_stalled(stall_timeout).await {
                    tracing::warn!(error = %e, "Stall recovery failed");
                }
            }

            tracing::debug!("Maintenance task stopped");
        })
    }
}

fn to_task(record: UrlRecord) -> CrawlTask {
    CrawlTask {
        record_id: record.id,
        url: record.url,
        depth: record.depth,
        priority: record.priority,
        job_id: record.job_id,
    }
}

impl CrawlContext {
    /// Run the crawl procedure and settle the frontier record
    ///
    /// Returns whether the task counts as a success for queue stats.
    pub async fn handle(&self, task: &CrawlTask) -> bool {
        match self.process(task).await {
            Ok(CrawlOutcome::Skipped) => {
                if let Err(e) = self
                    .frontier
                    .complete(task.record_id, UrlOutcome::Completed, None)
                    .await
                {
                    tracing::error!(url = %task.url, error = %e, "Failed to complete URL record");
                }
                metrics::record_page_outcome("skipped");
                self.maybe_finish_job(task.job_id).await;
                true
            }
            Ok(CrawlOutcome::Indexed { links_enqueued }) => {
                if let Err(e) = self
                    .frontier
                    .complete(task.record_id, UrlOutcome::Completed, None)
                    .await
                {
                    tracing::error!(url = %task.url, error = %e, "Failed to complete URL record");
                }
                metrics::record_page_outcome("indexed");
                tracing::info!(url = %task.url, depth = task.depth, links_enqueued, "Page crawled");
                self.maybe_finish_job(task.job_id).await;
                true
            }
            Err(e) => {
                let message = e.to_string();
                let retryable = e.is_recoverable();
                tracing::warn!(url = %task.url, error = %message, retryable, "Crawl failed");

                if let Err(complete_err) = self
                    .frontier
                    .complete(
                        task.record_id,
                        UrlOutcome::Failed { retryable },
                        Some(&message),
                    )
                    .await
                {
                    tracing::error!(url = %task.url, error = %complete_err, "Failed to fail URL record");
                }

                if let Err(store_err) = self.store.record_page_error(&task.url).await {
                    tracing::debug!(url = %task.url, error = %store_err, "Could not bump page error count");
                }
                if let Some(job_id) = task.job_id {
                    if let Err(job_err) = self.store.note_job_error(job_id, &message).await {
                        tracing::debug!(%job_id, error = %job_err, "Could not record job error");
                    }
                }

                metrics::record_page_outcome("failed");
                self.maybe_finish_job(task.job_id).await;
                false
            }
        }
    }

    /// The crawl procedure: recency, robots, pacing, fetch, extract,
    /// persist, index, expand, account
    pub async fn process(&self, task: &CrawlTask) -> Result<CrawlOutcome> {
        let url = task.url.as_str();

        // Recency check: a fresh page is not re-fetched no matter how it
        // entered the frontier
        if self
            .store
            .recently_crawled(url, self.config.recency_window())
            .await?
        {
            tracing::debug!(url, "Within recency window; skipping");
            return Ok(CrawlOutcome::Skipped);
        }

        // Politeness: robots verdict, then per-host spacing
        let decision = self.robots.can_crawl(url).await;
        if !decision.allowed {
            return Err(Error::Policy(String::from("Disallowed by robots.txt")));
        }

        let host = url_utils::extract_host(url)
            .ok_or_else(|| Error::other(format!("URL without host: {url}")))?;

        if decision.delay_secs > 0 {
            self.limiter.set_delay(&host, decision.delay_secs * 1_000).await;
        }
        self.limiter.wait(&host).await;

        // Acquire
        let page = self.fetcher.fetch(url).await.map_err(Error::Fetch)?;

        // Extract
        let extracted = self
            .extractor
            .extract(&page.body, &page.content_type, url)
            .ok_or_else(|| Error::Extraction(String::from("Content extraction failed")))?;

        // Persist
        self.store
            .upsert_page(&PageUpsert {
                url: url.to_string(),
                title: extracted.title.clone(),
                content_hash: extracted.content_hash.clone(),
                last_modified: page.last_modified,
                status_code: page.status_code as i32,
                content_type: page.content_type.clone(),
                word_count: extracted.word_count as i32,
                domain: host.clone(),
            })
            .await?;

        // Index under the deterministic id
        let doc = IndexedDocument {
            id: document_id(url),
            url: url.to_string(),
            title: extracted.title.clone().unwrap_or_default(),
            description: extracted.description.clone().unwrap_or_default(),
            content: extracted.content.clone(),
            keywords: extracted.keywords.clone(),
            domain: host.clone(),
            crawl_date: Utc::now(),
            last_modified: page.last_modified,
            content_type: page.content_type.clone(),
            language: extracted.language.clone(),
            word_count: extracted.word_count,
            content_hash: extracted.content_hash.clone(),
            links: extracted.links.clone(),
            metadata: extracted.metadata.clone(),
        };

        let retry = RetryConfig::new(2);
        with_retry(&retry, || async { self.sink.index_document(&doc).await }).await?;

        // Frontier expansion
        let job = match task.job_id {
            Some(job_id) => self.store.get_job(job_id).await?,
            None => None,
        };
        let max_depth = job
            .as_ref()
            .map(|j| j.max_depth.min(self.config.crawler.max_depth))
            .unwrap_or(self.config.crawler.max_depth);

        let mut links_enqueued = 0;
        if task.depth < max_depth {
            let empty: &[String] = &[];
            let filter = job.as_ref().map(|j| j.domain_filter.as_slice()).unwrap_or(empty);

            for link in &extracted.links {
                if !url_utils::should_crawl_domain(&link.url, filter) {
                    continue;
                }
                if self.store.page_known(&link.url).await.unwrap_or(false) {
                    continue;
                }
                match self
                    .frontier
                    .enqueue(&link.url, Some(url), task.depth + 1, task.priority, task.job_id)
                    .await
                {
                    Ok(EnqueueOutcome::Added) => links_enqueued += 1,
                    Ok(EnqueueOutcome::Duplicate) => {}
                    Err(e) => {
                        tracing::warn!(link = %link.url, error = %e, "Failed to enqueue link");
                    }
                }
            }
        }

        // Job accounting
        if let Some(job_id) = task.job_id {
            self.store.mark_job_started(job_id).await?;
            self.store.record_job_progress(job_id, 1, 1).await?;
        }

        Ok(CrawlOutcome::Indexed { links_enqueued })
    }

    /// Mark the owning job completed once nothing keeps it open
    async fn maybe_finish_job(&self, job_id: Option<Uuid>) {
        let Some(job_id) = job_id else { return };

        match self.frontier.open_for_job(job_id).await {
            Ok(0) => {
                if let Err(e) = self.store.complete_job(job_id, JobStatus::Completed).await {
                    tracing::warn!(%job_id, error = %e, "Failed to complete job");
                } else {
                    tracing::info!(%job_id, "Crawl job completed");
                }
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(%job_id, error = %e, "Could not check job completion");
            }
        }
    }
}
