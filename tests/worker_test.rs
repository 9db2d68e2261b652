//! Crawl-procedure integration tests
//!
//! These drive `CrawlContext::process` directly against a wiremock origin
//! and a no-op document sink, with the frontier and page store on a real
//! PostgreSQL instance (DATABASE_URL), so they are ignored by default.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use trawler::config::Config;
use trawler::error::Result;
use trawler::fetcher::PageFetcher;
use trawler::frontier::Frontier;
use trawler::index::{DocumentSink, SearchHit};
use trawler::limiter::RateLimiter;
use trawler::models::IndexedDocument;
use trawler::queue::CrawlTask;
use trawler::robots::RobotsCache;
use trawler::storage::{MetadataStore, PageUpsert};
use trawler::worker::{CrawlContext, CrawlOutcome};

/// Sink that only counts submissions
#[derive(Default)]
struct NullSink {
    indexed: AtomicUsize,
}

impl NullSink {
    fn indexed(&self) -> usize {
        self.indexed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentSink for NullSink {
    async fn ensure_index(&self) -> Result<()> {
        Ok(())
    }

    async fn index_document(&self, _doc: &IndexedDocument) -> Result<()> {
        self.indexed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn bulk_index(&self, docs: &[IndexedDocument]) -> Result<()> {
        self.indexed.fetch_add(docs.len(), Ordering::SeqCst);
        Ok(())
    }

    async fn search(&self, _query: &str, _k: usize) -> Result<Vec<SearchHit>> {
        Ok(Vec::new())
    }
}

struct Harness {
    ctx: CrawlContext,
    store: Arc<MetadataStore>,
    frontier: Arc<Frontier>,
    sink: Arc<NullSink>,
}

/// Wire a context whose only live dependency is PostgreSQL; robots are
/// disabled and pacing is zeroed so the tests stay fast
async fn harness() -> Harness {
    let mut config = Config::default();
    config.crawler.request_timeout_ms = 5_000;
    config.crawler.respect_robots_txt = false;
    config.crawler.delay_between_requests_ms = 0;
    if let Ok(url) = std::env::var("DATABASE_URL") {
        config.database.url = url;
    }

    let store = Arc::new(MetadataStore::connect(&config.database).await.unwrap());
    store.init_schema().await.unwrap();
    let frontier = Arc::new(Frontier::new(store.pool()));
    let robots = Arc::new(
        RobotsCache::new(None, &config.crawler.user_agent, false).unwrap(),
    );
    let limiter = Arc::new(RateLimiter::local_only(0));
    let fetcher = Arc::new(PageFetcher::new(&config.crawler).unwrap());
    let sink = Arc::new(NullSink::default());

    let ctx = CrawlContext::new(
        Arc::new(config),
        Arc::clone(&store),
        Arc::clone(&frontier),
        robots,
        limiter,
        fetcher,
        Arc::clone(&sink) as Arc<dyn DocumentSink>,
    );

    Harness {
        ctx,
        store,
        frontier,
        sink,
    }
}

fn page_with_links(links: &[(&str, &str)]) -> String {
    let anchors: String = links
        .iter()
        .map(|(href, text)| format!(r#"<p><a href="{href}">{text}</a></p>"#))
        .collect();
    format!("<html><head><title>Fixture</title></head><body>{anchors}</body></html>")
}

fn task_for(url: &str, depth: i32, job_id: Option<Uuid>) -> CrawlTask {
    CrawlTask {
        record_id: Uuid::new_v4(),
        url: url.to_string(),
        depth,
        priority: 100,
        job_id,
    }
}

#[tokio::test]
#[ignore = "Requires running PostgreSQL"]
async fn test_depth_limit_stops_expansion() {
    let server = MockServer::start().await;
    let run = Uuid::new_v4();
    let harness = harness().await;

    // Seed page links to three children; each child links one level deeper
    let seed_path = format!("/p/{run}/seed");
    let child_paths: Vec<String> = ["a", "b", "c"]
        .iter()
        .map(|leaf| format!("/p/{run}/{leaf}"))
        .collect();
    let deep_path = format!("/p/{run}/deep");

    let seed_links: Vec<(String, String)> = child_paths
        .iter()
        .map(|p| (p.clone(), format!("Child {p}")))
        .collect();
    let seed_body = page_with_links(
        &seed_links
            .iter()
            .map(|(h, t)| (h.as_str(), t.as_str()))
            .collect::<Vec<_>>(),
    );

    Mock::given(method("GET"))
        .and(path(seed_path.clone()))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(seed_body)
                .insert_header("content-type", "text/html"),
        )
        .mount(&server)
        .await;

    for child in &child_paths {
        Mock::given(method("GET"))
            .and(path(child.clone()))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(page_with_links(&[(deep_path.as_str(), "Deeper")]))
                    .insert_header("content-type", "text/html"),
            )
            .mount(&server)
            .await;
    }

    // The deeper page must never be fetched or enqueued
    Mock::given(method("GET"))
        .and(path(deep_path.clone()))
        .respond_with(ResponseTemplate::new(200).set_body_string("too deep"))
        .expect(0)
        .mount(&server)
        .await;

    let seed_url = format!("{}{}", server.uri(), seed_path);
    let job = harness
        .store
        .create_job(&seed_url, 1, &[], 100)
        .await
        .unwrap();

    // Depth 0 seed expands into exactly its three links
    let outcome = harness
        .ctx
        .process(&task_for(&seed_url, 0, Some(job.id)))
        .await
        .unwrap();
    assert_eq!(outcome, CrawlOutcome::Indexed { links_enqueued: 3 });
    assert_eq!(harness.sink.indexed(), 1);

    let claimed = harness.frontier.claim_batch(100).await.unwrap();
    let children: Vec<_> = claimed
        .iter()
        .filter(|r| r.url.contains(&format!("/p/{run}/")))
        .collect();
    assert_eq!(children.len(), 3);
    assert!(children.iter().all(|r| r.depth == 1));

    // Depth 1 children sit at the ceiling: crawled, but none of their
    // descendants are enqueued
    for child in &children {
        let outcome = harness
            .ctx
            .process(&task_for(&child.url, child.depth, Some(job.id)))
            .await
            .unwrap();
        assert_eq!(outcome, CrawlOutcome::Indexed { links_enqueued: 0 });
    }

    let leftover = harness.frontier.claim_batch(100).await.unwrap();
    assert!(!leftover.iter().any(|r| r.url.ends_with(&deep_path)));
}

#[tokio::test]
#[ignore = "Requires running PostgreSQL"]
async fn test_recency_window_skips_without_fetching() {
    let server = MockServer::start().await;
    let run = Uuid::new_v4();
    let harness = harness().await;

    let page_path = format!("/p/{run}/fresh");
    let page_url = format!("{}{}", server.uri(), page_path);

    // A fresh page record puts the URL inside the recency window
    harness
        .store
        .upsert_page(&PageUpsert {
            url: page_url.clone(),
            title: Some("Fresh".into()),
            content_hash: "f".repeat(64),
            last_modified: None,
            status_code: 200,
            content_type: "text/html".into(),
            word_count: 1,
            domain: "127.0.0.1".into(),
        })
        .await
        .unwrap();

    // The skip must happen before any network traffic
    Mock::given(method("GET"))
        .and(path(page_path.clone()))
        .respond_with(ResponseTemplate::new(200).set_body_string("should not be fetched"))
        .expect(0)
        .mount(&server)
        .await;

    let outcome = harness
        .ctx
        .process(&task_for(&page_url, 0, None))
        .await
        .unwrap();

    assert_eq!(outcome, CrawlOutcome::Skipped);
    assert_eq!(harness.sink.indexed(), 0);
}
