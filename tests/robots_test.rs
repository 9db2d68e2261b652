//! Integration tests for robots acquisition and caching using wiremock
//!
//! The cache runs without its durable tier here; these tests exercise the
//! fetch rules (status handling, crawl-delay) and the in-process tier.

use trawler::robots::RobotsCache;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const AGENT: &str = "trawler/0.3";

fn cache_for(server: &MockServer) -> RobotsCache {
    RobotsCache::new(None, AGENT, true)
        .unwrap()
        .with_base_url(&server.uri())
}

#[tokio::test]
async fn test_disallowed_path_is_refused() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("User-agent: *\nDisallow: /private/"),
        )
        .mount(&server)
        .await;

    let cache = cache_for(&server);

    let private = cache
        .can_crawl(&format!("{}/private/x", server.uri()))
        .await;
    assert!(!private.allowed);

    let public = cache.can_crawl(&format!("{}/public", server.uri())).await;
    assert!(public.allowed);
}

#[tokio::test]
async fn test_crawl_delay_surfaces_in_decision() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("User-agent: *\nCrawl-delay: 5\nDisallow: /admin/"),
        )
        .mount(&server)
        .await;

    let cache = cache_for(&server);
    let decision = cache.can_crawl(&format!("{}/page", server.uri())).await;

    assert!(decision.allowed);
    assert_eq!(decision.delay_secs, 5);
}

#[tokio::test]
async fn test_missing_robots_is_permissive_and_cached() {
    let server = MockServer::start().await;

    // expect(1): the permissive verdict for a 404 must be cached, so the
    // second lookup never refetches
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let cache = cache_for(&server);

    let first = cache.can_crawl(&format!("{}/a", server.uri())).await;
    assert!(first.allowed);
    assert_eq!(first.delay_secs, 1);

    let second = cache.can_crawl(&format!("{}/b", server.uri())).await;
    assert!(second.allowed);
}

#[tokio::test]
async fn test_server_error_is_permissive_but_not_cached() {
    let server = MockServer::start().await;

    // expect(2): a 5xx must not poison the cache, so both lookups fetch
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;

    let cache = cache_for(&server);

    assert!(cache.can_crawl(&format!("{}/a", server.uri())).await.allowed);
    assert!(cache.can_crawl(&format!("{}/b", server.uri())).await.allowed);
}

#[tokio::test]
async fn test_policy_body_cached_in_memory() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("User-agent: *\nDisallow: /private/"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let cache = cache_for(&server);

    for _ in 0..3 {
        let decision = cache
            .can_crawl(&format!("{}/private/x", server.uri()))
            .await;
        assert!(!decision.allowed);
    }
}

#[tokio::test]
async fn test_disabled_robots_never_fetches() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /"))
        .expect(0)
        .mount(&server)
        .await;

    let cache = RobotsCache::new(None, AGENT, false)
        .unwrap()
        .with_base_url(&server.uri());

    let decision = cache.can_crawl(&format!("{}/anything", server.uri())).await;
    assert!(decision.allowed);
    assert_eq!(decision.delay_secs, 0);
}
