//! Shared fixtures for integration tests

#![allow(dead_code)]

use trawler::config::CrawlerConfig;

/// A representative article page exercising every extraction rule
pub fn article_html() -> String {
    let body: String = "Breadth-first traversal of the reachable web. ".repeat(10);
    format!(
        r##"<!DOCTYPE html>
<html lang="en-US">
<head>
    <title>Crawling the Web</title>
    <meta name="description" content="Notes on polite distributed crawling.">
    <meta name="keywords" content="crawler, rust, io, distributed systems, crawler">
    <meta property="og:title" content="OG Crawling the Web">
    <meta property="og:locale" content="en_US">
    <meta name="twitter:card" content="summary">
</head>
<body>
    <nav><a href="/nav-link">Navigation</a></nav>
    <div class="sidebar">sidebar junk</div>
    <article itemtype="https://schema.org/Article">
        <h1>Crawling the Web</h1>
        <p>{body}</p>
        <a href="/guide" title="The guide">Crawl guide</a>
        <a href="https://other.example/reference">External reference</a>
        <a href="mailto:team@example.com">Mail us</a>
        <a href="#top">Back to top</a>
    </article>
    <footer>footer junk</footer>
    <script>console.log("analytics");</script>
</body>
</html>"##
    )
}

/// Crawler config pointed at defaults but cheap enough for tests
pub fn test_crawler_config() -> CrawlerConfig {
    CrawlerConfig {
        request_timeout_ms: 5_000,
        render_wait_ms: 100,
        ..Default::default()
    }
}
