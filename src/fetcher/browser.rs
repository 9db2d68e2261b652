//! Headless-browser rendering for the fetcher's fallback phase
//!
//! The browser process is shared by all handlers in the worker and
//! launched lazily on the first render; concurrent handlers open
//! independent pages from it. Image, stylesheet, font, and media
//! subresources are blocked to keep renders cheap.

use std::time::Duration;

use anyhow::{Context, Result};
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams, SetBlockedUrLsParams, SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::sync::Mutex;

/// URL patterns whose requests are dropped before they hit the network
const BLOCKED_RESOURCE_PATTERNS: &[&str] = &[
    "*.png", "*.jpg", "*.jpeg", "*.gif", "*.webp", "*.svg", "*.ico", "*.css", "*.woff",
    "*.woff2", "*.ttf", "*.otf", "*.mp4", "*.webm", "*.mp3", "*.ogg", "*.avi",
];

/// Script that resolves once the DOM is ready, bounded by its own timeout
const DOM_READY_SCRIPT: &str = r#"
    new Promise((resolve) => {
        if (document.readyState === 'complete' || document.readyState === 'interactive') {
            resolve(document.readyState);
        } else {
            document.addEventListener('DOMContentLoaded', () => resolve(document.readyState));
            setTimeout(() => resolve('timeout'), 10000);
        }
    })
"#;

/// Lazily initialized shared browser
pub struct BrowserFetcher {
    inner: Mutex<Option<Browser>>,
    user_agent: String,
    timeout: Duration,
}

impl BrowserFetcher {
    pub fn new(user_agent: &str, timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(None),
            user_agent: user_agent.to_string(),
            timeout,
        }
    }

    /// Render a URL and return the resulting HTML
    ///
    /// Navigates with a DOM-ready wait condition, then waits `extra_wait`
    /// more for late script mutations before snapshotting the document.
    pub async fn render(&self, url: &str, extra_wait: Duration) -> Result<String> {
        let page = {
            let mut guard = self.inner.lock().await;
            if guard.is_none() {
                *guard = Some(Self::launch().await?);
            }
            let browser = guard.as_ref().expect("browser just initialized");
            browser
                .new_page("about:blank")
                .await
                .context("failed to open browser page")?
        };

        let result = self.render_on(&page, url, extra_wait).await;
        let _ = page.close().await;
        result
    }

    async fn render_on(&self, page: &Page, url: &str, extra_wait: Duration) -> Result<String> {
        page.execute(SetUserAgentOverrideParams::new(self.user_agent.clone()))
            .await
            .context("failed to set user agent")?;

        page.execute(EnableParams::default())
            .await
            .context("failed to enable network domain")?;

        let blocked: Vec<String> = BLOCKED_RESOURCE_PATTERNS
            .iter()
            .map(|p| p.to_string())
            .collect();
        let block = SetBlockedUrLsParams::builder()
            .urls(blocked)
            .build()
            .map_err(|e| anyhow::anyhow!("invalid block list: {e}"))?;
        page.execute(block)
            .await
            .context("failed to block subresources")?;

        let nav = NavigateParams::builder()
            .url(url)
            .build()
            .map_err(|e| anyhow::anyhow!("invalid navigation target: {e}"))?;

        tokio::time::timeout(self.timeout, page.execute(nav))
            .await
            .map_err(|_| anyhow::anyhow!("navigation timed out after {:?} for {url}", self.timeout))?
            .with_context(|| format!("navigation failed for {url}"))?;

        // Wait for DOMContentLoaded; the script bounds itself so a broken
        // page cannot hold the handler
        let _ = tokio::time::timeout(self.timeout, page.evaluate(DOM_READY_SCRIPT.to_string())).await;

        tokio::time::sleep(extra_wait).await;

        page.content().await.context("failed to read rendered document")
    }

    async fn launch() -> Result<Browser> {
        let config = BrowserConfig::builder()
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-background-networking")
            .arg("--disable-sync")
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch headless browser")?;

        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        tracing::info!("Headless browser launched");
        Ok(browser)
    }

    /// Close the browser process if it was ever launched
    pub async fn shutdown(&self) {
        let mut guard = self.inner.lock().await;
        if let Some(mut browser) = guard.take() {
            if let Err(e) = browser.close().await {
                tracing::debug!(error = %e, "Browser close reported an error");
            }
            let _ = browser.wait().await;
            tracing::info!("Headless browser shut down");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shutdown_without_launch_is_noop() {
        let fetcher = BrowserFetcher::new("trawler/0.3", Duration::from_secs(30));
        fetcher.shutdown().await;
    }

    #[test]
    fn test_blocked_patterns_cover_subresource_classes() {
        let joined = BLOCKED_RESOURCE_PATTERNS.join(" ");
        for class in ["png", "css", "woff", "mp4"] {
            assert!(joined.contains(class), "missing pattern for {class}");
        }
    }

    // Rendering needs a local Chrome/Chromium binary
    #[tokio::test]
    #[ignore = "Requires a local Chromium installation"]
    async fn test_render_real_page() {
        let fetcher = BrowserFetcher::new("trawler/0.3", Duration::from_secs(30));
        let html = fetcher
            .render("https://example.com", Duration::from_millis(500))
            .await
            .unwrap();
        assert!(html.contains("<html"));
        fetcher.shutdown().await;
    }
}
