//! robots.txt acquisition, parsing, and two-tier caching
//!
//! Lookup order per host: in-process map (24 h TTL), then the persisted
//! `robots_cache` table, then a live fetch of `https://{host}/robots.txt`.
//! 404s and DNS failures mean "no restrictions" and are cached; 5xx and
//! other network errors are permissive for the current call only so a
//! flapping origin cannot poison the cache. The whole subsystem fails
//! open: any internal error yields `{allowed: true, delay: 1}`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use robotstxt::DefaultMatcher;

use crate::error::Result;
use crate::metrics;
use crate::storage::MetadataStore;
use crate::url_utils;

/// Verdict of a robots check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrawlDecision {
    pub allowed: bool,
    /// Crawl delay in seconds the caller should honor
    pub delay_secs: u64,
}

#[derive(Debug, Clone)]
struct CachedPolicy {
    /// Raw robots.txt body; empty means no restrictions
    body: String,
    delay_secs: u64,
    fetched_at: chrono::DateTime<Utc>,
}

const ROBOTS_FETCH_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_DELAY_SECS: u64 = 1;

/// Two-tier robots policy cache
pub struct RobotsCache {
    /// Durable tier; absent in unit-test setups, where only the memory
    /// tier and live fetches are exercised
    store: Option<Arc<MetadataStore>>,
    http: reqwest::Client,
    memory: DashMap<String, CachedPolicy>,
    user_agent: String,
    enabled: bool,
    ttl: chrono::Duration,

    /// Base URL override for tests against a mock server
    base_url: Option<String>,
}

impl RobotsCache {
    pub fn new(
        store: Option<Arc<MetadataStore>>,
        user_agent: &str,
        enabled: bool,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(ROBOTS_FETCH_TIMEOUT)
            .user_agent(user_agent)
            .build()
            .map_err(crate::error::Error::Http)?;

        Ok(Self {
            store,
            http,
            memory: DashMap::new(),
            user_agent: user_agent.to_string(),
            enabled,
            ttl: chrono::Duration::hours(24),
            base_url: None,
        })
    }

    /// Point robots fetches at a mock server instead of `https://{host}`
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = Some(base_url.trim_end_matches('/').to_string());
        self
    }

    /// Top-level robots check for a URL
    ///
    /// Disabled by configuration: `{true, 0}`. Internal errors: fail open
    /// with `{true, 1}` — politeness degrades, the pipeline never wedges.
    pub async fn can_crawl(&self, url: &str) -> CrawlDecision {
        if !self.enabled {
            return CrawlDecision {
                allowed: true,
                delay_secs: 0,
            };
        }

        match self.decide(url).await {
            Ok(decision) => decision,
            Err(e) => {
                tracing::warn!(url, error = %e, "Robots check failed; failing open");
                CrawlDecision {
                    allowed: true,
                    delay_secs: DEFAULT_DELAY_SECS,
                }
            }
        }
    }

    async fn decide(&self, url: &str) -> Result<CrawlDecision> {
        let host = match url_utils::extract_host(url) {
            Some(h) => h,
            None => {
                return Ok(CrawlDecision {
                    allowed: true,
                    delay_secs: DEFAULT_DELAY_SECS,
                })
            }
        };

        let policy = self.policy_for(&host).await?;

        let allowed = policy.body.is_empty()
            || DefaultMatcher::default().one_agent_allowed_by_robots(
                &policy.body,
                &self.user_agent,
                url,
            );

        Ok(CrawlDecision {
            allowed,
            delay_secs: policy.delay_secs,
        })
    }

    async fn policy_for(&self, host: &str) -> Result<CachedPolicy> {
        let now = Utc::now();

        if let Some(entry) = self.memory.get(host) {
            if now - entry.fetched_at < self.ttl {
                metrics::record_robots_lookup("memory");
                return Ok(entry.clone());
            }
        }

        if let Some(store) = &self.store {
            if let Some(record) = store.get_robots(host).await? {
                if now - record.last_updated < self.ttl {
                    metrics::record_robots_lookup("store");
                    let policy = CachedPolicy {
                        body: record.robots_txt,
                        delay_secs: record.crawl_delay.max(0) as u64,
                        fetched_at: record.last_updated,
                    };
                    self.memory.insert(host.to_string(), policy.clone());
                    return Ok(policy);
                }
            }
        }

        self.fetch_policy(host).await
    }

    async fn fetch_policy(&self, host: &str) -> Result<CachedPolicy> {
        let robots_url = match &self.base_url {
            Some(base) => format!("{base}/robots.txt"),
            None => format!("https://{host}/robots.txt"),
        };

        metrics::record_robots_lookup("fetch");

        match self.http.get(&robots_url).send().await {
            Ok(resp) => {
                let status = resp.status().as_u16();
                if status < 400 {
                    let body = resp.text().await.unwrap_or_default();
                    let delay = parse_crawl_delay(&body, &self.user_agent)
                        .unwrap_or(DEFAULT_DELAY_SECS);
                    Ok(self.cache_policy(host, body, delay).await)
                } else if status < 500 {
                    // No robots file means no restrictions
                    tracing::debug!(host, status, "robots.txt unavailable; treating as permissive");
                    Ok(self.cache_policy(host, String::new(), DEFAULT_DELAY_SECS).await)
                } else {
                    // Origin trouble: permissive now, but retry next time
                    tracing::debug!(host, status, "robots.txt server error; permissive, uncached");
                    metrics::record_robots_lookup("permissive");
                    Ok(CachedPolicy {
                        body: String::new(),
                        delay_secs: DEFAULT_DELAY_SECS,
                        fetched_at: Utc::now(),
                    })
                }
            }
            Err(e) if e.is_connect() => {
                // Host does not resolve or refuses connections; nothing to
                // obey, cache the permissive verdict
                tracing::debug!(host, error = %e, "robots.txt unreachable; treating as permissive");
                Ok(self.cache_policy(host, String::new(), DEFAULT_DELAY_SECS).await)
            }
            Err(e) => {
                tracing::debug!(host, error = %e, "robots.txt fetch failed; permissive, uncached");
                metrics::record_robots_lookup("permissive");
                Ok(CachedPolicy {
                    body: String::new(),
                    delay_secs: DEFAULT_DELAY_SECS,
                    fetched_at: Utc::now(),
                })
            }
        }
    }

    async fn cache_policy(&self, host: &str, body: String, delay_secs: u64) -> CachedPolicy {
        let policy = CachedPolicy {
            body,
            delay_secs,
            fetched_at: Utc::now(),
        };

        self.memory.insert(host.to_string(), policy.clone());

        if let Some(store) = &self.store {
            if let Err(e) = store
                .upsert_robots(host, &policy.body, policy.delay_secs as i32)
                .await
            {
                tracing::warn!(host, error = %e, "Failed to persist robots policy");
            }
        }

        policy
    }
}

/// Parse the Crawl-delay directive for a user agent from a robots.txt body
///
/// Walks agent groups line by line; a group matches on `*` or a
/// case-insensitive agent-name substring. A delay from a group naming the
/// agent takes precedence over one from the wildcard group. Fractional
/// delays are rounded up.
pub fn parse_crawl_delay(robots_txt: &str, user_agent: &str) -> Option<u64> {
    #[derive(Clone, Copy, PartialEq)]
    enum Group {
        None,
        Wildcard,
        Specific,
    }

    let mut group = Group::None;
    let mut wildcard_delay = None;
    let mut specific_delay = None;
    let agent_lower = user_agent.to_lowercase();

    for line in robots_txt.lines() {
        let line = line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }

        if let Some(agent) = strip_directive(line, "user-agent") {
            group = if agent == "*" {
                Group::Wildcard
            } else if agent_lower.contains(&agent.to_lowercase()) {
                Group::Specific
            } else {
                Group::None
            };
        } else if group != Group::None {
            if let Some(value) = strip_directive(line, "crawl-delay") {
                if let Ok(secs) = value.parse::<f64>() {
                    if secs >= 0.0 {
                        let delay = Some(secs.ceil() as u64);
                        match group {
                            Group::Specific => specific_delay = delay,
                            Group::Wildcard => wildcard_delay = delay,
                            Group::None => {}
                        }
                    }
                }
            }
        }
    }

    specific_delay.or(wildcard_delay)
}

fn strip_directive<'a>(line: &'a str, name: &str) -> Option<&'a str> {
    let (key, value) = line.split_once(':')?;
    if key.trim().eq_ignore_ascii_case(name) {
        Some(value.trim())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_crawl_delay_wildcard() {
        let body = "User-agent: *\nCrawl-delay: 5\nDisallow: /private/";
        assert_eq!(parse_crawl_delay(body, "trawler/0.3"), Some(5));
    }

    #[test]
    fn test_parse_crawl_delay_fractional_rounds_up() {
        let body = "User-agent: *\nCrawl-delay: 2.5";
        assert_eq!(parse_crawl_delay(body, "trawler/0.3"), Some(3));
    }

    #[test]
    fn test_parse_crawl_delay_specific_agent_wins() {
        let body = "User-agent: trawler\nCrawl-delay: 7\n\nUser-agent: *\nCrawl-delay: 1";
        assert_eq!(parse_crawl_delay(body, "trawler/0.3"), Some(7));
        assert_eq!(parse_crawl_delay(body, "otherbot"), Some(1));
    }

    #[test]
    fn test_parse_crawl_delay_absent() {
        let body = "User-agent: *\nDisallow: /admin/";
        assert_eq!(parse_crawl_delay(body, "trawler/0.3"), None);
    }

    #[test]
    fn test_parse_crawl_delay_ignores_comments() {
        let body = "User-agent: * # everyone\nCrawl-delay: 4 # seconds";
        assert_eq!(parse_crawl_delay(body, "trawler/0.3"), Some(4));
    }

    #[test]
    fn test_matcher_disallow() {
        let body = "User-agent: *\nDisallow: /private/";
        let mut matcher = DefaultMatcher::default();
        assert!(!matcher.one_agent_allowed_by_robots(
            body,
            "trawler/0.3",
            "https://example.com/private/x"
        ));
        let mut matcher = DefaultMatcher::default();
        assert!(matcher.one_agent_allowed_by_robots(
            body,
            "trawler/0.3",
            "https://example.com/public"
        ));
    }

    #[tokio::test]
    async fn test_disabled_robots_allows_with_zero_delay() {
        let cache = RobotsCache::new(None, "trawler/0.3", false).unwrap();
        let decision = cache.can_crawl("https://example.com/anything").await;
        assert!(decision.allowed);
        assert_eq!(decision.delay_secs, 0);
    }

    #[tokio::test]
    async fn test_invalid_url_fails_open() {
        let cache = RobotsCache::new(None, "trawler/0.3", true).unwrap();
        let decision = cache.can_crawl("not a url").await;
        assert!(decision.allowed);
        assert_eq!(decision.delay_secs, 1);
    }
}
