//! Per-host rate limiting shared across worker processes
//!
//! State per host is a last-request timestamp and a delay, kept in Redis
//! under 1 h TTL keys so idle hosts age out, with a process-local floor
//! map that guarantees the within-process spacing bound even when the
//! backend is unreachable. The limiter is advisory: read-update races
//! between processes can briefly exceed 1/delay requests per second, and
//! no distributed lock is taken. Any backend error degrades to the
//! default delay — the limiter must never wedge a worker.

use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use deadpool_redis::{Config as PoolConfig, Pool, Runtime};
use redis::AsyncCommands;

use crate::config::RedisConfig;
use crate::metrics;

const KEY_TTL_SECS: u64 = 3_600;

#[derive(Debug, Clone, Copy)]
struct HostPace {
    last_request_ms: i64,
    delay_ms: u64,
}

/// Shared per-host minimum-spacing limiter
pub struct RateLimiter {
    /// Cross-process tier; `None` runs the limiter process-local only
    pool: Option<Pool>,

    /// Process-local floor: consulted alongside Redis, authoritative when
    /// Redis is down
    local: DashMap<String, HostPace>,

    default_delay_ms: u64,
    key_prefix: String,
}

impl RateLimiter {
    /// Connect to Redis; degrade to process-local limiting if unreachable
    pub async fn connect(config: &RedisConfig, default_delay_ms: u64) -> Self {
        let pool = match Self::try_pool(config).await {
            Ok(pool) => {
                tracing::info!(url = %config.url, "Connected to Redis rate-limiter state");
                Some(pool)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Redis unavailable; rate limiting is process-local");
                None
            }
        };

        Self {
            pool,
            local: DashMap::new(),
            default_delay_ms,
            key_prefix: config.key_prefix.clone(),
        }
    }

    /// Process-local limiter with no shared backend
    pub fn local_only(default_delay_ms: u64) -> Self {
        Self {
            pool: None,
            local: DashMap::new(),
            default_delay_ms,
            key_prefix: String::from("trawler"),
        }
    }

    async fn try_pool(config: &RedisConfig) -> Result<Pool, String> {
        let pool = PoolConfig::from_url(&config.url)
            .builder()
            .map_err(|e| e.to_string())?
            .max_size(config.pool_size)
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| e.to_string())?;

        let mut conn = pool.get().await.map_err(|e| e.to_string())?;
        let _: String = redis::cmd("PING")
            .query_async(&mut *conn)
            .await
            .map_err(|e| e.to_string())?;

        Ok(pool)
    }

    fn last_key(&self, host: &str) -> String {
        format!("{}:rl:last:{}", self.key_prefix, host)
    }

    fn delay_key(&self, host: &str) -> String {
        format!("{}:rl:delay:{}", self.key_prefix, host)
    }

    /// Override the minimum delay for a host (robots crawl-delay in ms)
    pub async fn set_delay(&self, host: &str, delay_ms: u64) {
        self.local
            .entry(host.to_string())
            .and_modify(|pace| pace.delay_ms = delay_ms)
            .or_insert(HostPace {
                last_request_ms: 0,
                delay_ms,
            });

        if let Some(pool) = &self.pool {
            if let Ok(mut conn) = pool.get().await {
                let result: redis::RedisResult<()> = conn
                    .set_ex(self.delay_key(host), delay_ms, KEY_TTL_SECS)
                    .await;
                if let Err(e) = result {
                    tracing::debug!(host, error = %e, "Failed to publish host delay");
                }
            }
        }
    }

    /// Sleep until the host's minimum inter-request spacing is satisfied,
    /// then stamp the request time
    ///
    /// Between two successful calls for the same host within one process,
    /// the second returns no earlier than the configured delay after the
    /// first. Cross-process spacing is best-effort through Redis.
    pub async fn wait(&self, host: &str) {
        let (shared_last, shared_delay) = self.read_shared(host).await;

        let local = self.local.get(host).map(|p| *p);
        let delay_ms = shared_delay
            .or(local.map(|p| p.delay_ms))
            .unwrap_or(self.default_delay_ms);

        let last_ms = match (shared_last, local.map(|p| p.last_request_ms)) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        }
        .filter(|ms| *ms > 0);

        if let Some(last_ms) = last_ms {
            let now_ms = Utc::now().timestamp_millis();
            let elapsed = now_ms.saturating_sub(last_ms);
            if elapsed >= 0 && (elapsed as u64) < delay_ms {
                let sleep_ms = delay_ms - elapsed as u64;
                metrics::RATE_LIMIT_WAIT.observe(sleep_ms as f64 / 1000.0);
                tokio::time::sleep(Duration::from_millis(sleep_ms)).await;
            } else {
                metrics::RATE_LIMIT_WAIT.observe(0.0);
            }
        }

        let stamp = Utc::now().timestamp_millis();
        self.local
            .entry(host.to_string())
            .and_modify(|pace| pace.last_request_ms = stamp)
            .or_insert(HostPace {
                last_request_ms: stamp,
                delay_ms,
            });

        if let Some(pool) = &self.pool {
            if let Ok(mut conn) = pool.get().await {
                let result: redis::RedisResult<()> =
                    conn.set_ex(self.last_key(host), stamp, KEY_TTL_SECS).await;
                if let Err(e) = result {
                    tracing::debug!(host, error = %e, "Failed to publish request timestamp");
                }
            }
        }
    }

    /// Read shared state, tolerating any backend failure
    async fn read_shared(&self, host: &str) -> (Option<i64>, Option<u64>) {
        let Some(pool) = &self.pool else {
            return (None, None);
        };

        let mut conn = match pool.get().await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::debug!(host, error = %e, "Rate-limit backend unavailable");
                return (None, None);
            }
        };

        let last: Option<i64> = conn.get(self.last_key(host)).await.unwrap_or(None);
        let delay: Option<u64> = conn.get(self.delay_key(host)).await.unwrap_or(None);
        (last, delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn test_consecutive_waits_are_spaced() {
        let limiter = RateLimiter::local_only(200);

        let start = Instant::now();
        limiter.wait("example.com").await;
        limiter.wait("example.com").await;
        let elapsed = start.elapsed();

        // First wait is free; the second must honor the 200 ms spacing
        assert!(
            elapsed >= Duration::from_millis(190),
            "waits completed too fast: {elapsed:?}"
        );
    }

    #[tokio::test]
    async fn test_first_wait_returns_immediately() {
        let limiter = RateLimiter::local_only(1_000);

        let start = Instant::now();
        limiter.wait("fresh-host.example").await;
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_hosts_are_independent() {
        let limiter = RateLimiter::local_only(500);

        limiter.wait("a.example").await;
        let start = Instant::now();
        limiter.wait("b.example").await;
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_set_delay_overrides_default() {
        let limiter = RateLimiter::local_only(5_000);
        limiter.set_delay("quick.example", 100).await;

        let start = Instant::now();
        limiter.wait("quick.example").await;
        limiter.wait("quick.example").await;
        let elapsed = start.elapsed();

        assert!(elapsed >= Duration::from_millis(90));
        assert!(elapsed < Duration::from_millis(2_000));
    }

    #[tokio::test]
    async fn test_zero_delay_does_not_sleep() {
        let limiter = RateLimiter::local_only(0);

        let start = Instant::now();
        limiter.wait("free.example").await;
        limiter.wait("free.example").await;
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    // Cross-process behavior needs a live backend
    #[tokio::test]
    #[ignore = "Requires running Redis"]
    async fn test_shared_state_round_trip() {
        let config = RedisConfig::default();
        let limiter = RateLimiter::connect(&config, 1_000).await;
        assert!(limiter.pool.is_some());

        limiter.set_delay("shared.example", 250).await;
        limiter.wait("shared.example").await;
        limiter.wait("shared.example").await;
    }
}
