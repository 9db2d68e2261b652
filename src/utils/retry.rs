//! Exponential-backoff retry for transient failures
//!
//! Used where a second attempt is cheap and likely to help: index
//! submissions and metadata-store writes. Frontier-level retries (failed
//! URL records) are handled by the frontier's own attempts machinery, not
//! here.

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the first try
    pub max_retries: u32,

    /// Base delay in milliseconds for exponential backoff
    pub base_delay_ms: u64,

    /// Cap on the computed delay in milliseconds
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
        }
    }
}

impl RetryConfig {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let exponential = self.base_delay_ms.saturating_mul(1u64 << (attempt - 1).min(16));
        Duration::from_millis(exponential.min(self.max_delay_ms))
    }
}

/// Run `operation`, retrying recoverable errors with exponential backoff
///
/// Non-recoverable errors (see [`Error::is_recoverable`]) return
/// immediately; recoverable ones are retried up to `max_retries` times.
pub async fn with_retry<T, F, Fut>(config: &RetryConfig, operation: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_error = None;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let delay = config.delay_for(attempt);
            debug!(attempt, delay_ms = delay.as_millis() as u64, "Retrying operation");
            tokio::time::sleep(delay).await;
        }

        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    debug!(attempt, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if !e.is_recoverable() => {
                warn!(error = %e, "Non-retryable error");
                return Err(e);
            }
            Err(e) => {
                warn!(attempt, max_retries = config.max_retries, error = %e, "Operation failed");
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| Error::other("retry loop produced no error")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_success_first_attempt() {
        let config = RetryConfig::new(3);
        let result = with_retry(&config, || async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failures() {
        let config = RetryConfig::new(3);
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&attempts);

        let result = with_retry(&config, move || {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(Error::Pool("transient".into()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_recoverable_returns_immediately() {
        let config = RetryConfig::new(3);
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&attempts);

        let result: Result<()> = with_retry(&config, move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(Error::Policy("denied".into()))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_delay_progression() {
        let config = RetryConfig::default();
        assert_eq!(config.delay_for(0), Duration::ZERO);
        assert_eq!(config.delay_for(1), Duration::from_millis(1_000));
        assert_eq!(config.delay_for(2), Duration::from_millis(2_000));
        assert_eq!(config.delay_for(3), Duration::from_millis(4_000));
        // Capped
        assert_eq!(config.delay_for(10), Duration::from_millis(30_000));
    }
}
