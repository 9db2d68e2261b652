//! In-process dispatch queue between the frontier pump and crawl handlers
//!
//! Claimed frontier records ride a bounded channel to the handler pool;
//! the bound backpressures the pump so a slow crawl never piles up claims.
//! State counters mirror a broker's waiting/active/completed/failed
//! counts for stats reporting. The frontier record itself stays the
//! durable source of truth throughout.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use uuid::Uuid;

/// One unit of crawl work: a claimed frontier record
#[derive(Debug, Clone)]
pub struct CrawlTask {
    pub record_id: Uuid,
    pub url: String,
    pub depth: i32,
    pub priority: i32,
    pub job_id: Option<Uuid>,
}

/// Broker-style state counters
#[derive(Debug, Default)]
pub struct QueueStats {
    waiting: AtomicU64,
    active: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
}

impl QueueStats {
    pub fn task_queued(&self) {
        self.waiting.fetch_add(1, Ordering::Relaxed);
    }

    pub fn task_started(&self) {
        self.waiting.fetch_sub(1, Ordering::Relaxed);
        self.active.fetch_add(1, Ordering::Relaxed);
    }

    pub fn task_finished(&self, success: bool) {
        self.active.fetch_sub(1, Ordering::Relaxed);
        if success {
            self.completed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            waiting: self.waiting.load(Ordering::Relaxed),
            active: self.active.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time queue state
#[derive(Debug, Clone, Copy, Default)]
pub struct QueueSnapshot {
    pub waiting: u64,
    pub active: u64,
    pub completed: u64,
    pub failed: u64,
}

impl std::fmt::Display for QueueSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "queue: {} waiting, {} active, {} completed, {} failed",
            self.waiting, self.active, self.completed, self.failed
        )
    }
}

/// Sending half used by the frontier pump
pub struct DispatchQueue {
    tx: mpsc::Sender<CrawlTask>,
    stats: Arc<QueueStats>,
}

impl DispatchQueue {
    /// Create a queue with the given capacity; the receiver goes to the
    /// handler pool
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<CrawlTask>, Arc<QueueStats>) {
        let (tx, rx) = mpsc::channel(capacity);
        let stats = Arc::new(QueueStats::default());
        (
            Self {
                tx,
                stats: Arc::clone(&stats),
            },
            rx,
            stats,
        )
    }

    /// Enqueue a task, waiting for capacity; returns false once the
    /// receiving side is gone
    pub async fn dispatch(&self, task: CrawlTask) -> bool {
        self.stats.task_queued();
        if self.tx.send(task).await.is_err() {
            // Receiver dropped during shutdown; undo the waiting count
            self.stats.waiting.fetch_sub(1, Ordering::Relaxed);
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(url: &str) -> CrawlTask {
        CrawlTask {
            record_id: Uuid::new_v4(),
            url: url.to_string(),
            depth: 0,
            priority: 5,
            job_id: None,
        }
    }

    #[tokio::test]
    async fn test_dispatch_and_receive() {
        let (queue, mut rx, stats) = DispatchQueue::new(4);

        assert!(queue.dispatch(task("https://example.com/a")).await);
        assert_eq!(stats.snapshot().waiting, 1);

        let received = rx.recv().await.unwrap();
        assert_eq!(received.url, "https://example.com/a");

        stats.task_started();
        stats.task_finished(true);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.waiting, 0);
        assert_eq!(snapshot.active, 0);
        assert_eq!(snapshot.completed, 1);
        assert_eq!(snapshot.failed, 0);
    }

    #[tokio::test]
    async fn test_dispatch_after_receiver_dropped() {
        let (queue, rx, stats) = DispatchQueue::new(1);
        drop(rx);

        assert!(!queue.dispatch(task("https://example.com/b")).await);
        assert_eq!(stats.snapshot().waiting, 0);
    }

    #[tokio::test]
    async fn test_failure_counts() {
        let (_queue, _rx, stats) = DispatchQueue::new(1);
        stats.task_queued();
        stats.task_started();
        stats.task_finished(false);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.failed, 1);
        assert_eq!(snapshot.completed, 0);
    }
}
