//! Durable URL frontier
//!
//! The frontier is the source of truth for traversal state: a
//! priority-ordered, retry-aware queue in the `url_queue` table. Claiming
//! marks records `processing` and increments attempts in one atomic
//! statement; `complete` is the only writer of terminal statuses. A
//! worker-local set of recently enqueued URLs short-circuits duplicate
//! inserts within a session — the table's unique constraint remains the
//! correctness barrier.

use std::collections::HashSet;
use std::sync::Mutex;

use deadpool_postgres::Pool;
use uuid::Uuid;

use crate::error::Result;
use crate::metrics;
use crate::models::{UrlRecord, UrlStatus};

/// Result of an enqueue attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// A new record was inserted
    Added,
    /// The URL is already in the frontier; silently ignored
    Duplicate,
}

/// Terminal disposition of a claimed record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlOutcome {
    Completed,
    /// Failed; retryable failures stay eligible for rescheduling,
    /// non-retryable ones have their attempts forced to the cap
    Failed { retryable: bool },
}

/// Frontier counts by status
#[derive(Debug, Clone, Default)]
pub struct FrontierStats {
    pub pending: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
}

impl std::fmt::Display for FrontierStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "frontier: {} pending, {} processing, {} completed, {} failed",
            self.pending, self.processing, self.completed, self.failed
        )
    }
}

const MAX_ATTEMPTS: i32 = 3;
const RECENT_SET_CAP: usize = 10_000;

/// Durable, priority-ordered, retry-aware URL queue
pub struct Frontier {
    pool: Pool,

    /// Session-local fast reject for duplicate enqueues; rebuilt empty on
    /// worker start, never synchronized across workers
    recent: Mutex<HashSet<String>>,
}

impl Frontier {
    pub fn new(pool: Pool) -> Self {
        Self {
            pool,
            recent: Mutex::new(HashSet::with_capacity(RECENT_SET_CAP)),
        }
    }

    /// Insert a normalized URL as a pending record
    ///
    /// A second insertion of the same URL is a silent no-op, never a
    /// conflict error.
    pub async fn enqueue(
        &self,
        url: &str,
        parent_url: Option<&str>,
        depth: i32,
        priority: i32,
        job_id: Option<Uuid>,
    ) -> Result<EnqueueOutcome> {
        if self.recently_seen(url) {
            metrics::record_enqueue("duplicate");
            return Ok(EnqueueOutcome::Duplicate);
        }

        let client = self.pool.get().await?;
        let inserted = client
            .execute(
                r#"
                INSERT INTO url_queue
                    (id, url, parent_url, depth, priority, job_id, status, attempts)
                VALUES ($1, $2, $3, $4, $5, $6, 'pending', 0)
                ON CONFLICT (url) DO NOTHING
                "#,
                &[&Uuid::new_v4(), &url, &parent_url, &depth, &priority, &job_id],
            )
            .await?;

        self.remember(url);

        if inserted == 1 {
            metrics::record_enqueue("added");
            Ok(EnqueueOutcome::Added)
        } else {
            metrics::record_enqueue("duplicate");
            Ok(EnqueueOutcome::Duplicate)
        }
    }

    /// Atomically claim up to `n` eligible records
    ///
    /// Eligible: pending, due (`scheduled_at <= now`), attempts below the
    /// cap. Ordered by priority descending, then insertion time. The claim
    /// marks records `processing`, stamps `scheduled_at` with the claim
    /// time (the anchor for stall recovery), and increments attempts — all
    /// in the same statement, so no record is ever `processing` without a
    /// matching attempts increment.
    pub async fn claim_batch(&self, n: i64) -> Result<Vec<UrlRecord>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                r#"
                UPDATE url_queue
                SET status = 'processing', attempts = attempts + 1, scheduled_at = NOW()
                WHERE id IN (
                    SELECT id FROM url_queue
                    WHERE status = 'pending'
                      AND scheduled_at <= NOW()
                      AND attempts < $2
                    ORDER BY priority DESC, created_at ASC
                    LIMIT $1
                    FOR UPDATE SKIP LOCKED
                )
                RETURNING id, url, parent_url, depth, priority, job_id, status,
                          attempts, created_at, scheduled_at, error_message
                "#,
                &[&n, &MAX_ATTEMPTS],
            )
            .await?;

        let records: Vec<UrlRecord> = rows
            .into_iter()
            .map(|row| {
                let status: String = row.get(6);
                UrlRecord {
                    id: row.get(0),
                    url: row.get(1),
                    parent_url: row.get(2),
                    depth: row.get(3),
                    priority: row.get(4),
                    job_id: row.get(5),
                    status: UrlStatus::parse(&status).unwrap_or(UrlStatus::Processing),
                    attempts: row.get(7),
                    created_at: row.get(8),
                    scheduled_at: row.get(9),
                    error_message: row.get(10),
                }
            })
            .collect();

        metrics::FRONTIER_CLAIMED.inc_by(records.len() as f64);
        Ok(records)
    }

    /// Move a claimed record to its terminal status
    ///
    /// This is the only path that writes terminal URL statuses, keyed by
    /// record id. Non-retryable failures have attempts forced to the cap
    /// so `reschedule_failed` never resurrects them.
    pub async fn complete(
        &self,
        id: Uuid,
        outcome: UrlOutcome,
        error_message: Option<&str>,
    ) -> Result<()> {
        let client = self.pool.get().await?;

        match outcome {
            UrlOutcome::Completed => {
                client
                    .execute(
                        "UPDATE url_queue SET status = 'completed', error_message = NULL WHERE id = $1",
                        &[&id],
                    )
                    .await?;
            }
            UrlOutcome::Failed { retryable } => {
                if retryable {
                    client
                        .execute(
                            "UPDATE url_queue SET status = 'failed', error_message = $2 WHERE id = $1",
                            &[&id, &error_message],
                        )
                        .await?;
                } else {
                    client
                        .execute(
                            r#"
                            UPDATE url_queue
                            SET status = 'failed', error_message = $2,
                                attempts = GREATEST(attempts, $3)
                            WHERE id = $1
                            "#,
                            &[&id, &error_message, &MAX_ATTEMPTS],
                        )
                        .await?;
                }
            }
        }

        Ok(())
    }

    /// Move retryable failed records back to pending, due after `delay`
    pub async fn reschedule_failed(&self, delay: chrono::Duration) -> Result<u64> {
        let due_at = chrono::Utc::now() + delay;
        let client = self.pool.get().await?;
        let moved = client
            .execute(
                r#"
                UPDATE url_queue
                SET status = 'pending', scheduled_at = $1
                WHERE status = 'failed' AND attempts < $2
                "#,
                &[&due_at, &MAX_ATTEMPTS],
            )
            .await?;

        if moved > 0 {
            metrics::FRONTIER_RESCHEDULED.inc_by(moved as f64);
            tracing::info!(count = moved, "Rescheduled failed URLs");
        }
        Ok(moved)
    }

    /// Return abandoned `processing` records to pending
    ///
    /// A record claimed longer ago than `age` whose handler never
    /// completed (worker crash, kill -9) becomes claimable again. The
    /// claim time lives in `scheduled_at`, stamped by `claim_batch`.
    pub async fn recover_stalled(&self, age: chrono::Duration) -> Result<u64> {
        let cutoff = chrono::Utc::now() - age;
        let client = self.pool.get().await?;
        let recovered = client
            .execute(
                r#"
                UPDATE url_queue
                SET status = 'pending'
                WHERE status = 'processing' AND scheduled_at < $1
                "#,
                &[&cutoff],
            )
            .await?;

        if recovered > 0 {
            tracing::warn!(count = recovered, "Recovered stalled URL records");
        }
        Ok(recovered)
    }

    /// Count records that still keep a job open: pending, processing, or
    /// failed-but-retryable
    pub async fn open_for_job(&self, job_id: Uuid) -> Result<i64> {
        let client = self.pool.get().await?;
        let row = client
            .query_one(
                r#"
                SELECT COUNT(*) FROM url_queue
                WHERE job_id = $1
                  AND (status IN ('pending', 'processing')
                       OR (status = 'failed' AND attempts < $2))
                "#,
                &[&job_id, &MAX_ATTEMPTS],
            )
            .await?;
        Ok(row.get(0))
    }

    /// Counts by status
    pub async fn stats(&self) -> Result<FrontierStats> {
        let client = self.pool.get().await?;
        let rows = client
            .query("SELECT status, COUNT(*) FROM url_queue GROUP BY status", &[])
            .await?;

        let mut stats = FrontierStats::default();
        for row in rows {
            let status: String = row.get(0);
            let count: i64 = row.get(1);
            match status.as_str() {
                "pending" => stats.pending = count,
                "processing" => stats.processing = count,
                "completed" => stats.completed = count,
                "failed" => stats.failed = count,
                _ => {}
            }
        }
        Ok(stats)
    }

    fn recently_seen(&self, url: &str) -> bool {
        self.recent
            .lock()
            .map(|set| set.contains(url))
            .unwrap_or(false)
    }

    fn remember(&self, url: &str) {
        if let Ok(mut set) = self.recent.lock() {
            if set.len() >= RECENT_SET_CAP {
                // Drop half the set rather than tracking insertion order
                let survivors: Vec<String> =
                    set.iter().take(RECENT_SET_CAP / 2).cloned().collect();
                set.clear();
                set.extend(survivors);
            }
            set.insert(url.to_string());
        }
    }
}
