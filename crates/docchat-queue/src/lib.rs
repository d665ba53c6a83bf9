//! DocChat Queue - Durable work distribution for ingestion jobs
//!
//! SQLite-backed queue between the upload boundary and the ingestion
//! worker pool. Delivery is at-least-once: a claimed job that is never
//! completed (worker crash) becomes visible again once its lease
//! expires, and a failed job is re-queued with exponential backoff
//! until its attempts run out, after which it is retained as a dead
//! letter for operator inspection. Handlers must therefore be safely
//! retryable and must signal failure by raising rather than returning
//! success on partial completion.

use async_trait::async_trait;
use chrono::Utc;
use docchat_core::{DocChatError, IngestionJob, Result};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::path::PathBuf;
use uuid::Uuid;

/// Queue processing configuration
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Attempts before a job is dead-lettered
    pub max_attempts: u32,

    /// Initial retry delay in milliseconds (exponential backoff base)
    pub initial_retry_delay_ms: u64,

    /// Maximum retry delay in milliseconds
    pub max_retry_delay_ms: u64,

    /// How long a claimed job may run before its lease is considered
    /// abandoned and the job becomes claimable again
    pub lease_timeout_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_retry_delay_ms: 1000,
            max_retry_delay_ms: 60_000,
            lease_timeout_secs: 300,
        }
    }
}

impl QueueConfig {
    pub fn from_ingest(config: &docchat_core::IngestConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            initial_retry_delay_ms: config.retry_initial_delay_ms,
            max_retry_delay_ms: config.retry_max_delay_ms,
            lease_timeout_secs: config.lease_timeout_secs,
        }
    }
}

/// A job handed to a worker, identified by its queue row id
#[derive(Debug, Clone)]
pub struct ClaimedJob {
    pub id: i64,
    pub job: IngestionJob,
    /// 1-based attempt counter for this delivery
    pub attempt: u32,
}

/// A permanently failed job retained for inspection
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub id: i64,
    pub job: IngestionJob,
    pub attempts: u32,
    pub last_error: Option<String>,
}

/// Queue counters for monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueDepth {
    pub queued: u64,
    pub running: u64,
    pub dead: u64,
}

/// Trait for the durable job queue consumed by the ingestion worker
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Add a job; it becomes claimable immediately
    async fn enqueue(&self, job: &IngestionJob) -> Result<i64>;

    /// Atomically claim the oldest visible job, if any. The claim
    /// increments the attempt counter and stamps the lease; no two
    /// workers can receive the same attempt.
    async fn claim(&self) -> Result<Option<ClaimedJob>>;

    /// Acknowledge successful processing; the row is removed
    async fn complete(&self, id: i64) -> Result<()>;

    /// Report a failed attempt. Retryable failures re-queue with
    /// backoff until `max_attempts`; non-retryable failures
    /// dead-letter immediately.
    async fn fail(&self, id: i64, error: &str, retryable: bool) -> Result<()>;

    /// Return expired `running` leases to `queued`. Called
    /// periodically by the worker loop; this is how a crashed worker's
    /// job gets redelivered.
    async fn reap_stale(&self) -> Result<u64>;

    /// Current queue counters
    async fn depth(&self) -> Result<QueueDepth>;
}

// ============================================================================
// SQLite implementation
// ============================================================================

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS ingestion_jobs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    document_id TEXT NOT NULL,
    owner_id TEXT NOT NULL,
    source_path TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'queued',
    attempts INTEGER NOT NULL DEFAULT 0,
    last_error TEXT,
    visible_at INTEGER NOT NULL,
    leased_at INTEGER,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_ingestion_jobs_claim
    ON ingestion_jobs (status, visible_at);
"#;

#[derive(Debug, FromRow)]
struct JobRow {
    id: i64,
    document_id: String,
    owner_id: String,
    source_path: String,
    attempts: i64,
}

impl JobRow {
    fn into_job(self) -> Result<(i64, IngestionJob, u32)> {
        let document_id = Uuid::parse_str(&self.document_id)
            .map_err(|e| DocChatError::Queue(format!("corrupt documentId in job row: {e}")))?;
        Ok((
            self.id,
            IngestionJob {
                document_id,
                owner_id: self.owner_id,
                source_path: PathBuf::from(self.source_path),
            },
            self.attempts as u32,
        ))
    }
}

/// SQLite-backed durable job queue
pub struct SqliteJobQueue {
    pool: SqlitePool,
    config: QueueConfig,
}

impl SqliteJobQueue {
    /// Connect to the backing store and bootstrap the schema
    pub async fn connect(url: &str, config: QueueConfig) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .map_err(|e| DocChatError::Queue(format!("queue store connection failed: {e}")))?;

        let queue = Self { pool, config };
        queue.init_schema().await?;
        Ok(queue)
    }

    /// In-memory queue for tests. A single connection keeps every
    /// statement on the same in-memory database.
    pub async fn in_memory(config: QueueConfig) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| DocChatError::Queue(format!("queue store connection failed: {e}")))?;

        let queue = Self { pool, config };
        queue.init_schema().await?;
        Ok(queue)
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| DocChatError::Queue(format!("failed to create queue schema: {e}")))?;
        Ok(())
    }

    /// Permanently failed jobs, oldest first
    pub async fn dead_letters(&self) -> Result<Vec<DeadLetter>> {
        #[derive(FromRow)]
        struct DeadRow {
            id: i64,
            document_id: String,
            owner_id: String,
            source_path: String,
            attempts: i64,
            last_error: Option<String>,
        }

        let rows: Vec<DeadRow> = sqlx::query_as(
            r#"
            SELECT id, document_id, owner_id, source_path, attempts, last_error
            FROM ingestion_jobs
            WHERE status = 'dead'
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DocChatError::Queue(format!("failed to list dead letters: {e}")))?;

        rows.into_iter()
            .map(|row| {
                let last_error = row.last_error.clone();
                let (id, job, attempts) = JobRow {
                    id: row.id,
                    document_id: row.document_id,
                    owner_id: row.owner_id,
                    source_path: row.source_path,
                    attempts: row.attempts,
                }
                .into_job()?;
                Ok(DeadLetter {
                    id,
                    job,
                    attempts,
                    last_error,
                })
            })
            .collect()
    }

    /// Exponential backoff: `initial * 2^(attempt-1)`, capped
    fn retry_delay_ms(&self, attempt: u32) -> u64 {
        let delay = self
            .config
            .initial_retry_delay_ms
            .saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)));
        delay.min(self.config.max_retry_delay_ms)
    }
}

#[async_trait]
impl JobQueue for SqliteJobQueue {
    async fn enqueue(&self, job: &IngestionJob) -> Result<i64> {
        let now = Utc::now().timestamp_millis();
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO ingestion_jobs (document_id, owner_id, source_path, visible_at, created_at)
            VALUES ($1, $2, $3, $4, $4)
            RETURNING id
            "#,
        )
        .bind(job.document_id.to_string())
        .bind(&job.owner_id)
        .bind(job.source_path.display().to_string())
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DocChatError::Queue(format!("failed to enqueue job: {e}")))?;

        tracing::info!(job_id = id, document_id = %job.document_id, "enqueued ingestion job");
        Ok(id)
    }

    async fn claim(&self) -> Result<Option<ClaimedJob>> {
        let now = Utc::now().timestamp_millis();
        let row: Option<JobRow> = sqlx::query_as(
            r#"
            UPDATE ingestion_jobs
            SET status = 'running', attempts = attempts + 1, leased_at = $1
            WHERE id = (
                SELECT id FROM ingestion_jobs
                WHERE status = 'queued' AND visible_at <= $1
                ORDER BY id
                LIMIT 1
            )
            RETURNING id, document_id, owner_id, source_path, attempts
            "#,
        )
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DocChatError::Queue(format!("failed to claim job: {e}")))?;

        match row {
            Some(row) => {
                let (id, job, attempt) = row.into_job()?;
                tracing::debug!(job_id = id, document_id = %job.document_id, attempt, "claimed job");
                Ok(Some(ClaimedJob { id, job, attempt }))
            }
            None => Ok(None),
        }
    }

    async fn complete(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM ingestion_jobs WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| DocChatError::Queue(format!("failed to complete job: {e}")))?;

        tracing::debug!(job_id = id, "completed job");
        Ok(())
    }

    async fn fail(&self, id: i64, error: &str, retryable: bool) -> Result<()> {
        let attempts: Option<i64> =
            sqlx::query_scalar("SELECT attempts FROM ingestion_jobs WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| DocChatError::Queue(format!("failed to read job attempts: {e}")))?;

        let Some(attempts) = attempts else {
            return Err(DocChatError::NotFound(format!("job {id}")));
        };
        let attempts = attempts as u32;

        if !retryable || attempts >= self.config.max_attempts {
            sqlx::query(
                "UPDATE ingestion_jobs SET status = 'dead', last_error = $2, leased_at = NULL WHERE id = $1",
            )
            .bind(id)
            .bind(error)
            .execute(&self.pool)
            .await
            .map_err(|e| DocChatError::Queue(format!("failed to dead-letter job: {e}")))?;

            tracing::warn!(job_id = id, attempts, error, "job dead-lettered");
        } else {
            let delay_ms = self.retry_delay_ms(attempts);
            let visible_at = Utc::now().timestamp_millis() + delay_ms as i64;

            sqlx::query(
                r#"
                UPDATE ingestion_jobs
                SET status = 'queued', last_error = $2, visible_at = $3, leased_at = NULL
                WHERE id = $1
                "#,
            )
            .bind(id)
            .bind(error)
            .bind(visible_at)
            .execute(&self.pool)
            .await
            .map_err(|e| DocChatError::Queue(format!("failed to schedule retry: {e}")))?;

            tracing::info!(job_id = id, attempts, delay_ms, error, "job scheduled for retry");
        }

        Ok(())
    }

    async fn reap_stale(&self) -> Result<u64> {
        let cutoff =
            Utc::now().timestamp_millis() - (self.config.lease_timeout_secs as i64) * 1000;

        let result = sqlx::query(
            r#"
            UPDATE ingestion_jobs
            SET status = 'queued', leased_at = NULL
            WHERE status = 'running' AND leased_at <= $1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(|e| DocChatError::Queue(format!("failed to reap stale leases: {e}")))?;

        let reaped = result.rows_affected();
        if reaped > 0 {
            tracing::warn!(reaped, "returned stale leases to the queue");
        }
        Ok(reaped)
    }

    async fn depth(&self) -> Result<QueueDepth> {
        let (queued, running, dead): (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COALESCE(SUM(CASE WHEN status = 'queued' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN status = 'running' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN status = 'dead' THEN 1 ELSE 0 END), 0)
            FROM ingestion_jobs
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DocChatError::Queue(format!("failed to read queue depth: {e}")))?;

        Ok(QueueDepth {
            queued: queued as u64,
            running: running as u64,
            dead: dead as u64,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
