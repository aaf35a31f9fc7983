//! # Receipt Job Repository
//!
//! Outbox of receipts still to be generated.
//!
//! ## The Outbox Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  SALE TRANSACTION                                                       │
//! │    stocks, sale, items, payment, invoice                                │
//! │    INSERT INTO receipt_jobs (sale_id)        ← same commit              │
//! │                                                                         │
//! │  AFTER COMMIT (receipt worker)                                          │
//! │    SELECT … WHERE completed_at IS NULL AND attempts < max               │
//! │      ├── issued  → completed_at = now                                   │
//! │      └── failed  → attempts += 1, last_error = …                        │
//! │                                                                         │
//! │  A crash between commit and rendering loses nothing: the job row is    │
//! │  picked up by the next poll.                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::DbResult;
use kassa_core::ReceiptJob;

const JOB_COLUMNS: &str =
    "id, sale_id, attempts, last_error, created_at, attempted_at, completed_at";

/// Repository for receipt outbox operations.
#[derive(Debug, Clone)]
pub struct ReceiptJobRepository {
    pool: SqlitePool,
}

impl ReceiptJobRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ReceiptJobRepository { pool }
    }

    /// Queues the receipt of a sale, inside the sale transaction.
    pub async fn enqueue(conn: &mut SqliteConnection, sale_id: &str) -> DbResult<ReceiptJob> {
        let job = ReceiptJob {
            id: Uuid::new_v4().to_string(),
            sale_id: sale_id.to_string(),
            attempts: 0,
            last_error: None,
            created_at: Utc::now(),
            attempted_at: None,
            completed_at: None,
        };

        sqlx::query(
            r#"
            INSERT INTO receipt_jobs (id, sale_id, attempts, created_at)
            VALUES (?1, ?2, 0, ?3)
            "#,
        )
        .bind(&job.id)
        .bind(&job.sale_id)
        .bind(job.created_at)
        .execute(&mut *conn)
        .await?;

        debug!(sale_id = %sale_id, "Receipt queued");
        Ok(job)
    }

    /// Gets jobs still to run, oldest first.
    ///
    /// Jobs that already failed `max_attempts` times are left out.
    pub async fn get_pending(&self, limit: u32, max_attempts: u32) -> DbResult<Vec<ReceiptJob>> {
        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM receipt_jobs \
             WHERE completed_at IS NULL AND attempts < ?2 \
             ORDER BY created_at ASC LIMIT ?1"
        );

        let jobs = sqlx::query_as::<_, ReceiptJob>(&sql)
            .bind(limit)
            .bind(max_attempts)
            .fetch_all(&self.pool)
            .await?;

        Ok(jobs)
    }

    pub async fn get_by_sale_id(&self, sale_id: &str) -> DbResult<Option<ReceiptJob>> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM receipt_jobs WHERE sale_id = ?1");

        let job = sqlx::query_as::<_, ReceiptJob>(&sql)
            .bind(sale_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(job)
    }

    /// Marks a job as done.
    pub async fn mark_completed(&self, id: &str) -> DbResult<()> {
        let now = Utc::now();

        sqlx::query(
            r#"
            UPDATE receipt_jobs SET
                completed_at = ?2,
                attempted_at = ?2,
                attempts = attempts + 1,
                last_error = NULL
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Records a failed attempt.
    pub async fn mark_failed(&self, id: &str, error: &str) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE receipt_jobs SET
                attempts = attempts + 1,
                last_error = ?2,
                attempted_at = ?3
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Counts jobs not completed yet (including exhausted ones).
    pub async fn count_pending(&self) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM receipt_jobs WHERE completed_at IS NULL")
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }

    /// Counts jobs that gave up after `max_attempts` failures.
    pub async fn count_exhausted(&self, max_attempts: u32) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM receipt_jobs WHERE completed_at IS NULL AND attempts >= ?1",
        )
        .bind(max_attempts)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}
