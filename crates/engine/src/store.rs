//! Job store: the persisted dispatch queue and the only code that writes it.
//!
//! Every update is guarded by `status = 'pending'`, so terminal jobs
//! (`sent`, `failed`) can never be modified again, no matter how many worker
//! runs observe them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use flock_common::error::AppError;
use flock_common::types::{Job, JobStatus, NewJob};

/// Rows per INSERT statement; keeps bind parameters well under the Postgres limit.
const INSERT_CHUNK: usize = 1000;

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert all jobs at status `pending`, atomically. Returns the row count.
    async fn insert_batch(&self, jobs: &[NewJob]) -> Result<u64, AppError>;

    /// Pending jobs due at `now`, oldest `scheduled_at` first.
    async fn select_due_pending(&self, limit: i64, now: DateTime<Utc>)
    -> Result<Vec<Job>, AppError>;

    /// Mark a pending job sent. Returns `false` if it was no longer pending.
    async fn update_on_success(
        &self,
        id: Uuid,
        provider_message_id: &str,
        sent_at: DateTime<Utc>,
    ) -> Result<bool, AppError>;

    /// Record a failed attempt: bump `attempts`, move to `new_status`
    /// (`pending` or `failed`) and reschedule. Returns `false` if the job was
    /// no longer pending.
    async fn update_on_failure(
        &self,
        id: Uuid,
        new_status: JobStatus,
        new_scheduled_at: DateTime<Utc>,
        error: &str,
    ) -> Result<bool, AppError>;
}

/// Postgres-backed job store over the `dispatch_jobs` table.
#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn insert_batch(&self, jobs: &[NewJob]) -> Result<u64, AppError> {
        if jobs.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut inserted = 0u64;

        for chunk in jobs.chunks(INSERT_CHUNK) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO dispatch_jobs \
                 (id, tenant_id, contact_id, channel, status, payload, attempts, scheduled_at) ",
            );
            builder.push_values(chunk, |mut row, job| {
                row.push_bind(job.id)
                    .push_bind(job.tenant_id)
                    .push_bind(job.contact_id)
                    .push_bind(job.channel.to_string())
                    .push_bind(JobStatus::Pending.to_string())
                    .push_bind(Json(&job.payload))
                    .push_bind(0i32)
                    .push_bind(job.scheduled_at);
            });

            let result = builder.build().execute(&mut *tx).await?;
            inserted += result.rows_affected();
        }

        tx.commit().await?;

        tracing::debug!(inserted, "Dispatch jobs inserted");
        Ok(inserted)
    }

    async fn select_due_pending(
        &self,
        limit: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<Job>, AppError> {
        let jobs: Vec<Job> = sqlx::query_as(
            r#"
            SELECT *
            FROM dispatch_jobs
            WHERE status = 'pending'
              AND scheduled_at <= $1
            ORDER BY scheduled_at ASC, created_at ASC
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(jobs)
    }

    async fn update_on_success(
        &self,
        id: Uuid,
        provider_message_id: &str,
        sent_at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE dispatch_jobs
            SET status = 'sent',
                provider_message_id = $2,
                last_error = NULL,
                sent_at = $3,
                updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .bind(provider_message_id)
        .bind(sent_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn update_on_failure(
        &self,
        id: Uuid,
        new_status: JobStatus,
        new_scheduled_at: DateTime<Utc>,
        error: &str,
    ) -> Result<bool, AppError> {
        if new_status == JobStatus::Sent {
            return Err(AppError::Internal(format!(
                "job {} cannot fail into status sent",
                id
            )));
        }

        let result = sqlx::query(
            r#"
            UPDATE dispatch_jobs
            SET status = $2,
                attempts = attempts + 1,
                scheduled_at = $3,
                last_error = $4,
                updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .bind(new_status.to_string())
        .bind(new_scheduled_at)
        .bind(error)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
