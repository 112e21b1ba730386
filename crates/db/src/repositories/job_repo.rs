//! Repository for the `jobs`, `job_payloads` and `job_results` tables.
//!
//! The job store is the only component that writes these tables. Every
//! operation is a single statement or one short transaction, so the API,
//! the worker and the cleaner can interleave freely.

use std::time::Duration;

use chrono::Utc;
use rtrain_core::types::{new_job_id, JobId, Timestamp, PROGRESS_COMPLETE, PROGRESS_FAILED};
use sqlx::FromRow;

use crate::models::job::{Job, JobPayload, JobResult, JobStatus, ResultLookup, ResultType};
use crate::DbPool;

/// Column list for `jobs` queries.
const COLUMNS: &str = "id, job_type, progress, finished, claimed_at, created_at, updated_at";

/// Subquery selecting finished jobs last touched before a bound cutoff.
const STALE_JOBS: &str = "SELECT id FROM jobs WHERE finished = 1 AND updated_at < ?";

/// Joined projection used by [`JobRepo::result`].
#[derive(FromRow)]
struct ResultRow {
    finished: bool,
    result_id: Option<i64>,
    result_type: Option<ResultType>,
    result: Option<Vec<u8>>,
}

/// Provides the job store operations.
pub struct JobRepo;

impl JobRepo {
    /// Create a pending job together with its payload. Returns the new id.
    pub async fn create(
        pool: &DbPool,
        job_type: &str,
        payload: &[u8],
        checksum: &str,
    ) -> Result<JobId, sqlx::Error> {
        let id = new_job_id();
        let now = Utc::now();

        let mut tx = pool.begin().await?;
        sqlx::query(
            "INSERT INTO jobs (id, job_type, progress, finished, created_at, updated_at) \
             VALUES (?, ?, 0, 0, ?, ?)",
        )
        .bind(&id)
        .bind(job_type)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO job_payloads (job_id, payload, checksum) VALUES (?, ?, ?)")
            .bind(&id)
            .bind(payload)
            .bind(checksum.to_ascii_lowercase())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(id)
    }

    /// Atomically claim the oldest pending job.
    ///
    /// Selection and claim happen in one statement; the outer
    /// `claimed_at IS NULL` guard makes it a compare-and-set, so two workers
    /// can never both receive the same job.
    pub async fn claim_next(pool: &DbPool) -> Result<Option<Job>, sqlx::Error> {
        let now = Utc::now();
        let query = format!(
            "UPDATE jobs SET claimed_at = ?, updated_at = ? \
             WHERE id = ( \
                 SELECT id FROM jobs \
                 WHERE finished = 0 AND claimed_at IS NULL \
                 ORDER BY created_at ASC, rowid ASC \
                 LIMIT 1 \
             ) AND claimed_at IS NULL \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(now)
            .bind(now)
            .fetch_optional(pool)
            .await
    }

    /// Return a claimed, unfinished job to the pending queue.
    ///
    /// Progress is left as is. Returns `false` if the job was not claimed or
    /// has already finished.
    pub async fn release(pool: &DbPool, id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs SET claimed_at = NULL, updated_at = ? \
             WHERE id = ? AND finished = 0 AND claimed_at IS NOT NULL",
        )
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// The first payload submitted with a job.
    pub async fn first_payload(
        pool: &DbPool,
        id: &str,
    ) -> Result<Option<JobPayload>, sqlx::Error> {
        sqlx::query_as::<_, JobPayload>(
            "SELECT id, job_id, payload, checksum FROM job_payloads \
             WHERE job_id = ? ORDER BY id ASC LIMIT 1",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Record progress for an unfinished job.
    ///
    /// The value is clamped to `[0, 100]` and only ever raises the stored
    /// progress; late or out-of-order reports are ignored. Returns whether
    /// the row changed.
    pub async fn update_progress(
        pool: &DbPool,
        id: &str,
        value: f64,
    ) -> Result<bool, sqlx::Error> {
        let value = value.clamp(0.0, PROGRESS_COMPLETE);
        let result = sqlx::query(
            "UPDATE jobs SET progress = ?, updated_at = ? \
             WHERE id = ? AND finished = 0 AND progress <= ?",
        )
        .bind(value)
        .bind(Utc::now())
        .bind(id)
        .bind(value)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Move a job to its terminal state and store its result.
    ///
    /// Success forces progress to 100, error to -1. Calling this on a job
    /// that is already finished (or unknown) changes nothing and returns
    /// `false`.
    pub async fn finish(
        pool: &DbPool,
        id: &str,
        result: &[u8],
        result_type: ResultType,
    ) -> Result<bool, sqlx::Error> {
        let progress = match result_type {
            ResultType::Success => PROGRESS_COMPLETE,
            ResultType::Error => PROGRESS_FAILED,
        };

        let mut tx = pool.begin().await?;
        let updated = sqlx::query(
            "UPDATE jobs SET finished = 1, progress = ?, updated_at = ? \
             WHERE id = ? AND finished = 0",
        )
        .bind(progress)
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query("INSERT INTO job_results (job_id, result_type, result) VALUES (?, ?, ?)")
            .bind(id)
            .bind(result_type)
            .bind(result)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(true)
    }

    /// Find a job by its ID.
    pub async fn find_by_id(pool: &DbPool, id: &str) -> Result<Option<Job>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE id = ?");
        sqlx::query_as::<_, Job>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Progress and completion flag of a job.
    pub async fn status(pool: &DbPool, id: &str) -> Result<Option<JobStatus>, sqlx::Error> {
        sqlx::query_as::<_, JobStatus>("SELECT progress, finished FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// The stored result of a job, if it has finished.
    pub async fn result(pool: &DbPool, id: &str) -> Result<ResultLookup, sqlx::Error> {
        let row = sqlx::query_as::<_, ResultRow>(
            "SELECT j.finished, r.id AS result_id, r.result_type, r.result \
             FROM jobs j LEFT JOIN job_results r ON r.job_id = j.id \
             WHERE j.id = ?",
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        let lookup = match row {
            None => ResultLookup::NotFound,
            Some(row) if !row.finished => ResultLookup::NotReady,
            Some(ResultRow {
                result_id: Some(result_id),
                result_type: Some(result_type),
                result: Some(result),
                ..
            }) => ResultLookup::Ready(JobResult {
                id: result_id,
                job_id: id.to_string(),
                result_type,
                result,
            }),
            Some(_) => {
                tracing::error!(job_id = id, "Finished job has no result row");
                ResultLookup::NotFound
            }
        };
        Ok(lookup)
    }

    /// Delete finished jobs last updated before `cutoff`, with their
    /// payloads and results. Returns the number of jobs deleted.
    pub async fn purge_finished_before(
        pool: &DbPool,
        cutoff: Timestamp,
    ) -> Result<u64, sqlx::Error> {
        let mut tx = pool.begin().await?;

        sqlx::query(&format!(
            "DELETE FROM job_results WHERE job_id IN ({STALE_JOBS})"
        ))
        .bind(cutoff)
        .execute(&mut *tx)
        .await?;

        sqlx::query(&format!(
            "DELETE FROM job_payloads WHERE job_id IN ({STALE_JOBS})"
        ))
        .bind(cutoff)
        .execute(&mut *tx)
        .await?;

        let deleted = sqlx::query("DELETE FROM jobs WHERE finished = 1 AND updated_at < ?")
            .bind(cutoff)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        Ok(deleted)
    }

    /// Delete finished jobs older than `retention`.
    pub async fn purge_older_than(pool: &DbPool, retention: Duration) -> Result<u64, sqlx::Error> {
        let cutoff = chrono::Duration::from_std(retention)
            .ok()
            .and_then(|retention| Utc::now().checked_sub_signed(retention));
        match cutoff {
            Some(cutoff) => Self::purge_finished_before(pool, cutoff).await,
            // A retention window beyond the representable range never expires.
            None => Ok(0),
        }
    }

    /// Fail every unfinished job whose claim is older than `claimed_before`.
    ///
    /// Such jobs were abandoned by a worker that died mid-execution. Returns
    /// the number of jobs failed.
    pub async fn fail_abandoned(
        pool: &DbPool,
        claimed_before: Timestamp,
        reason: &str,
    ) -> Result<u64, sqlx::Error> {
        let ids: Vec<JobId> = sqlx::query_scalar(
            "SELECT id FROM jobs \
             WHERE finished = 0 AND claimed_at IS NOT NULL AND claimed_at < ?",
        )
        .bind(claimed_before)
        .fetch_all(pool)
        .await?;

        let mut failed = 0;
        for id in ids {
            if Self::finish(pool, &id, reason.as_bytes(), ResultType::Error).await? {
                tracing::warn!(job_id = %id, "Failed abandoned job");
                failed += 1;
            }
        }
        Ok(failed)
    }
}
