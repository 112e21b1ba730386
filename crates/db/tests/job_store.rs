//! Integration tests for the job store.
//!
//! Every test runs against a fresh in-memory database with all migrations
//! applied.

use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use rtrain_core::hashing::sha256_hex;
use rtrain_db::models::job::{ResultLookup, ResultType};
use rtrain_db::repositories::JobRepo;
use rtrain_db::DbPool;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn pool() -> DbPool {
    let pool = rtrain_db::create_memory_pool().await.unwrap();
    rtrain_db::run_migrations(&pool).await.unwrap();
    pool
}

async fn create_job(pool: &DbPool, payload: &[u8]) -> String {
    JobRepo::create(pool, "train", payload, &sha256_hex(payload))
        .await
        .unwrap()
}

async fn count(pool: &DbPool, table: &str, job_id: &str) -> i64 {
    let column = if table == "jobs" { "id" } else { "job_id" };
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table} WHERE {column} = ?"))
        .bind(job_id)
        .fetch_one(pool)
        .await
        .unwrap()
}

// ---------------------------------------------------------------------------
// Test: a fresh job is pending with zero progress
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fresh_job_reports_zero_progress() {
    let pool = pool().await;
    let id = create_job(&pool, b"payload").await;

    assert_eq!(id.len(), 32);
    let status = JobRepo::status(&pool, &id).await.unwrap().unwrap();
    assert_eq!(status.progress, 0.0);
    assert!(!status.finished);

    let payload = JobRepo::first_payload(&pool, &id).await.unwrap().unwrap();
    assert_eq!(payload.payload, b"payload");
    assert_eq!(payload.checksum, sha256_hex(b"payload"));
}

#[tokio::test]
async fn unknown_job_has_no_status() {
    let pool = pool().await;
    assert!(JobRepo::status(&pool, "0".repeat(32).as_str())
        .await
        .unwrap()
        .is_none());
}

// ---------------------------------------------------------------------------
// Test: claim_next hands out the oldest pending job exactly once
// ---------------------------------------------------------------------------

#[tokio::test]
async fn claim_next_returns_oldest_job_once() {
    let pool = pool().await;
    let first = create_job(&pool, b"one").await;
    let second = create_job(&pool, b"two").await;

    let claimed = JobRepo::claim_next(&pool).await.unwrap().unwrap();
    assert_eq!(claimed.id, first);
    assert!(claimed.claimed_at.is_some());

    let claimed = JobRepo::claim_next(&pool).await.unwrap().unwrap();
    assert_eq!(claimed.id, second);

    assert!(JobRepo::claim_next(&pool).await.unwrap().is_none());
}

#[tokio::test]
async fn concurrent_claims_never_share_a_job() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("jobs.db").display());
    let pool = rtrain_db::create_pool(&url).await.unwrap();
    rtrain_db::run_migrations(&pool).await.unwrap();

    for i in 0..20u8 {
        create_job(&pool, &[i]).await;
    }

    let mut handles = Vec::new();
    for _ in 0..4 {
        let pool = pool.clone();
        handles.push(tokio::spawn(async move {
            let mut claimed = Vec::new();
            while let Some(job) = JobRepo::claim_next(&pool).await.unwrap() {
                claimed.push(job.id);
            }
            claimed
        }));
    }

    let mut all = Vec::new();
    for handle in handles {
        all.extend(handle.await.unwrap());
    }
    let total = all.len();
    all.sort();
    all.dedup();
    assert_eq!(total, 20);
    assert_eq!(all.len(), 20, "a job was claimed twice");
}

#[tokio::test]
async fn released_job_can_be_claimed_again() {
    let pool = pool().await;
    let id = create_job(&pool, b"payload").await;
    JobRepo::claim_next(&pool).await.unwrap().unwrap();

    assert!(JobRepo::release(&pool, &id).await.unwrap());
    assert!(!JobRepo::release(&pool, &id).await.unwrap());

    let again = JobRepo::claim_next(&pool).await.unwrap().unwrap();
    assert_eq!(again.id, id);
}

// ---------------------------------------------------------------------------
// Test: progress only moves forward and stops at finish
// ---------------------------------------------------------------------------

#[tokio::test]
async fn progress_is_non_decreasing() {
    let pool = pool().await;
    let id = create_job(&pool, b"payload").await;

    assert!(JobRepo::update_progress(&pool, &id, 40.0).await.unwrap());
    assert!(!JobRepo::update_progress(&pool, &id, 25.0).await.unwrap());
    let status = JobRepo::status(&pool, &id).await.unwrap().unwrap();
    assert_eq!(status.progress, 40.0);

    JobRepo::update_progress(&pool, &id, 250.0).await.unwrap();
    let status = JobRepo::status(&pool, &id).await.unwrap().unwrap();
    assert_eq!(status.progress, 100.0);
}

#[tokio::test]
async fn progress_ignored_after_finish() {
    let pool = pool().await;
    let id = create_job(&pool, b"payload").await;
    JobRepo::finish(&pool, &id, b"boom", ResultType::Error)
        .await
        .unwrap();

    assert!(!JobRepo::update_progress(&pool, &id, 50.0).await.unwrap());
    let status = JobRepo::status(&pool, &id).await.unwrap().unwrap();
    assert_eq!(status.progress, -1.0);
}

// ---------------------------------------------------------------------------
// Test: finish is terminal and idempotent
// ---------------------------------------------------------------------------

#[tokio::test]
async fn finish_success_stores_result() {
    let pool = pool().await;
    let id = create_job(&pool, b"payload").await;
    JobRepo::update_progress(&pool, &id, 60.0).await.unwrap();

    assert_matches!(
        JobRepo::result(&pool, &id).await.unwrap(),
        ResultLookup::NotReady
    );

    assert!(JobRepo::finish(&pool, &id, b"model", ResultType::Success)
        .await
        .unwrap());

    let status = JobRepo::status(&pool, &id).await.unwrap().unwrap();
    assert!(status.finished);
    assert_eq!(status.progress, 100.0);

    let result = assert_matches!(
        JobRepo::result(&pool, &id).await.unwrap(),
        ResultLookup::Ready(result) => result
    );
    assert_eq!(result.result_type, ResultType::Success);
    assert_eq!(result.result, b"model");
}

#[tokio::test]
async fn finish_twice_is_a_no_op() {
    let pool = pool().await;
    let id = create_job(&pool, b"payload").await;

    assert!(JobRepo::finish(&pool, &id, b"trace", ResultType::Error)
        .await
        .unwrap());
    assert!(!JobRepo::finish(&pool, &id, b"model", ResultType::Success)
        .await
        .unwrap());

    assert_eq!(count(&pool, "job_results", &id).await, 1);
    let status = JobRepo::status(&pool, &id).await.unwrap().unwrap();
    assert_eq!(status.progress, -1.0);

    let result = assert_matches!(
        JobRepo::result(&pool, &id).await.unwrap(),
        ResultLookup::Ready(result) => result
    );
    assert_eq!(result.result_type, ResultType::Error);
    assert_eq!(result.result, b"trace");
}

#[tokio::test]
async fn finish_unknown_job_returns_false() {
    let pool = pool().await;
    assert!(!JobRepo::finish(&pool, &"f".repeat(32), b"x", ResultType::Success)
        .await
        .unwrap());
}

#[tokio::test]
async fn result_of_unknown_job_is_not_found() {
    let pool = pool().await;
    assert_matches!(
        JobRepo::result(&pool, "missing").await.unwrap(),
        ResultLookup::NotFound
    );
}

// ---------------------------------------------------------------------------
// Test: purge removes old finished jobs and their children only
// ---------------------------------------------------------------------------

#[tokio::test]
async fn purge_removes_old_finished_jobs_with_children() {
    let pool = pool().await;
    let finished = create_job(&pool, b"done").await;
    let running = create_job(&pool, b"running").await;
    JobRepo::finish(&pool, &finished, b"model", ResultType::Success)
        .await
        .unwrap();

    let cutoff = Utc::now() + Duration::seconds(1);
    let deleted = JobRepo::purge_finished_before(&pool, cutoff).await.unwrap();
    assert_eq!(deleted, 1);

    assert!(JobRepo::status(&pool, &finished).await.unwrap().is_none());
    assert_matches!(
        JobRepo::result(&pool, &finished).await.unwrap(),
        ResultLookup::NotFound
    );
    assert_eq!(count(&pool, "job_payloads", &finished).await, 0);
    assert_eq!(count(&pool, "job_results", &finished).await, 0);

    // Unfinished jobs are never purged, whatever their age.
    assert!(JobRepo::status(&pool, &running).await.unwrap().is_some());
    assert_eq!(count(&pool, "job_payloads", &running).await, 1);
}

#[tokio::test]
async fn purge_keeps_jobs_inside_retention_window() {
    let pool = pool().await;
    let id = create_job(&pool, b"done").await;
    JobRepo::finish(&pool, &id, b"model", ResultType::Success)
        .await
        .unwrap();

    let deleted = JobRepo::purge_older_than(&pool, std::time::Duration::from_secs(3600))
        .await
        .unwrap();
    assert_eq!(deleted, 0);
    assert!(JobRepo::status(&pool, &id).await.unwrap().is_some());

    let deleted = JobRepo::purge_older_than(&pool, std::time::Duration::MAX)
        .await
        .unwrap();
    assert_eq!(deleted, 0);
}

// ---------------------------------------------------------------------------
// Test: abandoned claims are failed
// ---------------------------------------------------------------------------

#[tokio::test]
async fn abandoned_claims_are_failed() {
    let pool = pool().await;
    let claimed = create_job(&pool, b"claimed").await;
    let pending = create_job(&pool, b"pending").await;
    JobRepo::claim_next(&pool).await.unwrap().unwrap();

    let cutoff = Utc::now() + Duration::seconds(1);
    let failed = JobRepo::fail_abandoned(&pool, cutoff, "worker lost")
        .await
        .unwrap();
    assert_eq!(failed, 1);

    let status = JobRepo::status(&pool, &claimed).await.unwrap().unwrap();
    assert!(status.finished);
    assert_eq!(status.progress, -1.0);

    let status = JobRepo::status(&pool, &pending).await.unwrap().unwrap();
    assert!(!status.finished);
}
