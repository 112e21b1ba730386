//! Periodic cleanup of the job store.
//!
//! Every tick purges finished jobs older than the retention period, and,
//! when a job timeout is configured, fails jobs whose claim has outlived it
//! (their worker crashed or was killed mid-job). Runs on a fixed interval
//! using `tokio::time::interval`.

use std::time::Duration;

use chrono::Utc;
use rtrain_db::repositories::JobRepo;
use rtrain_db::DbPool;
use tokio_util::sync::CancellationToken;

/// Tuning knobs for the cleaner loop.
#[derive(Debug, Clone)]
pub struct CleanerConfig {
    /// Time between cleanup passes.
    pub interval: Duration,
    /// How long finished jobs (and their results) are kept.
    pub retention: Duration,
    /// Age of a claim after which its job is failed; `None` never fails claims.
    pub abandon_after: Option<Duration>,
}

/// Run the cleanup loop until `cancel` is triggered.
pub async fn run(pool: DbPool, config: CleanerConfig, cancel: CancellationToken) {
    tracing::info!(
        retention_secs = config.retention.as_secs(),
        interval_secs = config.interval.as_secs(),
        abandon_after_secs = config.abandon_after.map(|d| d.as_secs()),
        "Cleaner started"
    );

    let mut interval = tokio::time::interval(config.interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Cleaner stopping");
                break;
            }
            _ = interval.tick() => run_once(&pool, &config).await,
        }
    }
}

/// One cleanup pass. Errors are logged and retried on the next tick.
pub async fn run_once(pool: &DbPool, config: &CleanerConfig) {
    match JobRepo::purge_older_than(pool, config.retention).await {
        Ok(0) => tracing::debug!("Cleaner: no finished jobs to purge"),
        Ok(deleted) => tracing::info!(deleted, "Cleaner: purged finished jobs"),
        Err(e) => tracing::error!(error = %e, "Cleaner: purge failed"),
    }

    let Some(abandon_after) = config.abandon_after else {
        return;
    };
    let Ok(age) = chrono::Duration::from_std(abandon_after) else {
        return;
    };
    let Some(cutoff) = Utc::now().checked_sub_signed(age) else {
        return;
    };

    let reason = format!(
        "job was abandoned: claimed more than {}s ago without finishing",
        abandon_after.as_secs()
    );
    match JobRepo::fail_abandoned(pool, cutoff, &reason).await {
        Ok(0) => {}
        Ok(failed) => tracing::warn!(failed, "Cleaner: failed abandoned jobs"),
        Err(e) => tracing::error!(error = %e, "Cleaner: abandoned-claim sweep failed"),
    }
}
