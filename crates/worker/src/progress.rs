//! Rate-limited progress reporting from a running job into the job store.
//!
//! The compute engine runs on a blocking thread and may report progress
//! after every batch. [`JobProgress`] keeps only the highest value seen in a
//! `watch` channel; [`persist_progress`] drains that channel and writes to
//! the store at most once per interval, so the write rate stays bounded no
//! matter how chatty the engine is.

use std::time::Duration;

use rtrain_core::compute::ProgressSink;
use rtrain_core::types::JobId;
use rtrain_db::repositories::JobRepo;
use rtrain_db::DbPool;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// [`ProgressSink`] handed to the compute engine for one job.
pub struct JobProgress {
    tx: watch::Sender<f64>,
    stop: CancellationToken,
}

impl JobProgress {
    /// Create a sink and the receiver its percentages are published on.
    ///
    /// `stop` is what [`ProgressSink::should_stop`] reports.
    pub fn new(stop: CancellationToken) -> (Self, watch::Receiver<f64>) {
        let (tx, rx) = watch::channel(0.0);
        (Self { tx, stop }, rx)
    }
}

impl ProgressSink for JobProgress {
    fn report(&self, fraction: f64) {
        let percent = (fraction * 100.0).clamp(0.0, 100.0);
        self.tx.send_if_modified(|current| {
            if percent > *current {
                *current = percent;
                true
            } else {
                false
            }
        });
    }

    fn should_stop(&self) -> bool {
        self.stop.is_cancelled()
    }
}

/// Persist published progress for `job_id` until `done` is cancelled or the
/// sink is dropped, waiting at least `interval` between writes.
pub async fn persist_progress(
    pool: DbPool,
    job_id: JobId,
    mut rx: watch::Receiver<f64>,
    interval: Duration,
    done: CancellationToken,
) {
    let mut persisted = 0.0;
    loop {
        tokio::select! {
            _ = done.cancelled() => break,
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }

        let value = *rx.borrow_and_update();
        if value > persisted {
            match JobRepo::update_progress(&pool, &job_id, value).await {
                Ok(_) => persisted = value,
                Err(e) => {
                    tracing::warn!(job_id = %job_id, error = %e, "Failed to persist job progress");
                }
            }
        }

        tokio::select! {
            _ = done.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtrain_core::hashing::sha256_hex;

    async fn pool_with_job() -> (DbPool, JobId) {
        let pool = rtrain_db::create_memory_pool().await.unwrap();
        rtrain_db::run_migrations(&pool).await.unwrap();
        let id = JobRepo::create(&pool, "train", b"x", &sha256_hex(b"x"))
            .await
            .unwrap();
        (pool, id)
    }

    async fn progress_of(pool: &DbPool, id: &str) -> f64 {
        JobRepo::status(pool, id).await.unwrap().unwrap().progress
    }

    #[test]
    fn sink_only_publishes_increases() {
        let (sink, rx) = JobProgress::new(CancellationToken::new());
        sink.report(0.4);
        sink.report(0.2);
        sink.report(f64::NAN);
        assert_eq!(*rx.borrow(), 40.0);
        sink.report(3.0);
        assert_eq!(*rx.borrow(), 100.0);
    }

    #[test]
    fn sink_reflects_stop_token() {
        let stop = CancellationToken::new();
        let (sink, _rx) = JobProgress::new(stop.clone());
        assert!(!sink.should_stop());
        stop.cancel();
        assert!(sink.should_stop());
    }

    #[tokio::test]
    async fn writer_persists_then_waits_out_the_interval() {
        let (pool, id) = pool_with_job().await;
        let (sink, rx) = JobProgress::new(CancellationToken::new());
        let done = CancellationToken::new();
        let writer = tokio::spawn(persist_progress(
            pool.clone(),
            id.clone(),
            rx,
            Duration::from_secs(3600),
            done.clone(),
        ));

        sink.report(0.1);
        for _ in 0..200 {
            if progress_of(&pool, &id).await > 0.0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(progress_of(&pool, &id).await, 10.0);

        // Still inside the rate-limit window: nothing new is written.
        sink.report(0.5);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(progress_of(&pool, &id).await, 10.0);

        done.cancel();
        writer.await.unwrap();
    }
}
