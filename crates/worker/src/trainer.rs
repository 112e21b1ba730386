//! The worker loop.
//!
//! Claims one job at a time from the store, runs it through the registered
//! [`CompiledJob`](rtrain_core::compute::CompiledJob) on the blocking pool,
//! and records exactly one terminal outcome per claimed job. Per-job
//! failures never escape this module; only store errors do, and the loop
//! answers those with a capped exponential backoff.

use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rtrain_core::compute::{ComputeError, JobRegistry};
use rtrain_core::hashing::verify_checksum;
use rtrain_db::models::job::{Job, ResultType};
use rtrain_db::repositories::JobRepo;
use rtrain_db::DbPool;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;

use crate::config::WorkerConfig;
use crate::progress::{persist_progress, JobProgress};

const MIN_BACKOFF: Duration = Duration::from_millis(1);

/// What became of a claimed job.
#[derive(Debug)]
enum Outcome {
    Success(Vec<u8>),
    Failure(String),
    /// Interrupted by shutdown or not loadable; goes back to the queue.
    Released,
}

/// Background worker that executes queued jobs.
pub struct Trainer {
    pool: DbPool,
    registry: Arc<JobRegistry>,
    config: WorkerConfig,
}

impl Trainer {
    pub fn new(pool: DbPool, registry: Arc<JobRegistry>, config: WorkerConfig) -> Self {
        Self {
            pool,
            registry,
            config,
        }
    }

    /// Run the worker loop until the cancellation token is triggered.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            job_timeout_secs = self.config.job_timeout.map(|t| t.as_secs()),
            job_types = ?self.registry.job_types(),
            "Trainer started",
        );

        let mut backoff = self.config.poll_interval;
        loop {
            if cancel.is_cancelled() {
                break;
            }

            let wait = match self.process_next(&cancel).await {
                Ok(true) => {
                    backoff = self.config.poll_interval;
                    continue;
                }
                Ok(false) => {
                    backoff = self.config.poll_interval;
                    self.config.poll_interval
                }
                Err(e) => {
                    backoff = next_backoff(backoff, self.config.max_backoff);
                    tracing::error!(
                        error = %e,
                        retry_in_ms = backoff.as_millis() as u64,
                        "Job store error in trainer loop",
                    );
                    backoff
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }
        }

        tracing::info!("Trainer shutting down");
    }

    /// Claim and execute one job.
    ///
    /// Returns `Ok(false)` when no job was pending. `cancel` interrupts the
    /// running job, which is then released back to the queue.
    ///
    /// Once a job is claimed its outcome is written before this returns;
    /// store errors on that write are retried with backoff until they
    /// succeed or `cancel` fires.
    pub async fn process_next(&self, cancel: &CancellationToken) -> Result<bool, sqlx::Error> {
        let Some(job) = JobRepo::claim_next(&self.pool).await? else {
            return Ok(false);
        };

        tracing::info!(job_id = %job.id, job_type = %job.job_type, "Starting job");
        let started = Instant::now();

        let outcome = match self.execute(&job, cancel).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(job_id = %job.id, error = %e, "Could not load job, releasing it");
                self.record(&job, &Outcome::Released, started, cancel).await?;
                return Err(e);
            }
        };
        self.record(&job, &outcome, started, cancel).await?;

        Ok(true)
    }

    /// Write `outcome`, retrying store errors with a capped backoff.
    async fn record(
        &self,
        job: &Job,
        outcome: &Outcome,
        started: Instant,
        cancel: &CancellationToken,
    ) -> Result<(), sqlx::Error> {
        let mut backoff = self.config.poll_interval;
        loop {
            let e = match self.write_outcome(job, outcome, started).await {
                Ok(()) => return Ok(()),
                Err(e) => e,
            };

            backoff = next_backoff(backoff, self.config.max_backoff);
            tracing::error!(
                job_id = %job.id,
                error = %e,
                retry_in_ms = backoff.as_millis() as u64,
                "Could not record job outcome, retrying",
            );
            tokio::select! {
                // A claim left behind here is picked up by the cleaner's abandon sweep.
                _ = cancel.cancelled() => return Err(e),
                _ = tokio::time::sleep(backoff) => {}
            }
        }
    }

    async fn write_outcome(
        &self,
        job: &Job,
        outcome: &Outcome,
        started: Instant,
    ) -> Result<(), sqlx::Error> {
        match outcome {
            Outcome::Success(artifact) => {
                if JobRepo::finish(&self.pool, &job.id, artifact, ResultType::Success).await? {
                    tracing::info!(
                        job_id = %job.id,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        result_bytes = artifact.len(),
                        "Job finished",
                    );
                } else {
                    tracing::warn!(
                        job_id = %job.id,
                        "Job was already finished elsewhere, artifact discarded",
                    );
                }
            }
            Outcome::Failure(description) => {
                tracing::warn!(job_id = %job.id, error = %description, "Job failed");
                let recorded =
                    JobRepo::finish(&self.pool, &job.id, description.as_bytes(), ResultType::Error)
                        .await?;
                if !recorded {
                    tracing::warn!(job_id = %job.id, "Job was already finished elsewhere");
                }
            }
            Outcome::Released => {
                JobRepo::release(&self.pool, &job.id).await?;
                tracing::info!(job_id = %job.id, "Job released to queue");
            }
        }
        Ok(())
    }

    async fn execute(&self, job: &Job, cancel: &CancellationToken) -> Result<Outcome, sqlx::Error> {
        let Some(payload) = JobRepo::first_payload(&self.pool, &job.id).await? else {
            return Ok(Outcome::Failure("job has no payload".into()));
        };
        if !verify_checksum(&payload.payload, &payload.checksum) {
            return Ok(Outcome::Failure(
                "stored payload does not match its checksum".into(),
            ));
        }
        let Some(compiled) = self.registry.get(&job.job_type) else {
            return Ok(Outcome::Failure(format!(
                "unsupported job type '{}'",
                job.job_type
            )));
        };

        let stop = cancel.child_token();
        let done = CancellationToken::new();
        let (sink, rx) = JobProgress::new(stop.clone());
        let writer = tokio::spawn(persist_progress(
            self.pool.clone(),
            job.id.clone(),
            rx,
            self.config.progress_interval,
            done.clone(),
        ));

        let data = payload.payload;
        let compute = tokio::task::spawn_blocking(move || compiled.execute(&data, &sink));
        let joined = match self.config.job_timeout {
            Some(limit) => tokio::time::timeout(limit, compute)
                .await
                .map_err(|_| limit),
            None => Ok(compute.await),
        };

        // An engine that outlived its time limit is still running; ask it to stop.
        stop.cancel();
        done.cancel();
        if let Err(e) = writer.await {
            tracing::warn!(job_id = %job.id, error = %e, "Progress writer task failed");
        }

        let outcome = match joined {
            Ok(Ok(Ok(artifact))) => Outcome::Success(artifact),
            Ok(Ok(Err(ComputeError::Interrupted))) if cancel.is_cancelled() => Outcome::Released,
            Ok(Ok(Err(e))) => Outcome::Failure(format!("{} job failed: {e}", job.job_type)),
            Ok(Err(e)) => Outcome::Failure(describe_join_error(e)),
            Err(limit) => Outcome::Failure(timeout_message(limit)),
        };
        Ok(outcome)
    }
}

/// Double `current`, at least 1 ms and at most `max`.
fn next_backoff(current: Duration, max: Duration) -> Duration {
    (current * 2).max(MIN_BACKOFF).min(max)
}

fn timeout_message(limit: Duration) -> String {
    format!("job exceeded its time limit of {}s", limit.as_secs())
}

fn describe_join_error(err: JoinError) -> String {
    if err.is_panic() {
        format!("compute engine panicked: {}", panic_message(err.into_panic()))
    } else {
        "compute task was cancelled".to_string()
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
