//! The client-side job state machine.
//!
//! ```text
//! Submitting -> Polling -> Fetching -> Done
//!      \           \          \
//!       +-----------+----------+--> Err(ClientError)
//! ```
//!
//! Submission failures are fatal. Status and result requests that fail in
//! a retryable way are retried under the session's [`RetryPolicy`]; every
//! wait is cut short by the cancellation token.
//!
//! [`RetryPolicy`]: crate::retry::RetryPolicy

use std::future::Future;
use std::time::Duration;

use rtrain_core::submission::SubmitJob;
use rtrain_core::types::JobId;
use tokio_util::sync::CancellationToken;

use crate::error::ClientError;
use crate::progress::{ProgressDisplay, ProgressTracker};
use crate::session::{JobOutcome, RTrainSession};

/// Where the poller currently is. Failure is the `Err` side of [`Poller::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollState {
    Submitting,
    Polling { job_id: JobId, failures: u32 },
    Fetching { job_id: JobId, failures: u32 },
    Done(Vec<u8>),
}

pub struct Poller<'a> {
    session: &'a RTrainSession,
    display: &'a mut dyn ProgressDisplay,
    cancel: &'a CancellationToken,
    tracker: ProgressTracker,
}

impl<'a> Poller<'a> {
    pub fn new(
        session: &'a RTrainSession,
        display: &'a mut dyn ProgressDisplay,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            session,
            display,
            cancel,
            tracker: ProgressTracker::new(),
        }
    }

    /// Drive `submission` from submission to its success artifact.
    pub async fn run(mut self, submission: &SubmitJob) -> Result<Vec<u8>, ClientError> {
        let mut state = PollState::Submitting;
        loop {
            state = match state {
                PollState::Done(artifact) => {
                    self.display.finish();
                    return Ok(artifact);
                }
                state => self.step(state, submission).await?,
            };
        }
    }

    async fn step(
        &mut self,
        state: PollState,
        submission: &SubmitJob,
    ) -> Result<PollState, ClientError> {
        let session = self.session;
        let options = session.options();
        match state {
            PollState::Submitting => {
                let job_id = self.cancellable(session.submit(submission)).await?;
                tracing::debug!(job_id = %job_id, "Job submitted");
                self.display.start(&job_id);
                self.sleep(options.initial_delay).await?;
                Ok(PollState::Polling {
                    job_id,
                    failures: 0,
                })
            }

            PollState::Polling { job_id, failures } => {
                match self.cancellable(session.status(&job_id)).await {
                    Ok(status) => {
                        if let Some(error) = status.error {
                            return Err(ClientError::Remote(error));
                        }
                        if let Some(per_mille) = self.tracker.observe(status.progress) {
                            self.display.advance(per_mille);
                        }
                        if status.finished {
                            return Ok(PollState::Fetching {
                                job_id,
                                failures: 0,
                            });
                        }
                        self.sleep(options.poll_interval).await?;
                        Ok(PollState::Polling {
                            job_id,
                            failures: 0,
                        })
                    }
                    Err(e) => {
                        let failures = self.retry_after(&job_id, failures, e).await?;
                        Ok(PollState::Polling { job_id, failures })
                    }
                }
            }

            PollState::Fetching { job_id, failures } => {
                match self.cancellable(session.fetch_result(&job_id)).await {
                    Ok(JobOutcome::Success(artifact)) => Ok(PollState::Done(artifact)),
                    Ok(JobOutcome::Failed(description)) => {
                        Err(ClientError::ComputeFailed(description))
                    }
                    Err(e) => {
                        let failures = self.retry_after(&job_id, failures, e).await?;
                        Ok(PollState::Fetching { job_id, failures })
                    }
                }
            }

            PollState::Done(artifact) => Ok(PollState::Done(artifact)),
        }
    }

    /// Account for a failed request; waits out the backoff when another
    /// attempt is allowed and returns the new failure count.
    async fn retry_after(
        &self,
        job_id: &str,
        failures: u32,
        error: ClientError,
    ) -> Result<u32, ClientError> {
        if !error.is_retryable() {
            return Err(error);
        }

        let retry = &self.session.options().retry;
        let failures = failures + 1;
        if !retry.allows_retry(failures) {
            tracing::error!(job_id, attempts = failures, error = %error, "Giving up on job");
            return Err(ClientError::StatusUnavailable {
                attempts: failures,
                last_error: error.to_string(),
            });
        }

        let delay = retry.backoff(failures);
        tracing::warn!(
            job_id,
            attempt = failures,
            retry_in_ms = delay.as_millis() as u64,
            error = %error,
            "Request failed, retrying"
        );
        self.sleep(delay).await?;
        Ok(failures)
    }

    async fn sleep(&self, duration: Duration) -> Result<(), ClientError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ClientError::Cancelled),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }

    async fn cancellable<T>(
        &self,
        request: impl Future<Output = Result<T, ClientError>>,
    ) -> Result<T, ClientError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ClientError::Cancelled),
            result = request => result,
        }
    }
}
