use std::time::Duration;

/// Tuning knobs for the [`crate::trainer::Trainer`] loop.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Idle wait between polls when no job is pending (default: 1 s).
    pub poll_interval: Duration,
    /// Minimum interval between persisted progress updates (default: 500 ms).
    pub progress_interval: Duration,
    /// Upper bound on a single job's execution time; `None` disables it
    /// (default: 24 h).
    pub job_timeout: Option<Duration>,
    /// Ceiling of the backoff applied after store errors (default: 30 s).
    pub max_backoff: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            progress_interval: Duration::from_millis(500),
            job_timeout: Some(Duration::from_secs(24 * 3600)),
            max_backoff: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{var} must be a non-negative integer, got '{value}'")]
pub struct InvalidEnvVar {
    pub var: &'static str,
    pub value: String,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                      | Default  |
    /// |------------------------------|----------|
    /// | `WORKER_POLL_INTERVAL_MS`    | `1000`   |
    /// | `WORKER_PROGRESS_INTERVAL_MS`| `500`    |
    /// | `JOB_TIMEOUT_SECS`           | `86400` (`0` disables) |
    pub fn from_env() -> Result<Self, InvalidEnvVar> {
        let defaults = Self::default();

        let poll_interval = env_u64("WORKER_POLL_INTERVAL_MS")?
            .map(|ms| Duration::from_millis(ms.max(1)))
            .unwrap_or(defaults.poll_interval);
        let progress_interval = env_u64("WORKER_PROGRESS_INTERVAL_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.progress_interval);
        let job_timeout = match env_u64("JOB_TIMEOUT_SECS")? {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => defaults.job_timeout,
        };

        Ok(Self {
            poll_interval,
            progress_interval,
            job_timeout,
            max_backoff: defaults.max_backoff,
        })
    }
}

fn env_u64(var: &'static str) -> Result<Option<u64>, InvalidEnvVar> {
    match std::env::var(var) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| InvalidEnvVar { var, value }),
        Err(_) => Ok(None),
    }
}
