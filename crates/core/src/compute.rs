//! The compute capability interface.
//!
//! The worker never knows what a job actually does. It looks the job's
//! `job_type` up in a [`JobRegistry`] and hands the opaque payload to the
//! matching [`CompiledJob`], which reports fractional progress through a
//! [`ProgressSink`] and returns the serialized artifact.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::CoreError;
use crate::training::TrainingJob;

/// Failure raised by a compute engine while executing a job.
#[derive(Debug, thiserror::Error)]
pub enum ComputeError {
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("unsupported configuration: {0}")]
    Unsupported(String),

    #[error("training diverged: {0}")]
    Diverged(String),

    #[error("execution interrupted")]
    Interrupted,
}

impl From<CoreError> for ComputeError {
    fn from(err: CoreError) -> Self {
        ComputeError::InvalidPayload(err.to_string())
    }
}

/// Receives progress reports from a running job.
///
/// Implementations must tolerate being called from a blocking thread at a
/// high rate; rate limiting is the sink's concern, not the engine's.
pub trait ProgressSink: Send + Sync {
    /// Report completion as a fraction in `[0, 1]`.
    fn report(&self, fraction: f64);

    /// Whether the engine should abandon the job at the next opportunity.
    fn should_stop(&self) -> bool {
        false
    }
}

/// A sink that discards all reports.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _fraction: f64) {}
}

/// One kind of runnable job, selected by `job_type`.
pub trait CompiledJob: Send + Sync {
    /// The `job_type` tag this implementation handles.
    fn job_type(&self) -> &'static str;

    /// Check that `payload` is well formed without running anything.
    fn validate(&self, payload: &[u8]) -> Result<(), CoreError>;

    /// Run the job, returning the serialized success artifact.
    fn execute(&self, payload: &[u8], progress: &dyn ProgressSink)
        -> Result<Vec<u8>, ComputeError>;
}

/// Lookup table from `job_type` to its [`CompiledJob`].
#[derive(Clone, Default)]
pub struct JobRegistry {
    jobs: HashMap<&'static str, Arc<dyn CompiledJob>>,
}

impl JobRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry containing the built-in job types.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(TrainingJob));
        registry
    }

    /// Add (or replace) the implementation for its `job_type`.
    pub fn register(&mut self, job: Arc<dyn CompiledJob>) {
        self.jobs.insert(job.job_type(), job);
    }

    pub fn get(&self, job_type: &str) -> Option<Arc<dyn CompiledJob>> {
        self.jobs.get(job_type).cloned()
    }

    /// Registered job types, sorted.
    pub fn job_types(&self) -> Vec<&'static str> {
        let mut types: Vec<_> = self.jobs.keys().copied().collect();
        types.sort_unstable();
        types
    }

    /// Validate `payload` against the schema of `job_type`.
    pub fn validate(&self, job_type: &str, payload: &[u8]) -> Result<(), CoreError> {
        let job = self.get(job_type).ok_or_else(|| {
            CoreError::Validation(format!(
                "Unsupported job type '{job_type}'. Must be one of: {}",
                self.job_types().join(", ")
            ))
        })?;
        job.validate(payload)
    }
}

/// Overall completion of an epoch-structured job.
///
/// `(epochs_done + samples_done / samples_per_epoch) / epochs`, clamped to
/// `[0, 1]`. Degenerate inputs (zero epochs or samples) count as no progress.
pub fn epoch_fraction(
    epochs_done: usize,
    samples_done: usize,
    samples_per_epoch: usize,
    epochs: usize,
) -> f64 {
    if epochs == 0 || samples_per_epoch == 0 {
        return 0.0;
    }
    let within = samples_done.min(samples_per_epoch) as f64 / samples_per_epoch as f64;
    ((epochs_done as f64 + within) / epochs as f64).clamp(0.0, 1.0)
}
