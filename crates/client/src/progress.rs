//! Progress tracking on the client side.
//!
//! The server reports percent complete as a float. [`ProgressTracker`]
//! turns that into per-mille steps and only lets increases through, so a
//! display never sees repeats, regressions or the failure sentinel.

/// Something that shows how far a remote job has come.
pub trait ProgressDisplay: Send {
    /// A job was accepted by the server.
    fn start(&mut self, _job_id: &str) {}

    /// Progress moved forward to `per_mille` (0..=1000).
    fn advance(&mut self, per_mille: u32);

    /// The job finished and its result was fetched.
    fn finish(&mut self) {}
}

/// Logs progress through `tracing`.
#[derive(Debug, Default)]
pub struct LogProgress {
    job_id: String,
}

impl ProgressDisplay for LogProgress {
    fn start(&mut self, job_id: &str) {
        self.job_id = job_id.to_string();
        tracing::info!(job_id, "Training remotely");
    }

    fn advance(&mut self, per_mille: u32) {
        tracing::info!(
            job_id = %self.job_id,
            percent = f64::from(per_mille) / 10.0,
            "Training progress"
        );
    }

    fn finish(&mut self) {
        tracing::info!(job_id = %self.job_id, "Remote training complete");
    }
}

/// Shows nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressDisplay for NoProgress {
    fn advance(&mut self, _per_mille: u32) {}
}

/// Filters raw status values down to forward movement.
#[derive(Debug, Default, Clone)]
pub struct ProgressTracker {
    current: u32,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last per-mille value let through.
    pub fn current(&self) -> u32 {
        self.current
    }

    /// Feed a raw percentage; returns the new per-mille value if it advanced.
    pub fn observe(&mut self, progress: f64) -> Option<u32> {
        let per_mille = to_per_mille(progress)?;
        if per_mille > self.current {
            self.current = per_mille;
            Some(per_mille)
        } else {
            None
        }
    }
}

/// `round(10 * progress)` clamped to `0..=1000`; negative and non-finite
/// values (the failure sentinel among them) have no per-mille equivalent.
fn to_per_mille(progress: f64) -> Option<u32> {
    if !progress.is_finite() || progress < 0.0 {
        return None;
    }
    Some((progress * 10.0).round().min(1000.0) as u32)
}
