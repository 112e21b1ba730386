/// Job identifiers are 32 lowercase hex characters (a UUID v4 without hyphens).
pub type JobId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Length of every [`JobId`].
pub const JOB_ID_LEN: usize = 32;

/// Progress value recorded for a job that finished with an error.
pub const PROGRESS_FAILED: f64 = -1.0;

/// Progress value recorded for a job that finished successfully.
pub const PROGRESS_COMPLETE: f64 = 100.0;

/// Generate a fresh, unique job identifier.
pub fn new_job_id() -> JobId {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Check that `id` has the shape of a [`JobId`].
pub fn is_valid_job_id(id: &str) -> bool {
    id.len() == JOB_ID_LEN && id.bytes().all(|b| b.is_ascii_hexdigit())
}
