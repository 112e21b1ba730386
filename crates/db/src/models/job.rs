//! Job, payload and result rows.

use rtrain_core::submission::{RESULT_TYPE_ERROR, RESULT_TYPE_SUCCESS};
use rtrain_core::types::{JobId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `jobs` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Job {
    pub id: JobId,
    pub job_type: String,
    pub progress: f64,
    pub finished: bool,
    pub claimed_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// A row from the `job_payloads` table.
#[derive(Debug, Clone, FromRow)]
pub struct JobPayload {
    pub id: i64,
    pub job_id: JobId,
    pub payload: Vec<u8>,
    pub checksum: String,
}

/// Whether a result holds a success artifact or an error description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ResultType {
    Success,
    Error,
}

impl ResultType {
    pub fn as_str(self) -> &'static str {
        match self {
            ResultType::Success => RESULT_TYPE_SUCCESS,
            ResultType::Error => RESULT_TYPE_ERROR,
        }
    }
}

/// A row from the `job_results` table.
#[derive(Debug, Clone, FromRow)]
pub struct JobResult {
    pub id: i64,
    pub job_id: JobId,
    pub result_type: ResultType,
    pub result: Vec<u8>,
}

/// The `{progress, finished}` projection served by the status endpoint.
#[derive(Debug, Clone, Copy, PartialEq, FromRow, Serialize)]
pub struct JobStatus {
    pub progress: f64,
    pub finished: bool,
}

/// Outcome of looking up a job's result.
#[derive(Debug, Clone)]
pub enum ResultLookup {
    /// No job with that id exists.
    NotFound,
    /// The job exists but has not finished.
    NotReady,
    Ready(JobResult),
}
