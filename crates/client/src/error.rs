use rtrain_core::error::CoreError;

use crate::retry::is_retryable_status;

/// Everything that can go wrong while talking to an rtrain server.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The underlying HTTP request failed (network, DNS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The server refused to create the job.
    #[error("Job not created (HTTP {status}): {message}")]
    SubmissionRejected { status: u16, message: String },

    /// A status or result request returned a non-2xx status code.
    #[error("{operation} returned HTTP {status}")]
    HttpStatus { operation: &'static str, status: u16 },

    /// Status polling kept failing until the retry budget ran out.
    #[error("Job status unavailable after {attempts} attempts: {last_error}")]
    StatusUnavailable { attempts: u32, last_error: String },

    /// The status response carried an error field.
    #[error("Server reported an error: {0}")]
    Remote(String),

    /// The job ran and failed; carries the server's description.
    #[error("Remote training failed: {0}")]
    ComputeFailed(String),

    /// The server answered with something we could not interpret.
    #[error("Malformed server response: {0}")]
    Decode(String),

    #[error("Invalid server URL '{0}'")]
    InvalidUrl(String),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Cancelled")]
    Cancelled,
}

impl ClientError {
    /// Whether retrying the same request might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Request(e) => !e.is_builder() && !e.is_decode(),
            ClientError::HttpStatus { status, .. } => reqwest::StatusCode::from_u16(*status)
                .map(is_retryable_status)
                .unwrap_or(false),
            _ => false,
        }
    }
}
