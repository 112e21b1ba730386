//! Wire types shared by the HTTP API and the client.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::hashing::{sha256_hex, verify_checksum};
use crate::training::{TrainingRequest, JOB_TYPE_TRAIN};

/// Response header naming the kind of result returned by `GET /result/{id}`.
pub const RESULT_TYPE_HEADER: &str = "x-rtrain-result-type";

/// Result kind of a successfully finished job.
pub const RESULT_TYPE_SUCCESS: &str = "success";

/// Result kind of a job that finished with an error.
pub const RESULT_TYPE_ERROR: &str = "error";

fn default_job_type() -> String {
    JOB_TYPE_TRAIN.to_string()
}

/// Body of `POST /train`: an opaque payload plus its integrity checksum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitJob {
    #[serde(default = "default_job_type")]
    pub job_type: String,
    /// Base64-encoded payload bytes.
    pub payload: String,
    /// SHA-256 hex digest of the decoded payload bytes.
    pub checksum: String,
}

impl SubmitJob {
    /// Wrap raw payload bytes, computing their checksum.
    pub fn new(job_type: impl Into<String>, payload: &[u8]) -> Self {
        Self {
            job_type: job_type.into(),
            payload: STANDARD.encode(payload),
            checksum: sha256_hex(payload),
        }
    }

    /// Envelope for a training request.
    pub fn training(request: &TrainingRequest) -> Result<Self, CoreError> {
        Ok(Self::new(JOB_TYPE_TRAIN, &request.to_payload()?))
    }

    /// Parse an envelope from a request body.
    pub fn from_body(body: &[u8]) -> Result<Self, CoreError> {
        serde_json::from_slice(body)
            .map_err(|e| CoreError::Validation(format!("Malformed job submission: {e}")))
    }

    /// Decode the payload and verify it against the checksum.
    pub fn decode_payload(&self) -> Result<Vec<u8>, CoreError> {
        let payload = STANDARD
            .decode(&self.payload)
            .map_err(|e| CoreError::Validation(format!("Payload is not valid base64: {e}")))?;
        if !verify_checksum(&payload, &self.checksum) {
            return Err(CoreError::Validation(
                "Payload checksum does not match".into(),
            ));
        }
        Ok(payload)
    }
}

/// Body of `GET /status/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatusResponse {
    /// Percent complete in `[0, 100]`, or `-1` when the job failed.
    pub progress: f64,
    pub finished: bool,
    /// Error carried by the status itself; clients abort polling when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
