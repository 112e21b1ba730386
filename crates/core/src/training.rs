//! The built-in `train` job type.
//!
//! The payload of a training job is a JSON [`TrainingRequest`]; the success
//! artifact is a JSON [`TrainedModel`]. Structure is validated at submission
//! time, while the model configuration (architecture, loss, optimizer) is
//! only checked by the engine when the job runs.

use serde::{Deserialize, Serialize};

use crate::compute::{CompiledJob, ComputeError, ProgressSink};
use crate::error::CoreError;
use crate::linear;
use crate::tensor::Tensor;

/// `job_type` tag of training jobs.
pub const JOB_TYPE_TRAIN: &str = "train";

/// Everything needed to train a model remotely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingRequest {
    pub architecture: String,
    pub loss: String,
    pub optimizer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub learning_rate: Option<f64>,
    /// Initial weights, in the order the architecture defines.
    pub weights: Vec<Tensor>,
    pub x_train: Tensor,
    pub y_train: Tensor,
    pub epochs: u32,
    pub batch_size: u32,
}

impl TrainingRequest {
    /// Parse and validate a request from payload bytes.
    pub fn from_payload(payload: &[u8]) -> Result<Self, CoreError> {
        let request: Self = serde_json::from_slice(payload)
            .map_err(|e| CoreError::Validation(format!("Malformed training request: {e}")))?;
        request.validate()?;
        Ok(request)
    }

    /// Serialize into payload bytes.
    pub fn to_payload(&self) -> Result<Vec<u8>, CoreError> {
        serde_json::to_vec(self).map_err(|e| CoreError::Internal(e.to_string()))
    }

    /// Structural validation of the request.
    pub fn validate(&self) -> Result<(), CoreError> {
        for (field, value) in [
            ("architecture", &self.architecture),
            ("loss", &self.loss),
            ("optimizer", &self.optimizer),
        ] {
            if value.trim().is_empty() {
                return Err(CoreError::Validation(format!("'{field}' must not be empty")));
            }
        }

        if self.epochs == 0 {
            return Err(CoreError::Validation("'epochs' must be at least 1".into()));
        }
        if self.batch_size == 0 {
            return Err(CoreError::Validation("'batch_size' must be at least 1".into()));
        }
        if let Some(rate) = self.learning_rate {
            if !rate.is_finite() || rate <= 0.0 {
                return Err(CoreError::Validation(
                    "'learning_rate' must be a positive number".into(),
                ));
            }
        }

        validate_tensor("x_train", &self.x_train)?;
        validate_tensor("y_train", &self.y_train)?;
        if self.x_train.rank() != 2 || self.y_train.rank() != 2 {
            return Err(CoreError::Validation(
                "'x_train' and 'y_train' must both be rank-2 tensors".into(),
            ));
        }
        if self.x_train.rows() == 0 {
            return Err(CoreError::Validation("'x_train' has no samples".into()));
        }
        if self.x_train.row_width() == 0 || self.y_train.row_width() == 0 {
            return Err(CoreError::Validation(
                "'x_train' and 'y_train' rows must not be empty".into(),
            ));
        }
        if self.x_train.rows() != self.y_train.rows() {
            return Err(CoreError::Validation(format!(
                "'x_train' has {} samples but 'y_train' has {}",
                self.x_train.rows(),
                self.y_train.rows()
            )));
        }

        for (i, weight) in self.weights.iter().enumerate() {
            validate_tensor(&format!("weights[{i}]"), weight)?;
        }

        Ok(())
    }
}

fn validate_tensor(field: &str, tensor: &Tensor) -> Result<(), CoreError> {
    tensor
        .decode()
        .map(|_| ())
        .map_err(|e| CoreError::Validation(format!("'{field}': {e}")))
}

/// The artifact produced by a successful training job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedModel {
    pub architecture: String,
    pub weights: Vec<Tensor>,
    /// Loss over the full training set after the last epoch.
    pub loss: f64,
}

impl TrainedModel {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CoreError> {
        serde_json::from_slice(bytes)
            .map_err(|e| CoreError::Validation(format!("Malformed trained model: {e}")))
    }
}

/// [`CompiledJob`] for [`JOB_TYPE_TRAIN`].
#[derive(Debug, Default, Clone, Copy)]
pub struct TrainingJob;

impl CompiledJob for TrainingJob {
    fn job_type(&self) -> &'static str {
        JOB_TYPE_TRAIN
    }

    fn validate(&self, payload: &[u8]) -> Result<(), CoreError> {
        TrainingRequest::from_payload(payload).map(|_| ())
    }

    fn execute(
        &self,
        payload: &[u8],
        progress: &dyn ProgressSink,
    ) -> Result<Vec<u8>, ComputeError> {
        let request = TrainingRequest::from_payload(payload)?;
        let model = linear::train(&request, progress)?;
        serde_json::to_vec(&model).map_err(|e| ComputeError::InvalidPayload(e.to_string()))
    }
}
