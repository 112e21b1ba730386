//! Dense `f64` tensors on the wire.
//!
//! A tensor travels as its shape plus the base64 encoding of its elements in
//! row-major order, each element as 8 little-endian bytes.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Size in bytes of one encoded element.
const ELEMENT_BYTES: usize = 8;

/// A shaped, base64-encoded array of `f64`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    pub shape: Vec<usize>,
    pub data: String,
}

impl Tensor {
    /// Encode `values` with the given shape.
    ///
    /// Fails if the number of values does not match the shape.
    pub fn encode(shape: Vec<usize>, values: &[f64]) -> Result<Self, CoreError> {
        let expected = element_count(&shape)?;
        if values.len() != expected {
            return Err(CoreError::Validation(format!(
                "Tensor of shape {shape:?} needs {expected} values, got {}",
                values.len()
            )));
        }

        let mut bytes = Vec::with_capacity(values.len() * ELEMENT_BYTES);
        for value in values {
            bytes.extend_from_slice(&value.to_le_bytes());
        }

        Ok(Self {
            shape,
            data: STANDARD.encode(bytes),
        })
    }

    /// Decode the elements, checking that they agree with the shape.
    pub fn decode(&self) -> Result<Vec<f64>, CoreError> {
        let bytes = STANDARD
            .decode(&self.data)
            .map_err(|e| CoreError::Validation(format!("Tensor data is not valid base64: {e}")))?;

        let expected = byte_len(&self.shape)?;
        if bytes.len() != expected {
            return Err(CoreError::Validation(format!(
                "Tensor of shape {:?} needs {expected} bytes, got {}",
                self.shape,
                bytes.len()
            )));
        }

        Ok(bytes
            .chunks_exact(ELEMENT_BYTES)
            .map(|chunk| {
                let mut raw = [0u8; ELEMENT_BYTES];
                raw.copy_from_slice(chunk);
                f64::from_le_bytes(raw)
            })
            .collect())
    }

    /// Number of dimensions.
    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Size of the first dimension (number of samples for training data).
    pub fn rows(&self) -> usize {
        self.shape.first().copied().unwrap_or(0)
    }

    /// Product of all dimensions after the first, saturating at `usize::MAX`.
    pub fn row_width(&self) -> usize {
        self.shape
            .iter()
            .skip(1)
            .try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
            .unwrap_or(usize::MAX)
    }
}

fn element_count(shape: &[usize]) -> Result<usize, CoreError> {
    shape
        .iter()
        .try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
        .ok_or_else(|| CoreError::Validation(format!("Tensor shape {shape:?} is too large")))
}

fn byte_len(shape: &[usize]) -> Result<usize, CoreError> {
    element_count(shape)?
        .checked_mul(ELEMENT_BYTES)
        .ok_or_else(|| CoreError::Validation(format!("Tensor shape {shape:?} is too large")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn decode_recovers_encoded_values() {
        let tensor = Tensor::encode(vec![2, 2], &[1.0, -2.5, 0.0, 1e-9]).unwrap();
        assert_eq!(tensor.decode().unwrap(), vec![1.0, -2.5, 0.0, 1e-9]);
        assert_eq!(tensor.rows(), 2);
        assert_eq!(tensor.row_width(), 2);
    }

    #[test]
    fn encode_rejects_shape_mismatch() {
        assert_matches!(
            Tensor::encode(vec![3], &[1.0, 2.0]),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn decode_rejects_truncated_data() {
        let mut tensor = Tensor::encode(vec![2], &[1.0, 2.0]).unwrap();
        tensor.shape = vec![3];
        let err = tensor.decode().unwrap_err();
        assert!(err.to_string().contains("needs 24 bytes"));
    }

    #[test]
    fn oversized_shape_is_rejected() {
        let tensor = Tensor {
            shape: vec![1 << 32, 1 << 32],
            data: String::new(),
        };
        let err = tensor.decode().unwrap_err();
        assert!(err.to_string().contains("too large"), "error was: {err}");
        assert_matches!(
            Tensor::encode(vec![usize::MAX, 2], &[]),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn decode_rejects_bad_base64() {
        let tensor = Tensor {
            shape: vec![1],
            data: "!!not base64!!".into(),
        };
        assert_matches!(tensor.decode(), Err(CoreError::Validation(_)));
    }
}
