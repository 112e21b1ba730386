//! Reference compute engine: a dense linear layer fitted by mini-batch SGD.
//!
//! Weights follow the dense-layer convention `[kernel (d x o), bias (o)]`.
//! An empty `weights` list starts from zeros.

use crate::compute::{epoch_fraction, ComputeError, ProgressSink};
use crate::tensor::Tensor;
use crate::training::{TrainedModel, TrainingRequest};

pub const ARCHITECTURE_LINEAR: &str = "linear";
pub const SUPPORTED_LOSSES: &[&str] = &["mean_squared_error", "mse"];
pub const OPTIMIZER_SGD: &str = "sgd";
pub const DEFAULT_LEARNING_RATE: f64 = 0.01;

/// Train the model described by `request`, reporting progress after every batch.
pub fn train(
    request: &TrainingRequest,
    progress: &dyn ProgressSink,
) -> Result<TrainedModel, ComputeError> {
    check_configuration(request)?;

    let n = request.x_train.rows();
    let d = request.x_train.row_width();
    let o = request.y_train.row_width();
    let x = request.x_train.decode()?;
    let y = request.y_train.decode()?;
    let (mut kernel, mut bias) = initial_weights(&request.weights, d, o)?;

    let epochs = request.epochs as usize;
    let batch_size = request.batch_size as usize;
    let learning_rate = request.learning_rate.unwrap_or(DEFAULT_LEARNING_RATE);

    let mut loss = mean_squared_error(&x, &y, &kernel, &bias, d, o);
    for epoch in 0..epochs {
        let mut start = 0;
        while start < n {
            if progress.should_stop() {
                return Err(ComputeError::Interrupted);
            }
            let end = (start + batch_size).min(n);

            let mut grad_kernel = vec![0.0; d * o];
            let mut grad_bias = vec![0.0; o];
            for i in start..end {
                let row = &x[i * d..(i + 1) * d];
                for k in 0..o {
                    let err = predict(row, &kernel, &bias, k, o) - y[i * o + k];
                    grad_bias[k] += err;
                    for (j, xj) in row.iter().enumerate() {
                        grad_kernel[j * o + k] += err * xj;
                    }
                }
            }

            let scale = 2.0 * learning_rate / (end - start) as f64;
            for (w, g) in kernel.iter_mut().zip(&grad_kernel) {
                *w -= scale * g;
            }
            for (b, g) in bias.iter_mut().zip(&grad_bias) {
                *b -= scale * g;
            }

            start = end;
            progress.report(epoch_fraction(epoch, end, n, epochs));
        }

        loss = mean_squared_error(&x, &y, &kernel, &bias, d, o);
        if !loss.is_finite() {
            return Err(ComputeError::Diverged(format!(
                "loss became {loss} in epoch {}; try a smaller learning rate",
                epoch + 1
            )));
        }
    }

    Ok(TrainedModel {
        architecture: request.architecture.clone(),
        weights: vec![
            Tensor::encode(vec![d, o], &kernel)?,
            Tensor::encode(vec![o], &bias)?,
        ],
        loss,
    })
}

fn check_configuration(request: &TrainingRequest) -> Result<(), ComputeError> {
    if request.architecture != ARCHITECTURE_LINEAR {
        return Err(ComputeError::Unsupported(format!(
            "architecture '{}' (supported: {ARCHITECTURE_LINEAR})",
            request.architecture
        )));
    }
    if !SUPPORTED_LOSSES.contains(&request.loss.as_str()) {
        return Err(ComputeError::Unsupported(format!(
            "loss '{}' (supported: {})",
            request.loss,
            SUPPORTED_LOSSES.join(", ")
        )));
    }
    if request.optimizer != OPTIMIZER_SGD {
        return Err(ComputeError::Unsupported(format!(
            "optimizer '{}' (supported: {OPTIMIZER_SGD})",
            request.optimizer
        )));
    }
    Ok(())
}

fn initial_weights(
    weights: &[Tensor],
    d: usize,
    o: usize,
) -> Result<(Vec<f64>, Vec<f64>), ComputeError> {
    match weights {
        [] => Ok((vec![0.0; d * o], vec![0.0; o])),
        [kernel, bias] if kernel.shape == [d, o] && bias.shape == [o] => {
            Ok((kernel.decode()?, bias.decode()?))
        }
        _ => Err(ComputeError::InvalidPayload(format!(
            "linear layer expects weights of shapes [{d}, {o}] and [{o}]"
        ))),
    }
}

fn predict(row: &[f64], kernel: &[f64], bias: &[f64], k: usize, o: usize) -> f64 {
    bias[k]
        + row
            .iter()
            .enumerate()
            .map(|(j, xj)| xj * kernel[j * o + k])
            .sum::<f64>()
}

fn mean_squared_error(
    x: &[f64],
    y: &[f64],
    kernel: &[f64],
    bias: &[f64],
    d: usize,
    o: usize,
) -> f64 {
    let n = y.len() / o.max(1);
    let mut total = 0.0;
    for i in 0..n {
        let row = &x[i * d..(i + 1) * d];
        for k in 0..o {
            let err = predict(row, kernel, bias, k, o) - y[i * o + k];
            total += err * err;
        }
    }
    total / y.len().max(1) as f64
}
