//! Binary click loss and accuracy.
//!
//! The loss is computed from logits rather than probabilities:
//!
//! L = mean(max(z, 0) - z * y + log(1 + exp(-|z|)))
//!
//! which equals mean binary cross-entropy of `sigmoid(z)` against `y` and
//! stays finite for arbitrarily large `|z|`.

use candle_core::{DType, Tensor};

use crate::error::{map_candle, DknError, DknResult};

/// Mean binary cross-entropy of `sigmoid(logits)` against `labels`, both `[B]`.
pub fn bce_with_logits(logits: &Tensor, labels: &Tensor) -> DknResult<Tensor> {
    check_same_shape(logits, labels)?;

    let positive_part = logits.relu().map_err(map_candle)?;
    let target_part = (logits * labels).map_err(map_candle)?;
    let log_term = logits
        .abs()
        .and_then(|t| t.neg())
        .and_then(|t| t.exp())
        .and_then(|t| t.affine(1.0, 1.0))
        .and_then(|t| t.log())
        .map_err(map_candle)?;

    positive_part
        .sub(&target_part)
        .and_then(|t| t.add(&log_term))
        .and_then(|t| t.mean_all())
        .map_err(map_candle)
}

/// Number of examples where `sigmoid(z) > 0.5` agrees with `y > 0.5`.
///
/// Thresholds the f32 probability, so logits too small to move the sigmoid
/// off 0.5 count as a negative prediction.
pub fn correct_predictions(logits: &Tensor, labels: &Tensor) -> DknResult<usize> {
    check_same_shape(logits, labels)?;
    let predicted = candle_nn::ops::sigmoid(logits)
        .and_then(|p| p.gt(0.5))
        .map_err(map_candle)?;
    let expected = labels.gt(0.5).map_err(map_candle)?;
    let correct = predicted
        .eq(&expected)
        .and_then(|t| t.to_dtype(DType::U32))
        .and_then(|t| t.sum_all())
        .and_then(|t| t.to_scalar::<u32>())
        .map_err(map_candle)?;
    Ok(correct as usize)
}

/// Fraction of correct predictions, see [`correct_predictions`].
pub fn accuracy(logits: &Tensor, labels: &Tensor) -> DknResult<f32> {
    let total = logits.elem_count();
    if total == 0 {
        return Ok(0.0);
    }
    Ok(correct_predictions(logits, labels)? as f32 / total as f32)
}

/// Extract a scalar f32 from a 0-d tensor.
pub fn tensor_to_f32(t: &Tensor) -> DknResult<f32> {
    t.to_dtype(DType::F32)
        .and_then(|t| t.to_scalar::<f32>())
        .map_err(map_candle)
}

fn check_same_shape(logits: &Tensor, labels: &Tensor) -> DknResult<()> {
    if logits.dims() != labels.dims() {
        return Err(DknError::ShapeMismatch {
            context: "logits and labels",
            expected: logits.dims().to_vec(),
            actual: labels.dims().to_vec(),
        });
    }
    Ok(())
}
