//! Held-out loss and accuracy.

use std::fmt;

use tracing::debug;

use super::data::{BatchBuilder, ClickDataset};
use super::loss::{bce_with_logits, correct_predictions, tensor_to_f32};
use crate::encoder::ContentEncoder;
use crate::error::{DknError, DknResult};
use crate::predictor::Predictor;

/// Result of one pass over a dataset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvalOutcome {
    /// Mean of per-batch losses.
    pub loss: f32,
    /// Correct predictions over evaluated examples.
    pub accuracy: f32,
    /// Full batches evaluated.
    pub batches: usize,
    /// Examples evaluated (`batches * batch_size`).
    pub examples: usize,
}

impl fmt::Display for EvalOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "loss={:.4} acc={:.4} (n={})",
            self.loss, self.accuracy, self.examples
        )
    }
}

/// Evaluate `predictor` on every full batch of `dataset` in index order.
///
/// Logits are detached and no backward pass is run. Nothing is mutated, so
/// repeated calls on the same dataset return identical outcomes.
pub fn evaluate<E: ContentEncoder>(
    predictor: &Predictor<E>,
    dataset: &ClickDataset,
    builder: &BatchBuilder,
    batch_size: usize,
) -> DknResult<EvalOutcome> {
    if batch_size == 0 || dataset.len() < batch_size {
        return Err(DknError::DatasetTooSmall {
            len: dataset.len(),
            batch_size,
        });
    }

    let mut loss_sum = 0.0f64;
    let mut correct = 0usize;
    let mut batches = 0usize;

    for positions in dataset.sequential_batches(batch_size) {
        let batch = builder.build(dataset, &positions)?;
        let logits = predictor
            .logits(&batch.candidate, &batch.clicked)?
            .detach();

        let loss = tensor_to_f32(&bce_with_logits(&logits, &batch.labels)?)?;
        loss_sum += loss as f64;
        correct += correct_predictions(&logits, &batch.labels)?;
        batches += 1;
    }

    let examples = batches * batch_size;
    let outcome = EvalOutcome {
        loss: (loss_sum / batches as f64) as f32,
        accuracy: correct as f32 / examples as f32,
        batches,
        examples,
    };
    debug!(
        batches,
        examples,
        loss = outcome.loss,
        accuracy = outcome.accuracy,
        "Evaluation pass complete"
    );
    Ok(outcome)
}
