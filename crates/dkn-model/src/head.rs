//! Click scoring head: `sigmoid(Linear(16 -> 1)(Linear(2D -> 16)(interest ++ candidate)))`.

use candle_core::{Module, Tensor};
use candle_nn::{Linear, VarBuilder};

use crate::config::SCORING_HIDDEN_DIM;
use crate::error::{map_candle, DknError, DknResult};

/// Maps an (interest, candidate) pair of embeddings to a click probability.
pub struct ScoringHead {
    hidden: Linear,
    output: Linear,
    embedding_dim: usize,
}

impl ScoringHead {
    /// Create the head for embeddings of width `embedding_dim`.
    pub fn new(embedding_dim: usize, vb: VarBuilder) -> DknResult<Self> {
        let hidden = candle_nn::linear(2 * embedding_dim, SCORING_HIDDEN_DIM, vb.pp("hidden"))
            .map_err(map_candle)?;
        let output = candle_nn::linear(SCORING_HIDDEN_DIM, 1, vb.pp("output")).map_err(map_candle)?;
        Ok(Self {
            hidden,
            output,
            embedding_dim,
        })
    }

    /// Head over caller-supplied layers (`2D -> k`, `k -> 1`).
    pub fn from_layers(hidden: Linear, output: Linear) -> DknResult<Self> {
        let in_features = hidden.weight().dim(1).map_err(map_candle)?;
        Ok(Self {
            hidden,
            output,
            embedding_dim: in_features / 2,
        })
    }

    /// Pre-sigmoid click scores, `[B]`.
    pub fn logits(&self, interest: &Tensor, candidate: &Tensor) -> DknResult<Tensor> {
        let (b, d) = interest.dims2().map_err(map_candle)?;
        let (cb, cd) = candidate.dims2().map_err(map_candle)?;
        if d != self.embedding_dim || cd != self.embedding_dim {
            return Err(DknError::DimensionMismatch {
                expected: self.embedding_dim,
                actual: if d != self.embedding_dim { d } else { cd },
            });
        }
        if b != cb {
            return Err(DknError::ShapeMismatch {
                context: "scoring head batch size",
                expected: vec![b, d],
                actual: vec![cb, cd],
            });
        }

        let joined = Tensor::cat(&[interest, candidate], 1).map_err(map_candle)?;
        let hidden = self.hidden.forward(&joined).map_err(map_candle)?;
        self.output
            .forward(&hidden)
            .and_then(|t| t.squeeze(1))
            .map_err(map_candle)
    }

    /// Click probabilities in (0, 1), `[B]`.
    pub fn score(&self, interest: &Tensor, candidate: &Tensor) -> DknResult<Tensor> {
        let logits = self.logits(interest, candidate)?;
        candle_nn::ops::sigmoid(&logits).map_err(map_candle)
    }
}
