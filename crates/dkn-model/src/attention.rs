//! Candidate-conditioned interest aggregation over a click history.
//!
//! # Architecture
//!
//! ```text
//! history [H, B, D]   candidate [B, D]
//!        |                  | broadcast over H
//!        +---- concat ------+             [H, B, 2D]
//!                |
//!   Linear(2D -> 32) -> Linear(32 -> 1)   [H, B]
//!                |
//!   softmax over H (row max subtracted)   [B, H]   attention weights
//!                |
//!   weighted sum of history               [B, D]   interest vector
//! ```
//!
//! Mean mode skips the affinity network and averages the history.

use candle_core::{Module, Tensor, D};
use candle_nn::{Linear, VarBuilder};

use crate::config::{ModelConfig, ATTENTION_HIDDEN_DIM};
use crate::error::{map_candle, DknError, DknResult};

/// How the click history is reduced to one interest vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationMode {
    /// Softmax-weighted sum conditioned on the candidate.
    Attention,
    /// Unweighted mean, no parameters.
    Mean,
}

/// Two linear layers scoring one (history item, candidate) pair.
struct AffinityNet {
    hidden: Linear,
    output: Linear,
}

impl AffinityNet {
    fn forward(&self, pairs: &Tensor) -> DknResult<Tensor> {
        let hidden = self.hidden.forward(pairs).map_err(map_candle)?;
        self.output.forward(&hidden).map_err(map_candle)
    }
}

/// Reduces `[H, B, D]` history embeddings to `[B, D]` interest vectors.
pub struct InterestAggregator {
    affinity: Option<AffinityNet>,
    embedding_dim: usize,
}

impl InterestAggregator {
    /// Build the aggregator the config asks for, registering attention
    /// variables under `vb` when attention is enabled.
    pub fn from_config(config: &ModelConfig, vb: VarBuilder) -> DknResult<Self> {
        if config.use_attention {
            Self::attention(config.embedding_dim(), vb)
        } else {
            Ok(Self::mean(config.embedding_dim()))
        }
    }

    /// Attention aggregator with freshly initialised affinity network.
    pub fn attention(embedding_dim: usize, vb: VarBuilder) -> DknResult<Self> {
        let hidden = candle_nn::linear(2 * embedding_dim, ATTENTION_HIDDEN_DIM, vb.pp("hidden"))
            .map_err(map_candle)?;
        let output =
            candle_nn::linear(ATTENTION_HIDDEN_DIM, 1, vb.pp("output")).map_err(map_candle)?;
        Ok(Self {
            affinity: Some(AffinityNet { hidden, output }),
            embedding_dim,
        })
    }

    /// Attention aggregator over caller-supplied layers.
    ///
    /// `hidden` maps `2D -> k`, `output` maps `k -> 1`.
    pub fn from_layers(hidden: Linear, output: Linear) -> DknResult<Self> {
        let in_features = hidden.weight().dim(1).map_err(map_candle)?;
        if in_features % 2 != 0 {
            return Err(DknError::InvalidInput(format!(
                "affinity input width {} is not 2 * embedding_dim",
                in_features
            )));
        }
        Ok(Self {
            affinity: Some(AffinityNet { hidden, output }),
            embedding_dim: in_features / 2,
        })
    }

    /// Parameter-free mean aggregator.
    pub fn mean(embedding_dim: usize) -> Self {
        Self {
            affinity: None,
            embedding_dim,
        }
    }

    /// Active aggregation mode.
    pub fn mode(&self) -> AggregationMode {
        if self.affinity.is_some() {
            AggregationMode::Attention
        } else {
            AggregationMode::Mean
        }
    }

    /// Per-user distribution over history positions, `[B, H]`.
    ///
    /// Uniform `1/H` in mean mode.
    pub fn attention_weights(&self, candidate: &Tensor, history: &Tensor) -> DknResult<Tensor> {
        let (h, b, d) = self.check_shapes(candidate, history)?;

        let Some(affinity) = &self.affinity else {
            return Tensor::ones((b, h), candidate.dtype(), candidate.device())
                .and_then(|t| t.affine(1.0 / h as f64, 0.0))
                .map_err(map_candle);
        };

        let candidate = candidate
            .unsqueeze(0)
            .and_then(|t| t.broadcast_as((h, b, d)))
            .and_then(|t| t.contiguous())
            .map_err(map_candle)?;
        let pairs = Tensor::cat(&[history, &candidate], 2).map_err(map_candle)?;

        // [H, B, 1] -> [B, H]
        let scores = affinity
            .forward(&pairs)?
            .squeeze(2)
            .and_then(|t| t.t())
            .map_err(map_candle)?;

        candle_nn::ops::softmax(&scores, D::Minus1).map_err(map_candle)
    }

    /// Interest vector per user, `[B, D]`.
    ///
    /// # Errors
    /// - `DknError::EmptyHistory` when `H == 0`
    /// - `DknError::DimensionMismatch` when candidate and history widths differ
    /// - `DknError::ShapeMismatch` when batch sizes differ
    pub fn aggregate(&self, candidate: &Tensor, history: &Tensor) -> DknResult<Tensor> {
        if self.affinity.is_none() {
            self.check_shapes(candidate, history)?;
            return history.mean(0).map_err(map_candle);
        }

        let weights = self.attention_weights(candidate, history)?;

        // [B, 1, H] x [B, H, D] -> [B, 1, D]
        let history = history
            .transpose(0, 1)
            .and_then(|t| t.contiguous())
            .map_err(map_candle)?;
        weights
            .unsqueeze(1)
            .and_then(|w| w.matmul(&history))
            .and_then(|t| t.squeeze(1))
            .map_err(map_candle)
    }

    fn check_shapes(&self, candidate: &Tensor, history: &Tensor) -> DknResult<(usize, usize, usize)> {
        let (b, d) = candidate.dims2().map_err(|_| DknError::ShapeMismatch {
            context: "candidate embedding",
            expected: vec![0, self.embedding_dim],
            actual: candidate.dims().to_vec(),
        })?;
        let (h, hb, hd) = history.dims3().map_err(|_| DknError::ShapeMismatch {
            context: "history embeddings",
            expected: vec![0, b, d],
            actual: history.dims().to_vec(),
        })?;

        if h == 0 {
            return Err(DknError::EmptyHistory);
        }
        if d != self.embedding_dim {
            return Err(DknError::DimensionMismatch {
                expected: self.embedding_dim,
                actual: d,
            });
        }
        if hd != d {
            return Err(DknError::DimensionMismatch {
                expected: d,
                actual: hd,
            });
        }
        if hb != b {
            return Err(DknError::ShapeMismatch {
                context: "history batch size",
                expected: vec![h, b, d],
                actual: vec![h, hb, hd],
            });
        }
        Ok((h, b, d))
    }
}
