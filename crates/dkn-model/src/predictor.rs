//! Full forward computation: encoder -> interest aggregation -> scoring head.

use candle_core::{DType, Device, Tensor, Var};
use candle_nn::{VarBuilder, VarMap};
use tracing::debug;

use crate::attention::{AggregationMode, InterestAggregator};
use crate::config::ModelConfig;
use crate::encoder::{ContentEncoder, KcnnEncoder};
use crate::error::{map_candle, DknError, DknResult};
use crate::head::ScoringHead;
use crate::types::{Batch, NewsBatch};

/// Click probability model.
///
/// Owns every learnable variable through one [`VarMap`]. The encoder is a
/// single instance applied to the candidate and to each history slot.
pub struct Predictor<E = KcnnEncoder> {
    encoder: E,
    aggregator: InterestAggregator,
    head: ScoringHead,
    history_len: usize,
    varmap: VarMap,
    device: Device,
}

impl Predictor<KcnnEncoder> {
    /// Build a KCNN-based predictor with freshly initialised parameters.
    pub fn new(config: &ModelConfig, device: &Device) -> DknResult<Self> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);

        let encoder = KcnnEncoder::new(config, vb.pp("kcnn"))?;
        let aggregator = InterestAggregator::from_config(config, vb.pp("attention"))?;
        let head = ScoringHead::new(config.embedding_dim(), vb.pp("head"))?;

        Self::from_parts(
            encoder,
            aggregator,
            head,
            config.num_clicked_news_a_user,
            varmap,
            device.clone(),
        )
    }
}

impl<E: ContentEncoder> Predictor<E> {
    /// Assemble a predictor from components whose variables live in `varmap`.
    pub fn from_parts(
        encoder: E,
        aggregator: InterestAggregator,
        head: ScoringHead,
        history_len: usize,
        varmap: VarMap,
        device: Device,
    ) -> DknResult<Self> {
        if history_len == 0 {
            return Err(DknError::EmptyHistory);
        }

        let predictor = Self {
            encoder,
            aggregator,
            head,
            history_len,
            varmap,
            device,
        };
        debug!(
            embedding_dim = predictor.encoder.output_dim(),
            history_len,
            mode = ?predictor.aggregator.mode(),
            num_params = predictor.num_params(),
            "Predictor assembled"
        );
        Ok(predictor)
    }

    /// Encode each history slot once and stack them, `[H, B, D]`.
    pub fn encode_history(&self, history: &[NewsBatch], batch_size: usize) -> DknResult<Tensor> {
        if history.is_empty() {
            return Err(DknError::EmptyHistory);
        }
        if history.len() != self.history_len {
            return Err(DknError::ShapeMismatch {
                context: "click history length",
                expected: vec![self.history_len],
                actual: vec![history.len()],
            });
        }

        let encoded = history
            .iter()
            .map(|slot| {
                let slot_batch = slot.batch_size()?;
                if slot_batch != batch_size {
                    return Err(DknError::ShapeMismatch {
                        context: "history slot batch size",
                        expected: vec![batch_size],
                        actual: vec![slot_batch],
                    });
                }
                self.encoder.encode(slot)
            })
            .collect::<DknResult<Vec<_>>>()?;

        Tensor::stack(&encoded, 0).map_err(map_candle)
    }

    fn embed(&self, candidate: &NewsBatch, history: &[NewsBatch]) -> DknResult<(Tensor, Tensor)> {
        let batch_size = candidate.batch_size()?;
        let candidate_vec = self.encoder.encode(candidate)?;
        let history_vecs = self.encode_history(history, batch_size)?;
        Ok((candidate_vec, history_vecs))
    }

    /// Pre-sigmoid click scores, `[B]`.
    pub fn logits(&self, candidate: &NewsBatch, history: &[NewsBatch]) -> DknResult<Tensor> {
        let (candidate_vec, history_vecs) = self.embed(candidate, history)?;
        let interest = self.aggregator.aggregate(&candidate_vec, &history_vecs)?;
        self.head.logits(&interest, &candidate_vec)
    }

    /// Click probabilities, `[B]`.
    pub fn predict(&self, candidate: &NewsBatch, history: &[NewsBatch]) -> DknResult<Tensor> {
        let logits = self.logits(candidate, history)?;
        candle_nn::ops::sigmoid(&logits).map_err(map_candle)
    }

    /// Click probabilities for a materialized batch.
    pub fn predict_batch(&self, batch: &Batch) -> DknResult<Tensor> {
        self.predict(&batch.candidate, &batch.clicked)
    }

    /// Attention weights over each user's history, `[B, H]`.
    pub fn attention_weights(
        &self,
        candidate: &NewsBatch,
        history: &[NewsBatch],
    ) -> DknResult<Tensor> {
        let (candidate_vec, history_vecs) = self.embed(candidate, history)?;
        self.aggregator
            .attention_weights(&candidate_vec, &history_vecs)
    }

    /// Aggregation mode in use.
    pub fn mode(&self) -> AggregationMode {
        self.aggregator.mode()
    }

    /// Configured history length `H`.
    pub fn history_len(&self) -> usize {
        self.history_len
    }

    /// Embedding width `D`.
    pub fn embedding_dim(&self) -> usize {
        self.encoder.output_dim()
    }

    /// Every learnable variable.
    pub fn trainable_vars(&self) -> Vec<Var> {
        self.varmap.all_vars()
    }

    /// Total learnable parameter count.
    pub fn num_params(&self) -> usize {
        self.varmap
            .all_vars()
            .iter()
            .map(|v| v.as_tensor().elem_count())
            .sum()
    }

    /// Device holding the parameters.
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Underlying variable map.
    pub fn varmap(&self) -> &VarMap {
        &self.varmap
    }
}
