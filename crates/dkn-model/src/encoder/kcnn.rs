//! Knowledge-aware CNN over word and entity channels.
//!
//! ```text
//! word ids   [B, L] -> word embedding                    [B, L, Dw]
//! entity ids [B, L] -> entity embedding -> tanh(Linear)  [B, L, Dw]
//! (context   [B, L] -> context embedding -> tanh(Linear) [B, L, Dw])
//!        |
//!        v  stack channels, tokens last                  [B, C*Dw, L]
//!   conv1d(window w, num_filters) -> ReLU -> max over L  [B, F]  per window
//!        |
//!        v  concat windows                               [B, W*F]
//! ```

use std::path::Path;

use candle_core::{DType, Module, Tensor};
use candle_nn::{Conv1d, Conv1dConfig, Embedding, Linear, VarBuilder};
use tracing::debug;

use super::ContentEncoder;
use crate::config::ModelConfig;
use crate::error::{map_candle, DknError, DknResult};
use crate::types::NewsBatch;

/// Convolutional news encoder with an entity channel aligned to the words.
pub struct KcnnEncoder {
    word_embedding: Embedding,
    entity_embedding: Embedding,
    transform_entity: Linear,
    context: Option<(Embedding, Linear)>,
    convs: Vec<(usize, Conv1d)>,
    num_word_tokens: usize,
    num_entity_tokens: usize,
    output_dim: usize,
}

impl KcnnEncoder {
    /// Build the encoder, registering its variables under `vb`.
    ///
    /// Entity and context matrices come from `.npy` files when the config
    /// names one; such matrices are kept fixed during training.
    pub fn new(config: &ModelConfig, vb: VarBuilder) -> DknResult<Self> {
        let word_dim = config.word_embedding_dim;
        let entity_dim = config.entity_embedding_dim;

        let word_embedding =
            candle_nn::embedding(config.num_word_tokens, word_dim, vb.pp("word_embedding"))
                .map_err(map_candle)?;

        let entity_embedding = match &config.entity_embedding_path {
            Some(path) => load_pretrained(path, config.num_entity_tokens, entity_dim, &vb)?,
            None => candle_nn::embedding(
                config.num_entity_tokens,
                entity_dim,
                vb.pp("entity_embedding"),
            )
            .map_err(map_candle)?,
        };
        let transform_entity =
            candle_nn::linear(entity_dim, word_dim, vb.pp("transform_entity")).map_err(map_candle)?;

        let context = if config.use_context {
            let embedding = match &config.context_embedding_path {
                Some(path) => load_pretrained(path, config.num_entity_tokens, entity_dim, &vb)?,
                None => candle_nn::embedding(
                    config.num_entity_tokens,
                    entity_dim,
                    vb.pp("context_embedding"),
                )
                .map_err(map_candle)?,
            };
            let transform = candle_nn::linear(entity_dim, word_dim, vb.pp("transform_context"))
                .map_err(map_candle)?;
            Some((embedding, transform))
        } else {
            None
        };

        let in_channels = config.num_channels() * word_dim;
        let convs = config
            .window_sizes
            .iter()
            .map(|&w| {
                candle_nn::conv1d(
                    in_channels,
                    config.num_filters,
                    w,
                    Conv1dConfig::default(),
                    vb.pp(format!("conv_{}", w)),
                )
                .map(|conv| (w, conv))
                .map_err(map_candle)
            })
            .collect::<DknResult<Vec<_>>>()?;

        Ok(Self {
            word_embedding,
            entity_embedding,
            transform_entity,
            context,
            convs,
            num_word_tokens: config.num_word_tokens,
            num_entity_tokens: config.num_entity_tokens,
            output_dim: config.embedding_dim(),
        })
    }

    /// Window sizes in the order their features are concatenated.
    pub fn window_sizes(&self) -> Vec<usize> {
        self.convs.iter().map(|(w, _)| *w).collect()
    }

    fn embed_knowledge(
        &self,
        ids: &Tensor,
        embedding: &Embedding,
        transform: &Linear,
    ) -> DknResult<Tensor> {
        let raw = embedding.forward(ids).map_err(map_candle)?;
        transform
            .forward(&raw)
            .map_err(map_candle)?
            .tanh()
            .map_err(map_candle)
    }
}

impl ContentEncoder for KcnnEncoder {
    fn output_dim(&self) -> usize {
        self.output_dim
    }

    fn encode(&self, news: &NewsBatch) -> DknResult<Tensor> {
        check_vocab(&news.word, self.num_word_tokens, "word")?;
        check_vocab(&news.entity, self.num_entity_tokens, "entity")?;

        let len = news.word.dim(1).map_err(map_candle)?;
        if let Some(&(w, _)) = self.convs.iter().find(|(w, _)| *w > len) {
            return Err(DknError::InvalidInput(format!(
                "window size {} exceeds title length {}",
                w, len
            )));
        }

        let mut channels = vec![
            self.word_embedding.forward(&news.word).map_err(map_candle)?,
            self.embed_knowledge(&news.entity, &self.entity_embedding, &self.transform_entity)?,
        ];
        if let Some((embedding, transform)) = &self.context {
            channels.push(self.embed_knowledge(&news.entity, embedding, transform)?);
        }

        // [B, L, C*Dw] -> [B, C*Dw, L]
        let stacked = Tensor::cat(&channels, 2)
            .map_err(map_candle)?
            .transpose(1, 2)
            .map_err(map_candle)?
            .contiguous()
            .map_err(map_candle)?;

        let pooled = self
            .convs
            .iter()
            .map(|(_, conv)| {
                conv.forward(&stacked)
                    .and_then(|x| x.relu())
                    .and_then(|x| x.max(2))
                    .map_err(map_candle)
            })
            .collect::<DknResult<Vec<_>>>()?;

        Tensor::cat(&pooled, 1).map_err(map_candle)
    }
}

/// Reject token ids outside the embedding table.
fn check_vocab(ids: &Tensor, vocab: usize, channel: &'static str) -> DknResult<()> {
    let max_id = ids
        .flatten_all()
        .and_then(|t| t.max(0))
        .and_then(|t| t.to_scalar::<u32>())
        .map_err(map_candle)?;
    if max_id as usize >= vocab {
        return Err(DknError::InvalidInput(format!(
            "{} id {} out of range for vocabulary of {}",
            channel, max_id, vocab
        )));
    }
    Ok(())
}

/// Load a fixed `[rows, dim]` embedding matrix from a `.npy` file.
fn load_pretrained(
    path: &Path,
    rows: usize,
    dim: usize,
    vb: &VarBuilder,
) -> DknResult<Embedding> {
    let matrix = Tensor::read_npy(path)
        .and_then(|t| t.to_dtype(DType::F32))
        .and_then(|t| t.to_device(vb.device()))
        .map_err(|e| DknError::InvalidInput(format!(
            "failed to load embedding matrix '{}': {}",
            path.display(),
            e
        )))?;

    let dims = matrix.dims().to_vec();
    if dims != [rows, dim] {
        return Err(DknError::ShapeMismatch {
            context: "pretrained embedding matrix",
            expected: vec![rows, dim],
            actual: dims,
        });
    }

    debug!(path = %path.display(), rows, dim, "Loaded pretrained embedding matrix");
    Ok(Embedding::new(matrix, dim))
}
