//! Model architecture configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Hidden width of the attention affinity network.
pub const ATTENTION_HIDDEN_DIM: usize = 32;

/// Hidden width of the click scoring head.
pub const SCORING_HIDDEN_DIM: usize = 16;

/// Architecture of the content encoder, aggregator and head.
///
/// `window_sizes` and `num_filters` fix the embedding width
/// `window_sizes.len() * num_filters` shared by every component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Use candidate-conditioned attention over the click history (otherwise mean).
    pub use_attention: bool,
    /// Stack the entity-context channel into the encoder input.
    pub use_context: bool,
    /// Tokens per news title (word and entity sequences share this length).
    pub num_words_a_sentence: usize,
    /// Clicked news items per user (history length `H`).
    pub num_clicked_news_a_user: usize,
    /// Word vocabulary size, including the padding id 0.
    pub num_word_tokens: usize,
    /// Entity vocabulary size, including the padding id 0.
    pub num_entity_tokens: usize,
    /// Word embedding width.
    pub word_embedding_dim: usize,
    /// Entity (and context) embedding width.
    pub entity_embedding_dim: usize,
    /// Convolution window sizes over the token axis.
    pub window_sizes: Vec<usize>,
    /// Filters per window size.
    pub num_filters: usize,
    /// Pretrained entity embedding matrix (`.npy`, `[num_entity_tokens, entity_embedding_dim]`).
    pub entity_embedding_path: Option<PathBuf>,
    /// Pretrained context embedding matrix (`.npy`), used when `use_context` is set.
    pub context_embedding_path: Option<PathBuf>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            use_attention: true,
            use_context: false,
            num_words_a_sentence: 10,
            num_clicked_news_a_user: 50,
            num_word_tokens: 30_000,
            num_entity_tokens: 20_000,
            word_embedding_dim: 100,
            entity_embedding_dim: 100,
            window_sizes: vec![1, 2, 3, 4],
            num_filters: 50,
            entity_embedding_path: None,
            context_embedding_path: None,
        }
    }
}

impl ModelConfig {
    /// Width of every news embedding produced by the encoder.
    pub fn embedding_dim(&self) -> usize {
        self.window_sizes.len() * self.num_filters
    }

    /// Number of stacked encoder input channels.
    pub fn num_channels(&self) -> usize {
        if self.use_context {
            3
        } else {
            2
        }
    }

    /// Validate model configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.num_words_a_sentence == 0 {
            return Err("num_words_a_sentence must be > 0".to_string());
        }
        if self.num_clicked_news_a_user == 0 {
            return Err("num_clicked_news_a_user must be > 0".to_string());
        }
        if self.num_word_tokens == 0 || self.num_entity_tokens == 0 {
            return Err("vocabulary sizes must be > 0".to_string());
        }
        if self.word_embedding_dim == 0 || self.entity_embedding_dim == 0 {
            return Err("embedding dimensions must be > 0".to_string());
        }
        if self.num_filters == 0 {
            return Err("num_filters must be > 0".to_string());
        }
        if self.window_sizes.is_empty() {
            return Err("window_sizes must not be empty".to_string());
        }
        if let Some(&w) = self
            .window_sizes
            .iter()
            .find(|&&w| w == 0 || w > self.num_words_a_sentence)
        {
            return Err(format!(
                "window size {} must be in 1..={}",
                w, self.num_words_a_sentence
            ));
        }
        if self.context_embedding_path.is_some() && !self.use_context {
            return Err("context_embedding_path is set but use_context is false".to_string());
        }
        Ok(())
    }
}
