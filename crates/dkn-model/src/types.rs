//! Core data types: news items, labeled examples and materialized batches.

use candle_core::{Device, Tensor};
use serde::{Deserialize, Serialize};

use crate::error::{map_candle, DknError, DknResult};

/// One news title as aligned word and entity token ids.
///
/// Entity id 0 marks a word that is not linked to any entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsItem {
    /// Word token ids, length `num_words_a_sentence`.
    pub word: Vec<u32>,
    /// Entity token ids aligned with `word`.
    pub entity: Vec<u32>,
}

impl NewsItem {
    /// Create a news item from aligned word and entity ids.
    pub fn new(word: Vec<u32>, entity: Vec<u32>) -> Self {
        Self { word, entity }
    }

    /// Title length in tokens.
    pub fn len(&self) -> usize {
        self.word.len()
    }

    /// Whether the title has no tokens.
    pub fn is_empty(&self) -> bool {
        self.word.is_empty()
    }
}

/// A labeled (candidate, click history) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Example {
    /// News item whose click probability is predicted.
    pub candidate_news: NewsItem,
    /// The user's clicked news, oldest first.
    pub clicked_news: Vec<NewsItem>,
    /// 1 if the user clicked the candidate, 0 otherwise.
    pub clicked: u8,
}

impl Example {
    /// Label as a float target.
    pub fn label(&self) -> f32 {
        if self.clicked > 0 {
            1.0
        } else {
            0.0
        }
    }

    /// Check title lengths, history length and label range.
    pub fn validate(&self, num_words: usize, num_clicked: usize) -> DknResult<()> {
        if self.clicked > 1 {
            return Err(DknError::InvalidInput(format!(
                "label must be 0 or 1, got {}",
                self.clicked
            )));
        }
        if self.clicked_news.len() != num_clicked {
            return Err(DknError::ShapeMismatch {
                context: "click history length",
                expected: vec![num_clicked],
                actual: vec![self.clicked_news.len()],
            });
        }
        for item in std::iter::once(&self.candidate_news).chain(self.clicked_news.iter()) {
            if item.word.len() != num_words || item.entity.len() != num_words {
                return Err(DknError::ShapeMismatch {
                    context: "news title length",
                    expected: vec![num_words, num_words],
                    actual: vec![item.word.len(), item.entity.len()],
                });
            }
        }
        Ok(())
    }
}

/// `B` news items laid out as `[B, L]` u32 tensors.
#[derive(Debug, Clone)]
pub struct NewsBatch {
    /// Word ids `[B, L]`.
    pub word: Tensor,
    /// Entity ids `[B, L]`.
    pub entity: Tensor,
}

impl NewsBatch {
    /// Stack news items into one batch. All items must share the same length.
    pub fn from_items(items: &[&NewsItem], device: &Device) -> DknResult<Self> {
        let batch_size = items.len();
        if batch_size == 0 {
            return Err(DknError::InvalidInput("empty news batch".to_string()));
        }
        let len = items[0].len();

        let mut word = Vec::with_capacity(batch_size * len);
        let mut entity = Vec::with_capacity(batch_size * len);
        for item in items {
            if item.word.len() != len || item.entity.len() != len {
                return Err(DknError::ShapeMismatch {
                    context: "news batch title length",
                    expected: vec![len, len],
                    actual: vec![item.word.len(), item.entity.len()],
                });
            }
            word.extend_from_slice(&item.word);
            entity.extend_from_slice(&item.entity);
        }

        Ok(Self {
            word: Tensor::from_vec(word, (batch_size, len), device).map_err(map_candle)?,
            entity: Tensor::from_vec(entity, (batch_size, len), device).map_err(map_candle)?,
        })
    }

    /// Number of news items in the batch.
    pub fn batch_size(&self) -> DknResult<usize> {
        self.word.dim(0).map_err(map_candle)
    }
}

/// A fully materialized training or evaluation batch, history-major.
#[derive(Debug, Clone)]
pub struct Batch {
    /// Candidate news `[B, L]`.
    pub candidate: NewsBatch,
    /// `H` slots, slot `h` holds the `h`-th clicked item of every user.
    pub clicked: Vec<NewsBatch>,
    /// Click labels `[B]` as f32.
    pub labels: Tensor,
}

impl Batch {
    /// Build a batch from examples on the given device.
    pub fn from_examples(examples: &[&Example], device: &Device) -> DknResult<Self> {
        let first = examples
            .first()
            .ok_or_else(|| DknError::InvalidInput("empty batch".to_string()))?;
        let history_len = first.clicked_news.len();

        let candidates: Vec<&NewsItem> = examples.iter().map(|e| &e.candidate_news).collect();
        let candidate = NewsBatch::from_items(&candidates, device)?;

        let clicked = (0..history_len)
            .map(|h| history_slot(examples, h, device))
            .collect::<DknResult<Vec<_>>>()?;

        let labels: Vec<f32> = examples.iter().map(|e| e.label()).collect();
        let labels = Tensor::from_vec(labels, examples.len(), device).map_err(map_candle)?;

        Ok(Self {
            candidate,
            clicked,
            labels,
        })
    }

    /// Number of examples in the batch.
    pub fn batch_size(&self) -> DknResult<usize> {
        self.candidate.batch_size()
    }
}

/// Gather the `h`-th clicked item of every example into one news batch.
pub(crate) fn history_slot(
    examples: &[&Example],
    h: usize,
    device: &Device,
) -> DknResult<NewsBatch> {
    let items = examples
        .iter()
        .map(|e| {
            e.clicked_news.get(h).ok_or(DknError::ShapeMismatch {
                context: "click history length",
                expected: vec![h + 1],
                actual: vec![e.clicked_news.len()],
            })
        })
        .collect::<DknResult<Vec<_>>>()?;
    NewsBatch::from_items(&items, device)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(seed: u32) -> NewsItem {
        NewsItem::new(vec![seed, seed + 1, seed + 2], vec![0, seed, 0])
    }

    fn example(seed: u32, clicked: u8) -> Example {
        Example {
            candidate_news: item(seed),
            clicked_news: vec![item(seed + 10), item(seed + 20)],
            clicked,
        }
    }

    #[test]
    fn test_batch_is_history_major() {
        let a = example(1, 1);
        let b = example(100, 0);
        let batch = Batch::from_examples(&[&a, &b], &Device::Cpu).unwrap();

        assert_eq!(batch.batch_size().unwrap(), 2);
        assert_eq!(batch.clicked.len(), 2);

        // Slot 1 holds the second clicked item of each user.
        let slot: Vec<Vec<u32>> = batch.clicked[1].word.to_vec2().unwrap();
        assert_eq!(slot, vec![vec![21, 22, 23], vec![120, 121, 122]]);

        let labels: Vec<f32> = batch.labels.to_vec1().unwrap();
        assert_eq!(labels, vec![1.0, 0.0]);
    }

    #[test]
    fn test_validate_rejects_bad_label() {
        let ex = example(1, 2);
        assert!(matches!(ex.validate(3, 2), Err(DknError::InvalidInput(_))));
    }

    #[test]
    fn test_validate_rejects_short_history() {
        let ex = example(1, 1);
        assert!(matches!(
            ex.validate(3, 5),
            Err(DknError::ShapeMismatch { .. })
        ));
        assert!(ex.validate(3, 2).is_ok());
    }

    #[test]
    fn test_ragged_titles_rejected() {
        let a = item(1);
        let b = NewsItem::new(vec![1, 2], vec![0, 0]);
        assert!(NewsBatch::from_items(&[&a, &b], &Device::Cpu).is_err());
    }

    #[test]
    fn test_example_json_shape() {
        let json = r#"{"candidate_news":{"word":[1,2],"entity":[0,3]},"clicked_news":[{"word":[4,5],"entity":[0,0]}],"clicked":1}"#;
        let ex: Example = serde_json::from_str(json).unwrap();
        assert_eq!(ex.clicked_news.len(), 1);
        assert_eq!(ex.label(), 1.0);
    }
}
