//! Synthetic click data for tests and smoke runs.
//!
//! Vocabularies are split into contiguous topic ranges. Every synthetic user
//! reads one topic; their history is drawn from it and a candidate is
//! clicked exactly when it shares that topic. The label is therefore
//! learnable from ids alone.

use dkn_model::{ClickDataset, Example, ModelConfig, NewsItem, OptimizerKind, TrainingConfig};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Number of topic ranges the vocabularies are split into.
pub const NUM_TOPICS: usize = 4;

/// Model small enough for CPU tests: L=5, H=3, D=8.
pub fn small_model_config() -> ModelConfig {
    ModelConfig {
        use_attention: true,
        use_context: false,
        num_words_a_sentence: 5,
        num_clicked_news_a_user: 3,
        num_word_tokens: 40,
        num_entity_tokens: 20,
        word_embedding_dim: 8,
        entity_embedding_dim: 6,
        window_sizes: vec![1, 2],
        num_filters: 4,
        entity_embedding_path: None,
        context_embedding_path: None,
    }
}

/// Short schedule for tests: B=4, N=20, diagnostics every 5, validation every 10.
pub fn small_training_config() -> TrainingConfig {
    TrainingConfig {
        batch_size: 4,
        num_workers: 0,
        train_split: 0.8,
        learning_rate: 0.01,
        optimizer: OptimizerKind::Adam,
        num_batches: 20,
        num_batches_batch_loss: 5,
        num_batches_val_loss_and_acc: 10,
        seed: 7,
    }
}

fn topic_range(vocab: usize, topic: usize) -> std::ops::Range<u32> {
    let width = (vocab / NUM_TOPICS).max(1);
    let start = (topic * width).min(vocab.saturating_sub(1));
    let end = (start + width).min(vocab).max(start + 1);
    start as u32..end as u32
}

/// A title whose word and entity ids all come from `topic`.
pub fn topic_news(config: &ModelConfig, topic: usize, rng: &mut impl Rng) -> NewsItem {
    let words = topic_range(config.num_word_tokens, topic);
    let entities = topic_range(config.num_entity_tokens, topic);
    let len = config.num_words_a_sentence;
    NewsItem::new(
        (0..len).map(|_| rng.gen_range(words.clone())).collect(),
        (0..len).map(|_| rng.gen_range(entities.clone())).collect(),
    )
}

/// One example for a user reading `user_topic`, labelled by topic match.
pub fn topic_example(
    config: &ModelConfig,
    user_topic: usize,
    candidate_topic: usize,
    rng: &mut impl Rng,
) -> Example {
    Example {
        candidate_news: topic_news(config, candidate_topic, rng),
        clicked_news: (0..config.num_clicked_news_a_user)
            .map(|_| topic_news(config, user_topic, rng))
            .collect(),
        clicked: u8::from(user_topic == candidate_topic),
    }
}

/// `count` examples, alternating positive and negative labels.
pub fn synthetic_examples(config: &ModelConfig, count: usize, seed: u64) -> Vec<Example> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|i| {
            let user_topic = rng.gen_range(0..NUM_TOPICS);
            let candidate_topic = if i % 2 == 0 {
                user_topic
            } else {
                (user_topic + rng.gen_range(1..NUM_TOPICS)) % NUM_TOPICS
            };
            topic_example(config, user_topic, candidate_topic, &mut rng)
        })
        .collect()
}

/// [`synthetic_examples`] wrapped in a dataset.
pub fn synthetic_dataset(config: &ModelConfig, count: usize, seed: u64) -> ClickDataset {
    ClickDataset::new(synthetic_examples(config, count, seed))
}
