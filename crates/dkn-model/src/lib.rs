//! Knowledge-aware news click prediction.
//!
//! Predicts the probability that a user clicks a candidate news item given
//! the items they clicked before. Each title is encoded by a knowledge-aware
//! CNN over aligned word and entity ids, the click history is reduced to one
//! interest vector by candidate-conditioned attention (or a plain mean), and
//! a small scoring head turns (interest, candidate) into a probability.
//!
//! # Architecture
//!
//! - **ContentEncoder**: Trait for news encoders; [`KcnnEncoder`] is the default
//! - **InterestAggregator**: Attention or mean over the `[H, B, D]` history
//! - **ScoringHead**: `Linear -> Linear -> sigmoid` over the joined vectors
//! - **Predictor**: Encoder, aggregator and head sharing one `VarMap`
//! - **Trainer**: Step loop with epoch reshuffling and periodic validation
//!
//! # Example
//!
//! ```rust,ignore
//! use dkn_model::{ClickDataset, DknConfig, MemorySink, Predictor, Trainer};
//! use candle_core::Device;
//!
//! let config = DknConfig::from_file("dkn.toml")?;
//! let dataset = ClickDataset::from_jsonl("clicks.jsonl".as_ref())?;
//! let (train, test) = dataset.random_split(config.training.train_split, config.training.seed);
//!
//! let predictor = Predictor::new(&config.model, &Device::Cpu)?;
//! let mut trainer = Trainer::new(predictor, config.training, Box::new(MemorySink::new()))?;
//! let report = trainer.train(&train, &test)?;
//! println!("final test accuracy {}", report.final_test.accuracy);
//! ```

pub mod attention;
pub mod config;
pub mod encoder;
pub mod error;
pub mod head;
pub mod predictor;
pub mod training;
pub mod types;

pub use attention::{AggregationMode, InterestAggregator};
pub use config::{DknConfig, ModelConfig, OptimizerKind, TrainingConfig};
pub use encoder::{ContentEncoder, KcnnEncoder};
pub use error::{DknError, DknResult};
pub use head::ScoringHead;
pub use predictor::Predictor;
pub use training::{
    evaluate, ClickDataset, EvalOutcome, ExhaustionEvent, FanoutSink, JsonlSink, LoopState,
    MemorySink, MetricSink, Trainer, TrainingReport, TracingSink,
};
pub use types::{Batch, Example, NewsBatch, NewsItem};
