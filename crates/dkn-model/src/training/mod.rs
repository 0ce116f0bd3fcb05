//! Training and evaluation of the click predictor.
//!
//! # Architecture
//!
//! ```text
//! ClickDataset ──> EpochSampler ──> BatchBuilder ──> Batch
//!                                                     │
//!                                              ┌──────┴──────┐
//!                                              │   Trainer   │
//!                                              │  logits     │
//!                                              │  BCE loss   │
//!                                              │  backward   │
//!                                              │  Adam / SGD │
//!                                              └──────┬──────┘
//!                                                     │
//!                          MetricSink <── evaluate (loss, accuracy)
//! ```
//!
//! # Modules
//!
//! - [`data`]: Datasets, JSONL files, epoch sampling and batch building
//! - [`loss`]: Stable binary cross-entropy and accuracy
//! - [`optimizer`]: Adam and SGD over the predictor's variables
//! - [`evaluation`]: Held-out loss and accuracy
//! - [`metrics`]: Scalar metric sinks
//! - [`trainer`]: Step loop with reshuffling and periodic validation

pub mod data;
pub mod evaluation;
pub mod loss;
pub mod metrics;
pub mod optimizer;
pub mod trainer;

pub use data::{load_examples_jsonl, save_examples_jsonl, BatchBuilder, ClickDataset, EpochSampler};
pub use evaluation::{evaluate, EvalOutcome};
pub use metrics::{tags, FanoutSink, JsonlSink, MemorySink, MetricRecord, MetricSink, TracingSink};
pub use optimizer::StepOptimizer;
pub use trainer::{format_elapsed, ExhaustionEvent, LoopState, Trainer, TrainingReport};
