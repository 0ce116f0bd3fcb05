//! Step-indexed training loop with epoch reshuffling and periodic validation.
//!
//! ```text
//!            next batch ok
//!   Running ───────────────> step ──> Running
//!     │  sampler exhausted              │ i % K2 == 0
//!     v                                 v
//!   Reshuffled ──> Running          Validating ──> Running
//!                                        ...
//!   i == N ──> final reports ──> Done
//! ```

use std::time::{Duration, Instant};

use tracing::{debug, error, info};

use super::data::{BatchBuilder, ClickDataset, EpochSampler};
use super::evaluation::{evaluate, EvalOutcome};
use super::loss::{bce_with_logits, tensor_to_f32};
use super::metrics::{tags, MetricSink};
use super::optimizer::StepOptimizer;
use crate::config::TrainingConfig;
use crate::encoder::{ContentEncoder, KcnnEncoder};
use crate::error::{map_candle, DknError, DknResult};
use crate::predictor::Predictor;
use crate::types::Batch;

/// Where the loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Drawing batches and applying updates.
    Running,
    /// The epoch ran out and a fresh permutation was started.
    Reshuffled,
    /// A validation pass is in progress.
    Validating,
    /// All `N` steps and the final reports completed.
    Done,
}

/// One epoch boundary crossed during training.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExhaustionEvent {
    /// Exhaustion count after this event (1-based).
    pub count: usize,
    /// Step whose batch triggered the reshuffle.
    pub step: usize,
}

/// Summary of a completed run.
#[derive(Debug, Clone)]
pub struct TrainingReport {
    pub steps_completed: usize,
    pub exhaustion_events: Vec<ExhaustionEvent>,
    /// Training loss of every step, index `i - 1`.
    pub losses: Vec<f32>,
    pub initial_test: EvalOutcome,
    pub final_test: EvalOutcome,
    pub final_train: EvalOutcome,
    /// Train and test splits evaluated together.
    pub final_full: EvalOutcome,
    pub first_non_finite_step: Option<usize>,
    pub elapsed: Duration,
}

impl TrainingReport {
    /// Number of times the training split was reshuffled.
    pub fn exhaustion_count(&self) -> usize {
        self.exhaustion_events.len()
    }
}

/// Drives optimizer steps over a predictor.
pub struct Trainer<E = KcnnEncoder> {
    predictor: Predictor<E>,
    optimizer: StepOptimizer,
    config: TrainingConfig,
    builder: BatchBuilder,
    sink: Box<dyn MetricSink>,
    state: LoopState,
}

impl<E: ContentEncoder> Trainer<E> {
    /// Create a trainer optimizing every variable of `predictor`.
    pub fn new(
        predictor: Predictor<E>,
        config: TrainingConfig,
        sink: Box<dyn MetricSink>,
    ) -> DknResult<Self> {
        config
            .validate()
            .map_err(|message| DknError::ConfigError { message })?;

        let optimizer = StepOptimizer::new(
            config.optimizer,
            predictor.trainable_vars(),
            config.learning_rate,
        )?;
        let builder = BatchBuilder::new(predictor.device(), config.num_workers)?;

        info!(
            optimizer = ?config.optimizer,
            learning_rate = config.learning_rate,
            batch_size = config.batch_size,
            num_workers = builder.num_workers(),
            num_params = predictor.num_params(),
            "Trainer initialized"
        );

        Ok(Self {
            predictor,
            optimizer,
            config,
            builder,
            sink,
            state: LoopState::Running,
        })
    }

    pub fn predictor(&self) -> &Predictor<E> {
        &self.predictor
    }

    pub fn into_predictor(self) -> Predictor<E> {
        self.predictor
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Loss and accuracy over every full batch of `dataset`.
    pub fn evaluate(&self, dataset: &ClickDataset) -> DknResult<EvalOutcome> {
        evaluate(
            &self.predictor,
            dataset,
            &self.builder,
            self.config.batch_size,
        )
    }

    /// Forward, backward and one optimizer update on `batch`; returns the loss.
    ///
    /// Gradients are fully computed before any parameter changes. A batch
    /// whose size differs from the configured `batch_size` is rejected
    /// before the forward pass.
    pub fn train_step(&mut self, batch: &Batch) -> DknResult<f32> {
        let actual = batch.batch_size()?;
        if actual != self.config.batch_size {
            return Err(DknError::ShapeMismatch {
                context: "batch size",
                expected: vec![self.config.batch_size],
                actual: vec![actual],
            });
        }
        let logits = self.predictor.logits(&batch.candidate, &batch.clicked)?;
        let loss = bce_with_logits(&logits, &batch.labels)?;
        let value = tensor_to_f32(&loss)?;
        let grads = loss.backward().map_err(map_candle)?;
        self.optimizer.step(&grads)?;
        Ok(value)
    }

    /// Run `num_batches` steps over `train`, validating on `test`.
    pub fn train(
        &mut self,
        train: &ClickDataset,
        test: &ClickDataset,
    ) -> DknResult<TrainingReport> {
        let batch_size = self.config.batch_size;
        for dataset in [train, test] {
            if dataset.len() < batch_size {
                return Err(DknError::DatasetTooSmall {
                    len: dataset.len(),
                    batch_size,
                });
            }
        }

        let num_batches = self.config.num_batches;
        let k1 = self.config.num_batches_batch_loss;
        let k2 = self.config.num_batches_val_loss_and_acc;
        let start = Instant::now();
        self.state = LoopState::Running;

        let mut sampler = EpochSampler::new(train.len(), batch_size, self.config.seed);
        info!(
            train_examples = train.len(),
            test_examples = test.len(),
            batches_per_epoch = sampler.batches_per_epoch(),
            num_batches,
            "Training started"
        );

        let initial_test = self.validate(test, 1)?;
        info!(
            loss = initial_test.loss,
            accuracy = initial_test.accuracy,
            "Test metrics before training"
        );

        let mut losses = Vec::with_capacity(num_batches);
        let mut loss_sum = 0.0f64;
        let mut exhaustion_events = Vec::new();
        let mut first_non_finite_step = None;

        for step in 1..=num_batches {
            let next = sampler.next_indices().map(<[usize]>::to_vec);
            let positions = match next {
                Some(positions) => positions,
                None => {
                    sampler.reshuffle();
                    self.state = LoopState::Reshuffled;
                    let event = ExhaustionEvent {
                        count: exhaustion_events.len() + 1,
                        step,
                    };
                    info!(
                        exhaustion_count = event.count,
                        step,
                        "Training data exhausted, reshuffling"
                    );
                    self.sink
                        .record(tags::EXHAUSTION, step, event.count as f64);
                    exhaustion_events.push(event);

                    let positions = sampler.next_indices().map(<[usize]>::to_vec);
                    self.state = LoopState::Running;
                    positions.ok_or(DknError::DatasetTooSmall {
                        len: train.len(),
                        batch_size,
                    })?
                }
            };

            let batch = self.builder.build(train, &positions)?;
            let loss = self.train_step(&batch)?;
            losses.push(loss);
            self.sink.record(tags::TRAIN_LOSS, step, loss as f64);

            if !loss.is_finite() {
                error!(step, loss, "Non-finite training loss");
                self.sink.record(tags::NON_FINITE_LOSS, step, loss as f64);
                first_non_finite_step.get_or_insert(step);
            }
            loss_sum += loss as f64;

            if k1 > 0 && step % k1 == 0 {
                let running_mean = loss_sum / step as f64;
                self.sink.record(tags::TRAIN_LOSS_MEAN, step, running_mean);
                info!(
                    step,
                    loss,
                    running_mean,
                    elapsed = %format_elapsed(start.elapsed()),
                    "Training loss"
                );
            }

            if k2 > 0 && step % k2 == 0 {
                let outcome = self.validate(test, step)?;
                info!(
                    step,
                    loss = outcome.loss,
                    accuracy = outcome.accuracy,
                    elapsed = %format_elapsed(start.elapsed()),
                    "Validation"
                );
            }
        }

        let final_test = self.validate(test, num_batches)?;
        let final_train = self.report(
            train,
            num_batches,
            tags::FINAL_TRAIN_LOSS,
            tags::FINAL_TRAIN_ACCURACY,
        )?;
        let full = ClickDataset::merged(&[train, test]);
        let final_full = self.report(
            &full,
            num_batches,
            tags::FINAL_FULL_LOSS,
            tags::FINAL_FULL_ACCURACY,
        )?;
        self.sink.flush()?;

        let elapsed = start.elapsed();
        self.state = LoopState::Done;
        info!(
            steps = num_batches,
            exhaustion_count = exhaustion_events.len(),
            test = %final_test,
            train = %final_train,
            full = %final_full,
            elapsed = %format_elapsed(elapsed),
            "Training finished"
        );

        Ok(TrainingReport {
            steps_completed: losses.len(),
            exhaustion_events,
            losses,
            initial_test,
            final_test,
            final_train,
            final_full,
            first_non_finite_step,
            elapsed,
        })
    }

    fn validate(&mut self, test: &ClickDataset, step: usize) -> DknResult<EvalOutcome> {
        self.state = LoopState::Validating;
        let outcome = self.report(test, step, tags::TEST_LOSS, tags::TEST_ACCURACY);
        self.state = LoopState::Running;
        outcome
    }

    fn report(
        &self,
        dataset: &ClickDataset,
        step: usize,
        loss_tag: &str,
        accuracy_tag: &str,
    ) -> DknResult<EvalOutcome> {
        let outcome = self.evaluate(dataset)?;
        self.sink.record(loss_tag, step, outcome.loss as f64);
        self.sink.record(accuracy_tag, step, outcome.accuracy as f64);
        debug!(step, loss_tag, %outcome, "Reported evaluation");
        Ok(outcome)
    }
}

/// Format a duration as `HH:MM:SS`.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(Duration::from_secs(0)), "00:00:00");
        assert_eq!(format_elapsed(Duration::from_millis(61_900)), "00:01:01");
        assert_eq!(format_elapsed(Duration::from_secs(3 * 3600 + 25 * 60 + 7)), "03:25:07");
        assert_eq!(format_elapsed(Duration::from_secs(100 * 3600)), "100:00:00");
    }
}
