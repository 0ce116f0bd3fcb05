//! Metric tags, validation cadence and the final report.

use dkn_model::training::tags;
use dkn_model::{DknError, LoopState, MemorySink, OptimizerKind, Predictor, Trainer, TrainingConfig};
use dkn_test_utils::small_model_config;

use candle_core::Device;

use crate::{dataset, new_trainer, schedule};

fn steps(sink: &MemorySink, tag: &str) -> Vec<usize> {
    sink.values(tag).into_iter().map(|(step, _)| step).collect()
}

#[test]
fn test_validation_cadence_and_tags() {
    let sink = MemorySink::new();
    let mut trainer = new_trainer(schedule(20, 5, 10), &sink);
    assert_eq!(trainer.state(), LoopState::Running);

    let report = trainer.train(&dataset(24, 21), &dataset(8, 22)).unwrap();

    // Initial report at step 1, validation at 10 and 20, final report at 20.
    assert_eq!(steps(&sink, tags::TEST_LOSS), vec![1, 10, 20, 20]);
    assert_eq!(steps(&sink, tags::TEST_ACCURACY), vec![1, 10, 20, 20]);
    assert_eq!(steps(&sink, tags::TRAIN_LOSS), (1..=20).collect::<Vec<_>>());
    assert_eq!(steps(&sink, tags::FINAL_TRAIN_LOSS), vec![20]);
    assert_eq!(steps(&sink, tags::FINAL_TRAIN_ACCURACY), vec![20]);
    assert_eq!(steps(&sink, tags::FINAL_FULL_LOSS), vec![20]);
    assert_eq!(steps(&sink, tags::FINAL_FULL_ACCURACY), vec![20]);
    assert!(sink.values(tags::NON_FINITE_LOSS).is_empty());

    assert_eq!(report.first_non_finite_step, None);
    assert_eq!(report.initial_test.batches, 2);
    assert_eq!(report.final_train.examples, 24);
    assert_eq!(report.final_full.examples, 32);
    assert_eq!(trainer.state(), LoopState::Done);
}

#[test]
fn test_running_mean_reported_every_k1_steps() {
    let sink = MemorySink::new();
    let mut trainer = new_trainer(schedule(20, 5, 10), &sink);
    let report = trainer.train(&dataset(24, 41), &dataset(8, 42)).unwrap();

    assert_eq!(steps(&sink, tags::TRAIN_LOSS_MEAN), vec![5, 10, 15, 20]);

    for (step, value) in sink.values(tags::TRAIN_LOSS_MEAN) {
        let expected = report.losses[..step]
            .iter()
            .map(|&l| l as f64)
            .sum::<f64>()
            / step as f64;
        assert!(
            (value - expected).abs() < 1e-9,
            "step {}: running mean {} != {}",
            step,
            value,
            expected
        );
    }
}

#[test]
fn test_recorded_losses_match_report() {
    let sink = MemorySink::new();
    let mut trainer = new_trainer(schedule(6, 2, 3), &sink);
    let report = trainer.train(&dataset(12, 23), &dataset(4, 24)).unwrap();

    let recorded: Vec<f32> = sink
        .values(tags::TRAIN_LOSS)
        .into_iter()
        .map(|(_, v)| v as f32)
        .collect();
    assert_eq!(recorded, report.losses);
    assert!(report.losses.iter().all(|l| l.is_finite()));
}

#[test]
fn test_training_reduces_loss_on_separable_data() {
    let sink = MemorySink::new();
    let config = TrainingConfig {
        learning_rate: 0.01,
        ..schedule(80, 20, 40)
    };
    let mut trainer = new_trainer(config, &sink);
    let train = dataset(32, 25);
    let test = dataset(16, 26);

    let before = trainer.evaluate(&train).unwrap();
    let report = trainer.train(&train, &test).unwrap();
    assert!(
        report.final_train.loss < before.loss,
        "train loss {} did not drop below {}",
        report.final_train.loss,
        before.loss
    );
}

#[test]
fn test_every_step_updates_parameters() {
    for optimizer in [OptimizerKind::Adam, OptimizerKind::Sgd] {
        let sink = MemorySink::new();
        let config = TrainingConfig {
            optimizer,
            ..schedule(2, 1, 1)
        };
        let mut trainer = new_trainer(config, &sink);
        let data = dataset(8, 27);
        let before = trainer.evaluate(&data).unwrap();
        trainer.train(&data, &data).unwrap();
        let after = trainer.evaluate(&data).unwrap();
        assert_ne!(before.loss, after.loss, "{:?} left the model unchanged", optimizer);
    }
}

#[test]
fn test_mean_aggregation_trains() {
    let sink = MemorySink::new();
    let model = dkn_model::ModelConfig {
        use_attention: false,
        ..small_model_config()
    };
    let predictor = Predictor::new(&model, &Device::Cpu).unwrap();
    let mut trainer = Trainer::new(predictor, schedule(4, 2, 2), Box::new(sink.clone())).unwrap();
    let report = trainer.train(&dataset(8, 28), &dataset(4, 29)).unwrap();
    assert_eq!(report.steps_completed, 4);
}

#[test]
fn test_invalid_schedule_rejected() {
    let predictor = Predictor::new(&small_model_config(), &Device::Cpu).unwrap();
    let config = TrainingConfig {
        num_batches_val_loss_and_acc: 0,
        ..schedule(4, 2, 2)
    };
    let err = Trainer::new(predictor, config, Box::new(MemorySink::new())).err().unwrap();
    assert!(matches!(err, DknError::ConfigError { .. }));
}
