//! Held-out evaluation: batch accounting, idempotence and purity.

use candle_core::Device;
use dkn_model::training::BatchBuilder;
use dkn_model::{evaluate, DknError, MemorySink, Predictor};
use dkn_test_utils::small_model_config;

use crate::{dataset, new_trainer, schedule};

fn snapshot(predictor: &Predictor) -> Vec<Vec<f32>> {
    let mut vars: Vec<(String, Vec<f32>)> = predictor
        .varmap()
        .data()
        .lock()
        .unwrap()
        .iter()
        .map(|(name, var)| {
            (
                name.clone(),
                var.as_tensor().flatten_all().unwrap().to_vec1().unwrap(),
            )
        })
        .collect();
    vars.sort_by(|a, b| a.0.cmp(&b.0));
    vars.into_iter().map(|(_, v)| v).collect()
}

#[test]
fn test_evaluation_processes_full_batches_only() {
    let predictor = Predictor::new(&small_model_config(), &Device::Cpu).unwrap();
    let builder = BatchBuilder::new(&Device::Cpu, 0).unwrap();

    for (len, expected_batches) in [(10, 2), (12, 3), (4, 1), (7, 1)] {
        let outcome = evaluate(&predictor, &dataset(len, 11), &builder, 4).unwrap();
        assert_eq!(outcome.batches, expected_batches, "dataset of {}", len);
        assert_eq!(outcome.examples, expected_batches * 4);
        assert!((0.0..=1.0).contains(&outcome.accuracy));
        assert!(outcome.loss.is_finite() && outcome.loss > 0.0);
    }
}

#[test]
fn test_evaluation_is_idempotent_and_pure() {
    let sink = MemorySink::new();
    let trainer = new_trainer(schedule(5, 1, 1), &sink);
    let data = dataset(13, 12);

    let before = snapshot(trainer.predictor());
    let first = trainer.evaluate(&data).unwrap();
    let second = trainer.evaluate(&data).unwrap();
    assert_eq!(first, second);
    assert_eq!(snapshot(trainer.predictor()), before);
    assert!(sink.records().is_empty());
}

#[test]
fn test_worker_count_does_not_change_outcome() {
    let predictor = Predictor::new(&small_model_config(), &Device::Cpu).unwrap();
    let data = dataset(16, 13);
    let inline = BatchBuilder::new(&Device::Cpu, 0).unwrap();
    let pooled = BatchBuilder::new(&Device::Cpu, 4).unwrap();

    let a = evaluate(&predictor, &data, &inline, 4).unwrap();
    let b = evaluate(&predictor, &data, &pooled, 4).unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_evaluation_rejects_dataset_smaller_than_batch() {
    let predictor = Predictor::new(&small_model_config(), &Device::Cpu).unwrap();
    let builder = BatchBuilder::new(&Device::Cpu, 0).unwrap();
    let err = evaluate(&predictor, &dataset(3, 14), &builder, 4).unwrap_err();
    assert!(matches!(err, DknError::DatasetTooSmall { len: 3, batch_size: 4 }));
}
