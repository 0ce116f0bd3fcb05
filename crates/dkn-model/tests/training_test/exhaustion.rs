//! Epoch boundaries during long runs over small datasets.

use dkn_model::training::tags;
use dkn_model::{DknError, ExhaustionEvent, LoopState, MemorySink};

use crate::{dataset, new_trainer, schedule};

#[test]
fn test_ten_examples_batch_four_five_steps() {
    let sink = MemorySink::new();
    let mut trainer = new_trainer(schedule(5, 1, 100), &sink);
    let report = trainer.train(&dataset(10, 1), &dataset(8, 2)).unwrap();

    assert_eq!(report.steps_completed, 5);
    assert_eq!(report.losses.len(), 5);
    assert_eq!(
        report.exhaustion_events,
        vec![
            ExhaustionEvent { count: 1, step: 3 },
            ExhaustionEvent { count: 2, step: 5 },
        ]
    );
    assert_eq!(sink.values(tags::TRAIN_LOSS).len(), 5);
    assert_eq!(trainer.state(), LoopState::Done);
}

#[test]
fn test_exhaustion_count_is_monotone() {
    let sink = MemorySink::new();
    let mut trainer = new_trainer(schedule(40, 10, 100), &sink);
    let report = trainer.train(&dataset(9, 3), &dataset(8, 4)).unwrap();

    // 9 examples, B=4: two batches per epoch, so every odd step from 3 on reshuffles.
    assert_eq!(report.exhaustion_count(), 19);
    for (i, event) in report.exhaustion_events.iter().enumerate() {
        assert_eq!(event.count, i + 1);
    }
    assert!(report
        .exhaustion_events
        .windows(2)
        .all(|w| w[0].step < w[1].step));

    let recorded: Vec<f64> = sink
        .values(tags::EXHAUSTION)
        .into_iter()
        .map(|(_, v)| v)
        .collect();
    let expected: Vec<f64> = (1..=19).map(|c| c as f64).collect();
    assert_eq!(recorded, expected);
}

#[test]
fn test_dataset_exactly_one_batch() {
    let sink = MemorySink::new();
    let mut trainer = new_trainer(schedule(3, 1, 100), &sink);
    let report = trainer.train(&dataset(4, 5), &dataset(4, 6)).unwrap();

    assert_eq!(report.steps_completed, 3);
    let steps: Vec<usize> = report.exhaustion_events.iter().map(|e| e.step).collect();
    assert_eq!(steps, vec![2, 3]);
}

#[test]
fn test_dataset_smaller_than_batch_fails_before_training() {
    let sink = MemorySink::new();
    let mut trainer = new_trainer(schedule(5, 1, 100), &sink);

    let err = trainer.train(&dataset(3, 7), &dataset(8, 8)).unwrap_err();
    assert!(
        matches!(err, DknError::DatasetTooSmall { len: 3, batch_size: 4 }),
        "got {:?}",
        err
    );
    assert!(sink.records().is_empty());

    let err = trainer.train(&dataset(8, 7), &dataset(2, 8)).unwrap_err();
    assert!(matches!(err, DknError::DatasetTooSmall { len: 2, .. }));
}
