//! JSONL datasets and splitting.

use dkn_model::training::{load_examples_jsonl, save_examples_jsonl};
use dkn_model::{ClickDataset, Example};
use dkn_test_utils::{small_model_config, synthetic_examples};

#[test]
fn test_jsonl_file_round_trip() {
    let examples = synthetic_examples(&small_model_config(), 9, 31);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("clicks.jsonl");

    save_examples_jsonl(&examples, &path).unwrap();
    let dataset = ClickDataset::from_jsonl(&path).unwrap();
    let loaded: Vec<Example> = dataset.iter().cloned().collect();
    assert_eq!(loaded, examples);
    assert_eq!(load_examples_jsonl(&path).unwrap().len(), 9);
}

#[test]
fn test_split_then_merge_covers_dataset() {
    let dataset = ClickDataset::new(synthetic_examples(&small_model_config(), 20, 32));
    let (train, test) = dataset.random_split(0.8, 5);
    assert_eq!(train.len(), 16);
    assert_eq!(test.len(), 4);

    let full = ClickDataset::merged(&[&train, &test]);
    assert_eq!(full.len(), 20);
    let mut all: Vec<String> = full
        .iter()
        .map(|e| format!("{:?}", e))
        .collect();
    let mut original: Vec<String> = dataset.iter().map(|e| format!("{:?}", e)).collect();
    all.sort();
    original.sort();
    assert_eq!(all, original);
}

#[test]
fn test_split_is_seeded() {
    let dataset = ClickDataset::new(synthetic_examples(&small_model_config(), 20, 33));
    let (a, _) = dataset.random_split(0.5, 9);
    let (b, _) = dataset.random_split(0.5, 9);
    let a: Vec<&Example> = a.iter().collect();
    let b: Vec<&Example> = b.iter().collect();
    assert_eq!(a, b);
}

#[test]
fn test_positive_rate_of_synthetic_data() {
    let dataset = ClickDataset::new(synthetic_examples(&small_model_config(), 10, 34));
    assert!((dataset.positive_rate() - 0.5).abs() < 1e-6);
}
