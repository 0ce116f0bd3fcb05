//! Single-step preconditions and divergence handling.

use candle_core::{DType, Device, Tensor};
use candle_nn::{VarBuilder, VarMap};
use dkn_model::training::tags;
use dkn_model::{
    Batch, ContentEncoder, DknError, DknResult, Example, InterestAggregator, MemorySink,
    NewsBatch, Predictor, ScoringHead, Trainer,
};
use dkn_test_utils::small_model_config;

use crate::{dataset, new_trainer, schedule};

/// Encoder whose every embedding is NaN.
struct NanEncoder {
    dim: usize,
}

impl ContentEncoder for NanEncoder {
    fn output_dim(&self) -> usize {
        self.dim
    }

    fn encode(&self, news: &NewsBatch) -> DknResult<Tensor> {
        let b = news.batch_size()?;
        Tensor::full(f32::NAN, (b, self.dim), &Device::Cpu).map_err(|e| DknError::Tensor {
            message: e.to_string(),
        })
    }
}

fn nan_trainer(num_batches: usize, sink: &MemorySink) -> Trainer<NanEncoder> {
    let dim = 8;
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    let aggregator = InterestAggregator::attention(dim, vb.pp("attention")).unwrap();
    let head = ScoringHead::new(dim, vb.pp("head")).unwrap();
    let history_len = small_model_config().num_clicked_news_a_user;
    let predictor = Predictor::from_parts(
        NanEncoder { dim },
        aggregator,
        head,
        history_len,
        varmap,
        Device::Cpu,
    )
    .unwrap();
    Trainer::new(predictor, schedule(num_batches, 2, 100), Box::new(sink.clone())).unwrap()
}

#[test]
fn test_train_step_rejects_wrong_batch_size() {
    let sink = MemorySink::new();
    let mut trainer = new_trainer(schedule(5, 1, 100), &sink);
    let data = dataset(3, 51);
    let examples: Vec<&Example> = data.iter().collect();
    let batch = Batch::from_examples(&examples, &Device::Cpu).unwrap();

    let before = trainer.evaluate(&dataset(8, 52)).unwrap();
    let err = trainer.train_step(&batch).unwrap_err();
    assert!(
        matches!(
            &err,
            DknError::ShapeMismatch { context: "batch size", expected, actual }
                if expected == &vec![4] && actual == &vec![3]
        ),
        "got {:?}",
        err
    );
    let after = trainer.evaluate(&dataset(8, 52)).unwrap();
    assert_eq!(before, after, "rejected batch must not update parameters");
}

#[test]
fn test_train_step_accepts_configured_batch_size() {
    let sink = MemorySink::new();
    let mut trainer = new_trainer(schedule(5, 1, 100), &sink);
    let data = dataset(4, 53);
    let examples: Vec<&Example> = data.iter().collect();
    let batch = Batch::from_examples(&examples, &Device::Cpu).unwrap();
    assert!(trainer.train_step(&batch).unwrap().is_finite());
}

#[test]
fn test_non_finite_loss_is_reported_and_training_continues() {
    let sink = MemorySink::new();
    let mut trainer = nan_trainer(6, &sink);
    let report = trainer.train(&dataset(8, 54), &dataset(4, 55)).unwrap();

    assert_eq!(report.steps_completed, 6);
    assert_eq!(report.first_non_finite_step, Some(1));
    assert!(report.losses.iter().all(|l| l.is_nan()));

    let flagged: Vec<usize> = sink
        .values(tags::NON_FINITE_LOSS)
        .into_iter()
        .map(|(step, _)| step)
        .collect();
    assert_eq!(flagged, (1..=6).collect::<Vec<_>>());
    assert_eq!(sink.values(tags::TRAIN_LOSS).len(), 6);
}
