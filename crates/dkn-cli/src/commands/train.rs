//! `dkn train`

use std::path::PathBuf;

use anyhow::{Context, Result};
use candle_core::Device;
use clap::Args;
use dkn_model::{
    ClickDataset, DknConfig, FanoutSink, JsonlSink, Predictor, Trainer, TracingSink,
    TrainingReport,
};
use tracing::{info, warn};

use super::load_config;

/// Arguments for `dkn train`.
#[derive(Args, Debug)]
pub struct TrainArgs {
    /// TOML configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// JSONL click examples (split by `train_split` unless --test-data is given)
    #[arg(long)]
    pub data: PathBuf,

    /// Pre-split JSONL test examples
    #[arg(long)]
    pub test_data: Option<PathBuf>,

    /// Append metrics as JSON lines to this file
    #[arg(long)]
    pub metrics: Option<PathBuf>,

    /// Total optimizer steps
    #[arg(long)]
    pub num_batches: Option<usize>,

    /// Examples per batch
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Fixed learning rate
    #[arg(long)]
    pub learning_rate: Option<f64>,

    /// Average the click history instead of attending over it
    #[arg(long)]
    pub no_attention: bool,

    /// Seed for splitting and shuffling
    #[arg(long)]
    pub seed: Option<u64>,

    /// Use the first CUDA device when available
    #[arg(long)]
    pub cuda: bool,
}

impl TrainArgs {
    /// Apply flags over an already resolved configuration.
    pub fn apply(&self, mut config: DknConfig) -> DknConfig {
        if let Some(n) = self.num_batches {
            config.training.num_batches = n;
        }
        if let Some(b) = self.batch_size {
            config.training.batch_size = b;
        }
        if let Some(lr) = self.learning_rate {
            config.training.learning_rate = lr;
        }
        if let Some(seed) = self.seed {
            config.training.seed = seed;
        }
        if self.no_attention {
            config.model.use_attention = false;
        }
        config
    }
}

/// Train and return the final report.
pub fn run(args: TrainArgs) -> Result<TrainingReport> {
    let config = args.apply(load_config(args.config.as_deref())?);
    config.validate()?;

    let device = if args.cuda {
        Device::cuda_if_available(0)?
    } else {
        Device::Cpu
    };
    if args.cuda && !device.is_cuda() {
        warn!("CUDA requested but unavailable, training on CPU");
    }

    let dataset = ClickDataset::from_jsonl(&args.data)
        .with_context(|| format!("loading {}", args.data.display()))?;
    let (train, test) = match &args.test_data {
        Some(path) => {
            let test = ClickDataset::from_jsonl(path)
                .with_context(|| format!("loading {}", path.display()))?;
            (dataset, test)
        }
        None => dataset.random_split(config.training.train_split, config.training.seed),
    };

    let model = &config.model;
    for split in [&train, &test] {
        split.validate_shapes(model.num_words_a_sentence, model.num_clicked_news_a_user)?;
    }
    info!(
        train = train.len(),
        test = test.len(),
        train_positive_rate = train.positive_rate(),
        use_attention = model.use_attention,
        "Datasets loaded"
    );

    let mut sink = FanoutSink::new().with(TracingSink);
    if let Some(path) = &args.metrics {
        let jsonl = JsonlSink::create(path)
            .with_context(|| format!("creating metrics file {}", path.display()))?;
        sink = sink.with(jsonl);
    }

    let predictor = Predictor::new(model, &device)?;
    let mut trainer = Trainer::new(predictor, config.training.clone(), Box::new(sink))?;
    let report = trainer.train(&train, &test)?;

    if let Some(step) = report.first_non_finite_step {
        warn!(step, "Training produced a non-finite loss");
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dkn_model::training::save_examples_jsonl;
    use dkn_test_utils::{small_model_config, synthetic_examples};

    fn args(data: PathBuf) -> TrainArgs {
        TrainArgs {
            config: None,
            data,
            test_data: None,
            metrics: None,
            num_batches: None,
            batch_size: None,
            learning_rate: None,
            no_attention: false,
            seed: None,
            cuda: false,
        }
    }

    #[test]
    fn test_flags_override_config() {
        let mut a = args(PathBuf::from("unused.jsonl"));
        a.num_batches = Some(12);
        a.learning_rate = Some(0.5);
        a.no_attention = true;
        let config = a.apply(DknConfig::default());
        assert_eq!(config.training.num_batches, 12);
        assert!((config.training.learning_rate - 0.5).abs() < 1e-12);
        assert!(!config.model.use_attention);
        assert_eq!(config.training.batch_size, 64);
    }

    #[test]
    fn test_run_end_to_end_on_synthetic_files() {
        let dir = tempfile::tempdir().unwrap();
        let model = small_model_config();

        let config_path = dir.path().join("dkn.toml");
        let config = DknConfig {
            model: model.clone(),
            training: dkn_test_utils::small_training_config(),
        };
        std::fs::write(&config_path, config.to_toml_string().unwrap()).unwrap();

        let data_path = dir.path().join("clicks.jsonl");
        save_examples_jsonl(&synthetic_examples(&model, 30, 1), &data_path).unwrap();
        let metrics_path = dir.path().join("metrics.jsonl");

        let mut a = args(data_path);
        a.config = Some(config_path);
        a.metrics = Some(metrics_path.clone());
        a.num_batches = Some(6);

        let report = run(a).unwrap();
        assert_eq!(report.steps_completed, 6);
        // 30 examples at 0.8: 24 train, 6 test.
        assert_eq!(report.final_train.examples, 24);
        assert_eq!(report.final_test.examples, 4);

        let lines = std::fs::read_to_string(&metrics_path).unwrap();
        assert!(lines.lines().any(|l| l.contains("Loss/final_full")));
    }

    #[test]
    fn test_run_rejects_malformed_history() {
        let dir = tempfile::tempdir().unwrap();
        let mut examples = synthetic_examples(&small_model_config(), 8, 2);
        examples[3].clicked_news.pop();
        let data_path = dir.path().join("clicks.jsonl");
        save_examples_jsonl(&examples, &data_path).unwrap();

        let config_path = dir.path().join("dkn.toml");
        let config = DknConfig {
            model: small_model_config(),
            training: dkn_test_utils::small_training_config(),
        };
        std::fs::write(&config_path, config.to_toml_string().unwrap()).unwrap();

        let mut a = args(data_path.clone());
        a.config = Some(config_path);
        a.test_data = Some(data_path);
        assert!(run(a).is_err());
    }
}
