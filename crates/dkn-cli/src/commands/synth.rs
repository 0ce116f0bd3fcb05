//! `dkn synth`

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use dkn_model::training::save_examples_jsonl;
use dkn_test_utils::{small_model_config, synthetic_examples};
use tracing::info;

use super::load_config;

/// Arguments for `dkn synth`.
#[derive(Args, Debug)]
pub struct SynthArgs {
    /// Output JSONL file
    #[arg(long)]
    pub out: PathBuf,

    /// Number of examples
    #[arg(long, default_value_t = 1000)]
    pub count: usize,

    /// Shape examples for this config's model section instead of the small test model
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Generator seed
    #[arg(long, default_value_t = 0)]
    pub seed: u64,
}

/// Write `count` synthetic examples to `out`.
pub fn run(args: SynthArgs) -> Result<()> {
    let model = match &args.config {
        Some(path) => load_config(Some(path.as_path()))?.model,
        None => small_model_config(),
    };
    let examples = synthetic_examples(&model, args.count, args.seed);
    save_examples_jsonl(&examples, &args.out)
        .with_context(|| format!("writing {}", args.out.display()))?;
    info!(
        path = %args.out.display(),
        count = examples.len(),
        title_len = model.num_words_a_sentence,
        history_len = model.num_clicked_news_a_user,
        "Synthetic dataset written"
    );
    Ok(())
}
