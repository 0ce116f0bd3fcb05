//! DKN command-line driver.
//!
//! # Usage
//!
//! ```bash
//! # Write a synthetic dataset for a smoke run
//! dkn synth --out clicks.jsonl --count 2000
//!
//! # Train on one file split by `train_split`
//! dkn train --config dkn.toml --data clicks.jsonl
//!
//! # Train on pre-split files, log as JSON, keep metrics
//! dkn train --data train.jsonl --test-data test.jsonl --metrics metrics.jsonl --log-json
//!
//! # Run in debug mode
//! RUST_LOG=debug dkn train --data clicks.jsonl
//! ```
//!
//! # Configuration Priority
//!
//! CLI arguments > Environment variables (`DKN_*`) > Config file > Defaults

mod commands;

use std::io;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::{fmt, EnvFilter};

use commands::synth::SynthArgs;
use commands::train::TrainArgs;

/// Knowledge-aware news click predictor.
#[derive(Parser)]
#[command(name = "dkn", version, about)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a predictor and report test, train and full-dataset metrics
    Train(TrainArgs),
    /// Write a synthetic click dataset
    Synth(SynthArgs),
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt().with_writer(io::stderr).with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_json);

    let result = match cli.command {
        Commands::Train(args) => commands::train::run(args).map(|_| ()),
        Commands::Synth(args) => commands::synth::run(args),
    };
    if let Err(e) = &result {
        error!(error = %e, "dkn failed");
    }
    result
}
