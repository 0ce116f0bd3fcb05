//! CLI command handlers
//!
//! # Modules
//!
//! - `train`: Load configuration and data, train, report
//! - `synth`: Generate synthetic click data

pub mod synth;
pub mod train;

use std::path::Path;

use anyhow::{Context, Result};
use dkn_model::DknConfig;

/// Resolve configuration: file (or defaults), then `DKN_*` environment overrides.
pub fn load_config(path: Option<&Path>) -> Result<DknConfig> {
    let config = match path {
        Some(path) => DknConfig::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => DknConfig::default(),
    };
    Ok(config.with_env_overrides())
}
