//! Root configuration for the click predictor.
//!
//! # TOML Structure
//!
//! ```toml
//! [model]
//! use_attention = true
//! window_sizes = [1, 2, 3, 4]
//! num_filters = 50
//!
//! [training]
//! batch_size = 64
//! learning_rate = 0.001
//! optimizer = "adam"
//! num_batches = 8000
//! ```
//!
//! Invalid configuration is an error, never silently replaced with defaults.

mod model;
mod training;

pub use model::{ModelConfig, ATTENTION_HIDDEN_DIM, SCORING_HIDDEN_DIM};
pub use training::{OptimizerKind, TrainingConfig};

use std::env;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{DknError, DknResult};

/// Root configuration: model architecture plus training schedule.
///
/// # Example
///
/// ```
/// use dkn_model::DknConfig;
///
/// let config = DknConfig::default();
/// config.validate().expect("Default config valid");
/// assert_eq!(config.model.embedding_dim(), 200);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DknConfig {
    /// Architecture of encoder, aggregator and head.
    #[serde(default)]
    pub model: ModelConfig,

    /// Batching, optimizer and reporting cadence.
    #[serde(default)]
    pub training: TrainingConfig,
}

impl DknConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// - `DknError::ConfigError` if the file cannot be read or parsed
    pub fn from_file(path: impl AsRef<Path>) -> DknResult<Self> {
        let path = path.as_ref();

        let contents = std::fs::read_to_string(path).map_err(|e| DknError::ConfigError {
            message: format!("Failed to read config file '{}': {}", path.display(), e),
        })?;

        toml::from_str(&contents).map_err(|e| DknError::ConfigError {
            message: format!("Failed to parse TOML in '{}': {}", path.display(), e),
        })
    }

    /// Create configuration from a TOML string.
    pub fn from_toml_str(toml: &str) -> DknResult<Self> {
        toml::from_str(toml).map_err(|e| DknError::ConfigError {
            message: format!("Failed to parse TOML: {}", e),
        })
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml_string(&self) -> DknResult<String> {
        toml::to_string_pretty(self).map_err(|e| DknError::ConfigError {
            message: format!("Failed to serialize to TOML: {}", e),
        })
    }

    /// Validate all sections, returning the first error found.
    pub fn validate(&self) -> DknResult<()> {
        self.model.validate().map_err(|e| DknError::ConfigError {
            message: format!("[model] {}", e),
        })?;

        self.training.validate().map_err(|e| DknError::ConfigError {
            message: format!("[training] {}", e),
        })?;

        Ok(())
    }

    /// Apply environment variable overrides. Prefix: `DKN_`
    ///
    /// | Variable | Config Path | Type |
    /// |----------|-------------|------|
    /// | `DKN_USE_ATTENTION` | `model.use_attention` | bool |
    /// | `DKN_USE_CONTEXT` | `model.use_context` | bool |
    /// | `DKN_BATCH_SIZE` | `training.batch_size` | usize |
    /// | `DKN_NUM_WORKERS` | `training.num_workers` | usize |
    /// | `DKN_LEARNING_RATE` | `training.learning_rate` | f64 |
    /// | `DKN_OPTIMIZER` | `training.optimizer` | adam / sgd |
    /// | `DKN_NUM_BATCHES` | `training.num_batches` | usize |
    /// | `DKN_SEED` | `training.seed` | u64 |
    ///
    /// Values that fail to parse are ignored.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup.
    #[must_use]
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(b) = lookup("DKN_USE_ATTENTION").and_then(|v| v.parse().ok()) {
            self.model.use_attention = b;
        }
        if let Some(b) = lookup("DKN_USE_CONTEXT").and_then(|v| v.parse().ok()) {
            self.model.use_context = b;
        }
        if let Some(n) = lookup("DKN_BATCH_SIZE").and_then(|v| v.parse().ok()) {
            self.training.batch_size = n;
        }
        if let Some(n) = lookup("DKN_NUM_WORKERS").and_then(|v| v.parse().ok()) {
            self.training.num_workers = n;
        }
        if let Some(lr) = lookup("DKN_LEARNING_RATE").and_then(|v| v.parse().ok()) {
            self.training.learning_rate = lr;
        }
        if let Some(kind) = lookup("DKN_OPTIMIZER").and_then(|v| OptimizerKind::parse(&v)) {
            self.training.optimizer = kind;
        }
        if let Some(n) = lookup("DKN_NUM_BATCHES").and_then(|v| v.parse().ok()) {
            self.training.num_batches = n;
        }
        if let Some(seed) = lookup("DKN_SEED").and_then(|v| v.parse().ok()) {
            self.training.seed = seed;
        }

        self
    }
}
