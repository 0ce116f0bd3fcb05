//! Training loop configuration.

use serde::{Deserialize, Serialize};

/// Parameter update rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizerKind {
    /// Adam (AdamW with zero weight decay).
    #[default]
    Adam,
    /// Plain stochastic gradient descent.
    Sgd,
}

impl OptimizerKind {
    /// Parse from a config or CLI string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "adam" | "adamw" => Some(Self::Adam),
            "sgd" => Some(Self::Sgd),
            _ => None,
        }
    }
}

/// Batching, optimizer and reporting cadence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Examples per batch.
    pub batch_size: usize,
    /// Threads used to materialize batches (0 = calling thread).
    pub num_workers: usize,
    /// Fraction of the merged dataset used for training.
    pub train_split: f32,
    /// Fixed learning rate.
    pub learning_rate: f64,
    /// Update rule.
    pub optimizer: OptimizerKind,
    /// Total optimizer steps `N`.
    pub num_batches: usize,
    /// Steps between loss diagnostics.
    pub num_batches_batch_loss: usize,
    /// Steps between validation passes.
    pub num_batches_val_loss_and_acc: usize,
    /// Seed for dataset splitting and epoch shuffling.
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            batch_size: 64,
            num_workers: 4,
            train_split: 0.8,
            learning_rate: 0.001,
            optimizer: OptimizerKind::Adam,
            num_batches: 8000,
            num_batches_batch_loss: 50,
            num_batches_val_loss_and_acc: 300,
            seed: 42,
        }
    }
}

impl TrainingConfig {
    /// Validate training configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.batch_size == 0 {
            return Err("batch_size must be > 0".to_string());
        }
        if !(self.train_split > 0.0 && self.train_split < 1.0) {
            return Err(format!(
                "train_split must be in (0, 1), got {}",
                self.train_split
            ));
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(format!(
                "learning_rate must be a positive finite number, got {}",
                self.learning_rate
            ));
        }
        if self.num_batches == 0 {
            return Err("num_batches must be > 0".to_string());
        }
        if self.num_batches_batch_loss == 0 || self.num_batches_val_loss_and_acc == 0 {
            return Err("reporting intervals must be > 0".to_string());
        }
        Ok(())
    }
}
