//! Error types for the click predictor.

use thiserror::Error;

/// Errors raised by the model, the data pipeline and the training loop.
#[derive(Debug, Error)]
pub enum DknError {
    /// Tensor operation failed inside candle.
    #[error("Tensor operation failed: {message}")]
    Tensor { message: String },

    /// Configuration is missing, unreadable or invalid.
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    /// Input validation failed.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Embedding dimension mismatch between two tensors that must agree.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Tensor shape does not match what the component expects.
    #[error("Shape mismatch in {context}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        context: &'static str,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// Interest aggregation was asked to reduce an empty click history.
    #[error("Click history is empty")]
    EmptyHistory,

    /// Dataset cannot yield a single full batch.
    #[error("Dataset of {len} examples cannot fill a batch of {batch_size}")]
    DatasetTooSmall { len: usize, batch_size: usize },

    /// Dataset file could not be parsed.
    #[error("Malformed dataset record at line {line}: {message}")]
    DatasetFormat { line: usize, message: String },

    /// IO error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type for click predictor operations.
pub type DknResult<T> = Result<T, DknError>;

/// Map candle errors to [`DknError::Tensor`].
pub(crate) fn map_candle(e: candle_core::Error) -> DknError {
    DknError::Tensor {
        message: e.to_string(),
    }
}
