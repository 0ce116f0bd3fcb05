//! News content encoders.
//!
//! The rest of the model only relies on [`ContentEncoder`]: one call maps a
//! batch of news items to a `[B, D]` embedding, with `D` fixed for the run.
//! A single encoder instance is shared by the candidate and every history
//! slot so their embeddings live in the same space.

mod kcnn;

pub use kcnn::KcnnEncoder;

use candle_core::Tensor;

use crate::error::DknResult;
use crate::types::NewsBatch;

/// Maps a batch of news items to fixed-width embedding vectors.
pub trait ContentEncoder {
    /// Width `D` of every embedding this encoder produces.
    fn output_dim(&self) -> usize;

    /// Encode `B` news items into a `[B, D]` f32 tensor.
    ///
    /// Deterministic for fixed parameters.
    fn encode(&self, news: &NewsBatch) -> DknResult<Tensor>;
}
