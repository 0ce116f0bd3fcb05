//! Click datasets, epoch sampling and batch materialization.
//!
//! Sampling is an explicit cursor over a shuffled permutation: a batch is
//! handed out only while a full `batch_size` of indices remains, and the
//! caller decides when to start a new permutation.

use std::io::{BufRead, Write};
use std::path::Path;
use std::sync::Arc;

use candle_core::{Device, Tensor};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use rayon::ThreadPool;

use crate::error::{map_candle, DknError, DknResult};
use crate::types::{history_slot, Batch, Example, NewsBatch, NewsItem};

/// Random-access view over a shared pool of examples.
///
/// Splits share the underlying storage and only own their index lists.
#[derive(Debug, Clone)]
pub struct ClickDataset {
    examples: Arc<[Example]>,
    indices: Vec<usize>,
}

impl ClickDataset {
    /// Wrap a list of examples.
    pub fn new(examples: Vec<Example>) -> Self {
        let indices = (0..examples.len()).collect();
        Self {
            examples: examples.into(),
            indices,
        }
    }

    /// Load examples from a JSONL file.
    pub fn from_jsonl(path: &Path) -> DknResult<Self> {
        Ok(Self::new(load_examples_jsonl(path)?))
    }

    /// Concatenate several views into one, in argument order.
    pub fn merged(parts: &[&ClickDataset]) -> Self {
        Self::new(parts.iter().flat_map(|p| p.iter().cloned()).collect())
    }

    /// Number of examples in this view.
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    /// Whether this view holds no examples.
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Example at position `idx` of this view.
    pub fn get(&self, idx: usize) -> Option<&Example> {
        self.indices.get(idx).map(|&i| &self.examples[i])
    }

    /// Iterate examples in view order.
    pub fn iter(&self) -> impl Iterator<Item = &Example> {
        self.indices.iter().map(move |&i| &self.examples[i])
    }

    /// Fraction of positive labels.
    pub fn positive_rate(&self) -> f32 {
        if self.is_empty() {
            return 0.0;
        }
        self.iter().filter(|e| e.clicked > 0).count() as f32 / self.len() as f32
    }

    /// Randomly split into `(train, test)` with `floor(train_fraction * len)`
    /// training examples.
    pub fn random_split(&self, train_fraction: f32, seed: u64) -> (ClickDataset, ClickDataset) {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut shuffled = self.indices.clone();
        shuffled.shuffle(&mut rng);

        let train_len = ((self.len() as f64) * train_fraction as f64).floor() as usize;
        let test = shuffled.split_off(train_len.min(shuffled.len()));

        (
            Self {
                examples: Arc::clone(&self.examples),
                indices: shuffled,
            },
            Self {
                examples: Arc::clone(&self.examples),
                indices: test,
            },
        )
    }

    /// Check every example against the configured title and history lengths.
    pub fn validate_shapes(&self, num_words: usize, num_clicked: usize) -> DknResult<()> {
        for (pos, example) in self.iter().enumerate() {
            example
                .validate(num_words, num_clicked)
                .map_err(|e| DknError::InvalidInput(format!("example {}: {}", pos, e)))?;
        }
        Ok(())
    }

    /// Consecutive full batches of positions in view order; the trailing
    /// partial batch is dropped.
    pub fn sequential_batches(&self, batch_size: usize) -> impl Iterator<Item = Vec<usize>> + '_ {
        let positions: Vec<usize> = (0..self.len()).collect();
        let chunks: Vec<Vec<usize>> = positions
            .chunks_exact(batch_size.max(1))
            .map(|c| c.to_vec())
            .collect();
        chunks.into_iter()
    }
}

/// Shuffled cursor over one epoch of a dataset.
pub struct EpochSampler {
    order: Vec<usize>,
    cursor: usize,
    batch_size: usize,
    epoch: usize,
    rng: StdRng,
}

impl EpochSampler {
    /// Create a sampler over `len` positions with a shuffled first epoch.
    pub fn new(len: usize, batch_size: usize, seed: u64) -> Self {
        let mut sampler = Self {
            order: (0..len).collect(),
            cursor: 0,
            batch_size,
            epoch: 0,
            rng: StdRng::seed_from_u64(seed),
        };
        sampler.order.shuffle(&mut sampler.rng);
        sampler
    }

    /// Full batches per epoch.
    pub fn batches_per_epoch(&self) -> usize {
        if self.batch_size == 0 {
            0
        } else {
            self.order.len() / self.batch_size
        }
    }

    /// Positions not yet handed out this epoch.
    pub fn remaining(&self) -> usize {
        self.order.len() - self.cursor
    }

    /// Zero-based epoch counter.
    pub fn epoch(&self) -> usize {
        self.epoch
    }

    /// Next full batch of positions, or `None` once the epoch cannot fill one.
    pub fn next_indices(&mut self) -> Option<&[usize]> {
        if self.batch_size == 0 || self.remaining() < self.batch_size {
            return None;
        }
        let start = self.cursor;
        self.cursor += self.batch_size;
        Some(&self.order[start..self.cursor])
    }

    /// Start a new epoch with a fresh permutation.
    pub fn reshuffle(&mut self) {
        self.order.shuffle(&mut self.rng);
        self.cursor = 0;
        self.epoch += 1;
    }
}

/// Materializes batches, optionally on a dedicated worker pool.
///
/// The pool only parallelizes gathering ids per history slot; the produced
/// tensors are identical for any worker count.
pub struct BatchBuilder {
    device: Device,
    pool: Option<ThreadPool>,
}

impl BatchBuilder {
    /// Create a builder. `num_workers <= 1` builds on the calling thread.
    pub fn new(device: &Device, num_workers: usize) -> DknResult<Self> {
        let pool = if num_workers > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(num_workers)
                .thread_name(|i| format!("dkn-batch-{}", i))
                .build()
                .map_err(|e| DknError::ConfigError {
                    message: format!("failed to start {} batch workers: {}", num_workers, e),
                })?;
            Some(pool)
        } else {
            None
        };
        Ok(Self {
            device: device.clone(),
            pool,
        })
    }

    /// Number of worker threads (0 when building inline).
    pub fn num_workers(&self) -> usize {
        self.pool.as_ref().map_or(0, |p| p.current_num_threads())
    }

    /// Build the batch holding `positions` of `dataset`.
    pub fn build(&self, dataset: &ClickDataset, positions: &[usize]) -> DknResult<Batch> {
        let examples = positions
            .iter()
            .map(|&p| {
                dataset.get(p).ok_or_else(|| {
                    DknError::InvalidInput(format!(
                        "position {} out of range for dataset of {}",
                        p,
                        dataset.len()
                    ))
                })
            })
            .collect::<DknResult<Vec<_>>>()?;

        let Some(pool) = &self.pool else {
            return Batch::from_examples(&examples, &self.device);
        };

        let first = examples
            .first()
            .ok_or_else(|| DknError::InvalidInput("empty batch".to_string()))?;
        let history_len = first.clicked_news.len();

        // Slot 0 is the candidate, slots 1..=H the history.
        let mut slots = pool.install(|| {
            (0..=history_len)
                .into_par_iter()
                .map(|slot| {
                    if slot == 0 {
                        let candidates: Vec<&NewsItem> =
                            examples.iter().map(|e| &e.candidate_news).collect();
                        NewsBatch::from_items(&candidates, &self.device)
                    } else {
                        history_slot(&examples, slot - 1, &self.device)
                    }
                })
                .collect::<DknResult<Vec<_>>>()
        })?;

        let candidate = slots.remove(0);
        let labels: Vec<f32> = examples.iter().map(|e| e.label()).collect();
        let labels = Tensor::from_vec(labels, examples.len(), &self.device).map_err(map_candle)?;

        Ok(Batch {
            candidate,
            clicked: slots,
            labels,
        })
    }
}

/// Save examples to a JSONL file, one example per line.
pub fn save_examples_jsonl(examples: &[Example], path: &Path) -> DknResult<()> {
    let file = std::fs::File::create(path)?;
    let mut writer = std::io::BufWriter::new(file);
    for example in examples {
        let json = serde_json::to_string(example).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;
        writeln!(writer, "{}", json)?;
    }
    writer.flush()?;
    Ok(())
}

/// Load examples from a JSONL file, skipping blank lines.
pub fn load_examples_jsonl(path: &Path) -> DknResult<Vec<Example>> {
    let file = std::fs::File::open(path)?;
    let reader = std::io::BufReader::new(file);
    let mut examples = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let example: Example = serde_json::from_str(&line).map_err(|e| DknError::DatasetFormat {
            line: idx + 1,
            message: e.to_string(),
        })?;
        examples.push(example);
    }
    Ok(examples)
}
