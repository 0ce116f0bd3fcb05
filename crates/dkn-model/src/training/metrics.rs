//! Scalar metric sinks keyed by tag and step.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{DknError, DknResult};

/// Stable metric tags.
pub mod tags {
    pub const TRAIN_LOSS: &str = "Loss/train";
    /// Mean of every training loss since the run started.
    pub const TRAIN_LOSS_MEAN: &str = "Loss/train_mean";
    pub const TEST_LOSS: &str = "Loss/test";
    pub const TEST_ACCURACY: &str = "Accuracy/test";
    pub const FINAL_TRAIN_LOSS: &str = "Loss/final_train";
    pub const FINAL_TRAIN_ACCURACY: &str = "Accuracy/final_train";
    pub const FINAL_FULL_LOSS: &str = "Loss/final_full";
    pub const FINAL_FULL_ACCURACY: &str = "Accuracy/final_full";
    pub const EXHAUSTION: &str = "Exhaustion";
    pub const NON_FINITE_LOSS: &str = "Loss/non_finite";
}

/// One recorded scalar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub tag: String,
    pub step: usize,
    pub value: f64,
}

/// Destination for scalar training metrics.
pub trait MetricSink: Send + Sync {
    /// Record `value` under `tag` at `step`.
    fn record(&self, tag: &str, step: usize, value: f64);

    /// Flush buffered output.
    fn flush(&self) -> DknResult<()> {
        Ok(())
    }
}

/// Emits every metric as a structured `tracing` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl MetricSink for TracingSink {
    fn record(&self, tag: &str, step: usize, value: f64) {
        info!(target: "dkn::metrics", tag, step, value, "metric");
    }
}

/// Keeps metrics in memory; clones share the same buffer.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<MetricRecord>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far.
    pub fn records(&self) -> Vec<MetricRecord> {
        self.records
            .lock()
            .map(|r| r.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    /// Values recorded under `tag`, in recording order.
    pub fn values(&self, tag: &str) -> Vec<(usize, f64)> {
        self.records()
            .into_iter()
            .filter(|r| r.tag == tag)
            .map(|r| (r.step, r.value))
            .collect()
    }
}

impl MetricSink for MemorySink {
    fn record(&self, tag: &str, step: usize, value: f64) {
        let record = MetricRecord {
            tag: tag.to_string(),
            step,
            value,
        };
        match self.records.lock() {
            Ok(mut records) => records.push(record),
            Err(poisoned) => poisoned.into_inner().push(record),
        }
    }
}

/// Appends one JSON object per metric to a file.
pub struct JsonlSink {
    writer: Mutex<BufWriter<File>>,
}

impl JsonlSink {
    /// Create (or truncate) the metrics file.
    pub fn create(path: &Path) -> DknResult<Self> {
        let file = File::create(path)?;
        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
        })
    }
}

impl MetricSink for JsonlSink {
    fn record(&self, tag: &str, step: usize, value: f64) {
        let record = MetricRecord {
            tag: tag.to_string(),
            step,
            value,
        };
        let line = match serde_json::to_string(&record) {
            Ok(line) => line,
            Err(e) => {
                warn!(tag, step, error = %e, "Failed to serialize metric");
                return;
            }
        };
        let mut writer = match self.writer.lock() {
            Ok(w) => w,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = writeln!(writer, "{}", line) {
            warn!(tag, step, error = %e, "Failed to write metric");
        }
    }

    fn flush(&self) -> DknResult<()> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| DknError::InvalidInput("metrics writer lock poisoned".to_string()))?;
        writer.flush()?;
        Ok(())
    }
}

/// Forwards every metric to several sinks.
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Box<dyn MetricSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sink.
    pub fn with(mut self, sink: impl MetricSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl MetricSink for FanoutSink {
    fn record(&self, tag: &str, step: usize, value: f64) {
        for sink in &self.sinks {
            sink.record(tag, step, value);
        }
    }

    fn flush(&self) -> DknResult<()> {
        for sink in &self.sinks {
            sink.flush()?;
        }
        Ok(())
    }
}
