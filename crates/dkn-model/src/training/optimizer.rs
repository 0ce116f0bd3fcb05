//! Parameter update rules over a predictor's variables.

use candle_core::backprop::GradStore;
use candle_core::Var;
use candle_nn::{AdamW, Optimizer, ParamsAdamW, SGD};

use crate::config::OptimizerKind;
use crate::error::{map_candle, DknResult};

/// Optimizer selected by [`OptimizerKind`].
pub enum StepOptimizer {
    /// Adam: AdamW with weight decay disabled.
    Adam(AdamW),
    /// Plain SGD.
    Sgd(SGD),
}

impl StepOptimizer {
    /// Create an optimizer over `vars` with a fixed learning rate.
    pub fn new(kind: OptimizerKind, vars: Vec<Var>, learning_rate: f64) -> DknResult<Self> {
        match kind {
            OptimizerKind::Adam => {
                let params = ParamsAdamW {
                    lr: learning_rate,
                    weight_decay: 0.0,
                    ..Default::default()
                };
                AdamW::new(vars, params).map(Self::Adam).map_err(map_candle)
            }
            OptimizerKind::Sgd => SGD::new(vars, learning_rate)
                .map(Self::Sgd)
                .map_err(map_candle),
        }
    }

    /// Apply one update from already computed gradients.
    pub fn step(&mut self, grads: &GradStore) -> DknResult<()> {
        match self {
            Self::Adam(opt) => opt.step(grads),
            Self::Sgd(opt) => opt.step(grads),
        }
        .map_err(map_candle)
    }

    /// Current learning rate.
    pub fn learning_rate(&self) -> f64 {
        match self {
            Self::Adam(opt) => opt.learning_rate(),
            Self::Sgd(opt) => opt.learning_rate(),
        }
    }

    /// Which rule this optimizer applies.
    pub fn kind(&self) -> OptimizerKind {
        match self {
            Self::Adam(_) => OptimizerKind::Adam,
            Self::Sgd(_) => OptimizerKind::Sgd,
        }
    }
}
