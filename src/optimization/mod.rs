mod adagrad;
mod adam;
mod momentum_sgd;
mod optimizer;

pub use adagrad::AdaGrad;
pub use adam::Adam;
pub use momentum_sgd::MomentumSgd;
pub use optimizer::{Optimizer, StateTensor};

use crate::config::OptimizerConfig;

/// Builds the optimizer described by `config` for a model of `len` parameters.
pub fn build(config: OptimizerConfig, len: usize) -> Box<dyn Optimizer> {
    match config {
        OptimizerConfig::MomentumSgd { lr, momentum } => {
            Box::new(MomentumSgd::new(len, lr, momentum))
        }
        OptimizerConfig::AdaGrad { lr, eps } => Box::new(AdaGrad::new(len, lr, eps)),
        OptimizerConfig::Adam { lr, b1, b2, eps } => Box::new(Adam::new(len, lr, b1, b2, eps)),
    }
}
