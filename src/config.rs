use std::{num::NonZeroUsize, path::PathBuf};

use serde::Serialize;

use crate::error::{Result, TrainErr};

/// Number of body-part classes, background included.
pub const N_CLASS: usize = 25;

/// The optimizers that can be picked for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OptimizerKind {
    Adam,
    AdaGrad,
    Sgd,
}

/// An optimizer together with its fixed hyperparameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum OptimizerConfig {
    MomentumSgd { lr: f32, momentum: f32 },
    AdaGrad { lr: f32, eps: f32 },
    Adam { lr: f32, b1: f32, b2: f32, eps: f32 },
}

impl From<OptimizerKind> for OptimizerConfig {
    fn from(kind: OptimizerKind) -> Self {
        match kind {
            OptimizerKind::Sgd => Self::MomentumSgd {
                lr: 1e-3,
                momentum: 0.99,
            },
            OptimizerKind::AdaGrad => Self::AdaGrad { lr: 1e-3, eps: 1e-8 },
            OptimizerKind::Adam => Self::Adam {
                lr: 1e-3,
                b1: 0.9,
                b2: 0.999,
                eps: 1e-8,
            },
        }
    }
}

/// Everything a training run needs to know, already validated.
#[derive(Debug, Clone, Serialize)]
pub struct RunConfig {
    pub epochs: NonZeroUsize,
    pub batch_size: NonZeroUsize,
    /// Accelerator index, negative values select the CPU.
    pub gpu: i32,
    pub optimizer: OptimizerConfig,
    pub pretrained: Option<PathBuf>,
    pub log: bool,
    pub save: bool,
    pub img_dir: PathBuf,
    pub mask_dir: PathBuf,
    pub result_dir: PathBuf,
    pub insize: u32,
    pub test_ratio: f32,
    pub seed: Option<u64>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            epochs: NonZeroUsize::new(100).unwrap_or(NonZeroUsize::MIN),
            batch_size: NonZeroUsize::new(100).unwrap_or(NonZeroUsize::MIN),
            gpu: -1,
            optimizer: OptimizerKind::Sgd.into(),
            pretrained: None,
            log: true,
            save: false,
            img_dir: PathBuf::from("./data/img/"),
            mask_dir: PathBuf::from("./data/mask/"),
            result_dir: PathBuf::from("./result/"),
            insize: 64,
            test_ratio: 0.1,
            seed: None,
        }
    }
}

/// Turns a raw count into a `NonZeroUsize`, naming the flag on failure.
pub fn non_zero(value: usize, flag: &str) -> Result<NonZeroUsize> {
    NonZeroUsize::new(value)
        .ok_or_else(|| TrainErr::Config(format!("--{flag} must be greater than 0")))
}

impl RunConfig {
    /// Checks the values that the types alone can't rule out.
    pub fn validate(&self) -> Result<()> {
        if self.insize == 0 {
            return Err(TrainErr::Config("--insize must be greater than 0".into()));
        }

        if !(0.0..1.0).contains(&self.test_ratio) {
            return Err(TrainErr::Config(format!(
                "--test-ratio must be in [0, 1), got {}",
                self.test_ratio
            )));
        }

        if let Some(path) = &self.pretrained {
            if path.as_os_str().is_empty() {
                return Err(TrainErr::Config(
                    "--pretrainedmodel must not be an empty path".into(),
                ));
            }
        }

        if self.img_dir == self.mask_dir {
            return Err(TrainErr::Config(format!(
                "images and masks must live in different directories, both are {}",
                self.img_dir.display()
            )));
        }

        Ok(())
    }
}
