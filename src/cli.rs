use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::{
    config::{non_zero, OptimizerKind, RunConfig},
    error::TrainErr,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Switch {
    On,
    Off,
}

impl Switch {
    pub fn is_on(self) -> bool {
        matches!(self, Switch::On)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OptimizerArg {
    Adam,
    Adagrad,
    Sgd,
}

impl From<OptimizerArg> for OptimizerKind {
    fn from(arg: OptimizerArg) -> Self {
        match arg {
            OptimizerArg::Adam => OptimizerKind::Adam,
            OptimizerArg::Adagrad => OptimizerKind::AdaGrad,
            OptimizerArg::Sgd => OptimizerKind::Sgd,
        }
    }
}

/// Human parts network trainer.
#[derive(Parser, Debug)]
#[command(name = "human-parts-trainer", version, about = "Human parts network")]
pub struct Cli {
    /// Batch size of training
    #[arg(short, long, default_value_t = 100)]
    pub batchsize: usize,

    /// Number of epoch of training
    #[arg(short, long, default_value_t = 100)]
    pub epoch: usize,

    /// GPU ID (negative value indicates CPU)
    #[arg(short, long, default_value_t = -1, allow_negative_numbers = true)]
    pub gpu: i32,

    /// Writing and plotting result flag
    #[arg(short, long, value_enum, default_value_t = Switch::On)]
    pub logflag: Switch,

    /// Optimizer algorithm
    #[arg(short, long, value_enum, default_value_t = OptimizerArg::Sgd)]
    pub optimizer: OptimizerArg,

    /// Path to pretrained model
    #[arg(short, long)]
    pub pretrainedmodel: Option<PathBuf>,

    /// Save model and optimizer flag
    #[arg(short, long, value_enum, default_value_t = Switch::Off)]
    pub saveflag: Switch,

    /// Directory holding the input images
    #[arg(long, default_value = "./data/img/")]
    pub img_dir: PathBuf,

    /// Directory holding one mask per input image
    #[arg(long, default_value = "./data/mask/")]
    pub mask_dir: PathBuf,

    /// Directory for the log, the plot and the checkpoints
    #[arg(long, default_value = "./result/")]
    pub result_dir: PathBuf,

    /// Side length images and masks are resized to
    #[arg(long, default_value_t = 64)]
    pub insize: u32,

    /// Fraction of the dataset held out for evaluation
    #[arg(long, default_value_t = 0.1)]
    pub test_ratio: f32,

    /// Seed for parameter initialization, shuffling and dropout
    #[arg(long)]
    pub seed: Option<u64>,
}

impl TryFrom<Cli> for RunConfig {
    type Error = TrainErr;

    fn try_from(cli: Cli) -> Result<Self, Self::Error> {
        let config = RunConfig {
            epochs: non_zero(cli.epoch, "epoch")?,
            batch_size: non_zero(cli.batchsize, "batchsize")?,
            gpu: cli.gpu,
            optimizer: OptimizerKind::from(cli.optimizer).into(),
            pretrained: cli.pretrainedmodel,
            log: cli.logflag.is_on(),
            save: cli.saveflag.is_on(),
            img_dir: cli.img_dir,
            mask_dir: cli.mask_dir,
            result_dir: cli.result_dir,
            insize: cli.insize,
            test_ratio: cli.test_ratio,
            seed: cli.seed,
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OptimizerConfig;

    fn parse(args: &[&str]) -> Result<RunConfig, TrainErr> {
        let argv = std::iter::once("human-parts-trainer").chain(args.iter().copied());
        let cli = Cli::try_parse_from(argv).expect("arguments should parse");
        RunConfig::try_from(cli)
    }

    #[test]
    fn defaults_match_the_documented_surface() {
        let config = parse(&[]).unwrap();

        assert_eq!(config.batch_size.get(), 100);
        assert_eq!(config.epochs.get(), 100);
        assert_eq!(config.gpu, -1);
        assert!(config.log);
        assert!(!config.save);
        assert!(config.pretrained.is_none());
        assert_eq!(config.optimizer, OptimizerKind::Sgd.into());
    }

    #[test]
    fn short_flags_and_negative_gpu_ids_parse() {
        let config = parse(&[
            "-b", "8", "-e", "25", "-g", "-1", "-l", "off", "-o", "adam", "-s", "on", "-p",
            "weights.model",
        ])
        .unwrap();

        assert_eq!(config.batch_size.get(), 8);
        assert_eq!(config.epochs.get(), 25);
        assert_eq!(config.gpu, -1);
        assert!(!config.log);
        assert!(config.save);
        assert_eq!(config.pretrained, Some(PathBuf::from("weights.model")));
        assert!(matches!(config.optimizer, OptimizerConfig::Adam { .. }));
    }

    #[test]
    fn adagrad_maps_to_its_config() {
        let config = parse(&["--optimizer", "adagrad"]).unwrap();
        assert!(matches!(config.optimizer, OptimizerConfig::AdaGrad { .. }));
    }

    #[test]
    fn unknown_switch_values_are_rejected_by_the_parser() {
        let res = Cli::try_parse_from(["human-parts-trainer", "--logflag", "maybe"]);
        assert!(res.is_err());
    }

    #[test]
    fn zero_batch_size_is_a_config_error() {
        assert!(matches!(parse(&["-b", "0"]), Err(TrainErr::Config(_))));
    }
}
