pub mod checkpoint;
pub mod cli;
pub mod config;
pub mod data;
pub mod device;
pub mod error;
pub mod metrics;
pub mod mode;
pub mod model;
pub mod optimization;
pub mod report;
pub mod training;

pub use error::{Phase, Result, RunError, TrainErr};
pub use mode::Mode;
