mod plot;

pub use plot::{render_losses, save_losses};

use std::{
    fmt,
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
    time::Duration,
};

use log::debug;

use crate::{
    config::RunConfig,
    error::{Result, TrainErr},
    metrics::MetricSeries,
};

/// Label written at the top of every log block.
pub const RUN_LABEL: &str = "Human part segmentation";

/// Everything logged after an epoch.
#[derive(Debug, Clone, Copy)]
pub struct LogRecord<'a> {
    pub epoch: usize,
    pub elapsed: Duration,
    pub train_size: usize,
    pub test_size: usize,
    pub batch_size: usize,
    pub series: &'a MetricSeries,
}

/// Receives one record per completed epoch.
pub trait RunLogger {
    fn record(&mut self, record: &LogRecord<'_>) -> Result<()>;
}

/// Appends plain-text blocks to `log.txt` and redraws `log.png` in the result directory.
#[derive(Debug, Clone)]
pub struct FileLogger {
    log_path: PathBuf,
    plot_path: PathBuf,
}

impl FileLogger {
    /// Creates the result directory if needed and writes the run's
    /// configuration next to the log as `config.json`.
    pub fn create(dir: &Path, config: &RunConfig) -> Result<Self> {
        fs::create_dir_all(dir).map_err(|e| TrainErr::io(dir, e))?;

        let config_path = dir.join("config.json");
        let json = serde_json::to_string_pretty(config)
            .map_err(|e| TrainErr::Config(format!("config is not serializable: {e}")))?;
        fs::write(&config_path, json).map_err(|e| TrainErr::io(&config_path, e))?;

        Ok(Self {
            log_path: dir.join("log.txt"),
            plot_path: dir.join("log.png"),
        })
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn plot_path(&self) -> &Path {
        &self.plot_path
    }
}

impl RunLogger for FileLogger {
    fn record(&mut self, record: &LogRecord<'_>) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .map_err(|e| TrainErr::io(&self.log_path, e))?;

        write!(file, "{record}").map_err(|e| TrainErr::io(&self.log_path, e))?;

        save_losses(
            &self.plot_path,
            record.series.train_loss(),
            record.series.test_loss(),
        )?;

        debug!("logged epoch {} to {}", record.epoch, self.log_path.display());
        Ok(())
    }
}

/// Formats one log block. Blocks end with an empty line.
impl fmt::Display for LogRecord<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let series = self.series;

        writeln!(f, "{RUN_LABEL}")?;
        writeln!(f, "epoch: {}", self.epoch)?;
        writeln!(f, "elapsed: {:.3}s", self.elapsed.as_secs_f64())?;
        writeln!(
            f,
            "datasize: train {}, test {}",
            self.train_size, self.test_size
        )?;
        writeln!(f, "batchsize: {}", self.batch_size)?;
        writeln!(f, "train/loss: {}", Values(series.train_loss()))?;
        writeln!(f, "train/accuracy: {}", Values(series.train_accuracy()))?;
        writeln!(f, "test/loss: {}", Values(series.test_loss()))?;
        writeln!(f, "test/accuracy: {}", Values(series.test_accuracy()))?;
        writeln!(f)
    }
}

/// Prints a bracketed, comma separated list with six decimals.
struct Values<'a>(&'a [f64]);

impl fmt::Display for Values<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, v) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{v:.6}")?;
        }
        write!(f, "]")
    }
}
