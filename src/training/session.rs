use std::{num::NonZeroUsize, time::Instant};

use log::{info, warn};
use rand::{rngs::StdRng, SeedableRng};

use super::epoch::{evaluate_epoch, train_epoch};
use crate::{
    checkpoint::{self, CheckpointSink, FileCheckpointer, CHECKPOINT_INTERVAL},
    config::{RunConfig, N_CLASS},
    data::{BatchSource, LoaderConfig, MiniBatchLoader},
    device::{select_device, Backend, CpuBackend},
    error::{Phase, Result, RunError, TrainErr},
    metrics::MetricSeries,
    mode::Mode,
    model::{Model, PartsNet},
    optimization::{self, Optimizer},
    report::{FileLogger, LogRecord, RunLogger},
};

/// Amount of channels of the decoded input images.
const INPUT_CHANNELS: usize = 3;

/// Drives a whole training run: one training pass and one evaluation pass per
/// epoch, followed by the optional logging and checkpointing steps.
///
/// The current `Phase` doubles as the orchestrator's state and is what a
/// failure gets tagged with.
pub struct Orchestrator<M, S, B>
where
    M: Model,
    S: BatchSource,
    B: Backend,
{
    model: M,
    optimizer: Box<dyn Optimizer>,
    source: S,
    backend: B,
    epochs: NonZeroUsize,

    logger: Option<Box<dyn RunLogger>>,
    checkpoints: Option<Box<dyn CheckpointSink>>,
    series: MetricSeries,
    phase: Phase,
}

impl<M, S, B> Orchestrator<M, S, B>
where
    M: Model,
    S: BatchSource,
    B: Backend,
{
    /// Creates a new `Orchestrator` with logging and checkpointing off.
    ///
    /// # Arguments
    /// * `model` - The model to train.
    /// * `optimizer` - The update rule, sized for `model`.
    /// * `source` - The loader providing both dataset splits.
    /// * `backend` - The backend, already bound to its device.
    /// * `epochs` - The amount of epochs to run.
    pub fn new(
        model: M,
        optimizer: Box<dyn Optimizer>,
        source: S,
        backend: B,
        epochs: NonZeroUsize,
    ) -> Self {
        Self {
            model,
            optimizer,
            source,
            backend,
            epochs,
            logger: None,
            checkpoints: None,
            series: MetricSeries::new(),
            phase: Phase::Configured,
        }
    }

    /// Records every epoch with `logger`.
    pub fn with_logger(mut self, logger: Box<dyn RunLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Saves a checkpoint into `sink` every `CHECKPOINT_INTERVAL` epochs.
    pub fn with_checkpoints(mut self, sink: Box<dyn CheckpointSink>) -> Self {
        self.checkpoints = Some(sink);
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn series(&self) -> &MetricSeries {
        &self.series
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn into_series(self) -> MetricSeries {
        self.series
    }

    /// Runs every epoch, stopping at the first error.
    ///
    /// # Returns
    /// The four metric series, or the error tagged with the phase it
    /// happened in. A run can only be started once.
    pub fn run(&mut self) -> std::result::Result<&MetricSeries, RunError> {
        if self.phase != Phase::Configured {
            return Err(RunError::new(
                self.phase,
                TrainErr::Config("this run has already been started".into()),
            ));
        }

        if self.checkpoints.is_some() && self.epochs.get() < CHECKPOINT_INTERVAL {
            warn!(
                "saving is on but {} epoch(s) never reach a checkpoint (every {} epochs)",
                self.epochs, CHECKPOINT_INTERVAL
            );
        }

        info!(
            "training for {} epoch(s) on {}: {} training / {} test samples, batch size {}",
            self.epochs,
            self.backend.device(),
            self.source.datasize(Mode::Train),
            self.source.datasize(Mode::Eval),
            self.source.batch_size()
        );

        let start = Instant::now();
        for epoch in 1..=self.epochs.get() {
            if let Err(e) = self.run_epoch(epoch, start) {
                return Err(RunError::new(self.phase, e));
            }
        }

        self.phase = Phase::Done;
        info!("finished {} epoch(s) in {:.1?}", self.epochs, start.elapsed());
        Ok(&self.series)
    }

    fn run_epoch(&mut self, epoch: usize, start: Instant) -> Result<()> {
        self.phase = Phase::Training { epoch };
        let train = train_epoch(
            &mut self.model,
            self.optimizer.as_mut(),
            &mut self.source,
            &self.backend,
        )?;

        self.phase = Phase::Evaluating { epoch };
        let test = evaluate_epoch(&mut self.model, &mut self.source, &self.backend)?;

        self.series.push(train, test);
        info!(
            "epoch {epoch}: train loss {:.6}, accuracy {:.6} | test loss {:.6}, accuracy {:.6}",
            train.loss, train.accuracy, test.loss, test.accuracy
        );

        if let Some(logger) = self.logger.as_mut() {
            self.phase = Phase::Logging { epoch };
            logger.record(&LogRecord {
                epoch,
                elapsed: start.elapsed(),
                train_size: self.source.datasize(Mode::Train),
                test_size: self.source.datasize(Mode::Eval),
                batch_size: self.source.batch_size(),
                series: &self.series,
            })?;
        }

        if let Some(sink) = self.checkpoints.as_mut() {
            if checkpoint::is_checkpoint_epoch(epoch) {
                self.phase = Phase::Checkpointing { epoch };
                sink.save(epoch, &self.model, self.optimizer.as_ref())?;
            }
        }

        Ok(())
    }
}

/// Builds everything a run needs from a validated configuration.
///
/// The model is built first and loaded with the pretrained parameters if
/// any, then the device is selected, then the optimizer and finally the
/// loader.
///
/// # Returns
/// A ready `Orchestrator`, or the first setup error tagged with `Phase::Configured`.
pub fn setup(
    config: &RunConfig,
) -> std::result::Result<Orchestrator<PartsNet, MiniBatchLoader, CpuBackend>, RunError> {
    build(config).map_err(|e| RunError::new(Phase::Configured, e))
}

fn build(config: &RunConfig) -> Result<Orchestrator<PartsNet, MiniBatchLoader, CpuBackend>> {
    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    let mut model = PartsNet::new(INPUT_CHANNELS, N_CLASS, StdRng::from_rng(&mut rng))?;
    if let Some(path) = &config.pretrained {
        checkpoint::load_pretrained(path, &mut model)?;
        info!("loaded pretrained parameters from {}", path.display());
    }

    let mut backend = CpuBackend::new();
    let device = select_device(config.gpu, &backend)?;
    backend.bind(device)?;
    info!("using device {device}");

    let optimizer = optimization::build(config.optimizer, model.size());
    info!("using optimizer {}", optimizer.name());

    let loader_config = LoaderConfig {
        img_dir: config.img_dir.clone(),
        mask_dir: config.mask_dir.clone(),
        batch_size: config.batch_size,
        insize: config.insize,
        test_ratio: config.test_ratio,
        n_class: N_CLASS,
    };
    let loader = MiniBatchLoader::open(&loader_config, StdRng::from_rng(&mut rng))?;

    let mut orchestrator = Orchestrator::new(model, optimizer, loader, backend, config.epochs);

    if config.log {
        let logger = FileLogger::create(&config.result_dir, config)?;
        orchestrator = orchestrator.with_logger(Box::new(logger));
    }

    if config.save {
        let sink = FileCheckpointer::new(&config.result_dir);
        orchestrator = orchestrator.with_checkpoints(Box::new(sink));
    }

    Ok(orchestrator)
}

/// Sets up and runs a whole training session.
pub fn run(config: &RunConfig) -> std::result::Result<MetricSeries, RunError> {
    let mut orchestrator = setup(config)?;
    orchestrator.run()?;
    Ok(orchestrator.into_series())
}
