use std::{
    error::Error,
    fmt::{self, Display},
    io,
    path::PathBuf,
};

/// The result type used across the training driver.
pub type Result<T> = std::result::Result<T, TrainErr>;

/// The training driver's error type.
#[derive(Debug)]
pub enum TrainErr {
    /// The run configuration is invalid, caught before anything is built.
    Config(String),
    /// The requested accelerator is not available on this backend.
    Device { requested: usize, available: usize },
    /// The pretrained parameters could not be loaded into the model.
    Load { path: PathBuf, reason: String },
    /// A batch is malformed or a dataset split is missing or empty.
    Data(String),
    /// Writing or reading an artifact failed.
    Io { path: PathBuf, source: io::Error },
    /// Two buffers that must agree in length do not.
    SizeMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },
}

impl TrainErr {
    /// Wraps an io error together with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Builds a `Load` error for the given path.
    pub fn load(path: impl Into<PathBuf>, reason: impl Display) -> Self {
        Self::Load {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

impl Display for TrainErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "invalid config: {msg}"),
            Self::Device {
                requested,
                available,
            } => write!(
                f,
                "accelerator {requested} is unavailable ({available} accelerator(s) found)"
            ),
            Self::Load { path, reason } => {
                write!(f, "failed to load {}: {reason}", path.display())
            }
            Self::Data(msg) => write!(f, "data error: {msg}"),
            Self::Io { path, source } => write!(f, "io error on {}: {source}", path.display()),
            Self::SizeMismatch {
                what,
                got,
                expected,
            } => write!(
                f,
                "size mismatch for {what}: got {got}, expected {expected}"
            ),
        }
    }
}

impl Error for TrainErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<image::ImageError> for TrainErr {
    fn from(e: image::ImageError) -> Self {
        Self::Data(format!("image decoding failed: {e}"))
    }
}

/// The stage of a run an error happened in.
///
/// It doubles as the orchestrator's state: whatever the orchestrator is doing
/// when an error surfaces is what gets reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Configured,
    Training { epoch: usize },
    Evaluating { epoch: usize },
    Logging { epoch: usize },
    Checkpointing { epoch: usize },
    Done,
}

impl Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configured => write!(f, "setup"),
            Self::Training { epoch } => write!(f, "training epoch {epoch}"),
            Self::Evaluating { epoch } => write!(f, "evaluating epoch {epoch}"),
            Self::Logging { epoch } => write!(f, "logging epoch {epoch}"),
            Self::Checkpointing { epoch } => write!(f, "checkpointing epoch {epoch}"),
            Self::Done => write!(f, "shutdown"),
        }
    }
}

/// A fatal run failure, tagged with the phase that produced it.
#[derive(Debug)]
pub struct RunError {
    pub phase: Phase,
    pub source: TrainErr,
}

impl RunError {
    pub fn new(phase: Phase, source: TrainErr) -> Self {
        Self { phase, source }
    }
}

impl Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.phase, self.source)
    }
}

impl Error for RunError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_error_names_the_phase() {
        let err = RunError::new(
            Phase::Evaluating { epoch: 3 },
            TrainErr::Data("split is empty".into()),
        );

        assert_eq!(
            err.to_string(),
            "evaluating epoch 3 failed: data error: split is empty"
        );
    }

    #[test]
    fn setup_phase_is_reported_as_setup() {
        let err = RunError::new(
            Phase::Configured,
            TrainErr::Device {
                requested: 1,
                available: 0,
            },
        );

        assert_eq!(
            err.to_string(),
            "setup failed: accelerator 1 is unavailable (0 accelerator(s) found)"
        );
    }

    #[test]
    fn io_errors_keep_their_source() {
        let err = TrainErr::io("result/log.txt", io::Error::other("disk full"));
        assert!(err.source().is_some());
    }
}
