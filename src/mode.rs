use std::fmt::{self, Display};

/// Which pass a model or loader call belongs to.
///
/// Passed explicitly into every call that behaves differently between
/// training and evaluation, so there is no flag to restore after a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Stochastic regularization on, shuffled and augmented batches.
    Train,
    /// Deterministic forward passes over the held-out split.
    Eval,
}

impl Mode {
    pub fn is_train(self) -> bool {
        matches!(self, Mode::Train)
    }
}

impl Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Train => write!(f, "train"),
            Mode::Eval => write!(f, "test"),
        }
    }
}
