use std::borrow::Cow;

use crate::error::{Result, TrainErr};

/// A named internal buffer of an optimizer, as written into checkpoints.
#[derive(Debug, Clone, PartialEq)]
pub struct StateTensor<'a> {
    pub name: &'static str,
    pub data: Cow<'a, [f32]>,
}

impl<'a> StateTensor<'a> {
    pub fn borrowed(name: &'static str, data: &'a [f32]) -> Self {
        Self {
            name,
            data: Cow::Borrowed(data),
        }
    }

    pub fn scalar(name: &'static str, value: f32) -> Self {
        Self {
            name,
            data: Cow::Owned(vec![value]),
        }
    }
}

/// Defines the strategy for updating model parameters based on calculated gradients.
pub trait Optimizer {
    /// Returns a short name for logs and checkpoint metadata.
    fn name(&self) -> &'static str;

    /// Updates the provided slice of parameters using the gradient.
    ///
    /// # Arguments
    /// * `grad` - A reference to the model's gradient.
    /// * `params` - The parameters to update.
    ///
    /// # Returns
    /// An error if there's a mismatch in the sizes of `grad` and `params`.
    fn update_params(&mut self, grad: &[f32], params: &mut [f32]) -> Result<()>;

    /// Returns every internal buffer needed to resume this optimizer.
    fn state(&self) -> Vec<StateTensor<'_>>;
}

/// Checks that the gradient, the parameters and an optimizer buffer agree in length.
pub(super) fn check_lengths(grad: &[f32], params: &[f32], buffer: usize) -> Result<()> {
    if grad.len() != params.len() {
        return Err(TrainErr::SizeMismatch {
            what: "gradient",
            got: grad.len(),
            expected: params.len(),
        });
    }

    if buffer != params.len() {
        return Err(TrainErr::SizeMismatch {
            what: "optimizer state",
            got: buffer,
            expected: params.len(),
        });
    }

    Ok(())
}
