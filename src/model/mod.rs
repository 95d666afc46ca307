mod layer;
mod loss;
mod parts_net;

pub use layer::PointwiseConv;
pub use loss::{LossOutput, SoftmaxCrossEntropy};
pub use parts_net::PartsNet;

use crate::{data::Batch, error::Result, mode::Mode};

/// Name and shape of one tensor inside a model's flat parameter buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: String,
    pub shape: Vec<usize>,
}

impl ParamSpec {
    pub fn new(name: impl Into<String>, shape: Vec<usize>) -> Self {
        Self {
            name: name.into(),
            shape,
        }
    }

    /// Returns the amount of values in this tensor.
    pub fn numel(&self) -> usize {
        self.shape.iter().product()
    }
}

/// Loss and accuracy of one forward pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchOutput {
    pub loss: f32,
    pub accuracy: f32,
}

/// A trainable network over a flat `f32` parameter buffer.
pub trait Model {
    /// Returns the amount of parameters in the model.
    fn size(&self) -> usize;

    /// Returns the tensors the parameter buffer is made of, in buffer order.
    fn layout(&self) -> Vec<ParamSpec>;

    fn params(&self) -> &[f32];

    fn params_mut(&mut self) -> &mut [f32];

    /// Runs the network over a batch.
    ///
    /// In `Mode::Train` stochastic regularization is active and the
    /// activations are kept for the following `backward` call. In
    /// `Mode::Eval` the pass is deterministic and leaves the model untouched.
    ///
    /// # Returns
    /// The batch loss and accuracy, or a `Data` error for malformed batches.
    fn forward(&mut self, batch: &Batch, mode: Mode) -> Result<BatchOutput>;

    /// Writes the gradient of the last training forward pass.
    fn backward(&mut self) -> Result<()>;

    /// Splits the model into its parameters and its gradient for an update step.
    fn params_and_grad(&mut self) -> (&mut [f32], &[f32]);
}
