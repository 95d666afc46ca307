use super::{
    optimizer::{check_lengths, StateTensor},
    Optimizer,
};
use crate::error::Result;

/// Stochastic gradient descent with classical momentum.
///
/// A `momentum` of zero makes it plain gradient descent.
#[derive(Debug)]
pub struct MomentumSgd {
    learning_rate: f32,
    momentum: f32,
    velocity: Box<[f32]>,
}

impl MomentumSgd {
    /// # Arguments
    /// * `len` - Size of the parameter buffer.
    /// * `learning_rate` - Multiplies the gradient in every step.
    /// * `momentum` - Fraction of the previous step carried into the next one.
    pub fn new(len: usize, learning_rate: f32, momentum: f32) -> Self {
        Self {
            learning_rate,
            momentum,
            velocity: vec![0.; len].into_boxed_slice(),
        }
    }
}

impl Optimizer for MomentumSgd {
    fn name(&self) -> &'static str {
        "momentum_sgd"
    }

    fn update_params(&mut self, grad: &[f32], params: &mut [f32]) -> Result<()> {
        check_lengths(grad, params, self.velocity.len())?;

        let lr = self.learning_rate;
        let mu = self.momentum;

        params
            .iter_mut()
            .zip(grad)
            .zip(self.velocity.iter_mut())
            .for_each(|((p, g), v)| {
                *v = mu * *v - lr * g;
                *p += *v;
            });

        Ok(())
    }

    fn state(&self) -> Vec<StateTensor<'_>> {
        vec![StateTensor::borrowed("velocity", &self.velocity)]
    }
}
