use super::{
    optimizer::{check_lengths, StateTensor},
    Optimizer,
};
use crate::error::Result;

/// Scales every parameter's step by the root of its summed squared gradients.
#[derive(Debug)]
pub struct AdaGrad {
    learning_rate: f32,
    epsilon: f32,
    h: Box<[f32]>,
}

impl AdaGrad {
    /// Starts with an all-zero squared gradient sum of length `len`, so the
    /// first step of every parameter is exactly `learning_rate` long.
    pub fn new(len: usize, learning_rate: f32, epsilon: f32) -> Self {
        Self {
            learning_rate,
            epsilon,
            h: vec![0.; len].into_boxed_slice(),
        }
    }
}

impl Optimizer for AdaGrad {
    fn name(&self) -> &'static str {
        "adagrad"
    }

    fn update_params(&mut self, grad: &[f32], params: &mut [f32]) -> Result<()> {
        check_lengths(grad, params, self.h.len())?;

        let lr = self.learning_rate;
        let eps = self.epsilon;

        params
            .iter_mut()
            .zip(grad)
            .zip(self.h.iter_mut())
            .for_each(|((p, g), h)| {
                *h += g * g;
                *p -= lr * g / (h.sqrt() + eps);
            });

        Ok(())
    }

    fn state(&self) -> Vec<StateTensor<'_>> {
        vec![StateTensor::borrowed("h", &self.h)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_step_has_learning_rate_length() {
        let mut adagrad = AdaGrad::new(2, 0.1, 0.0);
        let mut params = [1.0, 1.0];

        adagrad.update_params(&[4.0, -0.5], &mut params).unwrap();

        assert!((params[0] - 0.9).abs() < 1e-6);
        assert!((params[1] - 1.1).abs() < 1e-6);
    }

    #[test]
    fn steps_shrink_as_squared_gradients_accumulate() {
        let mut adagrad = AdaGrad::new(1, 1.0, 0.0);
        let mut params = [0.0];

        adagrad.update_params(&[1.0], &mut params).unwrap();
        let first = -params[0];
        adagrad.update_params(&[1.0], &mut params).unwrap();
        let second = -params[0] - first;

        assert!(second < first);
        assert!((second - 1.0 / 2f32.sqrt()).abs() < 1e-6);
    }
}
