use super::{
    optimizer::{check_lengths, StateTensor},
    Optimizer,
};
use crate::error::Result;

/// Adam over the flat parameter buffer of a segmentation network.
///
/// Keeps a running mean (`m`) and uncentered variance (`v`) of every
/// gradient entry, both bias corrected before the step.
#[derive(Debug)]
pub struct Adam {
    learning_rate: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    // beta1^t and beta2^t after t updates.
    beta1_pow: f32,
    beta2_pow: f32,
    m: Box<[f32]>,
    v: Box<[f32]>,
}

impl Adam {
    /// # Arguments
    /// * `len` - Size of the parameter buffer the moments are kept for.
    /// * `learning_rate` - Step length once both moments are bias corrected.
    /// * `beta1` - Decay of the gradient mean.
    /// * `beta2` - Decay of the squared gradient mean.
    /// * `epsilon` - Added to the step denominator.
    pub fn new(len: usize, learning_rate: f32, beta1: f32, beta2: f32, epsilon: f32) -> Self {
        Self {
            learning_rate,
            beta1,
            beta2,
            epsilon,
            beta1_pow: 1.,
            beta2_pow: 1.,
            m: vec![0.; len].into_boxed_slice(),
            v: vec![0.; len].into_boxed_slice(),
        }
    }
}

impl Optimizer for Adam {
    fn name(&self) -> &'static str {
        "adam"
    }

    fn update_params(&mut self, grad: &[f32], params: &mut [f32]) -> Result<()> {
        check_lengths(grad, params, self.m.len())?;

        self.beta1_pow *= self.beta1;
        self.beta2_pow *= self.beta2;

        let (b1, b2) = (self.beta1, self.beta2);
        let m_scale = 1. / (1. - self.beta1_pow);
        let v_scale = 1. / (1. - self.beta2_pow);

        for (i, (p, &g)) in params.iter_mut().zip(grad).enumerate() {
            let m = &mut self.m[i];
            let v = &mut self.v[i];
            *m += (1. - b1) * (g - *m);
            *v += (1. - b2) * (g * g - *v);

            let m_hat = *m * m_scale;
            let v_hat = *v * v_scale;
            *p -= self.learning_rate * m_hat / (v_hat.sqrt() + self.epsilon);
        }

        Ok(())
    }

    fn state(&self) -> Vec<StateTensor<'_>> {
        vec![
            StateTensor::borrowed("m", &self.m),
            StateTensor::borrowed("v", &self.v),
            StateTensor::scalar("beta1_t", self.beta1_pow),
            StateTensor::scalar("beta2_t", self.beta2_pow),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_step_moves_every_param_by_the_learning_rate() {
        let mut adam = Adam::new(3, 0.01, 0.9, 0.999, 1e-8);
        let mut params = [0.0, 0.0, 0.0];

        adam.update_params(&[0.5, -3.0, 100.0], &mut params).unwrap();

        assert!((params[0] + 0.01).abs() < 1e-5);
        assert!((params[1] - 0.01).abs() < 1e-5);
        assert!((params[2] + 0.01).abs() < 1e-5);
    }

    #[test]
    fn state_tracks_bias_correction_powers() {
        let mut adam = Adam::new(1, 0.01, 0.5, 0.25, 1e-8);
        adam.update_params(&[1.0], &mut [0.0]).unwrap();
        adam.update_params(&[1.0], &mut [0.0]).unwrap();

        let state = adam.state();
        let names: Vec<_> = state.iter().map(|t| t.name).collect();
        assert_eq!(names, ["m", "v", "beta1_t", "beta2_t"]);
        assert_eq!(state[2].data.as_ref(), [0.25]);
        assert_eq!(state[3].data.as_ref(), [0.0625]);
    }
}
