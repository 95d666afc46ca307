use ndarray::{linalg, prelude::*};

use crate::error::{Result, TrainErr};

/// A 1x1 convolution over pixel rows: every pixel is mapped from `dim.0`
/// channels to `dim.1` channels by the same weights.
///
/// Parameters live outside the layer in a flat slice laid out as the
/// `(dim.0, dim.1)` weights followed by the `dim.1` biases.
#[derive(Debug, Clone)]
pub struct PointwiseConv {
    dim: (usize, usize),
    size: usize,
}

impl PointwiseConv {
    /// Creates a new `PointwiseConv`.
    ///
    /// # Arguments
    /// * `dim` - The amount of input and output channels.
    pub fn new(dim: (usize, usize)) -> Self {
        Self {
            dim,
            size: (dim.0 + 1) * dim.1,
        }
    }

    /// Returns the amount of parameters this layer has.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn dim(&self) -> (usize, usize) {
        self.dim
    }

    /// Computes `x · w + b` for every pixel row of `x`.
    ///
    /// # Arguments
    /// * `params` - This layer's slice of the model parameters.
    /// * `x` - The input, one row per pixel.
    ///
    /// # Returns
    /// The output rows or an error if `params` or `x` have the wrong size.
    pub fn forward(&self, params: &[f32], x: ArrayView2<f32>) -> Result<Array2<f32>> {
        if x.ncols() != self.dim.0 {
            return Err(TrainErr::Data(format!(
                "expected {} input channels, got {}",
                self.dim.0,
                x.ncols()
            )));
        }

        let (w, b) = self.view_params(params)?;
        let mut z = Array2::zeros((x.nrows(), self.dim.1));
        linalg::general_mat_mul(1.0, &x, &w, 0.0, &mut z);
        z += &b;

        Ok(z)
    }

    /// Writes this layer's gradient and propagates the delta to its input.
    ///
    /// # Arguments
    /// * `params` - This layer's slice of the model parameters.
    /// * `grad` - This layer's slice of the gradient buffer, overwritten.
    /// * `x` - The input the matching `forward` call received.
    /// * `d` - The delta of the loss with respect to this layer's output.
    ///
    /// # Returns
    /// The delta of the loss with respect to this layer's input.
    pub fn backward(
        &self,
        params: &[f32],
        grad: &mut [f32],
        x: ArrayView2<f32>,
        d: ArrayView2<f32>,
    ) -> Result<Array2<f32>> {
        let (mut dw, mut db) = self.view_grad(grad)?;
        linalg::general_mat_mul(1.0, &x.t(), &d, 0.0, &mut dw);
        db.assign(&d.sum_axis(Axis(0)));

        let (w, _) = self.view_params(params)?;
        let mut dx = Array2::zeros((d.nrows(), self.dim.0));
        linalg::general_mat_mul(1.0, &d, &w.t(), 0.0, &mut dx);

        Ok(dx)
    }

    /// Gives a view of the raw parameter slice as the weights and biases of this layer.
    fn view_params<'a>(
        &self,
        params: &'a [f32],
    ) -> Result<(ArrayView2<'a, f32>, ArrayView1<'a, f32>)> {
        self.check_len("layer params", params.len())?;

        let w_size = self.size - self.dim.1;
        let (w_raw, b_raw) = params.split_at(w_size);
        let len = w_raw.len();
        let w = ArrayView2::from_shape(self.dim, w_raw).map_err(|_| self.mismatch(len))?;
        let b = ArrayView1::from(b_raw);

        Ok((w, b))
    }

    /// Gives a view of the raw gradient slice as the delta weights and delta biases of this layer.
    fn view_grad<'a>(
        &self,
        grad: &'a mut [f32],
    ) -> Result<(ArrayViewMut2<'a, f32>, ArrayViewMut1<'a, f32>)> {
        self.check_len("layer grad", grad.len())?;

        let w_size = self.size - self.dim.1;
        let (dw_raw, db_raw) = grad.split_at_mut(w_size);
        let len = dw_raw.len();
        let dw = ArrayViewMut2::from_shape(self.dim, dw_raw).map_err(|_| self.mismatch(len))?;
        let db = ArrayViewMut1::from(db_raw);

        Ok((dw, db))
    }

    fn check_len(&self, what: &'static str, got: usize) -> Result<()> {
        if got != self.size {
            return Err(TrainErr::SizeMismatch {
                what,
                got,
                expected: self.size,
            });
        }

        Ok(())
    }

    fn mismatch(&self, got: usize) -> TrainErr {
        TrainErr::SizeMismatch {
            what: "layer weights",
            got,
            expected: self.dim.0 * self.dim.1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    // w = [[1, 2], [3, 4], [5, 6]], b = [0.5, -0.5]
    const PARAMS: [f32; 8] = [1., 2., 3., 4., 5., 6., 0.5, -0.5];

    #[test]
    fn forward_maps_every_row() {
        let conv = PointwiseConv::new((3, 2));
        assert_eq!(conv.size(), 8);

        let x = array![[1., 0., 0.], [0., 1., 1.]];
        let z = conv.forward(&PARAMS, x.view()).unwrap();

        assert_eq!(z, array![[1.5, 1.5], [8.5, 9.5]]);
    }

    #[test]
    fn backward_writes_weight_and_bias_grads() {
        let conv = PointwiseConv::new((3, 2));
        let x = array![[1., 0., 0.], [0., 1., 1.]];
        let d = array![[1., 0.], [0., 2.]];
        let mut grad = [0.; 8];

        let dx = conv.backward(&PARAMS, &mut grad, x.view(), d.view()).unwrap();

        assert_eq!(grad, [1., 0., 0., 2., 0., 2., 1., 2.]);
        assert_eq!(dx, array![[1., 3., 5.], [4., 8., 12.]]);
    }

    #[test]
    fn wrong_channel_count_is_rejected() {
        let conv = PointwiseConv::new((3, 2));
        let x = array![[1., 0.]];
        assert!(matches!(conv.forward(&PARAMS, x.view()), Err(TrainErr::Data(_))));
    }

    #[test]
    fn short_param_slices_are_rejected() {
        let conv = PointwiseConv::new((3, 2));
        let x = array![[1., 0., 0.]];
        assert!(matches!(
            conv.forward(&PARAMS[..7], x.view()),
            Err(TrainErr::SizeMismatch { .. })
        ));
    }
}
