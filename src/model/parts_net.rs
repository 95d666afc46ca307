use log::debug;
use ndarray::{prelude::*, Zip};
use rand::{rngs::StdRng, Rng};
use rand_distr::{Distribution, Normal};

use super::{BatchOutput, Model, ParamSpec, PointwiseConv, SoftmaxCrossEntropy};
use crate::{
    data::Batch,
    error::{Result, TrainErr},
    mode::Mode,
};

pub const HIDDEN_CHANNELS: usize = 32;
pub const DROPOUT_RATIO: f32 = 0.2;

/// What a training forward pass leaves behind for `backward`.
struct Activations {
    rows: Array2<f32>,
    z1: Array2<f32>,
    keep: Option<Array2<f32>>,
    a1: Array2<f32>,
    delta: Array2<f32>,
}

/// Per-pixel part classifier: a 1x1 convolution, ReLU with dropout, and a
/// second 1x1 convolution producing one score per class, trained against a
/// softmax cross-entropy.
pub struct PartsNet {
    conv1: PointwiseConv,
    conv2: PointwiseConv,
    loss: SoftmaxCrossEntropy,
    dropout: f32,
    params: Vec<f32>,
    grad: Vec<f32>,
    rng: StdRng,
    cache: Option<Activations>,
}

impl PartsNet {
    /// Creates a new `PartsNet` with the default hidden width and dropout.
    ///
    /// # Arguments
    /// * `in_channels` - The amount of image channels.
    /// * `n_class` - The amount of part classes.
    /// * `rng` - Drives weight initialization and dropout.
    pub fn new(in_channels: usize, n_class: usize, rng: StdRng) -> Result<Self> {
        Self::with_shape(in_channels, HIDDEN_CHANNELS, n_class, DROPOUT_RATIO, rng)
    }

    /// Creates a new `PartsNet` with He-initialized weights and zero biases.
    ///
    /// # Returns
    /// A `Config` error if a width is zero or `dropout` is outside of `[0, 1)`.
    pub fn with_shape(
        in_channels: usize,
        hidden: usize,
        n_class: usize,
        dropout: f32,
        mut rng: StdRng,
    ) -> Result<Self> {
        if in_channels == 0 || hidden == 0 || n_class == 0 {
            return Err(TrainErr::Config(format!(
                "network widths must be positive, got {in_channels}->{hidden}->{n_class}"
            )));
        }

        if !(0.0..1.0).contains(&dropout) {
            return Err(TrainErr::Config(format!(
                "dropout ratio must be in [0, 1), got {dropout}"
            )));
        }

        let conv1 = PointwiseConv::new((in_channels, hidden));
        let conv2 = PointwiseConv::new((hidden, n_class));

        let mut params = Vec::with_capacity(conv1.size() + conv2.size());
        for conv in [&conv1, &conv2] {
            let (n_in, n_out) = conv.dim();
            let normal = Normal::new(0.0, (2.0 / n_in as f32).sqrt())
                .map_err(|e| TrainErr::Config(e.to_string()))?;

            params.extend((0..n_in * n_out).map(|_| normal.sample(&mut rng)));
            params.extend(std::iter::repeat(0.0).take(n_out));
        }

        debug!("initialized network with {} parameters", params.len());

        Ok(Self {
            grad: vec![0.0; params.len()],
            conv1,
            conv2,
            loss: SoftmaxCrossEntropy::new(n_class),
            dropout,
            params,
            rng,
            cache: None,
        })
    }

    /// Draws an inverted dropout mask: kept units are scaled by `1 / (1 - p)`.
    fn dropout_mask(&mut self, dim: (usize, usize)) -> Array2<f32> {
        let keep = 1.0 - self.dropout;
        let rng = &mut self.rng;
        Array2::from_shape_fn(dim, |_| {
            if rng.random_bool(keep as f64) {
                1.0 / keep
            } else {
                0.0
            }
        })
    }
}

/// Lays out `(N, C, H, W)` inputs as one `C`-wide row per pixel, in `(N, H, W)` order.
fn pixel_rows(inputs: &Array4<f32>) -> Result<Array2<f32>> {
    let (n, c, h, w) = inputs.dim();
    inputs
        .view()
        .permuted_axes([0, 2, 3, 1])
        .as_standard_layout()
        .into_owned()
        .into_shape_with_order((n * h * w, c))
        .map_err(|e| TrainErr::Data(e.to_string()))
}

impl Model for PartsNet {
    fn size(&self) -> usize {
        self.params.len()
    }

    fn layout(&self) -> Vec<ParamSpec> {
        [("conv1", &self.conv1), ("conv2", &self.conv2)]
            .into_iter()
            .flat_map(|(name, conv)| {
                let (n_in, n_out) = conv.dim();
                [
                    ParamSpec::new(format!("{name}.W"), vec![n_in, n_out]),
                    ParamSpec::new(format!("{name}.b"), vec![n_out]),
                ]
            })
            .collect()
    }

    fn params(&self) -> &[f32] {
        &self.params
    }

    fn params_mut(&mut self) -> &mut [f32] {
        &mut self.params
    }

    fn forward(&mut self, batch: &Batch, mode: Mode) -> Result<BatchOutput> {
        self.cache = None;

        let rows = pixel_rows(&batch.inputs)?;
        let labels: Vec<i32> = batch.labels.iter().copied().collect();

        let split = self.conv1.size();
        let z1 = self.conv1.forward(&self.params[..split], rows.view())?;
        let mut a1 = z1.mapv(|v| v.max(0.0));

        let keep = if mode.is_train() && self.dropout > 0.0 {
            let keep = self.dropout_mask(a1.dim());
            a1 *= &keep;
            Some(keep)
        } else {
            None
        };

        let logits = self.conv2.forward(&self.params[split..], a1.view())?;
        let out = self.loss.evaluate(logits.view(), &labels, mode.is_train())?;

        if let Some(delta) = out.delta {
            self.cache = Some(Activations {
                rows,
                z1,
                keep,
                a1,
                delta,
            });
        }

        Ok(BatchOutput {
            loss: out.loss,
            accuracy: out.accuracy,
        })
    }

    fn backward(&mut self) -> Result<()> {
        let Some(cache) = self.cache.take() else {
            return Err(TrainErr::Data(
                "backward needs a training forward pass first".into(),
            ));
        };

        let split = self.conv1.size();
        let (p1, p2) = self.params.split_at(split);
        let (g1, g2) = self.grad.split_at_mut(split);

        let mut d1 = self
            .conv2
            .backward(p2, g2, cache.a1.view(), cache.delta.view())?;

        if let Some(keep) = &cache.keep {
            d1 *= keep;
        }

        Zip::from(&mut d1).and(&cache.z1).for_each(|d, &z| {
            if z <= 0.0 {
                *d = 0.0;
            }
        });

        self.conv1.backward(p1, g1, cache.rows.view(), d1.view())?;
        Ok(())
    }

    fn params_and_grad(&mut self) -> (&mut [f32], &[f32]) {
        (&mut self.params, &self.grad)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimization::{MomentumSgd, Optimizer};
    use rand::SeedableRng;

    fn net(dropout: f32) -> PartsNet {
        PartsNet::with_shape(3, 8, 3, dropout, StdRng::seed_from_u64(7)).unwrap()
    }

    fn batch() -> Batch {
        let inputs = Array4::from_shape_fn((2, 3, 2, 2), |(n, c, h, w)| {
            ((n * 7 + c * 3 + h * 2 + w) % 5) as f32 / 5.0
        });
        let labels = Array3::from_shape_fn((2, 2, 2), |(n, h, w)| ((n + h + w) % 3) as i32);
        Batch::new(inputs, labels).unwrap()
    }

    #[test]
    fn layout_covers_the_parameter_buffer() {
        let net = net(0.0);
        let layout = net.layout();

        assert_eq!(layout.len(), 4);
        assert_eq!(layout[0], ParamSpec::new("conv1.W", vec![3, 8]));
        assert_eq!(layout[3], ParamSpec::new("conv2.b", vec![3]));
        assert_eq!(layout.iter().map(ParamSpec::numel).sum::<usize>(), net.size());
    }

    #[test]
    fn evaluation_is_repeatable_and_leaves_params_alone() {
        let mut net = net(0.5);
        let batch = batch();
        let before = net.params().to_vec();

        let first = net.forward(&batch, Mode::Eval).unwrap();
        let second = net.forward(&batch, Mode::Eval).unwrap();

        assert_eq!(first, second);
        assert_eq!(net.params(), before.as_slice());
        assert!(net.backward().is_err());
    }

    #[test]
    fn bias_gradient_matches_finite_differences() {
        let mut net = net(0.0);
        let batch = batch();

        net.forward(&batch, Mode::Train).unwrap();
        net.backward().unwrap();
        let (_, grad) = net.params_and_grad();
        let grad = grad.to_vec();

        let eps = 1e-3;
        for i in net.size() - 3..net.size() {
            net.params_mut()[i] += eps;
            let up = net.forward(&batch, Mode::Eval).unwrap().loss;
            net.params_mut()[i] -= 2.0 * eps;
            let down = net.forward(&batch, Mode::Eval).unwrap().loss;
            net.params_mut()[i] += eps;

            let numeric = (up - down) / (2.0 * eps);
            assert!(
                (numeric - grad[i]).abs() < 1e-3,
                "param {i}: numeric {numeric}, analytic {}",
                grad[i]
            );
        }
    }

    #[test]
    fn training_steps_lower_the_loss() {
        let mut net = net(0.0);
        let mut optimizer = MomentumSgd::new(net.size(), 0.5, 0.0);
        let batch = batch();

        let initial = net.forward(&batch, Mode::Eval).unwrap().loss;
        for _ in 0..50 {
            net.forward(&batch, Mode::Train).unwrap();
            net.backward().unwrap();
            let (params, grad) = net.params_and_grad();
            optimizer.update_params(grad, params).unwrap();
        }
        let trained = net.forward(&batch, Mode::Eval).unwrap().loss;

        assert!(trained < initial, "{trained} should be below {initial}");
    }

    #[test]
    fn channel_mismatch_is_a_data_error() {
        let mut net = net(0.0);
        let batch = Batch::new(Array4::zeros((1, 1, 2, 2)), Array3::zeros((1, 2, 2))).unwrap();

        assert!(matches!(
            net.forward(&batch, Mode::Train),
            Err(TrainErr::Data(_))
        ));
    }

    #[test]
    fn invalid_dropout_is_rejected() {
        let res = PartsNet::with_shape(3, 8, 3, 1.0, StdRng::seed_from_u64(0));
        assert!(matches!(res, Err(TrainErr::Config(_))));
    }
}
