use ndarray::{Array2, ArrayView2, Axis, Zip};

use crate::{
    data::IGNORE_LABEL,
    error::{Result, TrainErr},
};

/// What a loss evaluation over one batch yields.
#[derive(Debug, Clone)]
pub struct LossOutput {
    /// Mean loss over the counted pixels.
    pub loss: f32,
    /// Fraction of counted pixels whose arg-max class is the label.
    pub accuracy: f32,
    /// Delta of `loss` with respect to the logits, if it was asked for.
    pub delta: Option<Array2<f32>>,
}

/// Softmax cross-entropy over pixel rows of class logits.
///
/// Pixels labelled `IGNORE_LABEL` count towards neither the loss nor the
/// accuracy and get a zero delta.
#[derive(Debug, Clone, Copy)]
pub struct SoftmaxCrossEntropy {
    n_class: usize,
}

impl SoftmaxCrossEntropy {
    pub fn new(n_class: usize) -> Self {
        Self { n_class }
    }

    /// Evaluates the loss and accuracy of `logits` against `labels`.
    ///
    /// # Arguments
    /// * `logits` - One row of `n_class` scores per pixel.
    /// * `labels` - One class id per pixel, in the same order as `logits`.
    /// * `with_delta` - Whether to also compute the delta for backpropagation.
    ///
    /// # Returns
    /// The loss output or a `Data` error if a label is out of range. A batch
    /// where every pixel is ignored has zero loss and zero accuracy.
    pub fn evaluate(
        &self,
        logits: ArrayView2<f32>,
        labels: &[i32],
        with_delta: bool,
    ) -> Result<LossOutput> {
        if logits.ncols() != self.n_class {
            return Err(TrainErr::SizeMismatch {
                what: "logit classes",
                got: logits.ncols(),
                expected: self.n_class,
            });
        }

        if logits.nrows() != labels.len() {
            return Err(TrainErr::SizeMismatch {
                what: "pixel labels",
                got: labels.len(),
                expected: logits.nrows(),
            });
        }

        if let Some(bad) = labels
            .iter()
            .find(|&&y| y != IGNORE_LABEL && !(0..self.n_class as i32).contains(&y))
        {
            return Err(TrainErr::Data(format!(
                "label {bad} is outside of [0, {})",
                self.n_class
            )));
        }

        let probs = softmax(logits);
        let mut total = 0.0f64;
        let mut correct = 0usize;
        let mut counted = 0usize;

        for (row, &y) in probs.axis_iter(Axis(0)).zip(labels) {
            if y == IGNORE_LABEL {
                continue;
            }

            let y = y as usize;
            total -= (row[y].max(f32::MIN_POSITIVE) as f64).ln();
            counted += 1;

            if argmax(row.iter().copied()) == y {
                correct += 1;
            }
        }

        if counted == 0 {
            let delta = with_delta.then(|| Array2::zeros(logits.raw_dim()));
            return Ok(LossOutput {
                loss: 0.0,
                accuracy: 0.0,
                delta,
            });
        }

        let delta = with_delta.then(|| {
            let scale = 1.0 / counted as f32;
            let mut delta = probs;
            Zip::from(delta.rows_mut())
                .and(labels)
                .for_each(|mut row, &y| {
                    if y == IGNORE_LABEL {
                        row.fill(0.0);
                    } else {
                        row[y as usize] -= 1.0;
                        row *= scale;
                    }
                });
            delta
        });

        Ok(LossOutput {
            loss: (total / counted as f64) as f32,
            accuracy: correct as f32 / counted as f32,
            delta,
        })
    }
}

/// Row-wise softmax, shifted by the row maximum.
fn softmax(logits: ArrayView2<f32>) -> Array2<f32> {
    let mut probs = logits.to_owned();
    for mut row in probs.rows_mut() {
        let max = row.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        row /= sum;
    }

    probs
}

/// Index of the first maximum.
fn argmax(values: impl Iterator<Item = f32>) -> usize {
    values
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(bi, bv), (i, v)| {
            if v > bv {
                (i, v)
            } else {
                (bi, bv)
            }
        })
        .0
}
