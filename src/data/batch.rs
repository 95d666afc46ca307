use ndarray::{Array2, Array3, Array4, ArrayView2, ArrayView3, Axis};

use crate::error::{Result, TrainErr};

/// Mask pixels carrying this label are left out of loss and accuracy.
pub const IGNORE_LABEL: i32 = -1;

/// A single image with its per-pixel part labels.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Channels first, `(C, H, W)`, scaled to `[0, 1]`.
    pub image: Array3<f32>,
    /// `(H, W)` class ids, or `IGNORE_LABEL`.
    pub mask: Array2<i32>,
}

impl Sample {
    /// Creates a new `Sample`.
    ///
    /// # Returns
    /// A `Data` error if the image and mask disagree on their spatial size.
    pub fn new(image: Array3<f32>, mask: Array2<i32>) -> Result<Self> {
        let (_, h, w) = image.dim();
        if (h, w) != mask.dim() {
            return Err(TrainErr::Data(format!(
                "image is {h}x{w} but its mask is {}x{}",
                mask.nrows(),
                mask.ncols()
            )));
        }

        Ok(Self { image, mask })
    }
}

/// A mini-batch of inputs `(N, C, H, W)` and labels `(N, H, W)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub inputs: Array4<f32>,
    pub labels: Array3<i32>,
}

impl Batch {
    /// Creates a new `Batch`, validating that inputs and labels line up.
    pub fn new(inputs: Array4<f32>, labels: Array3<i32>) -> Result<Self> {
        let (n, _, h, w) = inputs.dim();
        if (n, h, w) != labels.dim() {
            let (ln, lh, lw) = labels.dim();
            return Err(TrainErr::Data(format!(
                "got {n} inputs of {h}x{w} but labels of shape {ln}x{lh}x{lw}"
            )));
        }

        if n == 0 {
            return Err(TrainErr::Data("batch must hold at least one sample".into()));
        }

        Ok(Self { inputs, labels })
    }

    /// Stacks samples into a batch, optionally mirroring some of them.
    ///
    /// # Arguments
    /// * `samples` - The samples to stack, all of the same shape.
    /// * `flip` - Whether each sample gets mirrored horizontally.
    pub fn stack<'a, I>(samples: I, flip: &[bool]) -> Result<Self>
    where
        I: ExactSizeIterator<Item = &'a Sample>,
    {
        let n = samples.len();
        let mut samples = samples.peekable();
        let Some(first) = samples.peek() else {
            return Err(TrainErr::Data("batch must hold at least one sample".into()));
        };

        let (c, h, w) = first.image.dim();
        let mut inputs = Array4::zeros((n, c, h, w));
        let mut labels = Array3::zeros((n, h, w));

        for (i, sample) in samples.enumerate() {
            if sample.image.dim() != (c, h, w) {
                return Err(TrainErr::Data(format!(
                    "sample {i} has shape {:?}, expected {:?}",
                    sample.image.dim(),
                    (c, h, w)
                )));
            }

            let (image, mask) = if flip.get(i).copied().unwrap_or(false) {
                mirrored(&sample.image, &sample.mask)
            } else {
                (sample.image.view(), sample.mask.view())
            };

            inputs.index_axis_mut(Axis(0), i).assign(&image);
            labels.index_axis_mut(Axis(0), i).assign(&mask);
        }

        Self::new(inputs, labels)
    }

    /// Returns the amount of samples in the batch.
    pub fn len(&self) -> usize {
        self.inputs.len_of(Axis(0))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `(C, H, W)`.
    pub fn sample_shape(&self) -> (usize, usize, usize) {
        let (_, c, h, w) = self.inputs.dim();
        (c, h, w)
    }
}

fn mirrored<'a>(
    image: &'a Array3<f32>,
    mask: &'a Array2<i32>,
) -> (ArrayView3<'a, f32>, ArrayView2<'a, i32>) {
    let mut image = image.view();
    let mut mask = mask.view();
    image.invert_axis(Axis(2));
    mask.invert_axis(Axis(1));
    (image, mask)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn sample(v: f32, label: i32) -> Sample {
        Sample::new(
            Array3::from_shape_fn((1, 1, 2), |(_, _, x)| v + x as f32),
            array![[label, label + 1]],
        )
        .unwrap()
    }

    #[test]
    fn stacking_keeps_sample_order() {
        let samples = [sample(0.0, 1), sample(10.0, 3)];
        let batch = Batch::stack(samples.iter(), &[]).unwrap();

        assert_eq!(batch.len(), 2);
        assert_eq!(batch.sample_shape(), (1, 1, 2));
        assert_eq!(batch.inputs[[1, 0, 0, 1]], 11.0);
        assert_eq!(batch.labels[[0, 0, 1]], 2);
    }

    #[test]
    fn flipped_samples_are_mirrored_with_their_mask() {
        let samples = [sample(0.0, 1), sample(10.0, 3)];
        let batch = Batch::stack(samples.iter(), &[false, true]).unwrap();

        assert_eq!(batch.inputs[[0, 0, 0, 0]], 0.0);
        assert_eq!(batch.inputs[[1, 0, 0, 0]], 11.0);
        assert_eq!(batch.labels[[1, 0, 0]], 4);
        assert_eq!(batch.labels[[1, 0, 1]], 3);
    }

    #[test]
    fn mismatched_labels_are_rejected() {
        let inputs = Array4::zeros((2, 3, 4, 4));
        let labels = Array3::zeros((2, 4, 5));
        assert!(matches!(Batch::new(inputs, labels), Err(TrainErr::Data(_))));
    }

    #[test]
    fn empty_batches_are_rejected() {
        let samples: [Sample; 0] = [];
        assert!(Batch::stack(samples.iter(), &[]).is_err());
    }
}
