use serde::Serialize;

use crate::error::{Result, TrainErr};

/// The per-epoch means produced by one pass over a dataset split.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct EpochMetrics {
    pub loss: f64,
    pub accuracy: f64,
}

/// Running, batch-size weighted sums of loss and accuracy.
///
/// Each batch contributes `value * batch_size`, so the finalized means are
/// weighted by how many samples every batch actually held (the last batch of
/// an epoch is usually smaller).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MetricAccumulator {
    total_loss: f64,
    total_accuracy: f64,
    samples: usize,
    batches: usize,
}

impl MetricAccumulator {
    /// Creates an empty `MetricAccumulator`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one batch worth of metrics to the running totals.
    ///
    /// # Arguments
    /// * `batch_loss` - The mean loss over the batch.
    /// * `batch_accuracy` - The mean accuracy over the batch.
    /// * `batch_size` - The amount of samples in the batch.
    pub fn accumulate(&mut self, batch_loss: f64, batch_accuracy: f64, batch_size: usize) {
        let weight = batch_size as f64;
        self.total_loss += batch_loss * weight;
        self.total_accuracy += batch_accuracy * weight;
        self.samples += batch_size;
        self.batches += 1;
    }

    /// Converts the running totals into per-sample means.
    ///
    /// # Arguments
    /// * `dataset_size` - The size of the split the totals were gathered on.
    ///
    /// # Returns
    /// The epoch means, or a `Data` error if `dataset_size` is zero.
    pub fn finalize(&self, dataset_size: usize) -> Result<EpochMetrics> {
        if dataset_size == 0 {
            return Err(TrainErr::Data(
                "cannot compute epoch means over an empty dataset split".into(),
            ));
        }

        let n = dataset_size as f64;
        Ok(EpochMetrics {
            loss: self.total_loss / n,
            accuracy: self.total_accuracy / n,
        })
    }

    /// Returns the amount of samples accumulated so far.
    pub fn samples(&self) -> usize {
        self.samples
    }

    /// Returns the amount of batches accumulated so far.
    pub fn batches(&self) -> usize {
        self.batches
    }
}

/// The append-only history of epoch means for a whole run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricSeries {
    train_loss: Vec<f64>,
    train_accuracy: Vec<f64>,
    test_loss: Vec<f64>,
    test_accuracy: Vec<f64>,
}

impl MetricSeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the results of one finished epoch.
    ///
    /// # Arguments
    /// * `train` - The means of the training pass.
    /// * `test` - The means of the evaluation pass.
    pub fn push(&mut self, train: EpochMetrics, test: EpochMetrics) {
        self.train_loss.push(train.loss);
        self.train_accuracy.push(train.accuracy);
        self.test_loss.push(test.loss);
        self.test_accuracy.push(test.accuracy);
    }

    /// Returns the amount of epochs recorded.
    pub fn len(&self) -> usize {
        self.train_loss.len()
    }

    pub fn is_empty(&self) -> bool {
        self.train_loss.is_empty()
    }

    pub fn train_loss(&self) -> &[f64] {
        &self.train_loss
    }

    pub fn train_accuracy(&self) -> &[f64] {
        &self.train_accuracy
    }

    pub fn test_loss(&self) -> &[f64] {
        &self.test_loss
    }

    pub fn test_accuracy(&self) -> &[f64] {
        &self.test_accuracy
    }

    /// Returns the `(train, test)` means of the most recent epoch.
    pub fn last(&self) -> Option<(EpochMetrics, EpochMetrics)> {
        let i = self.len().checked_sub(1)?;
        let train = EpochMetrics {
            loss: self.train_loss[i],
            accuracy: self.train_accuracy[i],
        };
        let test = EpochMetrics {
            loss: self.test_loss[i],
            accuracy: self.test_accuracy[i],
        };

        Some((train, test))
    }
}
