use log::debug;

use crate::{
    data::BatchSource,
    device::Backend,
    error::Result,
    metrics::{EpochMetrics, MetricAccumulator},
    mode::Mode,
    model::Model,
    optimization::Optimizer,
};

/// Runs one training pass over the loader's training split.
///
/// Every batch is uploaded to the bound device, forwarded in `Mode::Train`,
/// backpropagated and followed by exactly one optimizer step.
///
/// # Arguments
/// * `model` - The model to train, its parameters get updated in place.
/// * `optimizer` - The update rule applied after every batch.
/// * `source` - Where the training batches come from.
/// * `backend` - The device batches are moved onto.
///
/// # Returns
/// The sample-weighted mean loss and accuracy of the pass, or the first
/// error any step produced.
pub fn train_epoch<M, S, B>(
    model: &mut M,
    optimizer: &mut dyn Optimizer,
    source: &mut S,
    backend: &B,
) -> Result<EpochMetrics>
where
    M: Model + ?Sized,
    S: BatchSource + ?Sized,
    B: Backend + ?Sized,
{
    let datasize = source.datasize(Mode::Train);
    let mut acc = MetricAccumulator::new();

    for batch in source.batches(Mode::Train) {
        let batch = backend.upload(batch?)?;
        let out = model.forward(&batch, Mode::Train)?;
        model.backward()?;

        let (params, grad) = model.params_and_grad();
        optimizer.update_params(grad, params)?;

        acc.accumulate(f64::from(out.loss), f64::from(out.accuracy), batch.len());
        debug!(
            "train batch {}: loss {:.6}, accuracy {:.6}",
            acc.batches(),
            out.loss,
            out.accuracy
        );
    }

    acc.finalize(datasize)
}

/// Runs one evaluation pass over the loader's test split.
///
/// Nothing is written to the model: no gradient, no parameter update and
/// no stochastic regularization.
///
/// # Returns
/// The sample-weighted mean loss and accuracy of the pass, or a `Data` error
/// if the test split is empty.
pub fn evaluate_epoch<M, S, B>(model: &mut M, source: &mut S, backend: &B) -> Result<EpochMetrics>
where
    M: Model + ?Sized,
    S: BatchSource + ?Sized,
    B: Backend + ?Sized,
{
    let datasize = source.datasize(Mode::Eval);
    let mut acc = MetricAccumulator::new();

    for batch in source.batches(Mode::Eval) {
        let batch = backend.upload(batch?)?;
        let out = model.forward(&batch, Mode::Eval)?;

        acc.accumulate(f64::from(out.loss), f64::from(out.accuracy), batch.len());
        debug!(
            "test batch {}: loss {:.6}, accuracy {:.6}",
            acc.batches(),
            out.loss,
            out.accuracy
        );
    }

    acc.finalize(datasize)
}
