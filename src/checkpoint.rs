use std::{
    collections::HashMap,
    fs, io,
    path::{Path, PathBuf},
};

use log::{debug, info};
use safetensors::tensor::{Dtype, SafeTensors, TensorView};

use crate::{
    error::{Result, TrainErr},
    model::Model,
    optimization::Optimizer,
};

/// Checkpoints are written every this many epochs.
pub const CHECKPOINT_INTERVAL: usize = 10;

/// Whether a checkpoint is due after `epoch` (1-based) completes.
pub fn is_checkpoint_epoch(epoch: usize) -> bool {
    epoch > 0 && epoch % CHECKPOINT_INTERVAL == 0
}

/// Persists model parameters and optimizer state at the end of an epoch.
pub trait CheckpointSink {
    fn save(&mut self, epoch: usize, model: &dyn Model, optimizer: &dyn Optimizer) -> Result<()>;
}

/// Writes `humanpartsnet_epoch{N}.model` and `humanpartsnet_epoch{N}.state`
/// safetensors files into a directory.
#[derive(Debug, Clone)]
pub struct FileCheckpointer {
    dir: PathBuf,
}

impl FileCheckpointer {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn model_path(&self, epoch: usize) -> PathBuf {
        self.dir.join(format!("humanpartsnet_epoch{epoch}.model"))
    }

    pub fn state_path(&self, epoch: usize) -> PathBuf {
        self.dir.join(format!("humanpartsnet_epoch{epoch}.state"))
    }
}

impl CheckpointSink for FileCheckpointer {
    fn save(&mut self, epoch: usize, model: &dyn Model, optimizer: &dyn Optimizer) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|e| TrainErr::io(&self.dir, e))?;

        let model_path = self.model_path(epoch);
        let bytes = encode_model(model, epoch).map_err(|e| invalid(&model_path, e))?;
        fs::write(&model_path, bytes).map_err(|e| TrainErr::io(&model_path, e))?;

        let state_path = self.state_path(epoch);
        let bytes = encode_state(optimizer, epoch).map_err(|e| invalid(&state_path, e))?;
        fs::write(&state_path, bytes).map_err(|e| TrainErr::io(&state_path, e))?;

        info!(
            "saved checkpoint {} and {}",
            model_path.display(),
            state_path.display()
        );
        Ok(())
    }
}

fn invalid(path: &Path, reason: String) -> TrainErr {
    TrainErr::io(path, io::Error::new(io::ErrorKind::InvalidData, reason))
}

/// Serializes the model parameters, one tensor per entry of its layout.
fn encode_model(model: &dyn Model, epoch: usize) -> std::result::Result<Vec<u8>, String> {
    let layout = model.layout();
    let params = model.params();

    let total: usize = layout.iter().map(|spec| spec.numel()).sum();
    if total != params.len() {
        return Err(format!(
            "layout describes {total} parameters but the model holds {}",
            params.len()
        ));
    }

    let mut offset = 0;
    let mut views = Vec::with_capacity(layout.len());
    for spec in &layout {
        let chunk = &params[offset..offset + spec.numel()];
        offset += spec.numel();

        let view = TensorView::new(Dtype::F32, spec.shape.clone(), bytemuck::cast_slice(chunk))
            .map_err(|e| e.to_string())?;
        views.push((spec.name.as_str(), view));
    }

    let metadata = HashMap::from([("epoch".to_string(), epoch.to_string())]);
    safetensors::serialize(views, &Some(metadata)).map_err(|e| e.to_string())
}

/// Serializes every internal buffer of the optimizer as a flat tensor.
fn encode_state(optimizer: &dyn Optimizer, epoch: usize) -> std::result::Result<Vec<u8>, String> {
    let state = optimizer.state();
    let views = state
        .iter()
        .map(|tensor| {
            let view = TensorView::new(
                Dtype::F32,
                vec![tensor.data.len()],
                bytemuck::cast_slice::<f32, u8>(&tensor.data),
            )
            .map_err(|e| e.to_string())?;
            Ok((tensor.name, view))
        })
        .collect::<std::result::Result<Vec<_>, String>>()?;

    let metadata = HashMap::from([
        ("epoch".to_string(), epoch.to_string()),
        ("optimizer".to_string(), optimizer.name().to_string()),
    ]);
    safetensors::serialize(views, &Some(metadata)).map_err(|e| e.to_string())
}

/// Loads pretrained parameters from a `.model` file into `model`.
///
/// Every tensor of the model's layout must be present with the same shape
/// and an `F32` dtype. Nothing is written into the model unless all of them
/// check out.
///
/// # Returns
/// A `Load` error naming `path` if the file is missing, unreadable or
/// incompatible with the model.
pub fn load_pretrained(path: &Path, model: &mut dyn Model) -> Result<()> {
    let bytes = fs::read(path).map_err(|e| TrainErr::load(path, e))?;
    let tensors = SafeTensors::deserialize(&bytes).map_err(|e| TrainErr::load(path, e))?;

    let mut loaded = vec![0f32; model.size()];
    let mut offset = 0;

    for spec in model.layout() {
        let view = tensors
            .tensor(&spec.name)
            .map_err(|_| TrainErr::load(path, format!("missing tensor {}", spec.name)))?;

        if view.dtype() != Dtype::F32 {
            return Err(TrainErr::load(
                path,
                format!("tensor {} is {:?}, expected F32", spec.name, view.dtype()),
            ));
        }

        if view.shape() != spec.shape.as_slice() {
            return Err(TrainErr::load(
                path,
                format!(
                    "tensor {} has shape {:?}, expected {:?}",
                    spec.name,
                    view.shape(),
                    spec.shape
                ),
            ));
        }

        let end = offset + spec.numel();
        let Some(dst) = loaded.get_mut(offset..end) else {
            return Err(TrainErr::load(path, "layout exceeds the model size"));
        };
        bytemuck::cast_slice_mut(dst).copy_from_slice(view.data());
        offset = end;
    }

    if offset != loaded.len() {
        return Err(TrainErr::load(
            path,
            format!("layout covers {offset} of {} parameters", loaded.len()),
        ));
    }

    model.params_mut().copy_from_slice(&loaded);
    debug!("loaded {} parameters from {}", loaded.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{model::PartsNet, optimization::MomentumSgd};
    use rand::{rngs::StdRng, SeedableRng};

    fn net(seed: u64, hidden: usize) -> PartsNet {
        PartsNet::with_shape(3, hidden, 4, 0.0, StdRng::seed_from_u64(seed)).unwrap()
    }

    #[test]
    fn checkpoints_fall_on_every_tenth_epoch() {
        let due: Vec<_> = (1..=25).filter(|&e| is_checkpoint_epoch(e)).collect();
        assert_eq!(due, vec![10, 20]);
        assert!(!is_checkpoint_epoch(0));
    }

    #[test]
    fn saved_models_load_back_into_a_fresh_network() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = FileCheckpointer::new(dir.path());
        let saved = net(1, 5);
        let optimizer = MomentumSgd::new(saved.size(), 0.1, 0.9);

        sink.save(10, &saved, &optimizer).unwrap();
        assert!(sink.model_path(10).ends_with("humanpartsnet_epoch10.model"));
        assert!(sink.state_path(10).exists());

        let mut fresh = net(2, 5);
        assert_ne!(fresh.params(), saved.params());
        load_pretrained(&sink.model_path(10), &mut fresh).unwrap();
        assert_eq!(fresh.params(), saved.params());
    }

    #[test]
    fn state_files_hold_the_optimizer_buffers() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = FileCheckpointer::new(dir.path());
        let model = net(1, 5);
        let optimizer = MomentumSgd::new(model.size(), 0.1, 0.9);

        sink.save(20, &model, &optimizer).unwrap();

        let bytes = fs::read(sink.state_path(20)).unwrap();
        let tensors = SafeTensors::deserialize(&bytes).unwrap();
        let velocity = tensors.tensor("velocity").unwrap();
        assert_eq!(velocity.shape(), &[model.size()]);
    }

    #[test]
    fn missing_files_are_load_errors() {
        let dir = tempfile::tempdir().unwrap();
        let mut model = net(1, 5);

        let err = load_pretrained(&dir.path().join("nope.model"), &mut model).unwrap_err();
        assert!(matches!(err, TrainErr::Load { .. }));
    }

    #[test]
    fn shape_mismatches_are_load_errors_and_leave_params_alone() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = FileCheckpointer::new(dir.path());
        let wide = net(1, 6);
        let optimizer = MomentumSgd::new(wide.size(), 0.1, 0.9);
        sink.save(10, &wide, &optimizer).unwrap();

        let mut narrow = net(2, 5);
        let before = narrow.params().to_vec();
        let err = load_pretrained(&sink.model_path(10), &mut narrow).unwrap_err();

        assert!(matches!(err, TrainErr::Load { .. }));
        assert_eq!(narrow.params(), before.as_slice());
    }

    #[test]
    fn garbage_files_are_load_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.model");
        fs::write(&path, b"not a checkpoint").unwrap();

        let mut model = net(1, 5);
        assert!(matches!(
            load_pretrained(&path, &mut model),
            Err(TrainErr::Load { .. })
        ));
    }
}
