use std::fmt::{self, Display};

use crate::{
    data::Batch,
    error::{Result, TrainErr},
};

/// Where the numeric work of a run happens. Fixed once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Cpu,
    Accelerator(usize),
}

impl Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Accelerator(id) => write!(f, "accelerator:{id}"),
        }
    }
}

/// The compute backend a run is bound to.
///
/// Owns device selection and the transfer of batches onto the device; the
/// forward and backward passes belong to the model and the update step to the
/// optimizer.
pub trait Backend {
    /// Returns the amount of accelerators this backend can drive.
    fn accelerator_count(&self) -> usize;

    /// Binds the backend to `device` for the rest of the run.
    fn bind(&mut self, device: Device) -> Result<()>;

    /// Returns the device the backend is bound to.
    fn device(&self) -> Device;

    /// Moves a batch onto the bound device.
    ///
    /// # Returns
    /// A `Data` error if the batch can't be represented on the device.
    fn upload(&self, batch: Batch) -> Result<Batch>;
}

/// Resolves a `--gpu` style request against what a backend offers.
///
/// # Arguments
/// * `requested` - An accelerator index, or any negative value for the CPU.
/// * `backend` - The backend whose accelerators are considered.
///
/// # Returns
/// The selected device, or a `Device` error if the accelerator doesn't exist.
pub fn select_device<B: Backend + ?Sized>(requested: i32, backend: &B) -> Result<Device> {
    let Ok(id) = usize::try_from(requested) else {
        return Ok(Device::Cpu);
    };

    let available = backend.accelerator_count();
    if id >= available {
        return Err(TrainErr::Device {
            requested: id,
            available,
        });
    }

    Ok(Device::Accelerator(id))
}

/// Runs everything on the host, with `ndarray` doing the math.
#[derive(Debug, Default)]
pub struct CpuBackend;

impl CpuBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Backend for CpuBackend {
    fn accelerator_count(&self) -> usize {
        0
    }

    fn bind(&mut self, device: Device) -> Result<()> {
        match device {
            Device::Cpu => Ok(()),
            Device::Accelerator(id) => Err(TrainErr::Device {
                requested: id,
                available: 0,
            }),
        }
    }

    fn device(&self) -> Device {
        Device::Cpu
    }

    fn upload(&self, batch: Batch) -> Result<Batch> {
        if let Some(v) = batch.inputs.iter().find(|v| !v.is_finite()) {
            return Err(TrainErr::Data(format!("batch holds a non-finite input ({v})")));
        }

        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array3, Array4};

    struct TwoAccelerators;

    impl Backend for TwoAccelerators {
        fn accelerator_count(&self) -> usize {
            2
        }

        fn bind(&mut self, _device: Device) -> Result<()> {
            Ok(())
        }

        fn device(&self) -> Device {
            Device::Cpu
        }

        fn upload(&self, batch: Batch) -> Result<Batch> {
            Ok(batch)
        }
    }

    #[test]
    fn negative_ids_always_select_the_cpu() {
        assert_eq!(select_device(-1, &TwoAccelerators).unwrap(), Device::Cpu);
        assert_eq!(select_device(-7, &CpuBackend).unwrap(), Device::Cpu);
    }

    #[test]
    fn existing_accelerators_are_selected() {
        assert_eq!(
            select_device(1, &TwoAccelerators).unwrap(),
            Device::Accelerator(1)
        );
    }

    #[test]
    fn missing_accelerators_are_device_errors() {
        let err = select_device(2, &TwoAccelerators).unwrap_err();
        assert!(matches!(
            err,
            TrainErr::Device {
                requested: 2,
                available: 2
            }
        ));
        assert!(select_device(0, &CpuBackend).is_err());
    }

    #[test]
    fn cpu_backend_rejects_non_finite_inputs() {
        let mut inputs = Array4::zeros((1, 3, 2, 2));
        inputs[[0, 1, 1, 0]] = f32::NAN;
        let batch = Batch::new(inputs, Array3::zeros((1, 2, 2))).unwrap();

        assert!(matches!(CpuBackend.upload(batch), Err(TrainErr::Data(_))));
    }
}
