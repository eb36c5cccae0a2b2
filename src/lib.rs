//! Composable layer stacks and unrolled recurrent engines over Candle tensors.
//!
//! Re-exports the three workspace crates and provides device selection for
//! callers that do not want to pick a backend themselves.

pub use layers;
pub use model;
pub use recurrent;

pub use layers::{LayerError, Parameters, Result};
pub use model::Sequential;
pub use recurrent::{LstmNetwork, LstmState, RecurrentNetwork};

use candle_core::Device;

/// Picks a CUDA device when one is available, otherwise the CPU.
///
/// Setting `STACKGRAD_FORCE_CPU` skips accelerator detection.
pub fn setup_device() -> Result<Device> {
    select_device(std::env::var_os("STACKGRAD_FORCE_CPU").is_some())
}

/// Device selection without consulting the environment.
pub fn select_device(force_cpu: bool) -> Result<Device> {
    if force_cpu {
        log::info!("CPU backend forced");
        return Ok(Device::Cpu);
    }
    match Device::cuda_if_available(0) {
        Ok(device) if device.is_cuda() => {
            log::info!("CUDA device selected: {device:?}");
            Ok(device)
        }
        Ok(_) => {
            log::info!("using CPU backend");
            Ok(Device::Cpu)
        }
        Err(err) => {
            log::warn!("CUDA detection failed ({err}), using CPU backend");
            Ok(Device::Cpu)
        }
    }
}
