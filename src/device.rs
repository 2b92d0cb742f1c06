use candle_core::Device;
use once_cell::sync::OnceCell;
use tracing::{info, warn};

use crate::config::DeviceConfig;
use crate::error::{Result, TrainError};

static DEVICE: OnceCell<Device> = OnceCell::new();

/// Selects the compute device for every tensor the agent builds.
///
/// Must run once at startup, before the agent is constructed. Calling it a
/// second time is an error; the device never changes during a process.
pub fn init(cfg: &DeviceConfig) -> Result<&'static Device> {
    let selected = if cfg.prefer_cuda {
        match Device::new_cuda(0) {
            Ok(device) => {
                info!("Successfully initialized CUDA device.");
                device
            }
            Err(err_cuda) => {
                warn!(
                    "Failed to initialize CUDA device: {:?}. Falling back to CPU.",
                    err_cuda
                );
                Device::Cpu
            }
        }
    } else {
        Device::Cpu
    };

    DEVICE
        .set(selected)
        .map_err(|_| TrainError::Device("device already initialized".to_string()))?;
    Ok(device())
}

/// The device chosen by [`init`], or CPU when `init` was never called.
pub fn device() -> &'static Device {
    DEVICE.get_or_init(|| Device::Cpu)
}
