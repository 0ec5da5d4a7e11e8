use crate::gpu::WgpuDevice;
use crate::{AllocError, Allocator, HostAllocator, Location, MemoryBlock};

#[derive(Clone, Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("Failed to acquire device with error: {0:?}")]
    DeviceAcquisitionFailed(#[from] wgpu::RequestDeviceError),
    #[error("Failed to request a GPU adapter. Check that a Vulkan, Metal or DX12 driver is available, or unset STRATA_DISABLE_GPU")]
    AdapterRequestFailed,
    #[error("Device mismatch, requested device: {0:?}, actual device: {1:?}")]
    DeviceMismatch(String, String),
    #[error("Failed to allocate buffer with error: {0:?}")]
    BufferAllocationFailed(#[from] AllocError),
    #[error("Failed to transfer buffer with error: {0:?}")]
    BufferTransferFailed(#[from] wgpu::BufferAsyncError),
    #[error("Transfer result channel closed before the device answered")]
    TransferChannelClosed,
}

pub enum DeviceRequest {
    CPU,
    GPU,
}

/// Runtime choice between host and device memory.
///
/// Allocating through a `Device` dispatches to [`HostAllocator`] or to the
/// wrapped [`WgpuDevice`].
#[derive(Clone, Default, PartialEq)]
pub enum Device {
    #[default]
    CPU,
    GPU(WgpuDevice),
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Device::CPU => write!(f, "CPU"),
            Device::GPU(gpu) => write!(f, "GPU:{}", gpu.ordinal()),
        }
    }
}

impl Device {
    pub fn is_cpu(&self) -> bool {
        matches!(self, Device::CPU)
    }

    pub fn is_gpu(&self) -> bool {
        matches!(self, Device::GPU(_))
    }

    pub fn request_device(request: DeviceRequest) -> Result<Self, DeviceError> {
        match request {
            DeviceRequest::CPU => Ok(Device::CPU),
            DeviceRequest::GPU => {
                if std::env::var("STRATA_DISABLE_GPU").is_ok() {
                    log::warn!("STRATA_DISABLE_GPU is set, refusing GPU request");
                    return Err(DeviceError::AdapterRequestFailed);
                }
                Ok(Device::GPU(pollster::block_on(async {
                    WgpuDevice::new().await
                })?))
            }
        }
    }

    pub fn try_gpu(&self) -> Result<&WgpuDevice, DeviceError> {
        match self {
            Device::GPU(gpu) => Ok(gpu),
            Device::CPU => Err(DeviceError::DeviceMismatch(
                "GPU".to_string(),
                "CPU".to_string(),
            )),
        }
    }

    /// Blocks until outstanding device work has finished. No-op on the CPU.
    pub fn synchronize(&self) {
        if let Device::GPU(gpu) = self {
            gpu.synchronize();
        }
    }
}

impl Allocator for Device {
    fn location(&self) -> Location {
        match self {
            Device::CPU => HostAllocator.location(),
            Device::GPU(gpu) => gpu.location(),
        }
    }

    fn allocate(&self, n_bytes: usize) -> Result<MemoryBlock, AllocError> {
        match self {
            Device::CPU => HostAllocator.allocate(n_bytes),
            Device::GPU(gpu) => gpu.allocate(n_bytes),
        }
    }

    fn free(&self, block: MemoryBlock) {
        match self {
            Device::CPU => HostAllocator.free(block),
            Device::GPU(gpu) => gpu.free(block),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_request() -> anyhow::Result<()> {
        let device = Device::request_device(DeviceRequest::CPU)?;
        assert!(device.is_cpu());
        assert_eq!(device.location(), Location::Host);
        assert!(device.try_gpu().is_err());
        device.synchronize();
        Ok(())
    }

    #[test]
    fn test_cpu_device_allocates_on_host() -> anyhow::Result<()> {
        let block = Device::CPU.allocate(12)?;
        assert_eq!(block.location(), Location::Host);
        Device::CPU.free(block);
        Ok(())
    }
}
