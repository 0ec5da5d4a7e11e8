use std::sync::Arc;
use wgpu::{Adapter, DeviceType, Limits};

use crate::DeviceError;

pub const MAX_BUFFER_SIZE: u64 = (2 << 29) - 1;

/// # Device
///
/// A device is a handle to a physical GPU.
/// It is used to allocate device memory and to submit copies to the GPU.
///
/// Currently, WebGPU doesn't support multiple devices.
/// Ordinal should always be 0.
#[derive(Clone)]
pub struct WgpuDevice {
    ordinal: u32,
    device_info: DeviceInfo,
    device_limits: Limits,
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
}

impl std::ops::Deref for WgpuDevice {
    type Target = wgpu::Device;

    fn deref(&self) -> &Self::Target {
        &self.device
    }
}

impl std::fmt::Debug for WgpuDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "wgpu:{}", self.ordinal)
    }
}

impl PartialEq for WgpuDevice {
    fn eq(&self, other: &Self) -> bool {
        self.ordinal == other.ordinal && Arc::ptr_eq(&self.device, &other.device)
    }
}

impl WgpuDevice {
    pub async fn new() -> Result<Self, DeviceError> {
        let adapter = Self::select_adapter()?;
        log::info!("Adapter: {:?}", adapter.get_info());
        log::info!("Active GPU: {}", adapter.get_info().name);

        let mut device_descriptor = wgpu::DeviceDescriptor {
            label: Some("Strata"),
            required_features: wgpu::Features::default(),
            required_limits: Limits {
                max_buffer_size: MAX_BUFFER_SIZE,
                max_storage_buffer_binding_size: MAX_BUFFER_SIZE as u32,
                ..Default::default()
            },
            memory_hints: wgpu::MemoryHints::default(),
        };
        let device_request = adapter.request_device(&device_descriptor, None).await;
        let (device, queue) = if let Err(e) = device_request {
            log::error!("Failed to acq. device, trying with reduced limits: {:?}", e);
            device_descriptor.required_limits = adapter.limits();
            adapter.request_device(&device_descriptor, None).await
        } else {
            device_request
        }?;
        log::info!("Device: {:?}", device.limits());

        Ok(Self {
            ordinal: 0,
            device_info: adapter.get_info().into(),
            device_limits: device.limits(),
            queue: Arc::new(queue),
            device: Arc::new(device),
        })
    }

    pub(crate) fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn ordinal(&self) -> u32 {
        self.ordinal
    }

    fn select_adapter() -> Result<Adapter, DeviceError> {
        let backends = wgpu::util::backend_bits_from_env().unwrap_or(wgpu::Backends::PRIMARY);
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends,
            dx12_shader_compiler: wgpu::util::dx12_shader_compiler_from_env().unwrap_or_default(),
            ..Default::default()
        });
        let fallback_only = std::env::var("STRATA_FORCE_FALLBACK_ADAPTER").is_ok();
        if fallback_only {
            log::warn!("Restricting adapter selection to software adapters");
        }
        let adapter = instance
            .enumerate_adapters(backends)
            .into_iter()
            .filter(|adapter| !fallback_only || adapter.get_info().device_type == DeviceType::Cpu)
            .max_by_key(|adapter| match adapter.get_info().device_type {
                DeviceType::DiscreteGpu => 5,
                DeviceType::Other => 4,
                DeviceType::IntegratedGpu => 3,
                DeviceType::VirtualGpu => 2,
                DeviceType::Cpu => 1,
            })
            .ok_or(DeviceError::AdapterRequestFailed)?;
        Ok(adapter)
    }

    pub fn limits(&self) -> &Limits {
        &self.device_limits
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.device_info
    }

    /// Blocks until all work submitted to this device has completed.
    ///
    /// Device copies that were never waited on are visible to the host once
    /// this returns, see [`super::Submission::wait`] for a single submission.
    pub fn synchronize(&self) {
        self.device.poll(wgpu::Maintain::Wait);
    }
}

#[derive(Clone, Debug)]
pub struct DeviceInfo {
    pub name: String,
    pub vendor: u32,
    pub device: u32,
    pub device_type: wgpu::DeviceType,
    pub driver: String,
    pub driver_info: String,
    pub backend: wgpu::Backend,
}

impl From<wgpu::AdapterInfo> for DeviceInfo {
    fn from(info: wgpu::AdapterInfo) -> Self {
        DeviceInfo {
            name: info.name,
            vendor: info.vendor,
            device: info.device,
            device_type: info.device_type,
            driver: info.driver,
            driver_info: info.driver_info,
            backend: info.backend,
        }
    }
}
