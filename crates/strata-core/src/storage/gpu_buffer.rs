use crate::{
    gpu::{Align, BufferUsagesExt, Submission, WgpuDevice, MIN_STORAGE_BUFFER_SIZE},
    AllocError, Allocator, DeviceError, Location, MemoryBlock,
};

use wgpu::BufferUsages;

/// A block of device memory.
///
/// The underlying `wgpu::Buffer` is padded up to the copy alignment, so
/// `n_bytes` (the requested size) may be smaller than the buffer itself.
#[derive(Debug)]
pub struct RawGPUBuffer {
    inner: wgpu::Buffer,
    device: WgpuDevice,
    n_bytes: usize,
}

impl RawGPUBuffer {
    pub fn inner(&self) -> &wgpu::Buffer {
        &self.inner
    }

    pub fn device(&self) -> &WgpuDevice {
        &self.device
    }

    pub fn n_bytes(&self) -> usize {
        self.n_bytes
    }

    pub fn padded_size(&self) -> usize {
        self.inner.size() as usize
    }

    pub(crate) fn destroy(self) {
        self.inner.destroy();
    }

    /// Writes `bytes` at `offset`, blocking until the write has landed.
    ///
    /// Ranges that are not copy aligned are widened to the enclosing aligned
    /// window, which is read back first so neighbouring bytes survive.
    pub fn write(&self, offset: usize, bytes: &[u8]) -> Result<(), DeviceError> {
        if bytes.is_empty() {
            return Ok(());
        }
        let (start, end) = copy_window(offset, bytes.len());
        if start == offset && end == offset + bytes.len() {
            self.device
                .queue()
                .write_buffer(&self.inner, offset as u64, bytes);
        } else {
            let mut window = self.read_window(start, end)?;
            window[offset - start..offset - start + bytes.len()].copy_from_slice(bytes);
            self.device
                .queue()
                .write_buffer(&self.inner, start as u64, &window);
        }
        let index = self.device.queue().submit(None);
        Submission::new(self.device.clone(), index).wait();
        Ok(())
    }

    /// Reads `len` bytes starting at `offset`, blocking until they are on the host.
    pub fn read(&self, offset: usize, len: usize) -> Result<Vec<u8>, DeviceError> {
        if len == 0 {
            return Ok(vec![]);
        }
        let (start, end) = copy_window(offset, len);
        let window = self.read_window(start, end)?;
        Ok(window[offset - start..offset - start + len].to_vec())
    }

    fn read_window(&self, start: usize, end: usize) -> Result<Vec<u8>, DeviceError> {
        let size = (end - start) as u64;
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("strata-staging"),
            size,
            usage: BufferUsages::MAP_READ | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
        encoder.copy_buffer_to_buffer(&self.inner, start as u64, &staging, 0, size);
        let index = self.device.queue().submit(Some(encoder.finish()));

        let buffer_slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            // The receiver only goes away if the caller already bailed out.
            let _ = tx.send(result);
        });
        self.device
            .poll(wgpu::Maintain::WaitForSubmissionIndex(index));
        rx.recv().map_err(|_| DeviceError::TransferChannelClosed)??;

        let bytes = buffer_slice.get_mapped_range().to_vec();
        staging.unmap();
        staging.destroy();
        Ok(bytes)
    }

    /// Enqueues a copy of `len` bytes into `dst` without waiting for it.
    ///
    /// Offsets and length must be copy aligned.
    pub(crate) fn copy_to(
        &self,
        src_offset: usize,
        dst: &RawGPUBuffer,
        dst_offset: usize,
        len: usize,
    ) -> Submission {
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
        if len > 0 {
            encoder.copy_buffer_to_buffer(
                &self.inner,
                src_offset as u64,
                &dst.inner,
                dst_offset as u64,
                len as u64,
            );
        }
        let index = self.device.queue().submit(Some(encoder.finish()));
        Submission::new(self.device.clone(), index)
    }
}

/// Smallest copy aligned `[start, end)` containing `[offset, offset + len)`.
fn copy_window(offset: usize, len: usize) -> (usize, usize) {
    let start = offset - offset % usize::COPY_BUFFER_ALIGNMENT;
    let end = (offset + len).align_for_copy();
    (start, end)
}

impl Allocator for WgpuDevice {
    fn location(&self) -> Location {
        Location::Device
    }

    fn allocate(&self, n_bytes: usize) -> Result<MemoryBlock, AllocError> {
        let size = n_bytes.align_for_copy().max(MIN_STORAGE_BUFFER_SIZE);
        if size as u64 > self.limits().max_buffer_size {
            return Err(AllocError::OutOfMemory { n_bytes });
        }

        self.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let inner = self.create_buffer(&wgpu::BufferDescriptor {
            label: None,
            size: size as u64,
            usage: BufferUsages::standard(),
            mapped_at_creation: false,
        });
        if let Some(error) = pollster::block_on(self.pop_error_scope()) {
            log::error!("Device allocation of {} bytes failed: {}", size, error);
            inner.destroy();
            return Err(AllocError::OutOfMemory { n_bytes });
        }

        Ok(MemoryBlock::Device(RawGPUBuffer {
            inner,
            device: self.clone(),
            n_bytes,
        }))
    }

    fn free(&self, block: MemoryBlock) {
        match block {
            MemoryBlock::Device(raw) => raw.destroy(),
            host @ MemoryBlock::Host(_) => {
                log::error!("Device allocator was handed host memory, releasing on host");
                crate::HostAllocator.free(host);
            }
        }
    }
}
