use crate::{RVec, SharedBuffer};

use super::WgpuDevice;

/// Work enqueued on a device that may still be running.
///
/// Device copies return as soon as they are submitted. Nothing they write is
/// visible to the host until [`Submission::wait`] (or
/// [`WgpuDevice::synchronize`]) returns. The buffers involved are held until
/// the submission is dropped.
#[must_use = "device work is asynchronous, call `wait` before reading its results"]
pub struct Submission {
    device: WgpuDevice,
    index: wgpu::SubmissionIndex,
    buffers: RVec<SharedBuffer>,
}

impl Submission {
    pub(crate) fn new(device: WgpuDevice, index: wgpu::SubmissionIndex) -> Self {
        Self {
            device,
            index,
            buffers: RVec::new(),
        }
    }

    pub(crate) fn retain(mut self, buffer: SharedBuffer) -> Self {
        self.buffers.push(buffer);
        self
    }

    pub fn device(&self) -> &WgpuDevice {
        &self.device
    }

    /// Blocks until this submission has completed on the device.
    pub fn wait(self) {
        log::debug!(
            "Waiting on submission touching {:?}",
            self.buffers.iter().map(|b| b.id()).collect::<Vec<_>>()
        );
        self.device
            .poll(wgpu::Maintain::WaitForSubmissionIndex(self.index));
    }
}

impl std::fmt::Debug for Submission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Submission")
            .field("device", &self.device)
            .field("buffers", &self.buffers.iter().map(|b| b.id()).collect::<Vec<_>>())
            .finish()
    }
}
