mod align;
mod device;
mod submission;

pub use align::*;
pub use device::*;
pub use submission::*;

pub const MIN_STORAGE_BUFFER_SIZE: usize = 16;

/// Usages we use everywhere
pub trait BufferUsagesExt {
    fn standard() -> Self;
}

impl BufferUsagesExt for wgpu::BufferUsages {
    fn standard() -> Self {
        Self::COPY_DST | Self::COPY_SRC | Self::STORAGE
    }
}
