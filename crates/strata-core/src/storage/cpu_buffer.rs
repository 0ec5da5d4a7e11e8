use crate::{AllocError, Allocator, Location, MemoryBlock};

use std::{alloc::Layout, ptr::NonNull};

/// Alignment of every host allocation.
///
/// Large enough for any [`crate::ArrayDType`], so views whose offset is a
/// multiple of the item size stay aligned.
pub const HOST_ALIGNMENT: usize = 16;

/// A block of host memory. Does not free itself, see [`HostAllocator::free`].
#[derive(Debug, PartialEq, Eq)]
pub struct RawCPUBuffer(NonNull<u8>, Layout);

impl RawCPUBuffer {
    pub fn as_ptr(&self) -> *mut u8 {
        self.0.as_ptr()
    }

    pub fn n_bytes(&self) -> usize {
        self.1.size()
    }

    /// Zero-initialized allocation of `size` bytes.
    ///
    /// Zero-sized requests get a dangling, well-aligned pointer that is never
    /// dereferenced or deallocated.
    pub fn zeroed(size: usize, alignment: usize) -> Result<Self, AllocError> {
        let layout =
            Layout::from_size_align(size, alignment).map_err(|_| AllocError::InvalidLayout {
                n_bytes: size,
                align: alignment,
            })?;
        if size == 0 {
            // `alignment` is a valid non-zero power of two, checked by the layout above.
            let dangling = unsafe { NonNull::new_unchecked(alignment as *mut u8) };
            return Ok(Self(dangling, layout));
        }
        let ptr = unsafe { std::alloc::alloc_zeroed(layout) };
        NonNull::new(ptr)
            .map(|ptr| Self(ptr, layout))
            .ok_or(AllocError::OutOfMemory { n_bytes: size })
    }

    /// # Safety
    ///
    /// Must be called once, with a buffer produced by [`RawCPUBuffer::zeroed`].
    unsafe fn dealloc(self) {
        if self.1.size() > 0 {
            unsafe { std::alloc::dealloc(self.0.as_ptr(), self.1) }
        }
    }
}

/// Allocator for ordinary process memory.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HostAllocator;

impl Allocator for HostAllocator {
    fn location(&self) -> Location {
        Location::Host
    }

    fn allocate(&self, n_bytes: usize) -> Result<MemoryBlock, AllocError> {
        RawCPUBuffer::zeroed(n_bytes, HOST_ALIGNMENT).map(MemoryBlock::Host)
    }

    fn free(&self, block: MemoryBlock) {
        match block {
            MemoryBlock::Host(raw) => unsafe { raw.dealloc() },
            MemoryBlock::Device(raw) => {
                log::error!("Host allocator was handed device memory, releasing on device");
                raw.destroy();
            }
        }
    }
}
