mod cpu_buffer;
mod gpu_buffer;

pub use cpu_buffer::*;
pub use gpu_buffer::*;

use std::mem::ManuallyDrop;
use std::rc::Rc;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum AllocError {
    #[error("Out of memory while allocating {n_bytes} bytes")]
    OutOfMemory { n_bytes: usize },
    #[error("Invalid layout for allocation: {n_bytes} bytes aligned to {align}")]
    InvalidLayout { n_bytes: usize, align: usize },
    #[error("Shape element count overflows the address space")]
    ShapeOverflow,
}

/// Where a block of memory lives.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, strum_macros::Display)]
pub enum Location {
    Host,
    Device,
}

/// A raw allocation, as handed out by an [`Allocator`].
///
/// Blocks do not release themselves. Whoever holds one must hand it back to
/// the allocator that produced it, which [`Buffer`] does on drop.
#[derive(Debug)]
pub enum MemoryBlock {
    Host(RawCPUBuffer),
    Device(RawGPUBuffer),
}

impl MemoryBlock {
    pub fn location(&self) -> Location {
        match self {
            MemoryBlock::Host(_) => Location::Host,
            MemoryBlock::Device(_) => Location::Device,
        }
    }

    /// Usable size in bytes, as requested from the allocator.
    pub fn n_bytes(&self) -> usize {
        match self {
            MemoryBlock::Host(h) => h.n_bytes(),
            MemoryBlock::Device(d) => d.n_bytes(),
        }
    }

    pub fn try_host(&self) -> Result<&RawCPUBuffer, crate::DeviceError> {
        match self {
            MemoryBlock::Host(h) => Ok(h),
            MemoryBlock::Device(_) => Err(crate::DeviceError::DeviceMismatch(
                "CPU".to_string(),
                "GPU".to_string(),
            )),
        }
    }

    pub fn try_device(&self) -> Result<&RawGPUBuffer, crate::DeviceError> {
        match self {
            MemoryBlock::Device(d) => Ok(d),
            MemoryBlock::Host(_) => Err(crate::DeviceError::DeviceMismatch(
                "GPU".to_string(),
                "CPU".to_string(),
            )),
        }
    }
}

/// Storage strategy for array buffers.
///
/// An allocator hands out raw [`MemoryBlock`]s and takes them back in
/// [`Allocator::free`]. Arrays never call `free` themselves: [`Buffer::allocate`]
/// captures it when the block is created.
pub trait Allocator: Clone + 'static {
    fn location(&self) -> Location;

    fn allocate(&self, n_bytes: usize) -> Result<MemoryBlock, AllocError>;

    fn free(&self, block: MemoryBlock);
}

/// Unique identifier for buffers.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(usize);

impl std::fmt::Debug for BufferId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "B{}", self.0)
    }
}

impl BufferId {
    pub(crate) fn new() -> Self {
        // https://users.rust-lang.org/t/idiomatic-rust-way-to-generate-unique-id/33805
        use std::sync::atomic;
        static COUNTER: atomic::AtomicUsize = atomic::AtomicUsize::new(1);
        Self(COUNTER.fetch_add(1, atomic::Ordering::Relaxed))
    }
}

type Release = Box<dyn FnOnce(MemoryBlock)>;

/// An allocated block together with the function that frees it.
///
/// Shared between an array and all of its views through [`SharedBuffer`].
/// The block goes back to its allocator exactly once, when the last
/// reference drops.
pub struct Buffer {
    id: BufferId,
    block: ManuallyDrop<MemoryBlock>,
    release: Option<Release>,
}

pub type SharedBuffer = Rc<Buffer>;

impl Buffer {
    /// Allocates `n_bytes` from `allocator`, capturing its `free`.
    pub fn allocate<A: Allocator>(
        allocator: &A,
        n_bytes: usize,
    ) -> Result<SharedBuffer, AllocError> {
        let block = allocator.allocate(n_bytes)?;
        let owner = allocator.clone();
        let buffer = Self::from_block(block, Box::new(move |block| owner.free(block)));
        log::debug!(
            "Allocated {:?}: {} bytes on {}",
            buffer.id,
            n_bytes,
            buffer.location()
        );
        Ok(Rc::new(buffer))
    }

    /// Wraps an existing block. `release` runs once, when the buffer drops.
    pub fn from_block(block: MemoryBlock, release: Box<dyn FnOnce(MemoryBlock)>) -> Self {
        Self {
            id: BufferId::new(),
            block: ManuallyDrop::new(block),
            release: Some(release),
        }
    }

    pub fn id(&self) -> BufferId {
        self.id
    }

    pub fn block(&self) -> &MemoryBlock {
        &self.block
    }

    pub fn location(&self) -> Location {
        self.block().location()
    }

    pub fn n_bytes(&self) -> usize {
        self.block().n_bytes()
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("id", &self.id)
            .field("block", &*self.block)
            .finish()
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        // SAFETY: the block is never touched again after this point.
        let block = unsafe { ManuallyDrop::take(&mut self.block) };
        if let Some(release) = self.release.take() {
            log::debug!(
                "Releasing {:?}: {} bytes on {}",
                self.id,
                block.n_bytes(),
                block.location()
            );
            release(block);
        }
    }
}
