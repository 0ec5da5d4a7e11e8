use crate::{
    AllocError, Allocator, Buffer, DeviceError, HostAllocator, Location, MemoryBlock, RVec,
    RawCPUBuffer, RawGPUBuffer, Shape, SharedBuffer, Strides,
};

use std::ops::Range;
use std::rc::Rc;

#[derive(Debug, thiserror::Error)]
pub enum ArrayError {
    #[error("Invalid range {start}..{end} in dimension {dim}")]
    InvalidRange { dim: usize, start: usize, end: usize },
    #[error("Slice end {end} exceeds extent {extent} in dimension {dim}")]
    SliceOutOfBounds { dim: usize, end: usize, extent: usize },
    #[error("Index {index} out of bounds for extent {extent} in dimension {dim}")]
    IndexOutOfBounds {
        dim: usize,
        index: usize,
        extent: usize,
    },
    #[error("Expected {expected} dimensions, got {actual}")]
    RankMismatch { expected: usize, actual: usize },
    #[error("Item size mismatch, array holds {expected} byte items, got {actual}")]
    ItemSizeMismatch { expected: usize, actual: usize },
    #[error("Element at byte offset {offset} is not aligned to {align}")]
    Misaligned { offset: usize, align: usize },
    #[error("Byte size mismatch, destination has {dst} bytes, source has {src}")]
    ByteSizeMismatch { dst: usize, src: usize },
    #[error("Expected {expected} elements, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("Device memory must be contiguous for this operation")]
    NonContiguous,
    #[error("Array has no storage")]
    Unbound,
    #[error(transparent)]
    Alloc(#[from] AllocError),
    #[error(transparent)]
    Device(#[from] DeviceError),
}

/// # RawArray
///
/// An untyped, strided, N-dimensional array.
///
/// A `RawArray` is a view into a [`Buffer`]: the buffer is shared with every
/// clone and slice, and released when the last of them is dropped. Each
/// array carries its own shape, byte strides and byte offset into the buffer.
///
/// Strides are column-major, dimension 0 varies fastest. The item size is
/// fixed when the array is created.
///
/// Arrays are either *empty* (no buffer, zero dimensions) or *bound*.
#[derive(Clone)]
pub struct RawArray {
    item_size: usize,
    shape: Shape,
    strides: Strides,
    buffer: Option<SharedBuffer>,
    offset: usize,
}

impl Default for RawArray {
    fn default() -> Self {
        Self::new(1)
    }
}

impl std::fmt::Debug for RawArray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawArray")
            .field("item_size", &self.item_size)
            .field("shape", &self.shape)
            .field("strides", &self.strides)
            .field("buffer", &self.buffer.as_ref().map(|b| b.id()))
            .field("offset", &self.offset)
            .finish()
    }
}

impl RawArray {
    /// An empty array holding `item_size` byte items.
    pub fn new(item_size: usize) -> Self {
        Self {
            item_size,
            shape: Shape::default(),
            strides: Strides::default(),
            buffer: None,
            offset: 0,
        }
    }

    pub fn with_shape<A: Allocator>(
        item_size: usize,
        shape: impl Into<Shape>,
        allocator: &A,
    ) -> Result<Self, ArrayError> {
        let mut array = Self::new(item_size);
        array.set_size(shape, allocator)?;
        Ok(array)
    }

    /// Binds the array to a fresh allocation of `shape`.
    ///
    /// If the array is already bound with exactly this shape nothing happens,
    /// the data and address are kept. Otherwise a new buffer is allocated
    /// (zeroed on the host) and the reference to the old one is dropped.
    /// Other views of the old buffer keep it alive.
    pub fn set_size<A: Allocator>(
        &mut self,
        shape: impl Into<Shape>,
        allocator: &A,
    ) -> Result<(), ArrayError> {
        let shape = shape.into();
        if self.is_bound() && self.shape == shape {
            return Ok(());
        }

        let n_bytes = shape
            .checked_numel()
            .and_then(|numel| numel.checked_mul(self.item_size))
            .ok_or(AllocError::ShapeOverflow)?;
        let strides =
            Strides::packed(self.item_size, &shape).ok_or(AllocError::ShapeOverflow)?;
        let buffer = Buffer::allocate(allocator, n_bytes)?;

        self.shape = shape;
        self.strides = strides;
        self.buffer = Some(buffer);
        self.offset = 0;
        Ok(())
    }

    /// A view of the sub-range `ranges`, one range per dimension.
    ///
    /// The view shares this array's buffer and strides. Ranges are checked,
    /// never clamped or swapped.
    pub fn slice(&self, ranges: &[Range<usize>]) -> Result<RawArray, ArrayError> {
        self.check_rank(ranges.len())?;

        let mut shape = RVec::with_capacity(ranges.len());
        let mut offset = self.offset;
        for (dim, range) in ranges.iter().enumerate() {
            let extent = self.shape[dim];
            if range.start > range.end {
                return Err(ArrayError::InvalidRange {
                    dim,
                    start: range.start,
                    end: range.end,
                });
            }
            if range.end > extent {
                return Err(ArrayError::SliceOutOfBounds {
                    dim,
                    end: range.end,
                    extent,
                });
            }
            shape.push(range.end - range.start);
            // Only views without elements can saturate, and those never address memory.
            offset = offset.saturating_add(range.start.saturating_mul(self.strides[dim]));
        }

        Ok(RawArray {
            item_size: self.item_size,
            shape: shape.into(),
            strides: self.strides.clone(),
            buffer: self.buffer.clone(),
            offset,
        })
    }

    pub fn slice_1d(&self, from: usize, to: usize) -> Result<RawArray, ArrayError> {
        self.slice(&[from..to])
    }

    pub fn slice_2d(
        &self,
        from0: usize,
        from1: usize,
        to0: usize,
        to1: usize,
    ) -> Result<RawArray, ArrayError> {
        self.slice(&[from0..to0, from1..to1])
    }

    /// Copy-assignment: share `other`'s buffer and take its shape, strides and offset.
    ///
    /// The item size of an array never changes, so `other` must match it.
    pub fn assign(&mut self, other: &RawArray) -> Result<(), ArrayError> {
        if other.item_size != self.item_size {
            return Err(ArrayError::ItemSizeMismatch {
                expected: self.item_size,
                actual: other.item_size,
            });
        }
        self.shape = other.shape.clone();
        self.strides = other.strides.clone();
        self.buffer = other.buffer.clone();
        self.offset = other.offset;
        Ok(())
    }

    /// Move-assignment: hands over the buffer and leaves `self` empty.
    pub fn take(&mut self) -> RawArray {
        std::mem::replace(self, RawArray::new(self.item_size))
    }
}

impl RawArray {
    pub fn item_size(&self) -> usize {
        self.item_size
    }

    pub fn ndims(&self) -> usize {
        self.shape.ndims()
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Extent of dimension `dim`.
    pub fn size(&self, dim: usize) -> usize {
        self.shape[dim]
    }

    pub fn shape_at(&self, dim: usize) -> usize {
        self.size(dim)
    }

    /// Byte stride of dimension `dim`.
    pub fn stride(&self, dim: usize) -> usize {
        self.strides[dim]
    }

    pub fn strides(&self) -> &Strides {
        &self.strides
    }

    /// Total number of elements.
    pub fn numel(&self) -> usize {
        self.shape.numel()
    }

    pub fn byte_size(&self) -> usize {
        self.numel() * self.item_size
    }

    pub fn is_bound(&self) -> bool {
        self.buffer.is_some()
    }

    pub fn is_empty(&self) -> bool {
        !self.is_bound() || self.numel() == 0
    }

    /// Byte offset of element (0, .., 0) in the buffer.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn buffer(&self) -> Option<&SharedBuffer> {
        self.buffer.as_ref()
    }

    /// True if `other` is backed by the same allocation.
    pub fn shares_buffer(&self, other: &RawArray) -> bool {
        match (&self.buffer, &other.buffer) {
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub fn location(&self) -> Option<Location> {
        self.buffer.as_ref().map(|b| b.location())
    }

    /// True if the strides are the packed column-major strides of the shape.
    pub fn is_contiguous(&self) -> bool {
        Strides::packed(self.item_size, &self.shape).map_or(false, |packed| {
            packed
                .iter()
                .zip(self.strides.iter())
                .zip(self.shape.iter())
                .all(|((p, s), &extent)| extent <= 1 || p == s)
        })
    }

    /// Byte offset into the buffer of the element at `index`.
    pub fn byte_offset(&self, index: &[usize]) -> Result<usize, ArrayError> {
        self.check_rank(index.len())?;
        for (dim, &i) in index.iter().enumerate() {
            let extent = self.shape[dim];
            if i >= extent {
                return Err(ArrayError::IndexOutOfBounds {
                    dim,
                    index: i,
                    extent,
                });
            }
        }
        let offset = index
            .iter()
            .zip(self.strides.iter())
            .map(|(i, stride)| i * stride)
            .sum::<usize>();
        Ok(self.offset + offset)
    }

    /// Host address of element (0, .., 0).
    ///
    /// Null if the array is unbound or lives in device memory.
    pub fn as_ptr(&self) -> *const u8 {
        self.host_base()
            .map_or(std::ptr::null(), |base| base.wrapping_add(self.offset) as *const u8)
    }

    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.host_base()
            .map_or(std::ptr::null_mut(), |base| base.wrapping_add(self.offset))
    }

    fn host_base(&self) -> Option<*mut u8> {
        match self.buffer.as_deref().map(Buffer::block) {
            Some(MemoryBlock::Host(raw)) => Some(raw.as_ptr()),
            _ => None,
        }
    }

    fn check_rank(&self, actual: usize) -> Result<(), ArrayError> {
        if actual != self.ndims() {
            return Err(ArrayError::RankMismatch {
                expected: self.ndims(),
                actual,
            });
        }
        Ok(())
    }

    fn check_item<T>(&self) -> Result<(), ArrayError> {
        let actual = std::mem::size_of::<T>();
        if actual != self.item_size {
            return Err(ArrayError::ItemSizeMismatch {
                expected: self.item_size,
                actual,
            });
        }
        Ok(())
    }

    pub(crate) fn host_block(&self) -> Result<&RawCPUBuffer, ArrayError> {
        let buffer = self.buffer.as_ref().ok_or(ArrayError::Unbound)?;
        Ok(buffer.block().try_host()?)
    }

    pub(crate) fn device_block(&self) -> Result<&RawGPUBuffer, ArrayError> {
        let buffer = self.buffer.as_ref().ok_or(ArrayError::Unbound)?;
        Ok(buffer.block().try_device()?)
    }

    fn element_ptr<T>(&self, index: &[usize]) -> Result<*mut T, ArrayError> {
        self.check_item::<T>()?;
        let base = self.host_block()?.as_ptr();
        let offset = self.byte_offset(index)?;
        Ok(base.wrapping_add(offset).cast::<T>())
    }
}

/// Element access.
///
/// Only host memory is addressable, device arrays fail with
/// [`DeviceError::DeviceMismatch`].
impl RawArray {
    /// Reads the element at `index`.
    pub fn get<T: bytemuck::Pod>(&self, index: &[usize]) -> Result<T, ArrayError> {
        let ptr = self.element_ptr::<T>(index)?;
        // In bounds of a live host block, checked by `element_ptr`.
        Ok(unsafe { ptr.read_unaligned() })
    }

    /// Writes `value` to the element at `index`. Visible through every view
    /// sharing this buffer.
    pub fn set<T: bytemuck::Pod>(&mut self, index: &[usize], value: T) -> Result<(), ArrayError> {
        let ptr = self.element_ptr::<T>(index)?;
        unsafe { ptr.write_unaligned(value) };
        Ok(())
    }

    /// Reference to the element at `index`.
    ///
    /// # Safety
    ///
    /// Views share storage. No other array aliasing this buffer may write
    /// the element while the returned reference is alive.
    pub unsafe fn at<T: bytemuck::Pod>(&self, index: &[usize]) -> Result<&T, ArrayError> {
        let ptr = self.aligned_element_ptr::<T>(index)?;
        Ok(unsafe { &*ptr })
    }

    /// Mutable reference to the element at `index`.
    ///
    /// # Safety
    ///
    /// Views share storage. No other array aliasing this buffer may read or
    /// write the element while the returned reference is alive.
    pub unsafe fn at_mut<T: bytemuck::Pod>(
        &mut self,
        index: &[usize],
    ) -> Result<&mut T, ArrayError> {
        let ptr = self.aligned_element_ptr::<T>(index)?;
        Ok(unsafe { &mut *ptr })
    }

    fn aligned_element_ptr<T>(&self, index: &[usize]) -> Result<*mut T, ArrayError> {
        let ptr = self.element_ptr::<T>(index)?;
        let align = std::mem::align_of::<T>();
        if (ptr as usize) % align != 0 {
            return Err(ArrayError::Misaligned {
                offset: self.byte_offset(index)?,
                align,
            });
        }
        Ok(ptr)
    }

    /// Calls `f` with the byte offset of every element, in column-major order.
    fn for_each_offset(&self, mut f: impl FnMut(usize)) {
        let numel = self.numel();
        if numel == 0 {
            return;
        }
        let ndims = self.ndims();
        let mut index: RVec<usize> = RVec::from_elem(0, ndims);
        let mut offset = self.offset;
        for _ in 0..numel {
            f(offset);
            for dim in 0..ndims {
                index[dim] += 1;
                offset += self.strides[dim];
                if index[dim] < self.shape[dim] {
                    break;
                }
                offset -= index[dim] * self.strides[dim];
                index[dim] = 0;
            }
        }
    }

    /// The elements' bytes in column-major order.
    ///
    /// Device arrays must be contiguous and are downloaded, blocking.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ArrayError> {
        let location = self.location().ok_or(ArrayError::Unbound)?;
        // The offset of an empty view may lie past the end of its buffer.
        if self.byte_size() == 0 {
            return Ok(vec![]);
        }
        match location {
            Location::Host => {
                let base = self.host_block()?.as_ptr();
                let mut bytes = Vec::with_capacity(self.byte_size());
                if self.is_contiguous() {
                    let src = unsafe {
                        std::slice::from_raw_parts(base.add(self.offset), self.byte_size())
                    };
                    bytes.extend_from_slice(src);
                } else {
                    self.for_each_offset(|offset| {
                        let src = unsafe {
                            std::slice::from_raw_parts(base.add(offset), self.item_size)
                        };
                        bytes.extend_from_slice(src);
                    });
                }
                Ok(bytes)
            }
            Location::Device => {
                if !self.is_contiguous() {
                    return Err(ArrayError::NonContiguous);
                }
                Ok(self.device_block()?.read(self.offset, self.byte_size())?)
            }
        }
    }

    /// Overwrites the elements, in column-major order, with `bytes`.
    ///
    /// Device arrays must be contiguous and are uploaded, blocking.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), ArrayError> {
        let location = self.location().ok_or(ArrayError::Unbound)?;
        if bytes.len() != self.byte_size() {
            return Err(ArrayError::ByteSizeMismatch {
                dst: self.byte_size(),
                src: bytes.len(),
            });
        }
        if bytes.is_empty() {
            return Ok(());
        }
        match location {
            Location::Host => {
                let base = self.host_block()?.as_ptr();
                if self.is_contiguous() {
                    unsafe {
                        std::ptr::copy_nonoverlapping(
                            bytes.as_ptr(),
                            base.add(self.offset),
                            bytes.len(),
                        )
                    };
                } else {
                    let mut chunks = bytes.chunks_exact(self.item_size.max(1));
                    self.for_each_offset(|offset| {
                        if let Some(chunk) = chunks.next() {
                            unsafe {
                                std::ptr::copy_nonoverlapping(
                                    chunk.as_ptr(),
                                    base.add(offset),
                                    chunk.len(),
                                )
                            };
                        }
                    });
                }
                Ok(())
            }
            Location::Device => {
                if !self.is_contiguous() {
                    return Err(ArrayError::NonContiguous);
                }
                Ok(self.device_block()?.write(self.offset, bytes)?)
            }
        }
    }

    /// A packed copy of this array in a new buffer of the same kind of memory.
    pub fn deep_clone(&self) -> Result<RawArray, ArrayError> {
        match self.location() {
            None => Ok(RawArray::new(self.item_size)),
            Some(Location::Host) => {
                let mut copy = RawArray::with_shape(self.item_size, &self.shape, &HostAllocator)?;
                copy.write_bytes(&self.to_bytes()?)?;
                Ok(copy)
            }
            Some(Location::Device) => {
                let device = self.device_block()?.device().clone();
                let mut copy = RawArray::with_shape(self.item_size, &self.shape, &device)?;
                crate::copy(&mut copy, self)?;
                Ok(copy)
            }
        }
    }
}
