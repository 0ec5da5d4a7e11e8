use crate::{Allocator, ArrayDType, ArrayError, Location, RVec, RawArray, Shape};

use num_traits::Zero;

use std::marker::PhantomData;
use std::ops::Range;

/// A strided N-dimensional array of `T`.
///
/// A thin typed layer over [`RawArray`], the item size is `size_of::<T>()`.
/// Every read-only query of the core is available through `Deref`.
///
/// ```
/// # fn main() -> anyhow::Result<()> {
/// use strata::prelude::*;
///
/// let a = Array::<i32>::from_slice(&[10, 20, 30, 40, 50], [5], &HostAllocator)?;
/// let mut view = a.slice_1d(1, 4)?;
/// assert_eq!(view.to_vec()?, vec![20, 30, 40]);
///
/// view.set(&[0], 99)?;
/// assert_eq!(a.to_vec()?, vec![10, 99, 30, 40, 50]);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Array<T: ArrayDType> {
    raw: RawArray,
    _marker: PhantomData<T>,
}

impl<T: ArrayDType> Default for Array<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ArrayDType> std::ops::Deref for Array<T> {
    type Target = RawArray;

    fn deref(&self) -> &Self::Target {
        &self.raw
    }
}

impl<T: ArrayDType> Array<T> {
    pub fn new() -> Self {
        Self::from_raw_unchecked(RawArray::new(std::mem::size_of::<T>()))
    }

    fn from_raw_unchecked(raw: RawArray) -> Self {
        Self {
            raw,
            _marker: PhantomData,
        }
    }

    pub fn with_shape<A: Allocator>(
        shape: impl Into<Shape>,
        allocator: &A,
    ) -> Result<Self, ArrayError> {
        let mut array = Self::new();
        array.set_size(shape, allocator)?;
        Ok(array)
    }

    pub fn set_size<A: Allocator>(
        &mut self,
        shape: impl Into<Shape>,
        allocator: &A,
    ) -> Result<(), ArrayError> {
        self.raw.set_size(shape, allocator)
    }

    /// A new array with every element set to `value`.
    ///
    /// Fresh allocations are zeroed on the host and zero-initialised by wgpu
    /// on the device, so a zero `value` writes nothing.
    pub fn full<A: Allocator>(
        value: T,
        shape: impl Into<Shape>,
        allocator: &A,
    ) -> Result<Self, ArrayError> {
        let mut array = Self::with_shape(shape, allocator)?;
        if !value.is_zero() {
            let data = vec![value; array.numel()];
            array.raw.write_bytes(bytemuck::cast_slice(&data))?;
        }
        Ok(array)
    }

    pub fn zeros<A: Allocator>(shape: impl Into<Shape>, allocator: &A) -> Result<Self, ArrayError> {
        Self::full(T::zero(), shape, allocator)
    }

    pub fn ones<A: Allocator>(shape: impl Into<Shape>, allocator: &A) -> Result<Self, ArrayError> {
        Self::full(T::one(), shape, allocator)
    }

    /// A new array holding `data`, given in column-major order.
    pub fn from_slice<A: Allocator>(
        data: &[T],
        shape: impl Into<Shape>,
        allocator: &A,
    ) -> Result<Self, ArrayError> {
        let shape = shape.into();
        let expected = shape.checked_numel().ok_or(crate::AllocError::ShapeOverflow)?;
        if data.len() != expected {
            return Err(ArrayError::LengthMismatch {
                expected,
                actual: data.len(),
            });
        }
        let mut array = Self::with_shape(shape, allocator)?;
        array.raw.write_bytes(bytemuck::cast_slice(data))?;
        Ok(array)
    }

    /// Copies `other` into a new array from `allocator`, crossing between
    /// host and device as needed.
    pub fn from_array<A: Allocator>(other: &Array<T>, allocator: &A) -> Result<Self, ArrayError> {
        let mut array = Self::with_shape(other.shape(), allocator)?;
        crate::copy(&mut array.raw, &other.raw)?;
        Ok(array)
    }

    /// Re-types a core. Its item size must be `size_of::<T>()`.
    pub fn try_from_raw(raw: RawArray) -> Result<Self, ArrayError> {
        let expected = std::mem::size_of::<T>();
        if raw.item_size() != expected {
            return Err(ArrayError::ItemSizeMismatch {
                expected,
                actual: raw.item_size(),
            });
        }
        Ok(Self::from_raw_unchecked(raw))
    }

    pub fn as_raw(&self) -> &RawArray {
        &self.raw
    }

    pub fn into_raw(self) -> RawArray {
        self.raw
    }

    pub fn dt(&self) -> crate::DType {
        T::dt()
    }
}

impl<T: ArrayDType> Array<T> {
    pub fn get(&self, index: &[usize]) -> Result<T, ArrayError> {
        self.raw.get(index)
    }

    pub fn set(&mut self, index: &[usize], value: T) -> Result<(), ArrayError> {
        self.raw.set(index, value)
    }

    /// # Safety
    ///
    /// See [`RawArray::at`].
    pub unsafe fn at(&self, index: &[usize]) -> Result<&T, ArrayError> {
        unsafe { self.raw.at(index) }
    }

    /// # Safety
    ///
    /// See [`RawArray::at_mut`].
    pub unsafe fn at_mut(&mut self, index: &[usize]) -> Result<&mut T, ArrayError> {
        unsafe { self.raw.at_mut(index) }
    }

    /// The elements in column-major order. Device arrays are downloaded.
    pub fn to_vec(&self) -> Result<Vec<T>, ArrayError> {
        if !self.is_bound() {
            return Ok(vec![]);
        }
        Ok(bytemuck::pod_collect_to_vec(&self.raw.to_bytes()?))
    }

    /// Iterates host elements in column-major order.
    pub fn iter(&self) -> Result<Iter<'_, T>, ArrayError> {
        match self.location() {
            Some(Location::Host) => Ok(Iter {
                array: self,
                index: RVec::from_elem(0, self.ndims()),
                remaining: self.numel(),
            }),
            Some(Location::Device) => Err(crate::DeviceError::DeviceMismatch(
                "CPU".to_string(),
                "GPU".to_string(),
            )
            .into()),
            None => Ok(Iter {
                array: self,
                index: RVec::new(),
                remaining: 0,
            }),
        }
    }

    pub fn slice(&self, ranges: &[Range<usize>]) -> Result<Array<T>, ArrayError> {
        Ok(Self::from_raw_unchecked(self.raw.slice(ranges)?))
    }

    pub fn slice_1d(&self, from: usize, to: usize) -> Result<Array<T>, ArrayError> {
        Ok(Self::from_raw_unchecked(self.raw.slice_1d(from, to)?))
    }

    pub fn slice_2d(
        &self,
        from0: usize,
        from1: usize,
        to0: usize,
        to1: usize,
    ) -> Result<Array<T>, ArrayError> {
        Ok(Self::from_raw_unchecked(
            self.raw.slice_2d(from0, from1, to0, to1)?,
        ))
    }

    /// Copy-assignment, see [`RawArray::assign`].
    pub fn assign(&mut self, other: &Array<T>) -> Result<(), ArrayError> {
        self.raw.assign(&other.raw)
    }

    /// Move-assignment, see [`RawArray::take`].
    pub fn take(&mut self) -> Array<T> {
        Self::from_raw_unchecked(self.raw.take())
    }

    pub fn deep_clone(&self) -> Result<Array<T>, ArrayError> {
        Ok(Self::from_raw_unchecked(self.raw.deep_clone()?))
    }
}

pub struct Iter<'a, T: ArrayDType> {
    array: &'a Array<T>,
    index: RVec<usize>,
    remaining: usize,
}

impl<T: ArrayDType> Iterator for Iter<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        if self.remaining == 0 {
            return None;
        }
        let value = self.array.get(&self.index).ok()?;
        self.remaining -= 1;
        for (dim, i) in self.index.iter_mut().enumerate() {
            *i += 1;
            if *i < self.array.size(dim) {
                break;
            }
            *i = 0;
        }
        Some(value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<T: ArrayDType> ExactSizeIterator for Iter<'_, T> {}

impl<T: ArrayDType> std::fmt::Debug for Array<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("Array");
        s.field("dt", &T::dt())
            .field("shape", self.shape())
            .field("location", &self.location());
        if self.location() == Some(Location::Host) {
            if let Ok(values) = self.to_vec() {
                s.field("values", &values);
            }
        }
        s.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{shape, DType, HostAllocator};

    #[test]
    fn test_slice_writes_through() -> anyhow::Result<()> {
        let original = Array::<i32>::from_slice(&[10, 20, 30, 40, 50], [5], &HostAllocator)?;
        let mut view = original.slice_1d(1, 4)?;
        assert_eq!(view.to_vec()?, vec![20, 30, 40]);

        view.set(&[0], 99)?;
        assert_eq!(original.to_vec()?, vec![10, 99, 30, 40, 50]);
        assert_eq!(original.get(&[1])?, 99);
        Ok(())
    }

    #[test]
    fn test_empty_array() -> anyhow::Result<()> {
        let array = Array::<f32>::new();
        assert!(array.is_empty());
        assert_eq!(array.ndims(), 0);
        assert!(array.as_ptr().is_null());
        assert_eq!(array.item_size(), 4);
        assert!(array.to_vec()?.is_empty());
        assert_eq!(array.iter()?.count(), 0);
        Ok(())
    }

    #[test]
    fn test_zeros() -> anyhow::Result<()> {
        let array = Array::<f64>::zeros([3, 2], &HostAllocator)?;
        assert_eq!(array.to_vec()?, vec![0.0; 6]);
        assert_eq!(array.dt(), DType::F64);
        Ok(())
    }

    #[test]
    fn test_ones_and_full() -> anyhow::Result<()> {
        let ones = Array::<half::f16>::ones([2, 2], &HostAllocator)?;
        assert_eq!(ones.to_vec()?, vec![half::f16::ONE; 4]);
        let full = Array::<i16>::full(-3, [3], &HostAllocator)?;
        assert_eq!(full.to_vec()?, vec![-3, -3, -3]);
        Ok(())
    }

    #[test]
    fn test_from_slice_is_column_major() -> anyhow::Result<()> {
        let array = Array::<u16>::from_slice(&[1, 2, 3, 4, 5, 6], [2, 3], &HostAllocator)?;
        assert_eq!(array.get(&[1, 0])?, 2);
        assert_eq!(array.get(&[0, 1])?, 3);
        assert_eq!(array.get(&[1, 2])?, 6);
        assert_eq!(array.iter()?.collect::<Vec<_>>(), vec![1, 2, 3, 4, 5, 6]);
        Ok(())
    }

    #[test]
    fn test_from_slice_length_mismatch() {
        let err = Array::<i32>::from_slice(&[1, 2, 3], [2, 2], &HostAllocator).unwrap_err();
        assert!(matches!(
            err,
            ArrayError::LengthMismatch {
                expected: 4,
                actual: 3
            }
        ));
    }

    #[test]
    fn test_slice_2d_iter() -> anyhow::Result<()> {
        let data: Vec<f32> = (0..12).map(|x| x as f32).collect();
        let array = Array::from_slice(&data, [3, 4], &HostAllocator)?;
        let view = array.slice_2d(1, 1, 3, 3)?;
        assert_eq!(view.shape(), &shape![2, 2]);
        assert_eq!(view.iter()?.collect::<Vec<_>>(), vec![4., 5., 7., 8.]);
        assert_eq!(view.to_vec()?, vec![4., 5., 7., 8.]);
        Ok(())
    }

    #[test]
    fn test_from_array_on_host() -> anyhow::Result<()> {
        let source = Array::<i64>::from_slice(&[1, 2, 3, 4], [4], &HostAllocator)?;
        let view = source.slice_1d(1, 3)?;
        let mut copy = Array::from_array(&view, &HostAllocator)?;
        assert_eq!(copy.to_vec()?, vec![2, 3]);
        assert!(!copy.shares_buffer(&view));

        copy.set(&[0], -1)?;
        assert_eq!(source.to_vec()?, vec![1, 2, 3, 4]);
        Ok(())
    }

    #[test]
    fn test_raw_round_trip() -> anyhow::Result<()> {
        let array = Array::<f32>::from_slice(&[1.5, 2.5], [2], &HostAllocator)?;
        let raw = array.into_raw();
        assert!(matches!(
            Array::<u8>::try_from_raw(raw.clone()),
            Err(ArrayError::ItemSizeMismatch {
                expected: 1,
                actual: 4
            })
        ));
        let back = Array::<u32>::try_from_raw(raw)?;
        assert_eq!(back.to_vec()?, vec![1.5f32.to_bits(), 2.5f32.to_bits()]);
        Ok(())
    }

    #[test]
    fn test_take_and_assign() -> anyhow::Result<()> {
        let mut source = Array::<u8>::from_slice(&[7, 8, 9], [3], &HostAllocator)?;
        let mut target = Array::<u8>::new();
        target.assign(&source)?;
        assert!(target.shares_buffer(&source));

        let moved = source.take();
        assert!(source.is_empty());
        assert_eq!(moved.to_vec()?, vec![7, 8, 9]);
        assert_eq!(target.to_vec()?, vec![7, 8, 9]);
        Ok(())
    }

    #[test]
    fn test_debug_shows_values() -> anyhow::Result<()> {
        let array = Array::<i8>::from_slice(&[1, -1], [2], &HostAllocator)?;
        let debug = format!("{:?}", array);
        assert!(debug.contains("I8"));
        assert!(debug.contains("[2]"));
        assert!(debug.contains("[1, -1]"));
        Ok(())
    }
}
