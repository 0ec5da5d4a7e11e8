use crate::RVec;

/// Per-dimension extents of an array.
///
/// Dimension 0 is the fastest varying one, see [`crate::Strides`].
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct Shape(RVec<usize>);

impl Shape {
    pub fn new(shape: RVec<usize>) -> Self {
        Self(shape)
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }

    pub fn get(&self, index: usize) -> Option<&usize> {
        self.0.get(index)
    }

    /// Total number of elements described by this shape.
    ///
    /// A zero-dimensional shape describes a single element, any zero extent
    /// makes the shape empty regardless of the other extents.
    pub fn numel(&self) -> usize {
        if self.has_zero_extent() {
            return 0;
        }
        self.0.iter().product()
    }

    /// Like [`Shape::numel`], but `None` when the product overflows.
    pub fn checked_numel(&self) -> Option<usize> {
        if self.has_zero_extent() {
            return Some(0);
        }
        self.0
            .iter()
            .try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
    }

    pub fn has_zero_extent(&self) -> bool {
        self.0.contains(&0)
    }

    pub fn to_vec(&self) -> Vec<usize> {
        self.0.to_vec()
    }

    pub fn iter(&self) -> impl Iterator<Item = &usize> {
        self.0.iter()
    }

    pub fn ndims(&self) -> usize {
        self.0.len()
    }

    pub fn rank(&self) -> usize {
        self.ndims()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let dims: Vec<String> = self.0.iter().map(|d| d.to_string()).collect();
        write!(f, "[{}]", dims.join("x"))
    }
}

impl std::fmt::Display for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.0.as_slice())
    }
}

impl std::ops::Index<usize> for Shape {
    type Output = usize;

    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

impl From<RVec<usize>> for Shape {
    fn from(shape: RVec<usize>) -> Self {
        Self(shape)
    }
}

impl From<Vec<usize>> for Shape {
    fn from(shape: Vec<usize>) -> Self {
        Self(shape.into())
    }
}

impl From<&[usize]> for Shape {
    fn from(slice: &[usize]) -> Self {
        Shape(slice.into())
    }
}

impl<const N: usize> From<[usize; N]> for Shape {
    fn from(dims: [usize; N]) -> Self {
        Shape(dims.iter().copied().collect())
    }
}

impl From<&Shape> for Shape {
    fn from(shape: &Shape) -> Self {
        shape.clone()
    }
}

macro_rules! impl_try_into_for_shape {
    ($($N:expr),*) => {
        $(
            impl TryInto<[usize; $N]> for &Shape {
                type Error = anyhow::Error;

                fn try_into(self) -> Result<[usize; $N], Self::Error> {
                    if self.0.len() == $N {
                        let mut arr = [0; $N];
                        for (i, &item) in self.0.iter().enumerate().take($N) {
                            arr[i] = item;
                        }
                        Ok(arr)
                    } else {
                        Err(anyhow::anyhow!("Shape has length {} but expected {}", self.0.len(), $N))
                    }
                }
            }
        )*
    };
}

impl_try_into_for_shape!(0, 1, 2, 3, 4);

#[cfg(test)]
mod tests {
    use crate::{shape, Shape};
    use proptest::prelude::*;
    use proptest::strategy::{BoxedStrategy, Strategy};
    use std::ops::Range;
    use test_strategy::proptest;

    impl Arbitrary for Shape {
        type Parameters = Vec<Range<usize>>;
        type Strategy = BoxedStrategy<Self>;

        fn arbitrary_with(args: Self::Parameters) -> Self::Strategy {
            args.prop_map(Into::<Shape>::into).boxed()
        }
    }

    #[test]
    fn test_shape_formatting() {
        let shape = shape![2, 3, 4];
        assert_eq!(format!("{:?}", shape), "[2x3x4]");
        assert_eq!(format!("{}", shape), "[2, 3, 4]");
    }

    #[test]
    fn test_equality_is_elementwise() {
        assert_eq!(shape![2, 3], Shape::from([2, 3]));
        assert_ne!(shape![2, 3], shape![3, 2]);
        assert_ne!(shape![2, 3], shape![2, 3, 1]);
    }

    #[test]
    fn test_zero_dims() {
        let shape = Shape::default();
        assert_eq!(shape.ndims(), 0);
        assert_eq!(shape.numel(), 1);
        assert_eq!(format!("{:?}", shape), "[]");
        assert_eq!(format!("{:?}", shape![0]), "[0]");
    }

    #[test]
    fn test_try_into_array() -> anyhow::Result<()> {
        let dims: [usize; 3] = (&shape![5, 6, 7]).try_into()?;
        assert_eq!(dims, [5, 6, 7]);
        let bad: anyhow::Result<[usize; 2]> = (&shape![5, 6, 7]).try_into();
        assert!(bad.is_err());
        Ok(())
    }

    #[test]
    fn test_checked_numel_overflow() {
        assert_eq!(shape![usize::MAX, 2].checked_numel(), None);
        assert_eq!(shape![4, 0, 9].checked_numel(), Some(0));
        assert_eq!(shape![usize::MAX, 2, 0].checked_numel(), Some(0));
        assert_eq!(shape![usize::MAX, 2, 0].numel(), 0);
    }

    #[proptest(cases = 64)]
    fn test_numel_is_product(
        #[strategy(Shape::arbitrary_with(vec![0..8, 0..8, 0..8]))] shape: Shape,
    ) {
        let expected = shape[0] * shape[1] * shape[2];
        prop_assert_eq!(shape.numel(), expected);
        prop_assert_eq!(shape.checked_numel(), Some(expected));
    }
}
