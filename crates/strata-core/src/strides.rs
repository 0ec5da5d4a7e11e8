use crate::{RVec, Shape};

/// Per-dimension byte strides.
///
/// Strides are laid out column-major: `stride[0]` is the item size and each
/// following stride is the previous one times the previous extent.
#[derive(Clone, PartialEq, Eq, Default, Hash)]
pub struct Strides(RVec<usize>);

impl Strides {
    /// Packed column-major byte strides for `shape`.
    ///
    /// `None` if a stride does not fit in a `usize`. Shapes with a zero
    /// extent hold no elements, strides that would overflow there are 0.
    pub fn packed(item_size: usize, shape: &Shape) -> Option<Self> {
        let empty = shape.has_zero_extent();
        let mut strides = RVec::with_capacity(shape.ndims());
        let mut stride = item_size;
        for (dim, &extent) in shape.iter().enumerate() {
            strides.push(stride);
            if dim + 1 < shape.ndims() {
                stride = match stride.checked_mul(extent) {
                    Some(next) => next,
                    None if empty => 0,
                    None => return None,
                };
            }
        }
        Some(Self(strides))
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }

    pub fn get(&self, dim: usize) -> Option<&usize> {
        self.0.get(dim)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &usize> {
        self.0.iter()
    }

    pub fn to_vec(&self) -> Vec<usize> {
        self.0.to_vec()
    }
}

impl std::fmt::Debug for Strides {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let strides: Vec<String> = self.0.iter().map(|s| s.to_string()).collect();
        write!(f, "[{}]", strides.join("x"))
    }
}

impl std::ops::Index<usize> for Strides {
    type Output = usize;

    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

impl From<RVec<usize>> for Strides {
    fn from(strides: RVec<usize>) -> Self {
        Self(strides)
    }
}
