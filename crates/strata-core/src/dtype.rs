use half::{bf16, f16};

#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    Default,
    Hash,
    strum_macros::Display,
    strum_macros::EnumIter,
)]
pub enum DType {
    U8,
    I8,
    U16,
    I16,
    F16,
    BF16,
    U32,
    I32,
    #[default]
    F32,
    U64,
    I64,
    F64,
}

impl DType {
    /// Returns the size of the type in bytes.
    pub fn size_of(self) -> usize {
        match self {
            DType::U8 | DType::I8 => 1,
            DType::U16 | DType::I16 | DType::F16 | DType::BF16 => 2,
            DType::U32 | DType::I32 | DType::F32 => 4,
            DType::U64 | DType::I64 | DType::F64 => 8,
        }
    }
}

/// Element types an [`crate::Array`] can hold.
pub trait ArrayDType:
    Copy + std::fmt::Debug + PartialEq + 'static + num_traits::Zero + bytemuck::Pod
{
    fn dt() -> DType;

    fn one() -> Self;
}

macro_rules! map_type {
    ($t:ty, $v:ident) => {
        impl ArrayDType for $t {
            fn dt() -> DType {
                DType::$v
            }

            fn one() -> Self {
                1 as Self
            }
        }
    };
}

macro_rules! map_half_type {
    ($t:ty, $v:ident) => {
        impl ArrayDType for $t {
            fn dt() -> DType {
                DType::$v
            }

            fn one() -> Self {
                Self::ONE
            }
        }
    };
}

map_type!(u8, U8);
map_type!(i8, I8);
map_type!(u16, U16);
map_type!(i16, I16);
map_type!(u32, U32);
map_type!(i32, I32);
map_type!(f32, F32);
map_type!(u64, U64);
map_type!(i64, I64);
map_type!(f64, F64);
map_half_type!(f16, F16);
map_half_type!(bf16, BF16);
