mod array;
mod device;
mod dtype;
mod gpu;
mod raw_array;
mod shape;
mod storage;
mod strides;
mod transfer;

pub use array::*;
pub use device::*;
pub use dtype::*;
pub use gpu::{Align, Submission, WgpuDevice, MIN_STORAGE_BUFFER_SIZE};
pub use raw_array::*;
pub use shape::*;
pub use storage::*;
pub use strides::*;
pub use transfer::*;

use smallvec::SmallVec;
pub type RVec<T> = SmallVec<[T; 4]>;

//https://github.com/sonos/tract/blob/main/data/src/macros.rs#L2
#[macro_export]
macro_rules! rvec {
    (@one $x:expr) => (1usize);
    ($elem:expr; $n:expr) => ({
        $crate::RVec::from_elem($elem, $n)
    });
    ($($x:expr),*$(,)*) => ({
        let count = 0usize $(+ rvec![@one $x])*;
        #[allow(unused_mut)]
        let mut vec = $crate::RVec::new();
        if count <= vec.inline_size() {
            $(vec.push($x);)*
            vec
        } else {
            $crate::RVec::from_vec(vec![$($x,)*])
        }
    });
}

#[macro_export]
macro_rules! shape {
    ($($x:expr),*$(,)*) => ({
        use $crate::rvec;
        $crate::Shape::new(rvec![$($x,)*])
    });
}

pub mod prelude {
    pub use crate::{
        rvec, shape, Allocator, Array, Device, DeviceRequest, HostAllocator, RawArray, Shape,
    };
}
