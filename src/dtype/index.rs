//! Integer types that flat indices and coordinates are emitted in

use super::Element;

/// Element types that can hold a flat index or a coordinate
///
/// Implemented for `i32`, `i64`, `u32` and `u64`. The conversions assume the
/// value fits; callers check the input size against
/// [`DType::max_index`](super::DType::max_index) before any kernel runs.
pub trait IndexElement: Element + Ord {
    /// Convert a flat index into this type
    fn from_index(index: usize) -> Self;

    /// Convert back to a flat index
    fn to_index(self) -> usize;
}

macro_rules! impl_index_element {
    ($($ty:ty),*) => {
        $(
            impl IndexElement for $ty {
                #[inline]
                fn from_index(index: usize) -> Self {
                    index as $ty
                }

                #[inline]
                fn to_index(self) -> usize {
                    self as usize
                }
            }
        )*
    };
}

impl_index_element!(i32, i64, u32, u64);
