//! Element trait for mapping Rust types to DType

use super::DType;
use bytemuck::{Pod, Zeroable};

/// Trait for types that can be elements of a tensor
///
/// This trait connects Rust's type system to the runtime dtype system.
/// It's implemented for all primitive numeric types, and for `half::f16` /
/// `half::bf16` when the `f16` feature is enabled. `Bool` tensors are read as
/// `u8`.
///
/// # Predicate
///
/// [`Element::is_nonzero`] is the single predicate shared by the counting and
/// selecting passes. It is `self != 0` under the type's own `PartialEq`, so for
/// floats `-0.0` is zero and `NaN` is non-zero.
pub trait Element: Copy + Send + Sync + Pod + Zeroable + PartialEq + 'static {
    /// The corresponding DType for this Rust type
    const DTYPE: DType;

    /// Zero value
    fn zero() -> Self;

    /// True where the element satisfies the selection predicate
    #[inline]
    fn is_nonzero(self) -> bool {
        self != Self::zero()
    }
}

macro_rules! impl_element {
    ($($ty:ty => $dtype:ident, $zero:expr;)*) => {
        $(
            impl Element for $ty {
                const DTYPE: DType = DType::$dtype;

                #[inline]
                fn zero() -> Self {
                    $zero
                }
            }
        )*
    };
}

impl_element! {
    f64 => F64, 0.0;
    f32 => F32, 0.0;
    i64 => I64, 0;
    i32 => I32, 0;
    i16 => I16, 0;
    i8 => I8, 0;
    u64 => U64, 0;
    u32 => U32, 0;
    u16 => U16, 0;
    u8 => U8, 0;
}

#[cfg(feature = "f16")]
impl_element! {
    half::f16 => F16, half::f16::ZERO;
    half::bf16 => BF16, half::bf16::ZERO;
}
