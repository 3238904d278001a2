//! DType dispatch utilities
//!
//! This module provides the `dispatch_dtype!` and `dispatch_index_dtype!`
//! macros for runtime type dispatch. Kernels are written once as generics over
//! [`Element`](crate::dtype::Element) and selected from a `DType` value at the
//! call site.
//!
//! # Usage
//!
//! ```ignore
//! fn my_operation(dtype: DType) -> Result<usize> {
//!     dispatch_dtype!(dtype, T => {
//!         // T is now a concrete type (f32, i64, u8, ...)
//!         Ok(std::mem::size_of::<T>())
//!     }, "my_operation")
//! }
//! ```
//!
//! ## Supported Types
//!
//! - `F64` -> `f64`, `F32` -> `f32`
//! - `F16` -> `half::f16`, `BF16` -> `half::bf16` (requires "f16" feature)
//! - `I64`/`I32`/`I16`/`I8` -> signed primitives
//! - `U64`/`U32`/`U16`/`U8` -> unsigned primitives
//! - `Bool` -> `u8` (the predicate is "byte is non-zero")

/// Internal helper macro to dispatch types requiring the "f16" feature.
#[macro_export]
#[doc(hidden)]
macro_rules! dispatch_f16_type {
    ($T:ident, $body:block, $dtype:expr, $error_op:expr, $type:ty) => {{
        #[cfg(feature = "f16")]
        {
            type $T = $type;
            $body
        }
        #[cfg(not(feature = "f16"))]
        {
            Err($crate::error::Error::UnsupportedDType {
                dtype: $dtype,
                op: $error_op,
            })
        }
    }};
}

/// Macro for runtime dtype dispatch to typed operations.
///
/// Executes `$body` with `$T` bound to the Rust type of `$dtype`. The body must
/// evaluate to a `Result`; feature-disabled and unknown dtypes produce
/// `Error::UnsupportedDType` tagged with `$error_op`.
#[macro_export]
macro_rules! dispatch_dtype {
    ($dtype:expr, $T:ident => $body:block, $error_op:expr) => {
        match $dtype {
            $crate::dtype::DType::F64 => {
                type $T = f64;
                $body
            }
            $crate::dtype::DType::F32 => {
                type $T = f32;
                $body
            }
            $crate::dtype::DType::F16 => {
                $crate::dispatch_f16_type!($T, $body, $dtype, $error_op, half::f16)
            }
            $crate::dtype::DType::BF16 => {
                $crate::dispatch_f16_type!($T, $body, $dtype, $error_op, half::bf16)
            }
            $crate::dtype::DType::I64 => {
                type $T = i64;
                $body
            }
            $crate::dtype::DType::I32 => {
                type $T = i32;
                $body
            }
            $crate::dtype::DType::I16 => {
                type $T = i16;
                $body
            }
            $crate::dtype::DType::I8 => {
                type $T = i8;
                $body
            }
            $crate::dtype::DType::U64 => {
                type $T = u64;
                $body
            }
            $crate::dtype::DType::U32 => {
                type $T = u32;
                $body
            }
            $crate::dtype::DType::U16 => {
                type $T = u16;
                $body
            }
            $crate::dtype::DType::U8 | $crate::dtype::DType::Bool => {
                type $T = u8;
                $body
            }
            #[allow(unreachable_patterns)]
            other => Err($crate::error::Error::UnsupportedDType {
                dtype: other,
                op: $error_op,
            }),
        }
    };
}

/// Runtime dispatch over the four index dtypes.
///
/// `$I` is bound to `i32`, `i64`, `u32` or `u64`. Any other dtype yields
/// `Error::UnsupportedDType`.
#[macro_export]
macro_rules! dispatch_index_dtype {
    ($dtype:expr, $I:ident => $body:block, $error_op:expr) => {
        match $dtype {
            $crate::dtype::DType::I64 => {
                type $I = i64;
                $body
            }
            $crate::dtype::DType::I32 => {
                type $I = i32;
                $body
            }
            $crate::dtype::DType::U64 => {
                type $I = u64;
                $body
            }
            $crate::dtype::DType::U32 => {
                type $I = u32;
                $body
            }
            other => Err($crate::error::Error::UnsupportedDType {
                dtype: other,
                op: $error_op,
            }),
        }
    };
}

#[cfg(test)]
mod tests {
    use crate::dtype::DType;
    use crate::error::{Error, Result};

    fn element_size(dtype: DType) -> Result<usize> {
        dispatch_dtype!(dtype, T => { Ok(std::mem::size_of::<T>()) }, "element_size")
    }

    fn index_size(dtype: DType) -> Result<usize> {
        dispatch_index_dtype!(dtype, I => { Ok(std::mem::size_of::<I>()) }, "index_size")
    }

    #[test]
    fn test_dispatch_matches_dtype_size() {
        for dtype in [
            DType::F64,
            DType::F32,
            DType::I64,
            DType::I32,
            DType::I16,
            DType::I8,
            DType::U64,
            DType::U32,
            DType::U16,
            DType::U8,
            DType::Bool,
        ] {
            assert_eq!(element_size(dtype).unwrap(), dtype.size_in_bytes());
        }
    }

    #[cfg(not(feature = "f16"))]
    #[test]
    fn test_dispatch_f16_requires_feature() {
        let err = element_size(DType::F16).unwrap_err();
        assert!(matches!(
            err,
            Error::UnsupportedDType {
                dtype: DType::F16,
                op: "element_size"
            }
        ));
    }

    #[test]
    fn test_index_dispatch_rejects_non_index() {
        assert_eq!(index_size(DType::U32).unwrap(), 4);
        assert!(matches!(
            index_size(DType::I16),
            Err(Error::UnsupportedDType { .. })
        ));
    }
}
