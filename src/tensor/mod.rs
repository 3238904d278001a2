//! Tensor types
//!
//! This module provides the `Tensor` type, a contiguous row-major
//! n-dimensional array stored on a compute device, together with its
//! reference-counted `Storage` and its `Shape`.

mod core;
mod shape;
mod storage;

pub use core::Tensor;
pub use shape::{Shape, ravel_index};
pub use storage::Storage;
