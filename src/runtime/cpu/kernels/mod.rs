//! CPU kernel implementations
//!
//! This module provides low-level compute kernels for CPU operations.
//! Kernels are generic over `T: Element` and operate on raw pointers; the
//! callers in `runtime::cpu` validate shapes and dtypes first.

#![allow(unsafe_op_in_unsafe_fn)] // Kernels are already marked unsafe, inner unsafe is redundant

pub mod nonzero;

pub use nonzero::{chunk_count, count_nonzero_kernel, select_flagged_kernel, unravel_kernel};
#[cfg(feature = "rayon")]
pub use nonzero::{
    count_nonzero_parallel_kernel, select_flagged_parallel_kernel, unravel_grouped_kernel,
};
