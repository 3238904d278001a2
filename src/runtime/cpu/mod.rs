//! CPU runtime implementation
//!
//! The CPU runtime uses standard heap allocation. With the `rayon` feature its
//! kernels run chunked across a worker pool; with
//! [`ParallelismConfig::serial`] (or without `rayon`) the single-threaded
//! reference kernels run instead. Both paths produce identical results.

mod client;
mod device;
pub(crate) mod kernels;
mod nonzero;
mod runtime;

pub use crate::tensor::Tensor;
pub use client::{CpuAllocator, CpuClient, DEFAULT_MIN_LEN, ParallelismConfig};
pub use device::CpuDevice;
pub use runtime::CpuRuntime;
