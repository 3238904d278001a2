//! # argwhere
//!
//! **Parallel selection-and-unravel over N-dimensional tensors.**
//!
//! Given a tensor of condition values, argwhere finds every non-zero element
//! and reports its coordinates in row-major order. The work runs as three
//! passes on the selected backend:
//!
//! 1. **Count**: a device-wide reduction of the non-zero predicate gives `K`,
//!    which is read back to the host to size the outputs.
//! 2. **Select**: a stable stream compaction writes the `K` ascending flat
//!    indices.
//! 3. **Unravel**: each flat index is decomposed into `D` coordinates by a
//!    runtime loop over the shape.
//!
//! Transient working memory for each pass is sized by a query, allocated from
//! the client's [`Allocator`](runtime::Allocator) and released before the
//! next pass.
//!
//! ## Quick Start
//!
//! ```rust
//! use argwhere::prelude::*;
//!
//! let device = CpuDevice::new();
//! let client = CpuRuntime::default_client(&device);
//!
//! let cond = Tensor::<CpuRuntime>::from_slice(&[0u8, 1, 0, 0, 1, 0], &[2, 3], &device);
//! let coords = client.nonzero_coords(&cond, DType::I64)?;
//! assert_eq!(coords[0].to_vec::<i64>(), vec![0, 1]);
//! assert_eq!(coords[1].to_vec::<i64>(), vec![1, 1]);
//! # Ok::<(), argwhere::error::Error>(())
//! ```
//!
//! ## Feature Flags
//!
//! - `cpu` (default): CPU backend
//! - `rayon` (default): Multi-threaded CPU kernels
//! - `wgpu`: Cross-platform GPU via WebGPU
//! - `f16`: Half-precision float inputs (F16, BF16)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod dtype;
pub mod error;
pub mod ops;
pub mod runtime;
pub mod tensor;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::dtype::DType;
    pub use crate::error::{Error, Result};
    pub use crate::ops::{WhereConfig, WhereOps};
    pub use crate::runtime::{Allocator, Device, Runtime, RuntimeClient};
    pub use crate::tensor::Tensor;

    pub use crate::runtime::cpu::{CpuClient, CpuDevice, CpuRuntime, ParallelismConfig};

    #[cfg(feature = "wgpu")]
    pub use crate::runtime::wgpu::{WgpuClient, WgpuDevice, WgpuRuntime};

    pub use crate::DefaultRuntime;
}

/// Default runtime: WebGPU when the `wgpu` feature is enabled, else CPU
#[cfg(feature = "wgpu")]
pub type DefaultRuntime = runtime::wgpu::WgpuRuntime;

/// Default runtime: WebGPU when the `wgpu` feature is enabled, else CPU
#[cfg(not(feature = "wgpu"))]
pub type DefaultRuntime = runtime::cpu::CpuRuntime;
