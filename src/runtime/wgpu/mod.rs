//! WebGPU runtime implementation (requires `wgpu` feature)
//!
//! Cross-platform GPU execution through WebGPU (Vulkan, Metal, DX12).
//! Inputs must be F32, I32 or U32 and index outputs I32 or U32.

mod cache;
mod client;
mod device;
mod nonzero;
mod runtime;
pub(crate) mod shaders;

pub use crate::tensor::Tensor;
pub use client::{WgpuAllocator, WgpuClient};
pub use device::{WgpuDevice, WgpuError};
pub use runtime::{WgpuRuntime, is_wgpu_available};
