//! Selection operations for WebGPU runtime.

use crate::dtype::DType;
use crate::error::Result;
use crate::ops::WhereOps;
use crate::ops::pipeline;
use crate::runtime::wgpu::{WgpuClient, WgpuRuntime};
use crate::tensor::Tensor;

impl WhereOps<WgpuRuntime> for WgpuClient {
    fn nonzero_coords(
        &self,
        cond: &Tensor<WgpuRuntime>,
        index_dtype: DType,
    ) -> Result<Vec<Tensor<WgpuRuntime>>> {
        pipeline::nonzero_pipeline(self, cond, index_dtype)
    }

    fn count_nonzero(&self, cond: &Tensor<WgpuRuntime>) -> Result<usize> {
        pipeline::count_nonzero_pipeline(self, cond)
    }

    fn flat_nonzero(
        &self,
        cond: &Tensor<WgpuRuntime>,
        index_dtype: DType,
    ) -> Result<Tensor<WgpuRuntime>> {
        pipeline::flat_nonzero_pipeline(self, cond, index_dtype)
    }

    fn argwhere(
        &self,
        cond: &Tensor<WgpuRuntime>,
        index_dtype: DType,
    ) -> Result<Tensor<WgpuRuntime>> {
        pipeline::argwhere_pipeline(self, cond, index_dtype)
    }
}
