//! Selection operations for CPU runtime.

use crate::dtype::DType;
use crate::error::Result;
use crate::ops::WhereOps;
use crate::ops::pipeline;
use crate::runtime::cpu::{CpuClient, CpuRuntime};
use crate::tensor::Tensor;

impl WhereOps<CpuRuntime> for CpuClient {
    fn nonzero_coords(
        &self,
        cond: &Tensor<CpuRuntime>,
        index_dtype: DType,
    ) -> Result<Vec<Tensor<CpuRuntime>>> {
        pipeline::nonzero_pipeline(self, cond, index_dtype)
    }

    fn count_nonzero(&self, cond: &Tensor<CpuRuntime>) -> Result<usize> {
        pipeline::count_nonzero_pipeline(self, cond)
    }

    fn flat_nonzero(
        &self,
        cond: &Tensor<CpuRuntime>,
        index_dtype: DType,
    ) -> Result<Tensor<CpuRuntime>> {
        pipeline::flat_nonzero_pipeline(self, cond, index_dtype)
    }

    fn argwhere(
        &self,
        cond: &Tensor<CpuRuntime>,
        index_dtype: DType,
    ) -> Result<Tensor<CpuRuntime>> {
        pipeline::argwhere_pipeline(self, cond, index_dtype)
    }
}
