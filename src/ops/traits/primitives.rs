//! Backend primitives behind the selection pipeline.

use crate::dtype::DType;
use crate::error::Result;
use crate::runtime::{Runtime, RuntimeClient, ScratchSpace};
use crate::tensor::Tensor;

/// Where the unravel primitive writes coordinates
pub enum CoordLayout<'a, R: Runtime> {
    /// One `[K]` stream per dimension.
    ///
    /// The selected buffer is overwritten with the dimension-0 coordinates and
    /// `rest[d - 1]` receives dimension `d`.
    InPlace {
        /// Streams for dimensions `1..D`
        rest: &'a [Tensor<R>],
    },
    /// A single `[K, D]` row-major tensor; the selected buffer is left intact.
    Stacked {
        /// Destination tensor
        out: &'a Tensor<R>,
    },
}

impl<R: Runtime> CoordLayout<'_, R> {
    /// True for the `[K, D]` layout
    #[inline]
    pub fn is_stacked(&self) -> bool {
        matches!(self, Self::Stacked { .. })
    }
}

/// Tuning knobs for the selection pipeline
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WhereConfig {
    /// Number of selected elements unravelled per work group.
    ///
    /// Used by the CPU backend; WebGPU always uses its workgroup size.
    pub unravel_group_size: usize,
    /// Re-read the count reported by the select pass and fail with
    /// `Error::Internal` when it disagrees with the count pass.
    pub verify_selected_count: bool,
}

impl WhereConfig {
    /// Default CPU unravel group size
    pub const DEFAULT_UNRAVEL_GROUP_SIZE: usize = 1024;

    /// Set the unravel group size (clamped to at least 1)
    pub fn with_unravel_group_size(mut self, group_size: usize) -> Self {
        self.unravel_group_size = group_size.max(1);
        self
    }

    /// Enable or disable the selected-count check
    pub fn with_verify_selected_count(mut self, verify: bool) -> Self {
        self.verify_selected_count = verify;
        self
    }
}

impl Default for WhereConfig {
    fn default() -> Self {
        Self {
            unravel_group_size: Self::DEFAULT_UNRAVEL_GROUP_SIZE,
            verify_selected_count: cfg!(debug_assertions),
        }
    }
}

/// Device primitives for counting, selecting and unravelling.
///
/// Each primitive that needs working memory reports its size through a
/// `*_scratch_bytes` query and receives a region of at least that size. All
/// primitives apply the same predicate ([`Element::is_nonzero`](crate::dtype::Element::is_nonzero)).
pub trait WherePrimitives<R: Runtime>: RuntimeClient<R> {
    /// Element type of the one-element count cell
    const COUNT_DTYPE: DType;

    /// Pipeline configuration of this client
    fn where_config(&self) -> &WhereConfig;

    /// Fail with `UnsupportedDType` if the backend cannot read `dtype` inputs
    fn check_input_dtype(&self, dtype: DType) -> Result<()>;

    /// Fail with `UnsupportedDType` if the backend cannot emit `dtype` indices
    fn check_index_dtype(&self, dtype: DType) -> Result<()>;

    /// Fail with `BackendLimitation` if the backend cannot process `shape`
    fn check_shape(&self, shape: &[usize]) -> Result<()> {
        let _ = shape;
        Ok(())
    }

    /// Scratch required by [`Self::count_nonzero_into`]
    fn count_scratch_bytes(&self, dtype: DType, numel: usize) -> usize;

    /// Write the number of non-zero elements of `input` into the `count` cell.
    ///
    /// `count` holds one `COUNT_DTYPE` element.
    fn count_nonzero_into(
        &self,
        input: &Tensor<R>,
        count: ScratchSpace,
        scratch: ScratchSpace,
    ) -> Result<()>;

    /// Scratch required by [`Self::select_flagged_into`]
    fn select_scratch_bytes(&self, dtype: DType, numel: usize) -> usize;

    /// Stable compaction of the flat indices of non-zero elements.
    ///
    /// Writes at most `selected.numel()` indices in ascending order and stores
    /// the total number of non-zero elements into the `count` cell.
    fn select_flagged_into(
        &self,
        input: &Tensor<R>,
        selected: &Tensor<R>,
        count: ScratchSpace,
        scratch: ScratchSpace,
    ) -> Result<()>;

    /// Scratch required by [`Self::unravel_into`]
    fn unravel_scratch_bytes(&self, nnz: usize, ndim: usize, stacked: bool) -> usize {
        let _ = (nnz, ndim, stacked);
        0
    }

    /// Decompose each selected flat index into `shape.len()` coordinates.
    fn unravel_into(
        &self,
        selected: &Tensor<R>,
        shape: &[usize],
        layout: CoordLayout<'_, R>,
        scratch: ScratchSpace,
    ) -> Result<()>;

    /// Copy the `count` cell back to the host.
    ///
    /// This waits for all submitted work.
    fn read_count(&self, count: ScratchSpace) -> Result<usize>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_where_config_builders() {
        let config = WhereConfig::default()
            .with_unravel_group_size(0)
            .with_verify_selected_count(true);
        assert_eq!(config.unravel_group_size, 1);
        assert!(config.verify_selected_count);
        assert_eq!(
            WhereConfig::default().unravel_group_size,
            WhereConfig::DEFAULT_UNRAVEL_GROUP_SIZE
        );
    }
}
