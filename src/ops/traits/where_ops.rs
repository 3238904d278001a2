//! Selection operations trait.

use crate::dtype::DType;
use crate::error::Result;
use crate::runtime::Runtime;
use crate::tensor::Tensor;

/// Positions of non-zero elements
///
/// Every operation reports elements in row-major flattening order. The index
/// dtype must be `I32`, `I64`, `U32` or `U64` (WebGPU: `I32` or `U32`) and
/// able to hold `numel - 1`; otherwise the call fails before any device work
/// with `Error::UnsupportedDType` or `Error::IndexOverflow`.
///
/// `Bool` inputs are true where the byte is non-zero. For floats `-0.0` is
/// zero and `NaN` is non-zero.
pub trait WhereOps<R: Runtime> {
    /// Coordinates of non-zero elements, one stream per dimension.
    ///
    /// Returns `D = cond.ndim()` tensors of shape `[K]` where `K` is the number
    /// of non-zero elements; entry `i` across the streams is the coordinate of
    /// the `i`-th non-zero element. A rank-1 input yields its flat indices. A
    /// rank-0 input yields no streams.
    ///
    /// # Example
    ///
    /// ```
    /// # use argwhere::prelude::*;
    /// # let device = CpuDevice::new();
    /// # let client = CpuRuntime::default_client(&device);
    /// let cond = Tensor::<CpuRuntime>::from_slice(&[0.0f32, 1.0, 0.0, 0.0, 2.0, 0.0], &[2, 3], &device);
    /// let coords = client.nonzero_coords(&cond, DType::I64)?;
    /// assert_eq!(coords[0].to_vec::<i64>(), vec![0, 1]);
    /// assert_eq!(coords[1].to_vec::<i64>(), vec![1, 1]);
    /// # Ok::<(), argwhere::error::Error>(())
    /// ```
    fn nonzero_coords(&self, cond: &Tensor<R>, index_dtype: DType) -> Result<Vec<Tensor<R>>>;

    /// Number of non-zero elements.
    fn count_nonzero(&self, cond: &Tensor<R>) -> Result<usize>;

    /// Ascending flat indices of non-zero elements as a `[K]` tensor.
    fn flat_nonzero(&self, cond: &Tensor<R>, index_dtype: DType) -> Result<Tensor<R>>;

    /// Coordinates of non-zero elements stacked into a `[K, D]` tensor.
    ///
    /// Row `i` is the coordinate of the `i`-th non-zero element. A rank-0
    /// input yields shape `[K, 0]`.
    ///
    /// # Example
    ///
    /// ```
    /// # use argwhere::prelude::*;
    /// # let device = CpuDevice::new();
    /// # let client = CpuRuntime::default_client(&device);
    /// let cond = Tensor::<CpuRuntime>::from_slice(&[0i32, 7, 0, 3], &[2, 2], &device);
    /// let rows = client.argwhere(&cond, DType::I32)?;
    /// assert_eq!(rows.shape(), &[2, 2]);
    /// assert_eq!(rows.to_vec::<i32>(), vec![0, 1, 1, 1]);
    /// # Ok::<(), argwhere::error::Error>(())
    /// ```
    fn argwhere(&self, cond: &Tensor<R>, index_dtype: DType) -> Result<Tensor<R>>;
}
