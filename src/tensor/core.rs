//! Core Tensor type

use super::{Shape, Storage};
use crate::dtype::{DType, Element};
use crate::error::{Error, Result};
use crate::runtime::Runtime;
use std::fmt;

/// N-dimensional array stored on a compute device
///
/// A `Tensor` is reference-counted device [`Storage`] plus a [`Shape`]. Tensors
/// are always contiguous and row-major (last dimension fastest), which is the
/// flattening order every `nonzero` operation reports positions in.
///
/// # Example
///
/// ```ignore
/// use argwhere::prelude::*;
///
/// let device = CpuDevice::new();
/// let t = Tensor::<CpuRuntime>::from_slice(&[0.0f32, 1.0, 0.0, 2.0], &[2, 2], &device);
/// assert_eq!(t.shape(), &[2, 2]);
/// ```
pub struct Tensor<R: Runtime> {
    storage: Storage<R>,
    shape: Shape,
}

impl<R: Runtime> Tensor<R> {
    /// Create a tensor from storage and shape
    ///
    /// Returns an error if the storage length differs from the shape's element count.
    pub fn from_parts(storage: Storage<R>, shape: &[usize]) -> Result<Self> {
        let shape = Shape::from(shape);
        if storage.len() != shape.numel() {
            return Err(Error::shape_mismatch(&shape, &[storage.len()]));
        }
        Ok(Self { storage, shape })
    }

    /// Create a tensor from a slice of data
    ///
    /// # Panics
    ///
    /// Panics if `data.len()` does not equal the product of the `shape` dimensions.
    /// For a fallible alternative, use [`Self::try_from_slice`].
    pub fn from_slice<T: Element>(data: &[T], shape: &[usize], device: &R::Device) -> Self {
        Self::try_from_slice(data, shape, device).expect("Tensor::from_slice failed")
    }

    /// Create a tensor from a slice of data (fallible version)
    ///
    /// Returns an error if `data.len()` does not equal the product of the `shape` dimensions,
    /// or if memory allocation fails.
    pub fn try_from_slice<T: Element>(
        data: &[T],
        shape: &[usize],
        device: &R::Device,
    ) -> Result<Self> {
        let expected_len: usize = shape.iter().product();
        if data.len() != expected_len {
            return Err(Error::ShapeMismatch {
                expected: shape.to_vec(),
                got: vec![data.len()],
            });
        }

        let storage = Storage::from_slice(data, device)?;
        Ok(Self {
            storage,
            shape: Shape::from(shape),
        })
    }

    /// Create a `Bool` tensor from a slice of booleans
    pub fn try_from_bools(data: &[bool], shape: &[usize], device: &R::Device) -> Result<Self> {
        let expected_len: usize = shape.iter().product();
        if data.len() != expected_len {
            return Err(Error::ShapeMismatch {
                expected: shape.to_vec(),
                got: vec![data.len()],
            });
        }

        let bytes: Vec<u8> = data.iter().map(|&b| b as u8).collect();
        let storage = Storage::from_bytes(&bytes, DType::Bool, device)?;
        Ok(Self {
            storage,
            shape: Shape::from(shape),
        })
    }

    /// Create an uninitialized tensor
    ///
    /// # Panics
    ///
    /// Panics if allocation fails. For a fallible alternative, use [`Self::try_empty`].
    pub fn empty(shape: &[usize], dtype: DType, device: &R::Device) -> Self {
        Self::try_empty(shape, dtype, device).expect("Tensor::empty failed")
    }

    /// Create an uninitialized tensor (fallible version)
    ///
    /// The contents are unspecified until written by an operation.
    pub fn try_empty(shape: &[usize], dtype: DType, device: &R::Device) -> Result<Self> {
        let shape = Shape::from(shape);
        let storage = Storage::new(shape.numel(), dtype, device)?;
        Ok(Self { storage, shape })
    }

    /// Reinterpret the same storage under another shape with equal element count
    pub(crate) fn with_shape(&self, shape: &[usize]) -> Result<Self> {
        Self::from_parts(self.storage.clone(), shape)
    }

    /// Get the shape
    #[inline]
    pub fn shape(&self) -> &[usize] {
        self.shape.as_slice()
    }

    /// Get the number of dimensions (rank)
    #[inline]
    pub fn ndim(&self) -> usize {
        self.shape.ndim()
    }

    /// Get the total number of elements
    #[inline]
    pub fn numel(&self) -> usize {
        self.storage.len()
    }

    /// Get the element type
    #[inline]
    pub fn dtype(&self) -> DType {
        self.storage.dtype()
    }

    /// Get the device
    #[inline]
    pub fn device(&self) -> &R::Device {
        self.storage.device()
    }

    /// Get the underlying storage
    #[inline]
    pub fn storage(&self) -> &Storage<R> {
        &self.storage
    }

    /// Raw device pointer of the first element
    #[inline]
    pub fn ptr(&self) -> u64 {
        self.storage.ptr()
    }

    /// Copy the tensor contents to a host vector
    ///
    /// # Panics
    ///
    /// Panics if `T` does not match the tensor dtype or the copy fails.
    /// For a fallible alternative, use [`Self::try_to_vec`].
    pub fn to_vec<T: Element>(&self) -> Vec<T> {
        self.try_to_vec().expect("Tensor::to_vec failed")
    }

    /// Copy the tensor contents to a host vector (fallible version)
    ///
    /// `Bool` tensors are read as `u8`.
    pub fn try_to_vec<T: Element>(&self) -> Result<Vec<T>> {
        let matches = T::DTYPE == self.dtype()
            || (self.dtype() == DType::Bool && T::DTYPE == DType::U8);
        if !matches {
            return Err(Error::InvalidArgument {
                arg: "T",
                reason: format!(
                    "cannot read a {} tensor as {}",
                    self.dtype(),
                    T::DTYPE
                ),
            });
        }
        self.storage.to_vec()
    }
}

impl<R: Runtime> Clone for Tensor<R> {
    /// Clone creates a new tensor sharing the same storage (zero-copy)
    fn clone(&self) -> Self {
        Self {
            storage: self.storage.clone(),
            shape: self.shape.clone(),
        }
    }
}

impl<R: Runtime> fmt::Debug for Tensor<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tensor")
            .field("shape", &self.shape())
            .field("dtype", &self.dtype())
            .field("storage", &self.storage)
            .finish()
    }
}

impl<R: Runtime> fmt::Display for Tensor<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tensor({:?}, dtype={})", self.shape(), self.dtype())
    }
}
