//! Selection primitives for the CPU runtime

use super::kernels;
use super::{CpuClient, CpuRuntime};
use crate::dtype::DType;
use crate::error::{Error, Result};
use crate::ops::{CoordLayout, WhereConfig, WherePrimitives};
use crate::runtime::{Runtime, RuntimeClient, ScratchSpace};
use crate::tensor::Tensor;
use crate::{dispatch_dtype, dispatch_index_dtype};

impl CpuClient {
    /// Chunk length and chunk count when `numel` elements run in parallel
    ///
    /// `None` selects the serial kernels.
    fn parallel_chunks(&self, numel: usize) -> Option<(usize, usize)> {
        let chunk_len = self.rayon_min_len();
        if self.is_serial() || numel <= chunk_len {
            return None;
        }
        Some((chunk_len, kernels::chunk_count(numel, chunk_len)))
    }

    fn partials_bytes(&self, numel: usize) -> usize {
        self.parallel_chunks(numel)
            .map_or(0, |(_, chunks)| chunks * std::mem::size_of::<u64>())
    }

    /// Scratch pointer of the per-chunk partials, checked against its size
    fn partials_ptr(&self, numel: usize, scratch: ScratchSpace) -> Result<Option<(u64, usize)>> {
        let Some((chunk_len, _)) = self.parallel_chunks(numel) else {
            return Ok(None);
        };
        let needed = self.partials_bytes(numel);
        if scratch.size_bytes < needed || scratch.ptr == 0 {
            return Err(Error::InvalidArgument {
                arg: "scratch",
                reason: format!("need {needed} bytes, got {}", scratch.size_bytes),
            });
        }
        Ok(Some((scratch.ptr, chunk_len)))
    }
}

fn check_count_cell(count: ScratchSpace) -> Result<*mut u64> {
    if count.ptr == 0 || count.size_bytes < std::mem::size_of::<u64>() {
        return Err(Error::Internal(format!(
            "count cell must hold a u64, got {} bytes",
            count.size_bytes
        )));
    }
    Ok(count.ptr as *mut u64)
}

impl WherePrimitives<CpuRuntime> for CpuClient {
    const COUNT_DTYPE: DType = DType::U64;

    fn where_config(&self) -> &WhereConfig {
        &self.where_config
    }

    fn check_input_dtype(&self, dtype: DType) -> Result<()> {
        match dtype {
            DType::F16 | DType::BF16 if !cfg!(feature = "f16") => {
                Err(Error::unsupported_dtype(dtype, "nonzero"))
            }
            _ => Ok(()),
        }
    }

    fn check_index_dtype(&self, dtype: DType) -> Result<()> {
        if dtype.is_index_type() {
            Ok(())
        } else {
            Err(Error::unsupported_dtype(dtype, "nonzero"))
        }
    }

    fn count_scratch_bytes(&self, _dtype: DType, numel: usize) -> usize {
        self.partials_bytes(numel)
    }

    fn count_nonzero_into(
        &self,
        input: &Tensor<CpuRuntime>,
        count: ScratchSpace,
        scratch: ScratchSpace,
    ) -> Result<()> {
        let count_ptr = check_count_cell(count)?;
        let numel = input.numel();
        let input_ptr = input.ptr();
        let partials = self.partials_ptr(numel, scratch)?;

        let nnz = dispatch_dtype!(input.dtype(), T => {
            Ok(match partials {
                None => unsafe { kernels::count_nonzero_kernel(input_ptr as *const T, numel) },
                #[cfg(feature = "rayon")]
                Some((partials_ptr, chunk_len)) => self.install_parallelism(|| unsafe {
                    kernels::count_nonzero_parallel_kernel(
                        input_ptr as *const T,
                        numel,
                        partials_ptr as *mut u64,
                        chunk_len,
                    )
                }),
                #[cfg(not(feature = "rayon"))]
                Some(_) => unreachable!("parallel chunks without rayon"),
            })
        }, "count_nonzero")?;

        unsafe {
            *count_ptr = nnz as u64;
        }
        Ok(())
    }

    fn select_scratch_bytes(&self, _dtype: DType, numel: usize) -> usize {
        self.partials_bytes(numel)
    }

    fn select_flagged_into(
        &self,
        input: &Tensor<CpuRuntime>,
        selected: &Tensor<CpuRuntime>,
        count: ScratchSpace,
        scratch: ScratchSpace,
    ) -> Result<()> {
        let count_ptr = check_count_cell(count)?;
        let numel = input.numel();
        let capacity = selected.numel();
        let input_ptr = input.ptr();
        let out_ptr = selected.ptr();
        let partials = self.partials_ptr(numel, scratch)?;

        let total = dispatch_dtype!(input.dtype(), T => {
            dispatch_index_dtype!(selected.dtype(), I => {
                Ok(match partials {
                    None => unsafe {
                        kernels::select_flagged_kernel(
                            input_ptr as *const T,
                            numel,
                            out_ptr as *mut I,
                            capacity,
                        )
                    },
                    #[cfg(feature = "rayon")]
                    Some((partials_ptr, chunk_len)) => self.install_parallelism(|| unsafe {
                        kernels::select_flagged_parallel_kernel(
                            input_ptr as *const T,
                            numel,
                            out_ptr as *mut I,
                            capacity,
                            partials_ptr as *mut u64,
                            chunk_len,
                        )
                    }),
                    #[cfg(not(feature = "rayon"))]
                    Some(_) => unreachable!("parallel chunks without rayon"),
                })
            }, "select_flagged")
        }, "select_flagged")?;

        unsafe {
            *count_ptr = total as u64;
        }
        Ok(())
    }

    fn unravel_into(
        &self,
        selected: &Tensor<CpuRuntime>,
        shape: &[usize],
        layout: CoordLayout<'_, CpuRuntime>,
        _scratch: ScratchSpace,
    ) -> Result<()> {
        let nnz = selected.numel();
        let ndim = shape.len();
        if nnz == 0 || ndim == 0 {
            return Ok(());
        }

        let index_dtype = selected.dtype();
        let (bases, step) = coordinate_bases(selected, ndim, layout)?;
        let group_size = self.where_config.unravel_group_size.max(1);
        let selected_ptr = selected.ptr();

        dispatch_index_dtype!(index_dtype, I => {
            if self.is_serial() {
                unsafe {
                    kernels::unravel_kernel(selected_ptr as *const I, nnz, shape, &bases, step);
                }
            } else {
                #[cfg(feature = "rayon")]
                {
                    log::debug!(
                        "cpu unravel: {} groups of {}",
                        kernels::chunk_count(nnz, group_size).max(1),
                        group_size
                    );
                    self.install_parallelism(|| unsafe {
                        kernels::unravel_grouped_kernel(
                            selected_ptr as *const I,
                            nnz,
                            shape,
                            &bases,
                            step,
                            group_size,
                        );
                    });
                }
            }
            Ok(())
        }, "unravel")
    }

    fn read_count(&self, count: ScratchSpace) -> Result<usize> {
        check_count_cell(count)?;
        let mut host = [0u64];
        CpuRuntime::copy_from_device(count.ptr, bytemuck::cast_slice_mut(&mut host), self.device())?;
        Ok(host[0] as usize)
    }
}

/// Per-dimension output base addresses and the element step between rows.
fn coordinate_bases(
    selected: &Tensor<CpuRuntime>,
    ndim: usize,
    layout: CoordLayout<'_, CpuRuntime>,
) -> Result<(Vec<usize>, usize)> {
    let nnz = selected.numel();
    let index_dtype = selected.dtype();
    match layout {
        CoordLayout::InPlace { rest } => {
            if rest.len() + 1 != ndim {
                return Err(Error::InvalidArgument {
                    arg: "rest",
                    reason: format!("expected {} coordinate streams, got {}", ndim - 1, rest.len()),
                });
            }
            let mut bases = Vec::with_capacity(ndim);
            bases.push(selected.ptr() as usize);
            for out in rest {
                if out.numel() != nnz || out.dtype() != index_dtype {
                    return Err(Error::shape_mismatch(&[nnz], out.shape()));
                }
                bases.push(out.ptr() as usize);
            }
            Ok((bases, 1))
        }
        CoordLayout::Stacked { out } => {
            if out.shape() != [nnz, ndim] || out.dtype() != index_dtype {
                return Err(Error::shape_mismatch(&[nnz, ndim], out.shape()));
            }
            let elem = index_dtype.size_in_bytes();
            let base = out.ptr() as usize;
            Ok(((0..ndim).map(|d| base + d * elem).collect(), ndim))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::cpu::{CpuDevice, ParallelismConfig};
    use crate::runtime::{Allocator, RuntimeClient, ScratchBroker};

    fn parallel_client() -> CpuClient {
        CpuClient::new(CpuDevice::new()).with_parallelism(ParallelismConfig::new(None, Some(8)))
    }

    #[test]
    fn test_serial_needs_no_scratch() {
        let client = CpuClient::new(CpuDevice::new()).with_parallelism(ParallelismConfig::serial());
        assert_eq!(client.count_scratch_bytes(DType::F32, 1 << 20), 0);
        assert_eq!(client.select_scratch_bytes(DType::F32, 1 << 20), 0);
    }

    #[cfg(feature = "rayon")]
    #[test]
    fn test_parallel_scratch_is_one_partial_per_chunk() {
        let client = parallel_client();
        assert_eq!(client.count_scratch_bytes(DType::U8, 8), 0);
        assert_eq!(client.count_scratch_bytes(DType::U8, 17), 3 * 8);
    }

    #[cfg(feature = "rayon")]
    #[test]
    fn test_rejects_undersized_scratch() {
        let client = parallel_client();
        let device = CpuDevice::new();
        let input = Tensor::<CpuRuntime>::from_slice(&[1u8; 64], &[64], &device);
        let broker = ScratchBroker::new(client.allocator(), "test");
        let count = broker.acquire(8).unwrap();
        let err = client
            .count_nonzero_into(&input, count.space(), ScratchSpace::EMPTY)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { arg: "scratch", .. }));
    }

    #[test]
    fn test_count_through_broker() {
        let client = parallel_client();
        let device = CpuDevice::new();
        let data: Vec<f64> = (0..100).map(|i| if i % 3 == 0 { 1.0 } else { 0.0 }).collect();
        let input = Tensor::<CpuRuntime>::from_slice(&data, &[100], &device);

        let broker = ScratchBroker::new(client.allocator(), "test");
        let count = broker.acquire(8).unwrap();
        broker
            .run(client.count_scratch_bytes(DType::F64, 100), |scratch| {
                client.count_nonzero_into(&input, count.space(), scratch)
            })
            .unwrap();
        assert_eq!(client.read_count(count.space()).unwrap(), 34);
        assert_eq!(client.allocator().allocated_bytes(), 8);
        drop(count);
        assert_eq!(client.allocator().allocated_bytes(), 0);
    }

    #[test]
    fn test_rejects_missing_count_cell() {
        let client = CpuClient::new(CpuDevice::new());
        let device = CpuDevice::new();
        let input = Tensor::<CpuRuntime>::from_slice(&[1u8; 4], &[4], &device);
        let err = client
            .count_nonzero_into(&input, ScratchSpace::EMPTY, ScratchSpace::EMPTY)
            .unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
    }
}
