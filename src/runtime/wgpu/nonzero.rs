//! Selection primitives for the WebGPU runtime
//!
//! Inputs are F32, I32 or U32 and indices I32 or U32, the 32-bit types WGSL
//! can address. The count cell is a single u32.

use bytemuck::{Pod, Zeroable};

use super::client::require_buffer;
use super::shaders::{
    self, MAX_DIMS, TILE_SIZE, WORKGROUP_SIZE, workgroup_count,
};
use super::{WgpuClient, WgpuRuntime};
use crate::dtype::DType;
use crate::error::{Error, Result};
use crate::ops::{CoordLayout, WhereConfig, WherePrimitives};
use crate::runtime::{Runtime, ScratchSpace};
use crate::tensor::Tensor;

/// Uniform block of the tile shaders
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct TileParams {
    numel: u32,
    num_tiles: u32,
    capacity: u32,
    _pad: u32,
}

/// Uniform block of the unravel shader
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct UnravelParams {
    nnz: u32,
    ndim: u32,
    stacked: u32,
    _pad: u32,
    shape: [u32; MAX_DIMS],
}

const INDEX_BYTES: usize = 4;

#[inline]
fn num_tiles(numel: usize) -> usize {
    numel.div_ceil(TILE_SIZE as usize)
}

/// One u32 partial per tile, never an empty binding
#[inline]
fn partials_bytes(numel: usize) -> usize {
    num_tiles(numel).max(1) * 4
}

fn check_count_cell(count: ScratchSpace) -> Result<()> {
    if count.ptr == 0 || count.size_bytes < std::mem::size_of::<u32>() {
        return Err(Error::Internal(format!(
            "count cell must hold a u32, got {} bytes",
            count.size_bytes
        )));
    }
    Ok(())
}

fn check_scratch(scratch: ScratchSpace, needed: usize) -> Result<()> {
    if scratch.size_bytes < needed || scratch.ptr == 0 {
        return Err(Error::InvalidArgument {
            arg: "scratch",
            reason: format!("need {needed} bytes, got {}", scratch.size_bytes),
        });
    }
    Ok(())
}

impl WgpuClient {
    /// Largest single dispatch along x on this device
    fn max_workgroups(&self) -> u32 {
        self.device_id.max_workgroups_per_dimension().max(1)
    }

    /// Most tiles one call can cover: one workgroup per tile, u32 flat indices
    fn max_tiles(&self) -> usize {
        let addressable = u32::MAX as usize / TILE_SIZE as usize;
        (self.max_workgroups() as usize).min(addressable)
    }

    fn tile_params(&self, numel: usize, capacity: usize) -> wgpu::Buffer {
        let params = TileParams {
            numel: numel as u32,
            num_tiles: num_tiles(numel) as u32,
            capacity: capacity as u32,
            _pad: 0,
        };
        self.create_uniform_buffer("nonzero_tile_params", &params)
    }

    /// Encode `count_tiles` for `input` into the scratch partials
    fn launch_tiles(
        &self,
        input: &Tensor<WgpuRuntime>,
        partials: &wgpu::Buffer,
        params: &wgpu::Buffer,
    ) -> Result<()> {
        let input_buf = require_buffer(input.ptr(), "nonzero input")?;
        shaders::launch_count_tiles(
            self.pipeline_cache(),
            self.wgpu_queue(),
            &input_buf,
            partials,
            params,
            num_tiles(input.numel()) as u32,
            input.dtype(),
        )
    }
}

impl WherePrimitives<WgpuRuntime> for WgpuClient {
    const COUNT_DTYPE: DType = DType::U32;

    fn where_config(&self) -> &WhereConfig {
        &self.where_config
    }

    fn check_input_dtype(&self, dtype: DType) -> Result<()> {
        match dtype {
            DType::F32 | DType::I32 | DType::U32 => Ok(()),
            _ => Err(Error::unsupported_dtype(dtype, "wgpu nonzero")),
        }
    }

    fn check_index_dtype(&self, dtype: DType) -> Result<()> {
        match dtype {
            DType::I32 | DType::U32 => Ok(()),
            _ => Err(Error::unsupported_dtype(dtype, "wgpu nonzero")),
        }
    }

    fn check_shape(&self, shape: &[usize]) -> Result<()> {
        if shape.len() > MAX_DIMS {
            return Err(Error::backend_limitation(
                "wgpu",
                "nonzero",
                format!("rank {} exceeds maximum of {MAX_DIMS} dimensions", shape.len()),
            ));
        }
        let numel: usize = shape.iter().product();
        let max_tiles = self.max_tiles();
        if num_tiles(numel) > max_tiles {
            return Err(Error::backend_limitation(
                "wgpu",
                "nonzero",
                format!("{numel} elements exceed {max_tiles} tiles of {TILE_SIZE}"),
            ));
        }
        Ok(())
    }

    fn count_scratch_bytes(&self, _dtype: DType, numel: usize) -> usize {
        partials_bytes(numel)
    }

    fn count_nonzero_into(
        &self,
        input: &Tensor<WgpuRuntime>,
        count: ScratchSpace,
        scratch: ScratchSpace,
    ) -> Result<()> {
        check_count_cell(count)?;
        let numel = input.numel();
        check_scratch(scratch, partials_bytes(numel))?;
        let partials = require_buffer(scratch.ptr, "count scratch")?;
        let count_buf = require_buffer(count.ptr, "count cell")?;
        let params = self.tile_params(numel, 0);

        self.launch_tiles(input, &partials, &params)?;
        shaders::launch_sum_partials(
            self.pipeline_cache(),
            self.wgpu_queue(),
            &partials,
            &count_buf,
            &params,
        )
    }

    fn select_scratch_bytes(&self, _dtype: DType, numel: usize) -> usize {
        partials_bytes(numel)
    }

    fn select_flagged_into(
        &self,
        input: &Tensor<WgpuRuntime>,
        selected: &Tensor<WgpuRuntime>,
        count: ScratchSpace,
        scratch: ScratchSpace,
    ) -> Result<()> {
        check_count_cell(count)?;
        let numel = input.numel();
        check_scratch(scratch, partials_bytes(numel))?;
        let partials = require_buffer(scratch.ptr, "select scratch")?;
        let count_buf = require_buffer(count.ptr, "count cell")?;
        let input_buf = require_buffer(input.ptr(), "nonzero input")?;
        let selected_buf = require_buffer(selected.ptr(), "selected indices")?;
        let params = self.tile_params(numel, selected.numel());

        self.launch_tiles(input, &partials, &params)?;
        shaders::launch_scan_partials(
            self.pipeline_cache(),
            self.wgpu_queue(),
            &partials,
            &count_buf,
            &params,
        )?;
        shaders::launch_scatter(
            self.pipeline_cache(),
            self.wgpu_queue(),
            &input_buf,
            &partials,
            &selected_buf,
            &params,
            num_tiles(numel) as u32,
            input.dtype(),
            selected.dtype(),
        )
    }

    /// Planar scratch for dimensions `1..D` when unravelling in place
    fn unravel_scratch_bytes(&self, nnz: usize, ndim: usize, stacked: bool) -> usize {
        if stacked {
            0
        } else {
            ndim.saturating_sub(1) * nnz * INDEX_BYTES
        }
    }

    fn unravel_into(
        &self,
        selected: &Tensor<WgpuRuntime>,
        shape: &[usize],
        layout: CoordLayout<'_, WgpuRuntime>,
        scratch: ScratchSpace,
    ) -> Result<()> {
        let nnz = selected.numel();
        let ndim = shape.len();
        if nnz == 0 || ndim == 0 {
            return Ok(());
        }
        self.check_shape(shape)?;

        let index_dtype = selected.dtype();
        let selected_buf = require_buffer(selected.ptr(), "selected indices")?;
        let stacked = layout.is_stacked();

        let coords_buf = match &layout {
            CoordLayout::InPlace { rest } => {
                if rest.len() + 1 != ndim {
                    return Err(Error::InvalidArgument {
                        arg: "rest",
                        reason: format!(
                            "expected {} coordinate streams, got {}",
                            ndim - 1,
                            rest.len()
                        ),
                    });
                }
                if let Some(out) = rest
                    .iter()
                    .find(|out| out.numel() != nnz || out.dtype() != index_dtype)
                {
                    return Err(Error::shape_mismatch(&[nnz], out.shape()));
                }
                check_scratch(scratch, self.unravel_scratch_bytes(nnz, ndim, false))?;
                require_buffer(scratch.ptr, "unravel scratch")?
            }
            CoordLayout::Stacked { out } => {
                if out.shape() != [nnz, ndim] || out.dtype() != index_dtype {
                    return Err(Error::shape_mismatch(&[nnz, ndim], out.shape()));
                }
                require_buffer(out.ptr(), "argwhere output")?
            }
        };

        let mut dims = [1u32; MAX_DIMS];
        for (dst, &size) in dims.iter_mut().zip(shape) {
            *dst = size as u32;
        }
        let params = self.create_uniform_buffer(
            "nonzero_unravel_params",
            &UnravelParams {
                nnz: nnz as u32,
                ndim: ndim as u32,
                stacked: stacked as u32,
                _pad: 0,
                shape: dims,
            },
        );

        let workgroups = workgroup_count(nnz).clamp(1, self.max_workgroups());
        log::debug!(
            "wgpu unravel: {nnz} indices, {workgroups} workgroups of {WORKGROUP_SIZE}"
        );
        shaders::launch_unravel(
            self.pipeline_cache(),
            self.wgpu_queue(),
            &selected_buf,
            &coords_buf,
            &params,
            workgroups,
            index_dtype,
        )?;

        if let CoordLayout::InPlace { rest } = layout {
            let segment = (nnz * INDEX_BYTES) as u64;
            let mut encoder = self.pipeline_cache().create_encoder("nonzero_unravel_copy");
            for (d, out) in rest.iter().enumerate() {
                let dst = require_buffer(out.ptr(), "coordinate stream")?;
                encoder.copy_buffer_to_buffer(&coords_buf, d as u64 * segment, &dst, 0, segment);
            }
            self.wgpu_queue().submit(std::iter::once(encoder.finish()));
        }
        Ok(())
    }

    fn read_count(&self, count: ScratchSpace) -> Result<usize> {
        check_count_cell(count)?;
        let mut host = [0u32];
        WgpuRuntime::copy_from_device(count.ptr, bytemuck::cast_slice_mut(&mut host), &self.device_id)?;
        Ok(host[0] as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::RuntimeClient;

    #[test]
    fn test_params_layout_matches_wgsl() {
        assert_eq!(std::mem::size_of::<TileParams>(), 16);
        assert_eq!(std::mem::size_of::<UnravelParams>(), 48);
    }

    #[test]
    fn test_partials_bytes() {
        assert_eq!(partials_bytes(0), 4);
        assert_eq!(partials_bytes(1), 4);
        assert_eq!(partials_bytes(TILE_SIZE as usize), 4);
        assert_eq!(partials_bytes(TILE_SIZE as usize + 1), 8);
    }

    #[test]
    fn test_tile_limit_follows_device_limits() {
        let Ok(client) = WgpuClient::new(crate::runtime::wgpu::WgpuDevice::new(0)) else {
            println!("No GPU available, skipping test");
            return;
        };
        let granted = client.wgpu_device().limits().max_compute_workgroups_per_dimension;
        assert_eq!(client.device().max_workgroups_per_dimension(), granted);
        assert!(client.max_tiles() <= granted as usize);
    }

    #[test]
    fn test_rejects_rank_and_size_limits() {
        let Ok(client) = WgpuClient::new(crate::runtime::wgpu::WgpuDevice::new(0)) else {
            println!("No GPU available, skipping test");
            return;
        };
        assert!(matches!(
            client.check_shape(&[1; 9]),
            Err(Error::BackendLimitation { backend: "wgpu", .. })
        ));
        assert!(matches!(
            client.check_shape(&[TILE_SIZE as usize * client.max_tiles() + 1]),
            Err(Error::BackendLimitation { .. })
        ));
        assert!(client.check_shape(&[TILE_SIZE as usize * client.max_tiles()]).is_ok());
        assert!(client.check_shape(&[2, 3, 4]).is_ok());
        assert!(matches!(
            client.check_input_dtype(DType::U8),
            Err(Error::UnsupportedDType { dtype: DType::U8, .. })
        ));
        assert!(client.check_index_dtype(DType::I64).is_err());
    }
}
