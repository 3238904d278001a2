//! Nonzero WGSL kernel launchers
//!
//! Each launcher records one dispatch and submits it to the queue without
//! waiting. Submissions on one queue execute in order.

use wgpu::{Buffer, Queue};

use super::nonzero_wgsl::{
    generate_count_tiles_shader, generate_partials_shader, generate_scatter_shader,
    generate_unravel_shader,
};
use super::pipeline::{LayoutKey, PipelineCache, record_dispatch};
use crate::dtype::DType;
use crate::error::{Error, Result};

const PARTIALS_MODULE: &str = "nonzero_partials";

fn count_tiles_module(dtype: DType) -> Result<&'static str> {
    match dtype {
        DType::F32 => Ok("nonzero_count_tiles_f32"),
        DType::I32 => Ok("nonzero_count_tiles_i32"),
        DType::U32 => Ok("nonzero_count_tiles_u32"),
        _ => Err(Error::unsupported_dtype(dtype, "wgpu nonzero")),
    }
}

fn scatter_module(dtype: DType, index_dtype: DType) -> Result<&'static str> {
    match (dtype, index_dtype) {
        (DType::F32, DType::I32) => Ok("nonzero_scatter_f32_i32"),
        (DType::F32, DType::U32) => Ok("nonzero_scatter_f32_u32"),
        (DType::I32, DType::I32) => Ok("nonzero_scatter_i32_i32"),
        (DType::I32, DType::U32) => Ok("nonzero_scatter_i32_u32"),
        (DType::U32, DType::I32) => Ok("nonzero_scatter_u32_i32"),
        (DType::U32, DType::U32) => Ok("nonzero_scatter_u32_u32"),
        (DType::F32 | DType::I32 | DType::U32, _) => {
            Err(Error::unsupported_dtype(index_dtype, "wgpu nonzero"))
        }
        _ => Err(Error::unsupported_dtype(dtype, "wgpu nonzero")),
    }
}

fn unravel_module(index_dtype: DType) -> Result<&'static str> {
    match index_dtype {
        DType::I32 => Ok("nonzero_unravel_i32"),
        DType::U32 => Ok("nonzero_unravel_u32"),
        _ => Err(Error::unsupported_dtype(index_dtype, "wgpu nonzero")),
    }
}

#[allow(clippy::too_many_arguments)]
fn launch(
    cache: &PipelineCache,
    queue: &Queue,
    module_name: &'static str,
    source: impl FnOnce() -> Result<String>,
    entry_point: &'static str,
    buffers: &[&Buffer],
    num_storage_buffers: u32,
    workgroups: u32,
) -> Result<()> {
    let module = cache.get_or_create_module(module_name, source)?;
    let layout = cache.get_or_create_layout(LayoutKey {
        num_storage_buffers,
        num_uniform_buffers: 1,
    });
    let pipeline = cache.get_or_create_pipeline(module_name, entry_point, &module, &layout);
    let bind_group = cache.create_bind_group(&layout, buffers);

    let mut encoder = cache.create_encoder(entry_point);
    record_dispatch(&mut encoder, entry_point, &pipeline, &bind_group, workgroups);
    queue.submit(std::iter::once(encoder.finish()));
    Ok(())
}

/// Per-tile non-zero counts: `partials[t]` for `t < num_tiles`.
pub fn launch_count_tiles(
    cache: &PipelineCache,
    queue: &Queue,
    input: &Buffer,
    partials: &Buffer,
    params: &Buffer,
    num_tiles: u32,
    dtype: DType,
) -> Result<()> {
    let module_name = count_tiles_module(dtype)?;
    launch(
        cache,
        queue,
        module_name,
        || generate_count_tiles_shader(dtype),
        "count_tiles",
        &[input, partials, params],
        2,
        num_tiles,
    )
}

/// `count[0] = sum(partials)` on a single workgroup.
pub fn launch_sum_partials(
    cache: &PipelineCache,
    queue: &Queue,
    partials: &Buffer,
    count: &Buffer,
    params: &Buffer,
) -> Result<()> {
    launch(
        cache,
        queue,
        PARTIALS_MODULE,
        || Ok(generate_partials_shader()),
        "sum_partials",
        &[partials, count, params],
        2,
        1,
    )
}

/// Exclusive scan of `partials` in place; `count[0]` receives the total.
pub fn launch_scan_partials(
    cache: &PipelineCache,
    queue: &Queue,
    partials: &Buffer,
    count: &Buffer,
    params: &Buffer,
) -> Result<()> {
    launch(
        cache,
        queue,
        PARTIALS_MODULE,
        || Ok(generate_partials_shader()),
        "scan_partials",
        &[partials, count, params],
        2,
        1,
    )
}

/// Ordered scatter of non-zero flat indices into `selected`.
#[allow(clippy::too_many_arguments)]
pub fn launch_scatter(
    cache: &PipelineCache,
    queue: &Queue,
    input: &Buffer,
    partials: &Buffer,
    selected: &Buffer,
    params: &Buffer,
    num_tiles: u32,
    dtype: DType,
    index_dtype: DType,
) -> Result<()> {
    let module_name = scatter_module(dtype, index_dtype)?;
    launch(
        cache,
        queue,
        module_name,
        || generate_scatter_shader(dtype, index_dtype),
        "scatter",
        &[input, partials, selected, params],
        3,
        num_tiles,
    )
}

/// Unravel selected flat indices into `coords` (and `selected` in place).
pub fn launch_unravel(
    cache: &PipelineCache,
    queue: &Queue,
    selected: &Buffer,
    coords: &Buffer,
    params: &Buffer,
    workgroups: u32,
    index_dtype: DType,
) -> Result<()> {
    let module_name = unravel_module(index_dtype)?;
    launch(
        cache,
        queue,
        module_name,
        || generate_unravel_shader(index_dtype),
        "unravel",
        &[selected, coords, params],
        2,
        workgroups,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::wgpu::{WgpuClient, WgpuDevice};
    use wgpu::naga::{AddressSpace, StorageAccess};

    /// (module, entry point, storage buffers, source) for every kernel the
    /// launchers can dispatch
    fn kernel_table() -> Vec<(&'static str, &'static str, u32, String)> {
        let mut kernels = vec![
            (PARTIALS_MODULE, "sum_partials", 2, generate_partials_shader()),
            (PARTIALS_MODULE, "scan_partials", 2, generate_partials_shader()),
        ];
        for dtype in [DType::F32, DType::I32, DType::U32] {
            kernels.push((
                count_tiles_module(dtype).unwrap(),
                "count_tiles",
                2,
                generate_count_tiles_shader(dtype).unwrap(),
            ));
            for index_dtype in [DType::I32, DType::U32] {
                kernels.push((
                    scatter_module(dtype, index_dtype).unwrap(),
                    "scatter",
                    3,
                    generate_scatter_shader(dtype, index_dtype).unwrap(),
                ));
            }
        }
        for index_dtype in [DType::I32, DType::U32] {
            kernels.push((
                unravel_module(index_dtype).unwrap(),
                "unravel",
                2,
                generate_unravel_shader(index_dtype).unwrap(),
            ));
        }
        kernels
    }

    #[test]
    fn test_shader_bindings_match_layout() {
        for (name, entry, num_storage, source) in kernel_table() {
            let module = wgpu::naga::front::wgsl::parse_str(&source)
                .unwrap_or_else(|e| panic!("{name}: {e}"));
            let mut storage = Vec::new();
            let mut uniform = Vec::new();
            for (_, var) in module.global_variables.iter() {
                let Some(binding) = &var.binding else {
                    continue;
                };
                assert_eq!(binding.group, 0, "{name}");
                match var.space {
                    AddressSpace::Storage { access } => {
                        // LayoutKey layouts bind every storage buffer read-write.
                        assert!(
                            access.contains(StorageAccess::LOAD | StorageAccess::STORE),
                            "{name}::{entry}: binding {} is not read_write",
                            binding.binding
                        );
                        storage.push(binding.binding);
                    }
                    AddressSpace::Uniform => uniform.push(binding.binding),
                    other => panic!("{name}: unexpected address space {other:?}"),
                }
            }
            storage.sort_unstable();
            assert_eq!(storage, (0..num_storage).collect::<Vec<_>>(), "{name}");
            assert_eq!(uniform, vec![num_storage], "{name}");
            assert!(
                module.entry_points.iter().any(|ep| ep.name == entry),
                "{name}: missing entry point {entry}"
            );
        }
    }

    #[test]
    fn test_every_pipeline_builds() {
        let Ok(client) = WgpuClient::new(WgpuDevice::new(0)) else {
            println!("No GPU available, skipping test");
            return;
        };
        let cache = client.pipeline_cache();
        for (name, entry, num_storage, source) in kernel_table() {
            let module = cache.get_or_create_module(name, || Ok(source)).unwrap();
            let layout = cache.get_or_create_layout(LayoutKey {
                num_storage_buffers: num_storage,
                num_uniform_buffers: 1,
            });
            cache.get_or_create_pipeline(name, entry, &module, &layout);
        }
    }

    #[test]
    fn test_cached_module_skips_generation() {
        let Ok(client) = WgpuClient::new(WgpuDevice::new(0)) else {
            println!("No GPU available, skipping test");
            return;
        };
        let cache = client.pipeline_cache();
        let first = cache
            .get_or_create_module(PARTIALS_MODULE, || Ok(generate_partials_shader()))
            .unwrap();
        let second = cache
            .get_or_create_module(PARTIALS_MODULE, || {
                Err(Error::Internal("regenerated a cached module".into()))
            })
            .unwrap();
        assert!(std::sync::Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_module_names_are_distinct() {
        let mut names = vec![
            PARTIALS_MODULE,
            unravel_module(DType::I32).unwrap(),
            unravel_module(DType::U32).unwrap(),
        ];
        for dtype in [DType::F32, DType::I32, DType::U32] {
            names.push(count_tiles_module(dtype).unwrap());
            for index_dtype in [DType::I32, DType::U32] {
                names.push(scatter_module(dtype, index_dtype).unwrap());
            }
        }
        let total = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), total);
    }

    #[test]
    fn test_scatter_module_reports_offending_dtype() {
        assert!(matches!(
            scatter_module(DType::F32, DType::I64),
            Err(Error::UnsupportedDType {
                dtype: DType::I64,
                ..
            })
        ));
        assert!(matches!(
            scatter_module(DType::U8, DType::I32),
            Err(Error::UnsupportedDType { dtype: DType::U8, .. })
        ));
    }
}
