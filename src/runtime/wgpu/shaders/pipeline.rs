//! WGSL compute pipeline infrastructure
//!
//! Caches shader modules, bind group layouts and compute pipelines, and
//! records single-dispatch compute passes.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Result;
use wgpu::{
    BindGroup, BindGroupDescriptor, BindGroupEntry, BindGroupLayout, BindGroupLayoutDescriptor,
    BindGroupLayoutEntry, BindingType, Buffer, BufferBindingType, CommandEncoder, ComputePipeline,
    ComputePipelineDescriptor, Device, PipelineLayoutDescriptor, ShaderModule,
    ShaderModuleDescriptor, ShaderSource, ShaderStages,
};

/// Threads per workgroup for every nonzero shader
pub const WORKGROUP_SIZE: u32 = 256;

/// Cache for compute pipelines keyed by (module name, entry point)
pub struct PipelineCache {
    device: Arc<Device>,
    modules: Mutex<HashMap<&'static str, Arc<ShaderModule>>>,
    pipelines: Mutex<HashMap<(&'static str, &'static str), Arc<ComputePipeline>>>,
    layouts: Mutex<HashMap<LayoutKey, Arc<BindGroupLayout>>>,
}

/// Key for bind group layout cache
///
/// Storage buffers occupy bindings `0..num_storage_buffers`, uniform buffers
/// follow them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LayoutKey {
    /// Number of storage buffers in the layout
    pub num_storage_buffers: u32,
    /// Number of uniform buffers in the layout
    pub num_uniform_buffers: u32,
}

impl PipelineCache {
    /// Create an empty pipeline cache
    pub fn new(device: Arc<Device>) -> Self {
        Self {
            device,
            modules: Mutex::new(HashMap::new()),
            pipelines: Mutex::new(HashMap::new()),
            layouts: Mutex::new(HashMap::new()),
        }
    }

    /// Get or create a shader module.
    ///
    /// `source` is only invoked the first time `name` is requested.
    pub fn get_or_create_module(
        &self,
        name: &'static str,
        source: impl FnOnce() -> Result<String>,
    ) -> Result<Arc<ShaderModule>> {
        let mut modules = self.modules.lock();
        if let Some(module) = modules.get(name) {
            return Ok(module.clone());
        }

        let source = source()?;
        log::debug!("compiling WGSL module {name}");
        let module = self.device.create_shader_module(ShaderModuleDescriptor {
            label: Some(name),
            source: ShaderSource::Wgsl(source.into()),
        });

        let module = Arc::new(module);
        modules.insert(name, module.clone());
        Ok(module)
    }

    /// Get or create a compute pipeline
    pub fn get_or_create_pipeline(
        &self,
        module_name: &'static str,
        entry_point: &'static str,
        module: &ShaderModule,
        layout: &BindGroupLayout,
    ) -> Arc<ComputePipeline> {
        let key = (module_name, entry_point);
        let mut pipelines = self.pipelines.lock();

        if let Some(pipeline) = pipelines.get(&key) {
            return pipeline.clone();
        }

        let pipeline_layout = self
            .device
            .create_pipeline_layout(&PipelineLayoutDescriptor {
                label: Some(&format!("{}_layout", module_name)),
                bind_group_layouts: &[layout],
                immediate_size: 0,
            });

        let pipeline = self
            .device
            .create_compute_pipeline(&ComputePipelineDescriptor {
                label: Some(&format!("{}_{}", module_name, entry_point)),
                layout: Some(&pipeline_layout),
                module,
                entry_point: Some(entry_point),
                compilation_options: Default::default(),
                cache: None,
            });

        let pipeline = Arc::new(pipeline);
        pipelines.insert(key, pipeline.clone());
        pipeline
    }

    /// Get or create a bind group layout
    pub fn get_or_create_layout(&self, key: LayoutKey) -> Arc<BindGroupLayout> {
        let mut layouts = self.layouts.lock();

        if let Some(layout) = layouts.get(&key) {
            return layout.clone();
        }

        let buffer_entry = |binding: u32, ty: BufferBindingType| BindGroupLayoutEntry {
            binding,
            visibility: ShaderStages::COMPUTE,
            ty: BindingType::Buffer {
                ty,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };

        let storage = (0..key.num_storage_buffers)
            .map(|i| buffer_entry(i, BufferBindingType::Storage { read_only: false }));
        let uniform = (0..key.num_uniform_buffers)
            .map(|i| buffer_entry(key.num_storage_buffers + i, BufferBindingType::Uniform));
        let entries: Vec<BindGroupLayoutEntry> = storage.chain(uniform).collect();

        let layout = self
            .device
            .create_bind_group_layout(&BindGroupLayoutDescriptor {
                label: Some("nonzero_layout"),
                entries: &entries,
            });

        let layout = Arc::new(layout);
        layouts.insert(key, layout.clone());
        layout
    }

    /// Create a bind group binding `buffers` in order
    pub fn create_bind_group(&self, layout: &BindGroupLayout, buffers: &[&Buffer]) -> BindGroup {
        let entries: Vec<BindGroupEntry> = buffers
            .iter()
            .enumerate()
            .map(|(i, buffer)| BindGroupEntry {
                binding: i as u32,
                resource: buffer.as_entire_binding(),
            })
            .collect();

        self.device.create_bind_group(&BindGroupDescriptor {
            label: Some("nonzero_bind_group"),
            layout,
            entries: &entries,
        })
    }

    /// Create a command encoder on the cached device
    pub fn create_encoder(&self, label: &str) -> CommandEncoder {
        self.device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) })
    }
}

/// Record one compute pass dispatching `workgroups` workgroups along x
pub fn record_dispatch(
    encoder: &mut CommandEncoder,
    label: &str,
    pipeline: &ComputePipeline,
    bind_group: &BindGroup,
    workgroups: u32,
) {
    let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
        label: Some(label),
        timestamp_writes: None,
    });
    pass.set_pipeline(pipeline);
    pass.set_bind_group(0, Some(bind_group), &[]);
    pass.dispatch_workgroups(workgroups, 1, 1);
}

/// Compute number of workgroups for n threads
#[inline]
pub fn workgroup_count(n: usize) -> u32 {
    n.div_ceil(WORKGROUP_SIZE as usize) as u32
}
