//! WebGPU Client implementation.
//!
//! `WgpuClient` owns the WebGPU device and queue for operation dispatch.
//! Clones share the device, queue, allocator statistics and pipeline cache.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use wgpu::{Buffer, BufferDescriptor, BufferUsages, Device, Queue};

use super::WgpuRuntime;
use super::device::{WgpuDevice, WgpuError, query_adapter_info_blocking};
use super::shaders::PipelineCache;
use crate::error::{Error, Result};
use crate::ops::WhereConfig;
use crate::runtime::{DefaultAllocator, Runtime, RuntimeClient};

/// Timeout for a blocking wait on the queue
const POLL_TIMEOUT: Duration = Duration::from_secs(60);

/// Allocator for transient WebGPU buffers
pub type WgpuAllocator = DefaultAllocator<WgpuDevice>;

/// WebGPU Runtime Client.
///
/// All passes of an operation are submitted through this client's queue, so
/// they execute in submission order.
#[derive(Clone)]
pub struct WgpuClient {
    /// GPU device identifier
    pub(crate) device_id: WgpuDevice,

    /// WebGPU device handle
    pub(crate) wgpu_device: Arc<Device>,

    /// WebGPU queue for command submission
    pub(crate) queue: Arc<Queue>,

    /// Allocator for scratch buffers
    pub(crate) allocator: WgpuAllocator,

    /// Pipeline cache for compute shaders
    pub(crate) pipeline_cache: Arc<PipelineCache>,

    pub(crate) where_config: WhereConfig,
}

impl std::fmt::Debug for WgpuClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WgpuClient")
            .field("device", &self.device_id)
            .field("where_config", &self.where_config)
            .finish_non_exhaustive()
    }
}

impl WgpuClient {
    /// Get the client for a device, initializing the GPU on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if no suitable adapter is found or device creation
    /// fails.
    pub fn new(device: WgpuDevice) -> std::result::Result<Self, WgpuError> {
        super::cache::get_or_create_client(&device)
    }

    pub(super) fn new_uncached(index: usize) -> std::result::Result<Self, WgpuError> {
        let (adapter, info) = query_adapter_info_blocking(index)?;

        let (wgpu_device, queue) = pollster::block_on(async {
            adapter
                .request_device(&wgpu::DeviceDescriptor {
                    label: Some("argwhere WebGPU Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: wgpu::MemoryHints::Performance,
                    trace: wgpu::Trace::Off,
                    experimental_features: wgpu::ExperimentalFeatures::default(),
                })
                .await
        })
        .map_err(|e| WgpuError::DeviceError(format!("{:?}", e)))?;

        let wgpu_device = Arc::new(wgpu_device);
        let queue = Arc::new(queue);
        let pipeline_cache = Arc::new(PipelineCache::new(wgpu_device.clone()));
        let info = Arc::new(info.with_limits(wgpu_device.limits()));
        let device_id = WgpuDevice::with_info(index, info);
        let allocator = DefaultAllocator::new(
            device_id.clone(),
            WgpuRuntime::allocate,
            WgpuRuntime::deallocate,
        );

        Ok(Self {
            device_id,
            wgpu_device,
            queue,
            allocator,
            pipeline_cache,
            where_config: WhereConfig::default(),
        })
    }

    /// Client with a different pipeline configuration
    pub fn with_where_config(&self, config: WhereConfig) -> Self {
        let mut client = self.clone();
        client.where_config = config;
        client
    }

    /// Get reference to the WebGPU device.
    #[inline]
    pub fn wgpu_device(&self) -> &Device {
        &self.wgpu_device
    }

    /// Get reference to the WebGPU queue.
    #[inline]
    pub fn wgpu_queue(&self) -> &Queue {
        &self.queue
    }

    #[inline]
    pub(crate) fn pipeline_cache(&self) -> &PipelineCache {
        &self.pipeline_cache
    }

    /// Create a staging buffer for CPU readback.
    pub(crate) fn create_staging_buffer(&self, label: &str, size: u64) -> Buffer {
        self.wgpu_device.create_buffer(&BufferDescriptor {
            label: Some(label),
            size,
            usage: BufferUsages::MAP_READ | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    /// Create a uniform buffer holding `params`.
    pub(crate) fn create_uniform_buffer<T: bytemuck::Pod>(&self, label: &str, params: &T) -> Buffer {
        let buffer = self.wgpu_device.create_buffer(&BufferDescriptor {
            label: Some(label),
            size: std::mem::size_of::<T>() as u64,
            usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        self.queue
            .write_buffer(&buffer, 0, bytemuck::bytes_of(params));
        buffer
    }

    /// Submit commands and wait for completion.
    pub(crate) fn submit_and_wait(&self, encoder: wgpu::CommandEncoder) -> Result<()> {
        let submission = self.queue.submit(std::iter::once(encoder.finish()));
        self.wgpu_device
            .poll(wgpu::PollType::Wait {
                submission_index: Some(submission),
                timeout: Some(POLL_TIMEOUT),
            })
            .map_err(|e| Error::Backend(format!("GPU poll failed: {e}")))?;
        Ok(())
    }

    /// Map a staging buffer and copy its leading bytes into `output` (blocking).
    pub(crate) fn read_buffer(&self, staging: &Buffer, output: &mut [u8]) -> Result<()> {
        let slice = staging.slice(..);

        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });

        self.wgpu_device
            .poll(wgpu::PollType::Wait {
                submission_index: None,
                timeout: Some(POLL_TIMEOUT),
            })
            .map_err(|e| Error::Backend(format!("GPU poll failed during buffer read: {e}")))?;

        let map_result = receiver.recv().map_err(|_| {
            Error::Backend("map_async callback was not invoked during buffer read".into())
        })?;
        map_result
            .map_err(|e| Error::Backend(format!("map_async failed during buffer read: {e}")))?;

        {
            let data = slice.get_mapped_range();
            output.copy_from_slice(&data[..output.len()]);
        }

        staging.unmap();
        Ok(())
    }
}

impl RuntimeClient<WgpuRuntime> for WgpuClient {
    fn device(&self) -> &WgpuDevice {
        &self.device_id
    }

    fn synchronize(&self) {
        if let Err(e) = self.wgpu_device.poll(wgpu::PollType::Wait {
            submission_index: None,
            timeout: Some(POLL_TIMEOUT),
        }) {
            log::warn!("wgpu synchronize failed: {e}");
        }
    }

    fn allocator(&self) -> &WgpuAllocator {
        &self.allocator
    }
}

// ============================================================================
// Buffer registry
// ============================================================================

/// Maps allocation IDs to buffers.
///
/// WebGPU doesn't expose raw GPU pointers, so storages and scratch regions
/// carry a registry ID in place of an address. ID 0 is never registered.
static BUFFER_REGISTRY: std::sync::OnceLock<parking_lot::Mutex<HashMap<u64, Arc<Buffer>>>> =
    std::sync::OnceLock::new();

static BUFFER_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

fn get_buffer_registry() -> &'static parking_lot::Mutex<HashMap<u64, Arc<Buffer>>> {
    BUFFER_REGISTRY.get_or_init(|| parking_lot::Mutex::new(HashMap::new()))
}

/// Get a buffer by its ID.
pub(crate) fn get_buffer(id: u64) -> Option<Arc<Buffer>> {
    if id == 0 {
        return None;
    }
    get_buffer_registry().lock().get(&id).cloned()
}

/// Get a buffer by its ID or fail with `Error::Backend`.
pub(crate) fn require_buffer(id: u64, what: &str) -> Result<Arc<Buffer>> {
    get_buffer(id).ok_or_else(|| Error::Backend(format!("{what}: no wgpu buffer with id {id}")))
}

/// Create a storage buffer of at least `size_bytes` and register it.
///
/// Sizes are rounded up to the 4-byte copy alignment.
pub(super) fn register_buffer(device: &Device, size_bytes: usize) -> u64 {
    let aligned_size = size_bytes.div_ceil(4) * 4;

    let buffer = device.create_buffer(&BufferDescriptor {
        label: Some("argwhere buffer"),
        size: aligned_size as u64,
        usage: BufferUsages::STORAGE | BufferUsages::COPY_DST | BufferUsages::COPY_SRC,
        mapped_at_creation: false,
    });

    let id = BUFFER_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
    get_buffer_registry().lock().insert(id, Arc::new(buffer));
    id
}

/// Drop a registered buffer; GPU memory is released with the last reference.
pub(super) fn unregister_buffer(id: u64) {
    if id == 0 {
        return;
    }
    get_buffer_registry().lock().remove(&id);
}
