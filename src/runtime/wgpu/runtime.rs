//! WebGPU runtime implementation

use super::cache::get_or_create_client;
use super::client::{WgpuAllocator, WgpuClient, register_buffer, require_buffer, unregister_buffer};
use super::device::WgpuDevice;
use crate::error::Result;
use crate::runtime::Runtime;

/// WebGPU Runtime adapter
///
/// Device memory is a set of storage buffers addressed by registry ID.
#[derive(Clone, Debug, Default)]
pub struct WgpuRuntime;

/// WebGPU copies operate on multiples of 4 bytes
#[inline]
fn copy_aligned(size_bytes: usize) -> u64 {
    (size_bytes.div_ceil(4) * 4) as u64
}

impl Runtime for WgpuRuntime {
    type Device = WgpuDevice;
    type Client = WgpuClient;
    type Allocator = WgpuAllocator;

    fn name() -> &'static str {
        "wgpu"
    }

    /// Allocate a storage buffer and return its registry ID.
    fn allocate(size_bytes: usize, device: &Self::Device) -> Result<u64> {
        if size_bytes == 0 {
            return Ok(0);
        }

        let client = get_or_create_client(device)?;
        Ok(register_buffer(&client.wgpu_device, size_bytes))
    }

    fn deallocate(ptr: u64, _size_bytes: usize, _device: &Self::Device) {
        unregister_buffer(ptr);
    }

    fn copy_to_device(src: &[u8], dst: u64, device: &Self::Device) -> Result<()> {
        if src.is_empty() || dst == 0 {
            return Ok(());
        }

        let client = get_or_create_client(device)?;
        let buffer = require_buffer(dst, "copy_to_device")?;

        if src.len() % 4 == 0 {
            client.queue.write_buffer(&buffer, 0, src);
        } else {
            let mut padded = src.to_vec();
            padded.resize(copy_aligned(src.len()) as usize, 0);
            client.queue.write_buffer(&buffer, 0, &padded);
        }
        Ok(())
    }

    /// Copy data from device to host.
    ///
    /// Every submission on the queue completes before the copy runs.
    fn copy_from_device(src: u64, dst: &mut [u8], device: &Self::Device) -> Result<()> {
        if dst.is_empty() || src == 0 {
            return Ok(());
        }

        let client = get_or_create_client(device)?;
        let buffer = require_buffer(src, "copy_from_device")?;
        let size = copy_aligned(dst.len());

        let staging = client.create_staging_buffer("copy_staging", size);
        let mut encoder = client
            .wgpu_device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("copy_from_device"),
            });
        encoder.copy_buffer_to_buffer(&buffer, 0, &staging, 0, size);
        client.submit_and_wait(encoder)?;

        client.read_buffer(&staging, dst)
    }

    fn default_device() -> Self::Device {
        WgpuDevice::new(0)
    }

    /// Get the cached client for a device.
    ///
    /// # Panics
    ///
    /// Panics if no WebGPU adapter is available. Use [`WgpuClient::new`] to
    /// handle that case.
    fn default_client(device: &Self::Device) -> Self::Client {
        match get_or_create_client(device) {
            Ok(client) => client,
            Err(e) => panic!("failed to create WebGPU client for {device:?}: {e}"),
        }
    }
}

/// Check if WebGPU is available on this system
pub fn is_wgpu_available() -> bool {
    super::device::query_adapter_info_blocking(0).is_ok()
}
