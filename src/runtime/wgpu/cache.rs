//! Global client cache for WebGPU runtime

use super::client::WgpuClient;
use super::device::{WgpuDevice, WgpuError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Global client cache: device index -> cached WgpuClient
static CLIENT_CACHE: OnceLock<Mutex<HashMap<usize, WgpuClient>>> = OnceLock::new();

/// Get or create the cached WgpuClient for a device.
///
/// Only one `wgpu::Device` exists per device index: buffers in the global
/// registry belong to the device that created them and cannot be bound on
/// another.
pub(super) fn get_or_create_client(device: &WgpuDevice) -> Result<WgpuClient, WgpuError> {
    let cache = CLIENT_CACHE.get_or_init(|| Mutex::new(HashMap::new()));
    let mut cache_guard = cache.lock();

    if let Some(client) = cache_guard.get(&device.index) {
        return Ok(client.clone());
    }

    let client = WgpuClient::new_uncached(device.index)?;
    cache_guard.insert(device.index, client.clone());

    Ok(client)
}
