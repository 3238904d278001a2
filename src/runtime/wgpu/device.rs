//! WebGPU device implementation.
//!
//! `WgpuDevice` identifies a WebGPU adapter by enumeration index and caches
//! its properties once a client has been created for it.

use std::fmt;
use std::sync::Arc;
use wgpu::{Adapter, Backend, Limits};

/// Error type for WebGPU operations.
#[derive(Debug, Clone)]
pub enum WgpuError {
    /// No suitable GPU adapter found.
    NoAdapter,
    /// Device request failed.
    DeviceError(String),
}

impl fmt::Display for WgpuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WgpuError::NoAdapter => write!(f, "No suitable WebGPU adapter found"),
            WgpuError::DeviceError(msg) => write!(f, "WebGPU device error: {}", msg),
        }
    }
}

impl std::error::Error for WgpuError {}

impl From<WgpuError> for crate::error::Error {
    fn from(err: WgpuError) -> Self {
        crate::error::Error::Backend(err.to_string())
    }
}

/// Cached adapter information for a WebGPU device.
#[derive(Clone)]
pub(crate) struct AdapterInfo {
    /// Adapter name (e.g., "NVIDIA GeForce RTX 4090")
    name: String,
    /// Backend type (Vulkan, Metal, DX12, etc.)
    backend: Backend,
    /// Limits granted to the requested device
    limits: Limits,
}

impl AdapterInfo {
    /// Same adapter with the limits the device was actually created with
    pub(crate) fn with_limits(&self, limits: Limits) -> Self {
        Self {
            limits,
            ..self.clone()
        }
    }
}

/// WebGPU device identifier.
///
/// The device index maps to the order of adapters returned by WebGPU
/// enumeration.
///
/// # Example
///
/// ```ignore
/// let device = WgpuDevice::new(0);  // First GPU
/// println!("Device: {}", device.name());
/// ```
#[derive(Clone)]
pub struct WgpuDevice {
    /// Device index (adapter order)
    pub(crate) index: usize,
    /// Cached adapter info (populated by client creation)
    info: Option<Arc<AdapterInfo>>,
}

impl WgpuDevice {
    /// Create a device identifier for the specified adapter index.
    ///
    /// This does not initialize the GPU; that happens when the first client
    /// for this index is created.
    pub fn new(index: usize) -> Self {
        Self { index, info: None }
    }

    pub(crate) fn with_info(index: usize, info: Arc<AdapterInfo>) -> Self {
        Self {
            index,
            info: Some(info),
        }
    }

    /// Get the adapter name.
    ///
    /// Returns "unknown" if the device hasn't been initialized yet.
    pub fn adapter_name(&self) -> String {
        self.info
            .as_ref()
            .map(|i| i.name.clone())
            .unwrap_or_else(|| "unknown".to_string())
    }

    /// Get the backend type (Vulkan, Metal, DX12, etc.).
    pub fn backend(&self) -> Option<Backend> {
        self.info.as_ref().map(|i| i.backend)
    }

    /// Get device limits, or WebGPU defaults before initialization.
    pub fn limits(&self) -> Limits {
        self.info
            .as_ref()
            .map(|i| i.limits.clone())
            .unwrap_or_default()
    }

    /// Maximum workgroups per dispatch dimension.
    pub fn max_workgroups_per_dimension(&self) -> u32 {
        self.limits().max_compute_workgroups_per_dimension
    }
}

impl crate::runtime::Device for WgpuDevice {
    fn id(&self) -> usize {
        self.index
    }

    fn name(&self) -> String {
        format!("wgpu:{}", self.index)
    }
}

impl fmt::Debug for WgpuDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WgpuDevice")
            .field("index", &self.index)
            .field("adapter", &self.adapter_name())
            .field("backend", &self.backend())
            .finish()
    }
}

/// Request the adapter for a device index.
///
/// Falls back to the high-performance adapter when the index is out of range.
pub(crate) async fn query_adapter_info(
    index: usize,
) -> Result<(Adapter, Arc<AdapterInfo>), WgpuError> {
    let instance = wgpu::Instance::default();
    let mut adapters: Vec<_> = instance.enumerate_adapters(wgpu::Backends::all()).await;

    if adapters.is_empty() {
        return Err(WgpuError::NoAdapter);
    }

    let adapter = if index < adapters.len() {
        adapters.swap_remove(index)
    } else {
        log::warn!(
            "wgpu adapter {index} not found among {}, requesting high-performance adapter",
            adapters.len()
        );
        instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|_| WgpuError::NoAdapter)?
    };

    let wgpu_info = adapter.get_info();
    log::debug!(
        "wgpu adapter {index}: {} ({:?})",
        wgpu_info.name,
        wgpu_info.backend
    );
    let info = Arc::new(AdapterInfo {
        name: wgpu_info.name,
        backend: wgpu_info.backend,
        limits: adapter.limits(),
    });

    Ok((adapter, info))
}

/// Query adapter information synchronously using pollster.
pub(crate) fn query_adapter_info_blocking(
    index: usize,
) -> Result<(Adapter, Arc<AdapterInfo>), WgpuError> {
    pollster::block_on(query_adapter_info(index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Device;

    #[test]
    fn test_wgpu_device_creation() {
        let device = WgpuDevice::new(0);
        assert_eq!(device.id(), 0);
        assert_eq!(device.name(), "wgpu:0");
        assert_eq!(device.adapter_name(), "unknown");
    }

    #[test]
    fn test_uninitialized_device_reports_default_limits() {
        let device = WgpuDevice::new(3);
        assert_eq!(
            device.max_workgroups_per_dimension(),
            Limits::default().max_compute_workgroups_per_dimension
        );
    }

    #[test]
    fn test_wgpu_error_converts_to_backend() {
        let err: crate::error::Error = WgpuError::NoAdapter.into();
        assert!(matches!(err, crate::error::Error::Backend(_)));
    }
}
