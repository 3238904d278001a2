//! Common test utilities
#![allow(dead_code)]

use argwhere::runtime::Runtime;
use argwhere::runtime::cpu::{CpuClient, CpuDevice, CpuRuntime, ParallelismConfig};
#[cfg(feature = "wgpu")]
use argwhere::runtime::wgpu::{WgpuClient, WgpuDevice, WgpuRuntime};
use argwhere::tensor::ravel_index;

/// Create a CPU client and device for testing
pub fn create_cpu_client() -> (CpuClient, CpuDevice) {
    let device = CpuDevice::new();
    let client = CpuRuntime::default_client(&device);
    (client, device)
}

/// CPU client running the single-threaded reference kernels
pub fn create_serial_cpu_client() -> (CpuClient, CpuDevice) {
    let (client, device) = create_cpu_client();
    (client.with_parallelism(ParallelismConfig::serial()), device)
}

/// CPU client on a dedicated 4-thread pool with small chunks, so that even
/// small test inputs take the parallel kernels
pub fn create_parallel_cpu_client() -> (CpuClient, CpuDevice) {
    let (client, device) = create_cpu_client();
    let config = ParallelismConfig::new(Some(4), Some(64));
    (client.with_parallelism(config), device)
}

/// Create a WebGPU client and device, returning None if WebGPU is unavailable
#[cfg(feature = "wgpu")]
pub fn create_wgpu_client() -> Option<(WgpuClient, WgpuDevice)> {
    if !argwhere::runtime::wgpu::is_wgpu_available() {
        return None;
    }
    let init = std::panic::catch_unwind(|| {
        let device = WgpuDevice::new(0);
        let client = WgpuRuntime::default_client(&device);
        (client, device)
    });
    init.ok()
}

/// Ascending flat indices of the elements for which `pred` holds
pub fn reference_flat<T: Copy>(data: &[T], pred: impl Fn(T) -> bool) -> Vec<usize> {
    data.iter()
        .enumerate()
        .filter(|&(_, &v)| pred(v))
        .map(|(i, _)| i)
        .collect()
}

/// Row-major coordinates of a flat index
pub fn unravel(mut flat: usize, shape: &[usize]) -> Vec<usize> {
    let mut coords = vec![0; shape.len()];
    for d in (0..shape.len()).rev() {
        coords[d] = flat % shape[d];
        flat /= shape[d];
    }
    coords
}

/// Rebuild flat indices from per-dimension coordinate streams
pub fn ravel_streams(streams: &[Vec<i64>], shape: &[usize]) -> Vec<usize> {
    let nnz = streams.first().map_or(0, Vec::len);
    (0..nnz)
        .map(|i| {
            let coords: Vec<usize> = streams.iter().map(|s| s[i] as usize).collect();
            ravel_index(&coords, shape)
        })
        .collect()
}

/// Deterministic pseudo-random 0/1 pattern with roughly `density` ones
pub fn sparse_pattern(len: usize, density: f64, seed: u64) -> Vec<u8> {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len)
        .map(|_| u8::from(rng.random_bool(density)))
        .collect()
}
