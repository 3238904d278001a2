//! CPU client, allocator and parallelism configuration

use super::device::CpuDevice;
use super::runtime::CpuRuntime;
use crate::ops::WhereConfig;
use crate::runtime::{DefaultAllocator, Runtime, RuntimeClient};
#[cfg(feature = "rayon")]
use std::sync::Arc;

/// Minimum number of elements per parallel work item when unset
pub const DEFAULT_MIN_LEN: usize = 4096;

/// Worker pool settings for CPU kernels
///
/// `num_threads: None` uses rayon's global pool; `Some(1)` runs the
/// single-threaded reference kernels. `min_len` bounds the size of each
/// parallel chunk from below.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ParallelismConfig {
    /// Worker threads (`None` = global pool)
    pub num_threads: Option<usize>,
    /// Minimum elements per parallel chunk (`None` = [`DEFAULT_MIN_LEN`])
    pub min_len: Option<usize>,
}

impl ParallelismConfig {
    /// Create a parallelism configuration
    pub const fn new(num_threads: Option<usize>, min_len: Option<usize>) -> Self {
        Self {
            num_threads,
            min_len,
        }
    }

    /// Single-threaded reference execution
    pub const fn serial() -> Self {
        Self::new(Some(1), None)
    }

    /// True when kernels must run on the calling thread
    pub fn is_serial(&self) -> bool {
        !cfg!(feature = "rayon") || self.num_threads == Some(1)
    }
}

/// CPU client for operation dispatch
#[derive(Clone, Debug)]
pub struct CpuClient {
    pub(crate) device: CpuDevice,
    allocator: CpuAllocator,
    parallelism: ParallelismConfig,
    #[cfg(feature = "rayon")]
    pool: Option<Arc<rayon::ThreadPool>>,
    pub(crate) where_config: WhereConfig,
}

impl CpuClient {
    /// Create a new CPU client using the global rayon pool
    pub fn new(device: CpuDevice) -> Self {
        let allocator = create_cpu_allocator(device);
        Self {
            device,
            allocator,
            parallelism: ParallelismConfig::default(),
            #[cfg(feature = "rayon")]
            pool: None,
            where_config: WhereConfig::default(),
        }
    }

    /// Client with a different worker pool configuration
    ///
    /// A dedicated pool is built when `num_threads` is greater than one. If the
    /// pool cannot be built the global pool is used instead.
    pub fn with_parallelism(&self, config: ParallelismConfig) -> Self {
        let mut client = self.clone();
        client.parallelism = config;
        #[cfg(feature = "rayon")]
        {
            client.pool = match config.num_threads {
                Some(n) if n > 1 => match rayon::ThreadPoolBuilder::new().num_threads(n).build() {
                    Ok(pool) => Some(Arc::new(pool)),
                    Err(e) => {
                        log::warn!("failed to build {n}-thread pool, using global pool: {e}");
                        None
                    }
                },
                _ => None,
            };
        }
        client
    }

    /// Client with a different selection pipeline configuration
    pub fn with_where_config(&self, config: WhereConfig) -> Self {
        let mut client = self.clone();
        client.where_config = config;
        client
    }

    /// Current worker pool configuration
    pub fn parallelism(&self) -> ParallelismConfig {
        self.parallelism
    }

    /// True when kernels run single-threaded
    #[inline]
    pub fn is_serial(&self) -> bool {
        self.parallelism.is_serial()
    }

    /// Minimum elements per parallel chunk
    #[inline]
    pub fn rayon_min_len(&self) -> usize {
        self.parallelism.min_len.unwrap_or(DEFAULT_MIN_LEN).max(1)
    }

    /// Run `f` inside this client's worker pool
    #[cfg(feature = "rayon")]
    pub fn install_parallelism<F, T>(&self, f: F) -> T
    where
        F: FnOnce() -> T + Send,
        T: Send,
    {
        match &self.pool {
            Some(pool) => pool.install(f),
            None => f(),
        }
    }
}

impl RuntimeClient<CpuRuntime> for CpuClient {
    fn device(&self) -> &CpuDevice {
        &self.device
    }

    fn synchronize(&self) {
        // CPU operations are synchronous, nothing to do
    }

    fn allocator(&self) -> &CpuAllocator {
        &self.allocator
    }
}

/// CPU-specific allocator type alias
pub type CpuAllocator = DefaultAllocator<CpuDevice>;

/// Create a CPU allocator for the given device
fn create_cpu_allocator(device: CpuDevice) -> CpuAllocator {
    DefaultAllocator::new(device, CpuRuntime::allocate, CpuRuntime::deallocate)
}
