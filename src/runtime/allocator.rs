//! Memory allocator traits and default implementation
//!
//! The `Allocator` trait is the `alloc(size) -> (ptr, handle)` /
//! `free(ptr, size, handle)` contract through which operations obtain
//! transient device memory. Every allocation carries an opaque handle that
//! must be returned on free.

use crate::error::Result;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Opaque token identifying one allocation
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct AllocationHandle(pub u64);

/// Memory allocator trait for runtime backends
pub trait Allocator: Clone + Send + Sync {
    /// Allocate `size_bytes` of device memory
    ///
    /// Returns the device pointer and the handle to pass back to [`Allocator::free`].
    fn alloc(&self, size_bytes: usize) -> Result<(u64, AllocationHandle)>;

    /// Release an allocation previously returned by [`Allocator::alloc`]
    fn free(&self, ptr: u64, size_bytes: usize, handle: AllocationHandle);

    /// Get the total allocated bytes still live
    fn allocated_bytes(&self) -> usize {
        0 // Default: tracking not supported
    }

    /// Number of allocations not yet freed
    fn live_allocations(&self) -> usize {
        0
    }
}

#[derive(Debug, Default)]
struct AllocatorStats {
    live_bytes: AtomicUsize,
    live_allocations: AtomicUsize,
    next_handle: AtomicU64,
}

/// Default allocator that delegates to Runtime methods
///
/// Calls the runtime's allocate/deallocate through function pointers and
/// tracks live bytes and allocations. Clones share the same counters.
#[derive(Clone, Debug)]
pub struct DefaultAllocator<D> {
    device: D,
    allocate_fn: fn(usize, &D) -> Result<u64>,
    deallocate_fn: fn(u64, usize, &D),
    stats: Arc<AllocatorStats>,
}

impl<D: Clone + Send + Sync> DefaultAllocator<D> {
    /// Create a new default allocator
    pub fn new(
        device: D,
        allocate_fn: fn(usize, &D) -> Result<u64>,
        deallocate_fn: fn(u64, usize, &D),
    ) -> Self {
        Self {
            device,
            allocate_fn,
            deallocate_fn,
            stats: Arc::new(AllocatorStats::default()),
        }
    }

    /// Get the device this allocator is associated with
    pub fn device(&self) -> &D {
        &self.device
    }

    /// Allocations served since creation, freed or not
    pub fn total_allocations(&self) -> u64 {
        self.stats.next_handle.load(Ordering::Relaxed)
    }
}

impl<D: Clone + Send + Sync> Allocator for DefaultAllocator<D> {
    fn alloc(&self, size_bytes: usize) -> Result<(u64, AllocationHandle)> {
        let ptr = (self.allocate_fn)(size_bytes, &self.device)?;
        let handle = AllocationHandle(self.stats.next_handle.fetch_add(1, Ordering::Relaxed));
        self.stats.live_bytes.fetch_add(size_bytes, Ordering::Relaxed);
        self.stats.live_allocations.fetch_add(1, Ordering::Relaxed);
        log::trace!("alloc {size_bytes} bytes at 0x{ptr:x} ({handle:?})");
        Ok((ptr, handle))
    }

    fn free(&self, ptr: u64, size_bytes: usize, handle: AllocationHandle) {
        log::trace!("free {size_bytes} bytes at 0x{ptr:x} ({handle:?})");
        (self.deallocate_fn)(ptr, size_bytes, &self.device);
        self.stats.live_bytes.fetch_sub(size_bytes, Ordering::Relaxed);
        self.stats.live_allocations.fetch_sub(1, Ordering::Relaxed);
    }

    fn allocated_bytes(&self) -> usize {
        self.stats.live_bytes.load(Ordering::Relaxed)
    }

    fn live_allocations(&self) -> usize {
        self.stats.live_allocations.load(Ordering::Relaxed)
    }
}
