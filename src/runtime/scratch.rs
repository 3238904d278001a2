//! Transient scratch memory for multi-pass primitives
//!
//! Primitives that need working memory expose a `*_scratch_bytes` query
//! separate from their execute call. The [`ScratchBroker`] runs the
//! probe/allocate/execute/free sequence around one execute call, and the
//! [`ScratchBuffer`] guard releases the allocation on every exit path.

use super::{AllocationHandle, Allocator};
use crate::error::Result;

/// Device scratch region handed to a primitive
///
/// A zero-sized region has `ptr == 0` and must not be dereferenced.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ScratchSpace {
    /// Device pointer (CPU address or GPU buffer id)
    pub ptr: u64,
    /// Usable size in bytes
    pub size_bytes: usize,
}

impl ScratchSpace {
    /// An empty region for primitives that need no scratch
    pub const EMPTY: Self = Self {
        ptr: 0,
        size_bytes: 0,
    };
}

/// Scratch allocation freed when dropped
pub struct ScratchBuffer<'a, A: Allocator> {
    allocator: &'a A,
    space: ScratchSpace,
    handle: Option<AllocationHandle>,
}

impl<A: Allocator> ScratchBuffer<'_, A> {
    /// The region to pass to a primitive
    #[inline]
    pub fn space(&self) -> ScratchSpace {
        self.space
    }
}

impl<A: Allocator> Drop for ScratchBuffer<'_, A> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.allocator
                .free(self.space.ptr, self.space.size_bytes, handle);
        }
    }
}

/// Runs primitives with freshly allocated scratch
pub struct ScratchBroker<'a, A: Allocator> {
    allocator: &'a A,
    label: &'static str,
}

impl<'a, A: Allocator> ScratchBroker<'a, A> {
    /// Create a broker drawing from `allocator`; `label` tags log lines
    pub fn new(allocator: &'a A, label: &'static str) -> Self {
        Self { allocator, label }
    }

    /// Allocate `size_bytes` of scratch
    ///
    /// A zero-byte request performs no allocation.
    pub fn acquire(&self, size_bytes: usize) -> Result<ScratchBuffer<'a, A>> {
        if size_bytes == 0 {
            return Ok(ScratchBuffer {
                allocator: self.allocator,
                space: ScratchSpace::EMPTY,
                handle: None,
            });
        }
        let (ptr, handle) = self.allocator.alloc(size_bytes)?;
        Ok(ScratchBuffer {
            allocator: self.allocator,
            space: ScratchSpace { ptr, size_bytes },
            handle: Some(handle),
        })
    }

    /// Execute `f` with `size_bytes` of scratch, freeing it before returning.
    pub fn run<T>(
        &self,
        size_bytes: usize,
        f: impl FnOnce(ScratchSpace) -> Result<T>,
    ) -> Result<T> {
        log::debug!("{}: scratch {} bytes", self.label, size_bytes);
        let scratch = self.acquire(size_bytes)?;
        let result = f(scratch.space());
        drop(scratch);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::runtime::DefaultAllocator;

    fn heap_alloc(size: usize, _: &()) -> Result<u64> {
        let buf = vec![0u8; size].into_boxed_slice();
        Ok(Box::into_raw(buf) as *mut u8 as u64)
    }

    fn heap_free(ptr: u64, size: usize, _: &()) {
        let slice = std::ptr::slice_from_raw_parts_mut(ptr as *mut u8, size);
        drop(unsafe { Box::from_raw(slice) });
    }

    #[test]
    fn test_run_frees_after_success() {
        let allocator = DefaultAllocator::new((), heap_alloc, heap_free);
        let broker = ScratchBroker::new(&allocator, "test");
        let seen = broker
            .run(128, |space| {
                assert_eq!(space.size_bytes, 128);
                assert_ne!(space.ptr, 0);
                Ok(allocator.allocated_bytes())
            })
            .unwrap();
        assert_eq!(seen, 128);
        assert_eq!(allocator.allocated_bytes(), 0);
    }

    #[test]
    fn test_run_frees_after_error() {
        let allocator = DefaultAllocator::new((), heap_alloc, heap_free);
        let broker = ScratchBroker::new(&allocator, "test");
        let result: Result<()> = broker.run(64, |_| Err(Error::Internal("boom".into())));
        assert!(matches!(result, Err(Error::Internal(_))));
        assert_eq!(allocator.allocated_bytes(), 0);
        assert_eq!(allocator.live_allocations(), 0);
    }

    #[test]
    fn test_zero_bytes_skips_allocation() {
        let allocator = DefaultAllocator::new((), heap_alloc, heap_free);
        let broker = ScratchBroker::new(&allocator, "test");
        let buffer = broker.acquire(0).unwrap();
        assert_eq!(buffer.space(), ScratchSpace::EMPTY);
        assert_eq!(allocator.live_allocations(), 0);
    }
}
