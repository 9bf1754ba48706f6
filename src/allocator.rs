//! Pixel buffer allocation.
//!
//! Decoders never allocate the output buffer directly; they ask a
//! [`PixelAllocator`]. The allocator is shared by every decode call that uses
//! it, so implementations must hand out independent buffers when called from
//! several threads at once.

use crate::error::{Error, Result};

/// Source of zero-filled pixel buffers.
pub trait PixelAllocator: Send + Sync {
    /// Return a zero-filled buffer of exactly `size` bytes.
    fn allocate(&self, size: usize) -> Result<Vec<u8>>;

    /// Take back a buffer previously returned by [`allocate`](Self::allocate).
    fn free(&self, buffer: Vec<u8>) {
        drop(buffer);
    }
}

/// Allocator backed by the global heap.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemAllocator;

impl PixelAllocator for SystemAllocator {
    fn allocate(&self, size: usize) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        buffer
            .try_reserve_exact(size)
            .map_err(|_| Error::AllocationFailed { size })?;
        buffer.resize(size, 0);
        Ok(buffer)
    }
}

impl<A: PixelAllocator + ?Sized> PixelAllocator for &A {
    fn allocate(&self, size: usize) -> Result<Vec<u8>> {
        (**self).allocate(size)
    }

    fn free(&self, buffer: Vec<u8>) {
        (**self).free(buffer)
    }
}
