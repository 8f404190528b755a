//! Kernel allocation facility seam.

use std::fmt;
use std::io;
use std::ops::BitOr;
use std::ptr::NonNull;

use rustix::fd::{BorrowedFd, OwnedFd};

/// Allocation granularity. Requested lengths are rounded up to this.
pub const PAGE_SIZE: usize = 4096;

/// Bitmask selecting the kernel heap(s) allowed to back an allocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct HeapMask(pub u32);

impl HeapMask {
    /// Mask selecting a single heap id.
    pub const fn heap(id: u32) -> Self {
        HeapMask(1 << id)
    }

    /// Whether every heap in `other` is selected.
    pub const fn contains(self, other: HeapMask) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for HeapMask {
    type Output = HeapMask;

    fn bitor(self, rhs: HeapMask) -> HeapMask {
        HeapMask(self.0 | rhs.0)
    }
}

/// Allocation flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct AllocFlags(pub u32);

impl AllocFlags {
    /// CPU mapping is uncached.
    pub const UNCACHED: AllocFlags = AllocFlags(0);
    /// CPU mapping is cached; coherency needs explicit cache maintenance.
    pub const CACHED: AllocFlags = AllocFlags(1);
}

/// Opaque allocation handle issued by a [`KernelAllocator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AllocHandle(pub i32);

/// Cache maintenance operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheOp {
    /// Write dirty lines back to memory, before a hardware reader.
    Clean,
    /// Drop cached lines, after a hardware writer.
    Invalidate,
    /// Both, in that order.
    CleanInvalidate,
}

/// Region a cache operation applies to.
#[derive(Debug, Clone, Copy)]
pub struct CacheRegion<'a> {
    /// Allocation handle.
    pub handle: AllocHandle,
    /// Shared descriptor of the allocation.
    pub fd: BorrowedFd<'a>,
    /// Process-local mapping.
    pub addr: NonNull<u8>,
    /// Start of the region within the mapping.
    pub offset: usize,
    /// Length of the region.
    pub len: usize,
}

/// Kernel allocation facility.
///
/// The steps are deliberately separate so a caller can unwind exactly the
/// ones that succeeded: [`allocate`](Self::allocate) yields a handle,
/// [`share`](Self::share) exports it as a descriptor the process maps and
/// passes to other subsystems, and [`free`](Self::free) drops the handle.
pub trait KernelAllocator: Send + Sync + fmt::Debug {
    /// Short backend name for logs and metric labels.
    fn name(&self) -> &'static str;

    /// Whether the allocator itself is usable. Cache maintenance through an
    /// invalid allocator is skipped.
    fn is_valid(&self) -> bool {
        true
    }

    /// Allocate `len` bytes aligned to `align` from one of `heaps`.
    fn allocate(
        &self,
        len: usize,
        align: usize,
        heaps: HeapMask,
        flags: AllocFlags,
    ) -> io::Result<AllocHandle>;

    /// Export `handle` as a shareable descriptor.
    fn share(&self, handle: AllocHandle) -> io::Result<OwnedFd>;

    /// Release `handle`. Descriptors obtained from [`share`](Self::share)
    /// stay valid until closed.
    fn free(&self, handle: AllocHandle) -> io::Result<()>;

    /// Run a cache maintenance operation over a mapped region.
    fn cache_maintenance(&self, op: CacheOp, region: &CacheRegion<'_>) -> io::Result<()>;
}

/// Round `len` up to the next multiple of `quantum`. A zero quantum leaves
/// `len` unchanged.
pub(crate) fn round_up(len: usize, quantum: usize) -> Option<usize> {
    if quantum == 0 {
        Some(len)
    } else {
        len.checked_next_multiple_of(quantum)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_up() {
        assert_eq!(round_up(4097, PAGE_SIZE), Some(8192));
        assert_eq!(round_up(4096, PAGE_SIZE), Some(4096));
        assert_eq!(round_up(1, PAGE_SIZE), Some(4096));
        assert_eq!(round_up(4097, 0), Some(4097));
        assert_eq!(round_up(usize::MAX, PAGE_SIZE), None);
    }

    #[test]
    fn test_heap_mask() {
        let mask = HeapMask::heap(25) | HeapMask::heap(8);
        assert_eq!(mask.0, (1 << 25) | (1 << 8));
        assert!(mask.contains(HeapMask::heap(8)));
        assert!(!HeapMask::heap(25).contains(HeapMask::heap(8)));
    }
}
