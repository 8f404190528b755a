//! Host allocator backed by `memfd_create`.
//!
//! Each allocation is an anonymous memfd sized with `ftruncate`; the handle
//! indexes a table of live files and `share` duplicates the descriptor, the
//! same way ION hands out a fresh dma-buf descriptor per share. Mappings are
//! coherent, so cache maintenance only validates the handle.

use std::collections::HashMap;
use std::io;
use std::os::fd::OwnedFd;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Mutex, MutexGuard};

use rustix::fs::MemfdFlags;

use super::allocator::{AllocFlags, AllocHandle, CacheOp, CacheRegion, HeapMask, KernelAllocator};

#[derive(Debug)]
struct MemfdEntry {
    fd: OwnedFd,
    heaps: HeapMask,
    len: usize,
}

/// Allocator for hosts without ION.
#[derive(Debug)]
pub struct MemfdAllocator {
    entries: Mutex<HashMap<i32, MemfdEntry>>,
    next_handle: AtomicI32,
}

impl MemfdAllocator {
    /// Create an allocator with no live allocations.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            next_handle: AtomicI32::new(1),
        }
    }

    /// Number of handles allocated and not yet freed.
    pub fn live_handles(&self) -> usize {
        self.lock().len()
    }

    /// Heap mask an allocation was requested with.
    pub fn heaps_of(&self, handle: AllocHandle) -> Option<HeapMask> {
        self.lock().get(&handle.0).map(|entry| entry.heaps)
    }

    /// Length an allocation was requested with.
    pub fn len_of(&self, handle: AllocHandle) -> Option<usize> {
        self.lock().get(&handle.0).map(|entry| entry.len)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<i32, MemfdEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for MemfdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

fn unknown_handle(handle: AllocHandle) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("unknown allocation handle {}", handle.0),
    )
}

impl KernelAllocator for MemfdAllocator {
    fn name(&self) -> &'static str {
        "memfd"
    }

    fn allocate(
        &self,
        len: usize,
        _align: usize,
        heaps: HeapMask,
        _flags: AllocFlags,
    ) -> io::Result<AllocHandle> {
        if len == 0 {
            return Err(io::Error::from_raw_os_error(libc::EINVAL));
        }
        let fd = rustix::fs::memfd_create(c"camhal-block", MemfdFlags::CLOEXEC)?;
        rustix::fs::ftruncate(&fd, len as u64)?;

        let handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
        self.lock().insert(handle, MemfdEntry { fd, heaps, len });
        Ok(AllocHandle(handle))
    }

    fn share(&self, handle: AllocHandle) -> io::Result<OwnedFd> {
        self.lock()
            .get(&handle.0)
            .ok_or_else(|| unknown_handle(handle))?
            .fd
            .try_clone()
    }

    fn free(&self, handle: AllocHandle) -> io::Result<()> {
        self.lock()
            .remove(&handle.0)
            .map(drop)
            .ok_or_else(|| unknown_handle(handle))
    }

    fn cache_maintenance(&self, _op: CacheOp, region: &CacheRegion<'_>) -> io::Result<()> {
        if self.lock().contains_key(&region.handle.0) {
            Ok(())
        } else {
            Err(unknown_handle(region.handle))
        }
    }
}
