//! Kernel-backed shared memory blocks.

use std::fmt;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd, RawFd};
use std::ptr::NonNull;
use std::sync::Arc;

use rustix::mm::{MapFlags, ProtFlags};
use tracing::{debug, trace, warn};

use super::allocator::{
    AllocFlags, AllocHandle, CacheOp, CacheRegion, HeapMask, KernelAllocator, PAGE_SIZE,
    round_up,
};
use crate::error::{AllocStage, Error, Result};
use crate::observability::metrics as m;

/// Acquisition state of a [`MemoryBlock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BlockState {
    /// Nothing held.
    Released,
    /// Handle and descriptor held, no mapping.
    Allocated,
    /// Handle, descriptor, and process mapping held.
    Mapped,
}

/// Front end over a [`KernelAllocator`] that hands out mapped blocks.
///
/// # Example
///
/// ```rust,ignore
/// use camhal::memory::{HeapMask, MemfdAllocator, MemoryAllocator};
///
/// let allocator = MemoryAllocator::new(MemfdAllocator::new());
/// let mut block = allocator.acquire(5000, HeapMask::heap(25))?;
/// assert_eq!(block.len(), 8192);
/// block.as_mut_slice()[..5].copy_from_slice(b"hello");
/// block.release()?;
/// ```
#[derive(Clone)]
pub struct MemoryAllocator {
    backend: Arc<dyn KernelAllocator>,
}

impl MemoryAllocator {
    /// Wrap a kernel allocation backend.
    pub fn new(backend: impl KernelAllocator + 'static) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }

    /// Wrap an already shared backend.
    pub fn from_arc(backend: Arc<dyn KernelAllocator>) -> Self {
        Self { backend }
    }

    /// The backend in use.
    pub fn backend(&self) -> &dyn KernelAllocator {
        self.backend.as_ref()
    }

    /// Allocate, share, and map a block of at least `size` bytes.
    ///
    /// The length is rounded up to [`PAGE_SIZE`]. On failure every step that
    /// already succeeded is undone before the error is returned.
    pub fn acquire(&self, size: usize, heaps: HeapMask) -> Result<MemoryBlock> {
        if size == 0 {
            return Err(Error::InvalidRequest("zero-length block".into()));
        }
        let len = round_up(size, PAGE_SIZE)
            .ok_or_else(|| Error::InvalidRequest(format!("block size {size} overflows")))?;

        let handle = self
            .backend
            .allocate(len, PAGE_SIZE, heaps, AllocFlags::CACHED)
            .map_err(|e| Error::alloc(AllocStage::Allocate, e))?;

        let mut block = MemoryBlock {
            backend: Arc::clone(&self.backend),
            handle: Some(handle),
            fd: None,
            ptr: None,
            len,
            counted: false,
        };

        if let Err(err) = block.share_and_map() {
            warn!(
                backend = self.backend.name(),
                len,
                error = %err,
                "block acquisition failed, unwinding"
            );
            if let Err(cleanup) = block.release() {
                warn!(error = %cleanup, "unwind of partial block failed");
            }
            return Err(err);
        }

        block.counted = true;
        m::record_block_acquired(self.backend.name(), len);
        debug!(
            backend = self.backend.name(),
            len,
            heaps = heaps.0,
            handle = handle.0,
            "block acquired"
        );
        Ok(block)
    }

    /// Tear down a block. See [`MemoryBlock::release`].
    pub fn release(&self, block: &mut MemoryBlock) -> Result<()> {
        block.release()
    }

    /// Cache maintenance over a block. See [`MemoryBlock::cache_op`].
    pub fn cache_op(&self, block: &MemoryBlock, op: CacheOp) -> Result<()> {
        block.cache_op(op)
    }
}

impl fmt::Debug for MemoryAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryAllocator")
            .field("backend", &self.backend.name())
            .finish()
    }
}

/// One kernel allocation with its shared descriptor and process mapping.
///
/// The mapping is valid iff the state is [`BlockState::Mapped`]. Teardown
/// runs in reverse acquisition order (unmap, close, free) and is attempted
/// step by step even after a failure. Dropping a block that was not
/// released releases it.
pub struct MemoryBlock {
    backend: Arc<dyn KernelAllocator>,
    handle: Option<AllocHandle>,
    fd: Option<OwnedFd>,
    ptr: Option<NonNull<u8>>,
    len: usize,
    /// Set once the block was counted as acquired; a partial block unwound
    /// inside `acquire` is never counted as released either.
    counted: bool,
}

// SAFETY: MemoryBlock exclusively owns its mapping. Shared access only hands
// out `&[u8]`; mutation requires `&mut self`. The backend is Send + Sync.
unsafe impl Send for MemoryBlock {}
unsafe impl Sync for MemoryBlock {}

impl MemoryBlock {
    fn share_and_map(&mut self) -> Result<()> {
        let handle = self
            .handle
            .ok_or(Error::Protocol("share without allocation"))?;
        let fd = self
            .backend
            .share(handle)
            .map_err(|e| Error::alloc(AllocStage::Share, e))?;

        // SAFETY: mapping a fresh shared region over a descriptor we own; the
        // kernel picks the address and the length matches the allocation.
        let ptr = unsafe {
            rustix::mm::mmap(
                std::ptr::null_mut(),
                self.len,
                ProtFlags::READ | ProtFlags::WRITE,
                MapFlags::SHARED,
                &fd,
                0,
            )
        };
        self.fd = Some(fd);

        let ptr = ptr.map_err(|e| Error::alloc(AllocStage::Map, e))?;
        self.ptr = Some(
            NonNull::new(ptr.cast::<u8>())
                .ok_or_else(|| Error::alloc(AllocStage::Map, rustix::io::Errno::FAULT))?,
        );
        Ok(())
    }

    /// Unmap, close the descriptor, and free the handle.
    ///
    /// Every held resource is released even if an earlier step fails; the
    /// first error is returned. Calling this on a released block is a no-op.
    pub fn release(&mut self) -> Result<()> {
        if self.state() == BlockState::Released && self.fd.is_none() {
            return Ok(());
        }

        let mut first_err = None;

        if let Some(ptr) = self.ptr.take() {
            // SAFETY: ptr/len describe the mapping created in share_and_map,
            // and taking `ptr` guarantees no slice into it outlives this call.
            if let Err(e) = unsafe { rustix::mm::munmap(ptr.as_ptr().cast(), self.len) } {
                first_err.get_or_insert(Error::alloc(AllocStage::Unmap, e));
            }
        }

        drop(self.fd.take());

        if let Some(handle) = self.handle.take() {
            if let Err(e) = self.backend.free(handle) {
                first_err.get_or_insert(Error::alloc(AllocStage::Free, e));
            }
        }

        if std::mem::take(&mut self.counted) {
            m::record_block_released(self.backend.name());
        }
        match first_err {
            Some(err) => {
                warn!(backend = self.backend.name(), len = self.len, error = %err, "block release incomplete");
                Err(err)
            }
            None => {
                trace!(backend = self.backend.name(), len = self.len, "block released");
                Ok(())
            }
        }
    }

    /// Cache maintenance over the whole mapping.
    ///
    /// Succeeds without doing anything if the block holds no valid handle or
    /// the backend is unusable.
    pub fn cache_op(&self, op: CacheOp) -> Result<()> {
        let (Some(handle), Some(fd), Some(addr)) = (self.handle, self.fd.as_ref(), self.ptr) else {
            return Ok(());
        };
        if !self.backend.is_valid() {
            return Ok(());
        }

        let region = CacheRegion {
            handle,
            fd: fd.as_fd(),
            addr,
            offset: 0,
            len: self.len,
        };
        self.backend
            .cache_maintenance(op, &region)
            .map_err(|e| Error::alloc(AllocStage::Cache, e))
    }

    /// Current acquisition state.
    pub fn state(&self) -> BlockState {
        match (self.ptr, self.handle) {
            (Some(_), _) => BlockState::Mapped,
            (None, Some(_)) => BlockState::Allocated,
            (None, None) => BlockState::Released,
        }
    }

    /// Length of the allocation in bytes (page-rounded).
    pub fn len(&self) -> usize {
        self.len
    }

    /// True for a zero-length block. Acquired blocks are never empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Allocation handle, while held.
    pub fn handle(&self) -> Option<AllocHandle> {
        self.handle
    }

    /// Shared descriptor, while held.
    pub fn fd(&self) -> Option<BorrowedFd<'_>> {
        self.fd.as_ref().map(AsFd::as_fd)
    }

    /// Raw shared descriptor, or -1 once released.
    pub fn raw_fd(&self) -> RawFd {
        self.fd.as_ref().map_or(-1, AsRawFd::as_raw_fd)
    }

    /// Mapped bytes. Empty once released.
    pub fn as_slice(&self) -> &[u8] {
        match self.ptr {
            // SAFETY: the mapping is valid for `len` bytes while `ptr` is Some.
            Some(ptr) => unsafe { std::slice::from_raw_parts(ptr.as_ptr(), self.len) },
            None => &[],
        }
    }

    /// Mapped bytes, mutable. Empty once released.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        match self.ptr {
            // SAFETY: as above, and `&mut self` gives exclusive access.
            Some(ptr) => unsafe { std::slice::from_raw_parts_mut(ptr.as_ptr(), self.len) },
            None => &mut [],
        }
    }
}

impl Drop for MemoryBlock {
    fn drop(&mut self) {
        if self.state() != BlockState::Released {
            if let Err(err) = self.release() {
                warn!(error = %err, "release on drop failed");
            }
        }
    }
}

impl fmt::Debug for MemoryBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryBlock")
            .field("backend", &self.backend.name())
            .field("state", &self.state())
            .field("handle", &self.handle)
            .field("fd", &self.raw_fd())
            .field("len", &self.len)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

    use metrics::{
        Counter, CounterFn, Gauge, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit,
    };

    use super::*;
    use crate::memory::MemfdAllocator;

    /// Memfd backend that can report itself unusable or refuse to share.
    #[derive(Debug, Default)]
    struct ScriptedBackend {
        inner: MemfdAllocator,
        valid: bool,
        fail_share: bool,
        cache_calls: AtomicUsize,
    }

    impl KernelAllocator for ScriptedBackend {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn is_valid(&self) -> bool {
            self.valid
        }

        fn allocate(
            &self,
            len: usize,
            align: usize,
            heaps: HeapMask,
            flags: AllocFlags,
        ) -> io::Result<AllocHandle> {
            self.inner.allocate(len, align, heaps, flags)
        }

        fn share(&self, handle: AllocHandle) -> io::Result<OwnedFd> {
            if self.fail_share {
                return Err(io::Error::from_raw_os_error(libc::EBADF));
            }
            self.inner.share(handle)
        }

        fn free(&self, handle: AllocHandle) -> io::Result<()> {
            self.inner.free(handle)
        }

        fn cache_maintenance(&self, op: CacheOp, region: &CacheRegion<'_>) -> io::Result<()> {
            self.cache_calls.fetch_add(1, Ordering::SeqCst);
            self.inner.cache_maintenance(op, region)
        }
    }

    #[derive(Debug, Default)]
    struct Tally(AtomicU64);

    impl CounterFn for Tally {
        fn increment(&self, value: u64) {
            self.0.fetch_add(value, Ordering::SeqCst);
        }

        fn absolute(&self, value: u64) {
            self.0.store(value, Ordering::SeqCst);
        }
    }

    /// Counts block acquire and release events, ignoring everything else.
    #[derive(Debug, Default)]
    struct BlockRecorder {
        acquired: Arc<Tally>,
        released: Arc<Tally>,
    }

    impl Recorder for BlockRecorder {
        fn describe_counter(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
        fn describe_gauge(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
        fn describe_histogram(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}

        fn register_counter(&self, key: &Key, _: &Metadata<'_>) -> Counter {
            match key.name() {
                "camhal_blocks_acquired" => Counter::from_arc(Arc::clone(&self.acquired)),
                "camhal_blocks_released" => Counter::from_arc(Arc::clone(&self.released)),
                _ => Counter::noop(),
            }
        }

        fn register_gauge(&self, _: &Key, _: &Metadata<'_>) -> Gauge {
            Gauge::noop()
        }

        fn register_histogram(&self, _: &Key, _: &Metadata<'_>) -> Histogram {
            Histogram::noop()
        }
    }

    fn allocator() -> (Arc<MemfdAllocator>, MemoryAllocator) {
        let backend = Arc::new(MemfdAllocator::new());
        let allocator = MemoryAllocator::from_arc(backend.clone());
        (backend, allocator)
    }

    #[test]
    fn test_acquire_rounds_to_page() {
        let (_, allocator) = allocator();
        for size in [1, 4095, 4096, 4097, 100_000] {
            let block = allocator.acquire(size, HeapMask::heap(25)).unwrap();
            assert!(block.len() >= size);
            assert_eq!(block.len() % PAGE_SIZE, 0);
            assert_eq!(block.state(), BlockState::Mapped);
        }
    }

    #[test]
    fn test_zero_size_rejected() {
        let (backend, allocator) = allocator();
        assert!(matches!(
            allocator.acquire(0, HeapMask::heap(25)),
            Err(Error::InvalidRequest(_))
        ));
        assert_eq!(backend.live_handles(), 0);
    }

    #[test]
    fn test_release_frees_everything() {
        let (backend, allocator) = allocator();
        let mut block = allocator.acquire(5000, HeapMask::heap(25)).unwrap();
        assert_eq!(backend.live_handles(), 1);
        assert!(block.raw_fd() >= 0);

        block.as_mut_slice()[..5].copy_from_slice(b"hello");
        assert_eq!(&block.as_slice()[..5], b"hello");

        allocator.release(&mut block).unwrap();
        assert_eq!(block.state(), BlockState::Released);
        assert_eq!(backend.live_handles(), 0);
        assert_eq!(block.raw_fd(), -1);
        assert!(block.as_slice().is_empty());

        // Second release is a no-op.
        block.release().unwrap();
    }

    #[test]
    fn test_drop_releases() {
        let (backend, allocator) = allocator();
        {
            let _block = allocator.acquire(4096, HeapMask::heap(25)).unwrap();
            assert_eq!(backend.live_handles(), 1);
        }
        assert_eq!(backend.live_handles(), 0);
    }

    #[test]
    fn test_cache_op_on_released_block_is_noop() {
        let (_, allocator) = allocator();
        let mut block = allocator.acquire(4096, HeapMask::heap(25)).unwrap();
        allocator.cache_op(&block, CacheOp::CleanInvalidate).unwrap();
        block.release().unwrap();
        block.cache_op(CacheOp::Invalidate).unwrap();
    }

    #[test]
    fn test_cache_op_skipped_on_invalid_backend() {
        let backend = Arc::new(ScriptedBackend {
            valid: false,
            ..Default::default()
        });
        let allocator = MemoryAllocator::from_arc(backend.clone());
        let mut block = allocator.acquire(4096, HeapMask::heap(25)).unwrap();
        assert_eq!(block.state(), BlockState::Mapped);

        block.cache_op(CacheOp::Clean).unwrap();
        allocator.cache_op(&block, CacheOp::CleanInvalidate).unwrap();
        assert_eq!(backend.cache_calls.load(Ordering::SeqCst), 0);

        block.release().unwrap();
        block.cache_op(CacheOp::Invalidate).unwrap();
        assert_eq!(backend.cache_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_cache_op_without_handle_skips_backend() {
        let backend = Arc::new(ScriptedBackend {
            valid: true,
            ..Default::default()
        });
        let allocator = MemoryAllocator::from_arc(backend.clone());
        let mut block = allocator.acquire(4096, HeapMask::heap(25)).unwrap();
        block.cache_op(CacheOp::Invalidate).unwrap();
        assert_eq!(backend.cache_calls.load(Ordering::SeqCst), 1);

        // Mapping and descriptor still held, handle gone.
        let handle = block.handle.take().unwrap();
        block.cache_op(CacheOp::Invalidate).unwrap();
        assert_eq!(backend.cache_calls.load(Ordering::SeqCst), 1);

        block.handle = Some(handle);
        block.release().unwrap();
        assert_eq!(backend.inner.live_handles(), 0);
    }

    #[test]
    fn test_release_counted_once_per_acquire() {
        let recorder = BlockRecorder::default();
        let backend = Arc::new(ScriptedBackend {
            valid: true,
            fail_share: true,
            ..Default::default()
        });
        let failing = MemoryAllocator::from_arc(backend.clone());
        let (_, working) = allocator();

        metrics::with_local_recorder(&recorder, || {
            assert!(matches!(
                failing.acquire(4096, HeapMask::heap(25)),
                Err(Error::Alloc {
                    stage: AllocStage::Share,
                    ..
                })
            ));
            let mut block = working.acquire(4096, HeapMask::heap(25)).unwrap();
            block.release().unwrap();
            block.release().unwrap();
        });

        assert_eq!(backend.inner.live_handles(), 0);
        assert_eq!(recorder.acquired.0.load(Ordering::SeqCst), 1);
        assert_eq!(recorder.released.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_shared_mapping_visible_through_fd() {
        let (_, allocator) = allocator();
        let mut block = allocator.acquire(4096, HeapMask::heap(25)).unwrap();
        block.as_mut_slice()[0] = 0xAB;

        let mut byte = [0u8; 1];
        let fd = block.fd().unwrap();
        rustix::io::pread(fd, &mut byte, 0).unwrap();
        assert_eq!(byte[0], 0xAB);
    }
}
