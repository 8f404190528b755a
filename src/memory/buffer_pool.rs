//! Fixed-size sets of kernel-backed buffers.
//!
//! A [`BufferPool`] holds the buffers of one stream (or one auxiliary
//! descriptor). Every buffer owns exactly one [`MemoryBlock`] and carries
//! the plane descriptors the pipeline uses to address it. Indices are stable
//! for the pool's lifetime so device callbacks can refer to buffers by
//! position.
//!
//! # Example
//!
//! ```rust,ignore
//! use camhal::memory::{BufferPool, FrameLayout, HeapPolicy, PoolKind};
//!
//! let layout = FrameLayout::single_plane(640 * 480 * 3 / 2);
//! let mut pool = BufferPool::allocate(&allocator, &layout, 7, PoolKind::Stream, 0, HeapPolicy::default())?;
//! assert_eq!(pool.len(), 7);
//! pool.release()?;
//! ```

use std::os::fd::{BorrowedFd, RawFd};

use tracing::{debug, warn};

use super::allocator::{HeapMask, round_up};
use super::block::{MemoryAllocator, MemoryBlock};
use super::defaults::{FALLBACK_HEAP_ID, MAX_BUFS_PER_STREAM, STREAM_HEAP_ID};
use super::layout::{FrameLayout, PlaneDescs, derive_planes};
use crate::error::{Error, Result};
use crate::observability::metrics as m;

/// What a pool's buffers are used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolKind {
    /// Pipeline-visible frame buffers; may use the camera heap.
    Stream,
    /// Capability, parameter, and stream-info scratch.
    Auxiliary,
}

impl PoolKind {
    fn label(self) -> &'static str {
        match self {
            PoolKind::Stream => "stream",
            PoolKind::Auxiliary => "auxiliary",
        }
    }
}

/// Which heaps back which pool kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapPolicy {
    /// Heap id added for stream buffers.
    pub stream_heap: u32,
    /// Heap id every allocation may use.
    pub fallback_heap: u32,
}

impl HeapPolicy {
    /// Heap mask for a pool of `kind`.
    pub fn mask(&self, kind: PoolKind) -> HeapMask {
        let fallback = HeapMask::heap(self.fallback_heap);
        match kind {
            PoolKind::Stream => fallback | HeapMask::heap(self.stream_heap),
            PoolKind::Auxiliary => fallback,
        }
    }
}

impl Default for HeapPolicy {
    fn default() -> Self {
        Self {
            stream_heap: STREAM_HEAP_ID,
            fallback_heap: FALLBACK_HEAP_ID,
        }
    }
}

/// One buffer of a pool.
#[derive(Debug)]
pub struct PoolBuffer {
    index: u32,
    block: MemoryBlock,
    planes: PlaneDescs,
}

impl PoolBuffer {
    /// Position within the pool.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Backing block.
    pub fn block(&self) -> &MemoryBlock {
        &self.block
    }

    /// Backing block, mutable.
    pub fn block_mut(&mut self) -> &mut MemoryBlock {
        &mut self.block
    }

    /// Plane descriptors.
    pub fn planes(&self) -> &PlaneDescs {
        &self.planes
    }

    /// Shared descriptor of the backing block.
    pub fn fd(&self) -> Option<BorrowedFd<'_>> {
        self.block.fd()
    }

    /// Raw shared descriptor, or -1 once released.
    pub fn raw_fd(&self) -> RawFd {
        self.block.raw_fd()
    }

    /// Length of the backing block.
    pub fn len(&self) -> usize {
        self.block.len()
    }

    /// True if the backing block is empty.
    pub fn is_empty(&self) -> bool {
        self.block.is_empty()
    }
}

/// An ordered set of buffers sharing one layout.
#[derive(Debug)]
pub struct BufferPool {
    buffers: Vec<PoolBuffer>,
    kind: PoolKind,
    quantum: usize,
    buf_len: usize,
}

impl BufferPool {
    /// Empty pool of `kind`.
    pub fn empty(kind: PoolKind) -> Self {
        Self {
            buffers: Vec::new(),
            kind,
            quantum: 0,
            buf_len: 0,
        }
    }

    /// Allocate `count` buffers laid out like `layout`.
    ///
    /// Each buffer is `layout.frame_len` rounded up to a multiple of
    /// `quantum` (no rounding when `quantum` is 0) before the allocator
    /// applies its own page rounding. If any buffer fails, the ones already
    /// acquired are released and the error is returned.
    pub fn allocate(
        allocator: &MemoryAllocator,
        layout: &FrameLayout,
        count: usize,
        kind: PoolKind,
        quantum: usize,
        heaps: HeapPolicy,
    ) -> Result<Self> {
        if count == 0 || count > MAX_BUFS_PER_STREAM {
            return Err(Error::InvalidRequest(format!(
                "buffer count {count} outside 1..={MAX_BUFS_PER_STREAM}"
            )));
        }
        let buf_len = round_up(layout.frame_len as usize, quantum).ok_or_else(|| {
            Error::InvalidRequest(format!("frame length {} overflows", layout.frame_len))
        })?;
        let mask = heaps.mask(kind);

        let mut pool = Self {
            buffers: Vec::with_capacity(count),
            kind,
            quantum,
            buf_len,
        };

        for index in 0..count as u32 {
            let block = match allocator.acquire(buf_len, mask) {
                Ok(block) => block,
                Err(err) => {
                    warn!(
                        index,
                        count,
                        buf_len,
                        error = %err,
                        "pool allocation failed, releasing acquired buffers"
                    );
                    if let Err(cleanup) = pool.release() {
                        warn!(error = %cleanup, "pool unwind incomplete");
                    }
                    return Err(err);
                }
            };
            let planes = derive_planes(layout, block.raw_fd());
            pool.buffers.push(PoolBuffer {
                index,
                block,
                planes,
            });
        }

        m::record_pool_buffers(kind.label(), count);
        debug!(
            kind = kind.label(),
            count,
            buf_len,
            quantum,
            heaps = mask.0,
            "buffer pool allocated"
        );
        Ok(pool)
    }

    /// Single-buffer auxiliary pool of `len` bytes.
    pub fn auxiliary(allocator: &MemoryAllocator, len: usize, heaps: HeapPolicy) -> Result<Self> {
        let len = u32::try_from(len)
            .map_err(|_| Error::InvalidRequest(format!("auxiliary length {len} too large")))?;
        Self::allocate(
            allocator,
            &FrameLayout::single_plane(len),
            1,
            PoolKind::Auxiliary,
            0,
            heaps,
        )
    }

    /// Release every buffer.
    ///
    /// All buffers are attempted even if one fails; the first error is
    /// returned. The pool is empty and reusable afterwards either way.
    pub fn release(&mut self) -> Result<()> {
        let count = self.buffers.len();
        let mut first_err = None;

        for mut buffer in self.buffers.drain(..) {
            if let Err(err) = buffer.block.release() {
                warn!(index = buffer.index, error = %err, "buffer release failed, continuing");
                first_err.get_or_insert(err);
            }
        }
        self.buf_len = 0;
        self.quantum = 0;

        if count > 0 {
            m::record_pool_buffers(self.kind.label(), 0);
            debug!(kind = self.kind.label(), count, "buffer pool released");
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Buffer at `index`.
    pub fn get(&self, index: u32) -> Option<&PoolBuffer> {
        self.buffers.get(index as usize)
    }

    /// Buffer at `index`, mutable.
    pub fn get_mut(&mut self, index: u32) -> Option<&mut PoolBuffer> {
        self.buffers.get_mut(index as usize)
    }

    /// Buffers in index order.
    pub fn buffers(&self) -> &[PoolBuffer] {
        &self.buffers
    }

    /// Number of buffers.
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    /// True for an empty (unallocated or released) pool.
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Pool kind.
    pub fn kind(&self) -> PoolKind {
        self.kind
    }

    /// Quantum buffer lengths were rounded to.
    pub fn quantum(&self) -> usize {
        self.quantum
    }

    /// Requested per-buffer length, after quantum rounding.
    pub fn buf_len(&self) -> usize {
        self.buf_len
    }
}
