//! Kernel-backed shared memory for camera buffers.
//!
//! # Architecture
//!
//! - [`KernelAllocator`]: seam to the kernel allocation facility
//!   ([`IonAllocator`] on devices, [`MemfdAllocator`] on hosts and in tests)
//! - [`MemoryAllocator`]: hands out page-rounded, mapped [`MemoryBlock`]s
//!   and unwinds partial acquisitions
//! - [`BufferPool`]: fixed set of blocks for one stream with per-plane
//!   addressing derived from a [`FrameLayout`]
//!
//! # Example
//!
//! ```rust,ignore
//! use camhal::memory::{BufferPool, FrameLayout, HeapPolicy, IonAllocator, MemoryAllocator, PoolKind};
//!
//! let allocator = MemoryAllocator::new(IonAllocator::open()?);
//! let layout = FrameLayout::single_plane(640 * 480 * 3 / 2);
//! let pool = BufferPool::allocate(&allocator, &layout, 7, PoolKind::Stream, 0, HeapPolicy::default())?;
//! ```

mod allocator;
mod block;
mod buffer_pool;
pub mod defaults;
mod ion;
mod layout;
mod memfd;

pub use allocator::{
    AllocFlags, AllocHandle, CacheOp, CacheRegion, HeapMask, KernelAllocator, PAGE_SIZE,
};
pub use block::{BlockState, MemoryAllocator, MemoryBlock};
pub use buffer_pool::{BufferPool, HeapPolicy, PoolBuffer, PoolKind};
pub use defaults::MAX_BUFS_PER_STREAM;
pub use ion::{ION_DEVICE, IonAllocator};
pub use layout::{FrameLayout, INLINE_PLANES, PlaneDesc, PlaneDescs, PlaneLayout, derive_planes};
pub use memfd::MemfdAllocator;
