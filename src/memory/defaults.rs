//! Default heap ids, buffer counts, and auxiliary buffer sizes.
//!
//! # Usage
//!
//! ```rust,ignore
//! use camhal::memory::{BufferPool, HeapPolicy, defaults};
//!
//! let pool = BufferPool::auxiliary(&allocator, defaults::STREAM_INFO_BUF_LEN, HeapPolicy::default())?;
//! ```

// =============================================================================
// Heaps
// =============================================================================

/// Camera-reserved ION heap, added for pipeline-visible stream buffers.
pub const STREAM_HEAP_ID: u32 = 8;

/// General-purpose ION heap every allocation may fall back to.
pub const FALLBACK_HEAP_ID: u32 = 25;

// =============================================================================
// Buffer counts
// =============================================================================

/// Hard upper bound on buffers per stream.
pub const MAX_BUFS_PER_STREAM: usize = 24;

/// Buffers a stream cycles when the caller does not ask otherwise.
pub const NUM_STREAM_BUFS: usize = 7;

// =============================================================================
// Auxiliary buffer sizes (bytes)
// =============================================================================

/// Capability descriptor filled by the device.
pub const CAPABILITY_BUF_LEN: usize = 64 * 1024;

/// Shared parameter table. Sized for the tuning blobs it can carry.
pub const PARAM_BUF_LEN: usize = 256 * 1024;

/// Per-stream info descriptor.
pub const STREAM_INFO_BUF_LEN: usize = 4096;
