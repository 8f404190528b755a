//! Stream buffer negotiation.
//!
//! Drives one stream's buffer set through allocate, map, and release, with
//! rollback when the device rejects a map part way through:
//!
//! ```text
//! Unbound --init--> BuffersAllocated --map 0..n--> BuffersMapped --deinit--> Unbound
//!                          |                |
//!                          +-- alloc fail --+-- map k fails: unmap [0, k), release
//! ```
//!
//! Failures are reported, never retried.

use std::os::fd::BorrowedFd;

use smallvec::SmallVec;
use tracing::{debug, error, warn};

use crate::error::{Error, Result};
use crate::memory::{
    BufferPool, CacheOp, FrameLayout, HeapPolicy, MAX_BUFS_PER_STREAM, MemoryAllocator,
    PoolBuffer, PoolKind,
};
use crate::observability::StreamMetrics;
use crate::session::{ChannelId, DeviceResult, DeviceSession, MappingBufType, StreamId};

/// Per-buffer map callbacks the negotiator drives.
pub trait MapOps {
    /// Map buffer `index` (plane `plane`, or -1 for the whole buffer).
    fn map(
        &mut self,
        index: u32,
        plane: i32,
        fd: BorrowedFd<'_>,
        len: usize,
        buf_type: MappingBufType,
    ) -> DeviceResult<()>;

    /// Forget buffer `index`.
    fn unmap(&mut self, index: u32, plane: i32, buf_type: MappingBufType) -> DeviceResult<()>;
}

/// [`MapOps`] routed to one stream of a device session.
pub struct StreamMapOps<'a> {
    session: &'a mut dyn DeviceSession,
    channel: ChannelId,
    stream: StreamId,
}

impl<'a> StreamMapOps<'a> {
    /// Bind map calls to `channel`/`stream` of `session`.
    pub fn new(session: &'a mut dyn DeviceSession, channel: ChannelId, stream: StreamId) -> Self {
        Self {
            session,
            channel,
            stream,
        }
    }
}

impl MapOps for StreamMapOps<'_> {
    fn map(
        &mut self,
        index: u32,
        plane: i32,
        fd: BorrowedFd<'_>,
        len: usize,
        buf_type: MappingBufType,
    ) -> DeviceResult<()> {
        self.session
            .map_stream_buf(self.channel, self.stream, buf_type, index, plane, fd, len)
    }

    fn unmap(&mut self, index: u32, plane: i32, buf_type: MappingBufType) -> DeviceResult<()> {
        self.session
            .unmap_stream_buf(self.channel, self.stream, buf_type, index, plane)
    }
}

/// Negotiation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiatorState {
    /// No buffers held.
    Unbound,
    /// Pool allocated, maps in progress.
    BuffersAllocated,
    /// Every buffer mapped.
    BuffersMapped,
}

/// What a successful init hands back to the pipeline.
#[derive(Debug)]
pub struct BufferRegistration<'a> {
    /// Buffers in index order.
    pub buffers: &'a [PoolBuffer],
    /// Whether each buffer starts out queued to the device. All true.
    pub initially_registered: SmallVec<[bool; MAX_BUFS_PER_STREAM]>,
}

impl BufferRegistration<'_> {
    /// Number of buffers.
    pub fn count(&self) -> usize {
        self.buffers.len()
    }
}

/// Buffer negotiator for one stream.
#[derive(Debug)]
pub struct StreamBufferNegotiator {
    allocator: MemoryAllocator,
    heaps: HeapPolicy,
    pool: BufferPool,
    state: NegotiatorState,
    metrics: Option<StreamMetrics>,
}

impl StreamBufferNegotiator {
    /// Unbound negotiator drawing from `allocator`.
    pub fn new(allocator: MemoryAllocator, heaps: HeapPolicy) -> Self {
        Self {
            allocator,
            heaps,
            pool: BufferPool::empty(PoolKind::Stream),
            state: NegotiatorState::Unbound,
            metrics: None,
        }
    }

    /// Attach per-stream counters.
    pub fn with_metrics(mut self, metrics: StreamMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Allocate `num_bufs` buffers (clamped to [`MAX_BUFS_PER_STREAM`]) and
    /// map each in ascending index order.
    ///
    /// If the map of buffer `k` fails, buffers `[0, k)` are unmapped in
    /// ascending order, the pool is released, and [`Error::Map`] is returned.
    pub fn init(
        &mut self,
        ops: &mut dyn MapOps,
        layout: &FrameLayout,
        num_bufs: usize,
        quantum: usize,
    ) -> Result<BufferRegistration<'_>> {
        if self.state != NegotiatorState::Unbound {
            return Err(Error::Protocol("stream buffers already initialized"));
        }

        let count = num_bufs.min(MAX_BUFS_PER_STREAM);
        if count < num_bufs {
            debug!(requested = num_bufs, count, "buffer count clamped");
        }
        self.pool = BufferPool::allocate(
            &self.allocator,
            layout,
            count,
            PoolKind::Stream,
            quantum,
            self.heaps,
        )?;
        self.state = NegotiatorState::BuffersAllocated;

        let mut failed = None;
        for buffer in self.pool.buffers() {
            let index = buffer.index();
            let Some(fd) = buffer.fd() else {
                failed = Some((index, Error::Protocol("pool buffer without descriptor")));
                break;
            };
            match ops.map(index, -1, fd, buffer.len(), MappingBufType::StreamBuf) {
                Ok(()) => {
                    if let Some(metrics) = &self.metrics {
                        metrics.record_mapped();
                    }
                }
                Err(source) => {
                    if let Some(metrics) = &self.metrics {
                        metrics.record_map_failure();
                    }
                    failed = Some((index, Error::Map { index, source }));
                    break;
                }
            }
        }

        if let Some((k, err)) = failed {
            error!(index = k, count, error = %err, "buffer map failed, rolling back");
            self.rollback(ops, k);
            return Err(err);
        }

        self.state = NegotiatorState::BuffersMapped;
        debug!(count, buf_len = self.pool.buf_len(), "stream buffers mapped");
        Ok(BufferRegistration {
            buffers: self.pool.buffers(),
            initially_registered: std::iter::repeat_n(true, count).collect(),
        })
    }

    fn rollback(&mut self, ops: &mut dyn MapOps, mapped: u32) {
        for index in 0..mapped {
            if let Err(source) = ops.unmap(index, -1, MappingBufType::StreamBuf) {
                warn!(index, error = %source, "rollback unmap failed, continuing");
            }
        }
        if let Err(err) = self.pool.release() {
            warn!(error = %err, "rollback release incomplete");
        }
        self.state = NegotiatorState::Unbound;
    }

    /// Unmap every buffer in ascending order, then release the pool.
    ///
    /// Runs to completion regardless of individual failures and returns the
    /// first one.
    pub fn deinit(&mut self, ops: &mut dyn MapOps) -> Result<()> {
        if self.state == NegotiatorState::Unbound {
            return Err(Error::Protocol("stream buffers not initialized"));
        }

        let mut first_err = None;
        for buffer in self.pool.buffers() {
            let index = buffer.index();
            match ops.unmap(index, -1, MappingBufType::StreamBuf) {
                Ok(()) => {
                    if let Some(metrics) = &self.metrics {
                        metrics.record_unmapped();
                    }
                }
                Err(source) => {
                    warn!(index, error = %source, "buffer unmap failed, continuing");
                    first_err.get_or_insert(Error::Unmap { index, source });
                }
            }
        }

        let count = self.pool.len();
        if let Err(err) = self.pool.release() {
            first_err.get_or_insert(err);
        }
        self.state = NegotiatorState::Unbound;
        debug!(count, "stream buffers released");
        first_err.map_or(Ok(()), Err)
    }

    /// Invalidate the cache lines of buffer `index` (after a hardware write).
    pub fn invalidate(&self, index: u32) -> Result<()> {
        self.cache_op(index, CacheOp::Invalidate)
    }

    /// Clean and invalidate buffer `index` (before a hardware read).
    pub fn clean_invalidate(&self, index: u32) -> Result<()> {
        self.cache_op(index, CacheOp::CleanInvalidate)
    }

    fn cache_op(&self, index: u32, op: CacheOp) -> Result<()> {
        let buffer = self
            .pool
            .get(index)
            .ok_or_else(|| Error::InvalidRequest(format!("no stream buffer at index {index}")))?;
        self.allocator.cache_op(buffer.block(), op)
    }

    /// Current state.
    pub fn state(&self) -> NegotiatorState {
        self.state
    }

    /// Buffers held, in index order.
    pub fn buffers(&self) -> &[PoolBuffer] {
        self.pool.buffers()
    }

    /// Buffer at `index`, mutable (for CPU access to its block).
    pub fn buffer_mut(&mut self, index: u32) -> Option<&mut PoolBuffer> {
        self.pool.get_mut(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemfdAllocator;
    use crate::session::DeviceError;
    use std::sync::Arc;

    #[derive(Default)]
    struct RecordingOps {
        mapped: Vec<(u32, usize)>,
        unmapped: Vec<u32>,
        fail_map_at: Option<u32>,
        fail_unmap_at: Option<u32>,
    }

    impl MapOps for RecordingOps {
        fn map(
            &mut self,
            index: u32,
            plane: i32,
            _fd: BorrowedFd<'_>,
            len: usize,
            buf_type: MappingBufType,
        ) -> DeviceResult<()> {
            assert_eq!(plane, -1);
            assert_eq!(buf_type, MappingBufType::StreamBuf);
            if self.fail_map_at == Some(index) {
                return Err(DeviceError::GENERAL);
            }
            self.mapped.push((index, len));
            Ok(())
        }

        fn unmap(&mut self, index: u32, _plane: i32, _buf_type: MappingBufType) -> DeviceResult<()> {
            self.unmapped.push(index);
            if self.fail_unmap_at == Some(index) {
                return Err(DeviceError::new(-22));
            }
            Ok(())
        }
    }

    fn negotiator() -> (Arc<MemfdAllocator>, StreamBufferNegotiator) {
        let backend = Arc::new(MemfdAllocator::new());
        let allocator = MemoryAllocator::from_arc(backend.clone());
        (
            backend,
            StreamBufferNegotiator::new(allocator, HeapPolicy::default()),
        )
    }

    #[test]
    fn test_init_maps_in_order() {
        let (backend, mut negotiator) = negotiator();
        let mut ops = RecordingOps::default();
        let layout = FrameLayout::single_plane(1000);

        let reg = negotiator.init(&mut ops, &layout, 5, 0).unwrap();
        assert_eq!(reg.count(), 5);
        assert!(reg.initially_registered.iter().all(|&r| r));
        assert_eq!(reg.initially_registered.len(), 5);

        let indices: Vec<u32> = ops.mapped.iter().map(|(i, _)| *i).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
        // The device sees the page-rounded allocation, not the frame length.
        assert!(ops.mapped.iter().all(|(_, len)| *len == 4096));
        assert_eq!(negotiator.state(), NegotiatorState::BuffersMapped);
        assert_eq!(backend.live_handles(), 5);
    }

    #[test]
    fn test_map_len_follows_quantum() {
        let (_, mut negotiator) = negotiator();
        let mut ops = RecordingOps::default();
        let reg = negotiator
            .init(&mut ops, &FrameLayout::single_plane(15_000), 2, 10_000)
            .unwrap();
        let lens: Vec<usize> = reg.buffers.iter().map(PoolBuffer::len).collect();
        assert_eq!(lens, vec![20_480, 20_480]);
        assert_eq!(ops.mapped, vec![(0, 20_480), (1, 20_480)]);
    }

    #[test]
    fn test_init_clamps_count() {
        let (_, mut negotiator) = negotiator();
        let mut ops = RecordingOps::default();
        let reg = negotiator
            .init(&mut ops, &FrameLayout::single_plane(64), 100, 0)
            .unwrap();
        assert_eq!(reg.count(), MAX_BUFS_PER_STREAM);
    }

    #[test]
    fn test_rollback_at_each_index() {
        const N: u32 = 6;
        for k in 0..N {
            let (backend, mut negotiator) = negotiator();
            let mut ops = RecordingOps {
                fail_map_at: Some(k),
                ..Default::default()
            };

            let err = negotiator
                .init(&mut ops, &FrameLayout::single_plane(512), N as usize, 0)
                .unwrap_err();
            assert!(matches!(err, Error::Map { index, .. } if index == k));

            let expected: Vec<u32> = (0..k).collect();
            assert_eq!(ops.unmapped, expected, "failure at {k}");
            assert_eq!(backend.live_handles(), 0);
            assert_eq!(negotiator.state(), NegotiatorState::Unbound);
            assert!(negotiator.buffers().is_empty());
        }
    }

    #[test]
    fn test_double_init_rejected() {
        let (_, mut negotiator) = negotiator();
        let mut ops = RecordingOps::default();
        let layout = FrameLayout::single_plane(64);
        negotiator.init(&mut ops, &layout, 2, 0).unwrap();
        assert!(matches!(
            negotiator.init(&mut ops, &layout, 2, 0),
            Err(Error::Protocol(_))
        ));
    }

    #[test]
    fn test_deinit_continues_past_failures() {
        let (backend, mut negotiator) = negotiator();
        let mut ops = RecordingOps {
            fail_unmap_at: Some(1),
            ..Default::default()
        };
        negotiator
            .init(&mut ops, &FrameLayout::single_plane(64), 4, 0)
            .unwrap();

        let err = negotiator.deinit(&mut ops).unwrap_err();
        assert!(matches!(err, Error::Unmap { index: 1, .. }));
        assert_eq!(ops.unmapped, vec![0, 1, 2, 3]);
        assert_eq!(backend.live_handles(), 0);
        assert_eq!(negotiator.state(), NegotiatorState::Unbound);

        assert!(matches!(
            negotiator.deinit(&mut ops),
            Err(Error::Protocol(_))
        ));
    }

    #[test]
    fn test_cache_hooks() {
        let (_, mut negotiator) = negotiator();
        let mut ops = RecordingOps::default();
        negotiator
            .init(&mut ops, &FrameLayout::single_plane(64), 2, 0)
            .unwrap();

        negotiator.invalidate(0).unwrap();
        negotiator.clean_invalidate(1).unwrap();
        assert!(matches!(
            negotiator.invalidate(2),
            Err(Error::InvalidRequest(_))
        ));
    }
}
