//! Channels and the streams they own.

use crate::error::{Error, Result};
use crate::memory::BufferPool;
use crate::session::{ChannelId, StreamId};
use crate::stream::dump::DumpCounter;
use crate::stream::negotiator::StreamBufferNegotiator;

/// Streams one channel can hold.
pub const MAX_STREAMS_PER_CHANNEL: usize = 8;

/// Role of a channel. A camera holds at most one channel per role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelType {
    /// Viewfinder.
    Preview,
    /// Still capture.
    Snapshot,
    /// Recording.
    Video,
    /// Raw dump interface.
    Rdi,
    /// Zero-shutter-lag capture.
    Capture,
    /// Offline reprocessing.
    Reprocess,
}

impl ChannelType {
    /// Number of channel roles.
    pub const COUNT: usize = 6;

    /// Slot index.
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// One stream: its data buffers, its info descriptor, and dump progress.
#[derive(Debug)]
pub struct Stream {
    id: StreamId,
    quantum: usize,
    info_buf: BufferPool,
    negotiator: StreamBufferNegotiator,
    dump: DumpCounter,
}

impl Stream {
    /// Assemble a stream around its mapped info buffer.
    pub fn new(
        id: StreamId,
        quantum: usize,
        info_buf: BufferPool,
        negotiator: StreamBufferNegotiator,
    ) -> Self {
        Self {
            id,
            quantum,
            info_buf,
            negotiator,
            dump: DumpCounter::default(),
        }
    }

    /// Device-assigned id.
    pub fn id(&self) -> StreamId {
        self.id
    }

    /// Quantum the data buffers are rounded to.
    pub fn quantum(&self) -> usize {
        self.quantum
    }

    /// Info descriptor buffer.
    pub fn info_buf(&self) -> &BufferPool {
        &self.info_buf
    }

    /// Info descriptor buffer, mutable.
    pub fn info_buf_mut(&mut self) -> &mut BufferPool {
        &mut self.info_buf
    }

    /// Data buffer negotiator.
    pub fn negotiator(&self) -> &StreamBufferNegotiator {
        &self.negotiator
    }

    /// Data buffer negotiator, mutable.
    pub fn negotiator_mut(&mut self) -> &mut StreamBufferNegotiator {
        &mut self.negotiator
    }

    /// Dump progress, mutable.
    pub fn dump_counter_mut(&mut self) -> &mut DumpCounter {
        &mut self.dump
    }
}

/// A channel and its streams.
#[derive(Debug)]
pub struct Channel {
    id: ChannelId,
    streams: Vec<Stream>,
}

impl Channel {
    /// Empty channel.
    pub fn new(id: ChannelId) -> Self {
        Self {
            id,
            streams: Vec::new(),
        }
    }

    /// Device-assigned id.
    pub fn id(&self) -> ChannelId {
        self.id
    }

    /// Whether another stream fits.
    pub fn has_room(&self) -> bool {
        self.streams.len() < MAX_STREAMS_PER_CHANNEL
    }

    /// Add a stream.
    pub fn push(&mut self, stream: Stream) -> Result<()> {
        if !self.has_room() {
            return Err(Error::Protocol("channel stream table full"));
        }
        self.streams.push(stream);
        Ok(())
    }

    /// Take a stream out of the channel.
    pub fn remove(&mut self, id: StreamId) -> Option<Stream> {
        let pos = self.streams.iter().position(|s| s.id == id)?;
        Some(self.streams.remove(pos))
    }

    /// Stream by id.
    pub fn stream(&self, id: StreamId) -> Option<&Stream> {
        self.streams.iter().find(|s| s.id == id)
    }

    /// Stream by id, mutable.
    pub fn stream_mut(&mut self, id: StreamId) -> Option<&mut Stream> {
        self.streams.iter_mut().find(|s| s.id == id)
    }

    /// Streams in creation order.
    pub fn streams(&self) -> &[Stream] {
        &self.streams
    }

    /// Ids of every stream, in creation order.
    pub fn stream_ids(&self) -> Vec<StreamId> {
        self.streams.iter().map(Stream::id).collect()
    }

    /// Number of streams.
    pub fn len(&self) -> usize {
        self.streams.len()
    }

    /// True when the channel holds no stream.
    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}
