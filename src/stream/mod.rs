//! Per-stream buffer negotiation and topology planning.
//!
//! - [`StreamBufferNegotiator`]: allocates a stream's buffers and maps them
//!   into the device, rolling back on partial failure
//! - [`StreamConfigPlanner`]: decides which streams must coexist
//! - [`Channel`] / [`Stream`]: ownership of buffer sets by device identity
//! - [`DumpPolicy`] / [`DumpCounter`]: which frames to dump and what to call them

mod channel;
mod dump;
mod negotiator;
mod planner;

pub use channel::{Channel, ChannelType, MAX_STREAMS_PER_CHANNEL, Stream};
pub use dump::{
    DEFAULT_DUMP_FRAMES, DumpContext, DumpCounter, DumpPolicy, DumpType, MAX_DUMP_FRAMES,
    dump_file_name,
};
pub use negotiator::{
    BufferRegistration, MapOps, NegotiatorState, StreamBufferNegotiator, StreamMapOps,
};
pub use planner::{CaptureMode, DEFAULT_PREVIEW_DIM, Features, StreamConfigPlanner};
