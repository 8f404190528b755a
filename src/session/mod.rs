//! Device and encoder session capability interfaces.
//!
//! The imaging pipeline and the encoder live outside this crate. They are
//! reached through the traits in this module, injected by the host at
//! construction time (typically backed by a vendor library the host loaded).
//!
//! # Architecture
//!
//! - [`DeviceModule`]: entry point that enumerates and opens cameras
//! - [`DeviceSession`]: one open camera (parameters, channels, streams, buffer mapping)
//! - [`EncoderSession`]: one open encoder client
//! - [`Notifier`]: single-pending-signal wait handle released by device events
//!
//! The session never owns the buffers it is told about. Map calls hand it a
//! borrowed descriptor plus length; it must be told to forget them through the
//! matching unmap call.

mod notify;

pub use notify::{Notifier, WaitStatus};

use std::os::fd::BorrowedFd;

use thiserror::Error;

use crate::format::{Dimension, PpMask, StreamType};
use crate::params::{FocusMode, ParameterTable};

/// Error reported by the device or encoder session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("device error code {code}")]
pub struct DeviceError {
    /// Status code returned by the session.
    pub code: i32,
}

impl DeviceError {
    /// Generic failure code.
    pub const GENERAL: DeviceError = DeviceError { code: -1 };

    /// Create an error from a raw status code.
    pub const fn new(code: i32) -> Self {
        Self { code }
    }
}

/// Result type for session calls.
pub type DeviceResult<T> = std::result::Result<T, DeviceError>;

/// Identity the device assigns to a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId(pub u32);

/// Identity the device assigns to a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamId(pub u32);

/// Role of a buffer handed to the device for mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MappingBufType {
    /// Capability descriptor filled by `query_capability`.
    Capability,
    /// Shared parameter table.
    ParmBuf,
    /// Per-stream data buffer.
    StreamBuf,
    /// Per-stream info descriptor.
    StreamInfo,
    /// Input buffer for offline reprocessing.
    OfflineInput,
}

impl MappingBufType {
    /// Short name used in logs and metric labels.
    pub const fn label(self) -> &'static str {
        match self {
            MappingBufType::Capability => "capability",
            MappingBufType::ParmBuf => "parm_buf",
            MappingBufType::StreamBuf => "stream_buf",
            MappingBufType::StreamInfo => "stream_info",
            MappingBufType::OfflineInput => "offline_input",
        }
    }
}

/// Asynchronous event delivered through the registered notify callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceEvent {
    /// Autofocus sweep finished.
    AutoFocusDone,
    /// Smooth zoom reached its target.
    ZoomDone,
    /// Any other server event, by raw type.
    Other(u32),
}

impl DeviceEvent {
    /// Whether this event should release a pending wait.
    pub fn releases_wait(&self) -> bool {
        matches!(self, DeviceEvent::AutoFocusDone | DeviceEvent::ZoomDone)
    }
}

/// Callback invoked by the session for asynchronous events.
pub type EventCallback = Box<dyn Fn(&DeviceEvent) + Send + Sync>;

/// Capabilities reported by the device.
#[derive(Debug, Clone, PartialEq)]
pub struct Capability {
    /// Lowest accepted exposure compensation step.
    pub exposure_compensation_min: i32,
    /// Highest accepted exposure compensation step.
    pub exposure_compensation_max: i32,
    /// Post-processing the device requires on every stream.
    pub min_required_pp_mask: PpMask,
    /// Focus modes the sensor module supports.
    pub supported_focus_modes: Vec<FocusMode>,
    /// Raw (RDI) output dimensions, largest first.
    pub raw_dims: Vec<Dimension>,
}

impl Capability {
    /// Focus is adjustable unless the only supported mode is `Fixed`.
    pub fn focus_supported(&self) -> bool {
        !(self.supported_focus_modes.len() == 1
            && self.supported_focus_modes[0] == FocusMode::Fixed)
    }
}

impl Default for Capability {
    fn default() -> Self {
        Self {
            exposure_compensation_min: -12,
            exposure_compensation_max: 12,
            min_required_pp_mask: PpMask::NONE,
            supported_focus_modes: vec![FocusMode::Auto],
            raw_dims: Vec::new(),
        }
    }
}

/// Per-stream configuration handed to `config_stream`.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamConfig {
    /// Role of the stream.
    pub stream_type: StreamType,
    /// Output dimensions.
    pub dim: Dimension,
    /// Number of buffers the stream will cycle.
    pub num_bufs: u8,
    /// Post-processing to apply.
    pub pp_mask: PpMask,
}

/// Host-provided entry point to the imaging pipeline.
pub trait DeviceModule: Send + Sync {
    /// Number of cameras the pipeline exposes.
    fn num_cameras(&self) -> u8;

    /// Open a camera session.
    fn open(&self, camera_id: u8) -> DeviceResult<Box<dyn DeviceSession>>;

    /// Open an encoder client able to handle pictures up to `max_dim`.
    fn open_encoder(&self, max_dim: Dimension) -> DeviceResult<Box<dyn EncoderSession>>;
}

/// An open camera session.
///
/// All calls are synchronous: they return once the device has processed the
/// request. Asynchronous completions arrive through the callback passed to
/// [`register_event_notify`](DeviceSession::register_event_notify).
pub trait DeviceSession: Send {
    /// Close the camera. No other call is valid afterwards.
    fn close(&mut self) -> DeviceResult<()>;

    /// Ask the device to report its capabilities.
    fn query_capability(&mut self) -> DeviceResult<Capability>;

    /// Apply every set entry of the table in one round trip.
    fn set_parms(&mut self, table: &ParameterTable) -> DeviceResult<()>;

    /// Fill every set entry of the table with the device's current value.
    fn get_parms(&mut self, table: &mut ParameterTable) -> DeviceResult<()>;

    /// Create a channel.
    fn add_channel(&mut self) -> DeviceResult<ChannelId>;

    /// Destroy a channel.
    fn delete_channel(&mut self, channel: ChannelId) -> DeviceResult<()>;

    /// Create a stream inside a channel.
    fn add_stream(&mut self, channel: ChannelId) -> DeviceResult<StreamId>;

    /// Destroy a stream.
    fn delete_stream(&mut self, channel: ChannelId, stream: StreamId) -> DeviceResult<()>;

    /// Configure a stream before its channel starts.
    fn config_stream(
        &mut self,
        channel: ChannelId,
        stream: StreamId,
        config: &StreamConfig,
    ) -> DeviceResult<()>;

    /// Start every stream of a channel.
    fn start_channel(&mut self, channel: ChannelId) -> DeviceResult<()>;

    /// Stop every stream of a channel.
    fn stop_channel(&mut self, channel: ChannelId) -> DeviceResult<()>;

    /// Map a session-wide singleton buffer.
    fn map_buf(&mut self, buf_type: MappingBufType, fd: BorrowedFd<'_>, len: usize)
    -> DeviceResult<()>;

    /// Forget a session-wide singleton buffer.
    fn unmap_buf(&mut self, buf_type: MappingBufType) -> DeviceResult<()>;

    /// Map one plane (or, with `plane_idx == -1`, a whole buffer) of a stream.
    #[allow(clippy::too_many_arguments)]
    fn map_stream_buf(
        &mut self,
        channel: ChannelId,
        stream: StreamId,
        buf_type: MappingBufType,
        buf_idx: u32,
        plane_idx: i32,
        fd: BorrowedFd<'_>,
        len: usize,
    ) -> DeviceResult<()>;

    /// Forget a stream buffer mapped with `map_stream_buf`.
    fn unmap_stream_buf(
        &mut self,
        channel: ChannelId,
        stream: StreamId,
        buf_type: MappingBufType,
        buf_idx: u32,
        plane_idx: i32,
    ) -> DeviceResult<()>;

    /// Install the asynchronous event callback.
    fn register_event_notify(&mut self, callback: EventCallback) -> DeviceResult<()>;

    /// Start an autofocus sweep; completion arrives as [`DeviceEvent::AutoFocusDone`].
    fn do_auto_focus(&mut self) -> DeviceResult<()>;

    /// Abort a running autofocus sweep.
    fn cancel_auto_focus(&mut self) -> DeviceResult<()>;
}

/// An open encoder client.
pub trait EncoderSession: Send {
    /// Close the client.
    fn close(&mut self) -> DeviceResult<()>;
}
