//! Tracing integration for structured logging and spans.

use tracing::{Level, Span, span};

use crate::session::{ChannelId, StreamId};

/// Create a span covering work on one stream.
///
/// # Example
///
/// ```rust,ignore
/// use camhal::observability::span_stream;
///
/// let span = span_stream(channel, stream);
/// let _guard = span.enter();
/// // Buffer negotiation here...
/// ```
#[inline]
pub fn span_stream(channel: ChannelId, stream: StreamId) -> Span {
    span!(
        Level::DEBUG,
        "stream",
        channel = channel.0,
        stream = stream.0
    )
}

/// Create a span covering one camera session.
#[inline]
pub fn span_camera(camera_id: u8) -> Span {
    span!(Level::INFO, "camera", id = camera_id)
}

/// Enter a stream span and return the guard.
pub fn instrument_stream(channel: ChannelId, stream: StreamId) -> tracing::span::EnteredSpan {
    span_stream(channel, stream).entered()
}

/// Log a device call that failed during best-effort teardown.
#[inline]
pub fn trace_teardown_error(op: &str, error: &dyn std::error::Error) {
    tracing::warn!(op = %op, error = %error, "teardown step failed, continuing");
}
