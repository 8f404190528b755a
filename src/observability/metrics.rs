//! Metrics collection using metrics-rs.

use metrics::{Counter, Unit, counter, gauge};
use std::sync::atomic::{AtomicBool, Ordering};

/// Whether metrics have been initialized.
static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

const BLOCKS_ACQUIRED: &str = "camhal_blocks_acquired";
const BLOCKS_RELEASED: &str = "camhal_blocks_released";
const BYTES_ACQUIRED: &str = "camhal_bytes_acquired";
const MAP_FAILURES: &str = "camhal_map_failures";
const PARAM_COMMITS: &str = "camhal_param_commits";
const POOL_BUFFERS: &str = "camhal_pool_buffers";

/// Initialize metrics descriptions.
///
/// Call this once at application startup before using any metrics.
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init_metrics() {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }

    metrics::describe_counter!(
        BLOCKS_ACQUIRED,
        Unit::Count,
        "Kernel memory blocks allocated and mapped"
    );
    metrics::describe_counter!(
        BLOCKS_RELEASED,
        Unit::Count,
        "Kernel memory blocks torn down"
    );
    metrics::describe_counter!(
        BYTES_ACQUIRED,
        Unit::Bytes,
        "Page-rounded bytes of kernel memory allocated"
    );
    metrics::describe_counter!(
        MAP_FAILURES,
        Unit::Count,
        "Buffer map requests rejected by the device"
    );
    metrics::describe_counter!(
        PARAM_COMMITS,
        Unit::Count,
        "Parameter batches sent to the device"
    );
    metrics::describe_gauge!(
        POOL_BUFFERS,
        Unit::Count,
        "Buffers held by the most recently changed pool of each kind"
    );
}

/// Record a block acquired from the kernel allocator.
#[inline]
pub fn record_block_acquired(backend: &'static str, bytes: usize) {
    counter!(BLOCKS_ACQUIRED, "backend" => backend).increment(1);
    counter!(BYTES_ACQUIRED, "backend" => backend).increment(bytes as u64);
}

/// Record a block released.
#[inline]
pub fn record_block_released(backend: &'static str) {
    counter!(BLOCKS_RELEASED, "backend" => backend).increment(1);
}

/// Record a buffer map rejected by the device.
#[inline]
pub fn record_map_failure(buf_type: &'static str) {
    counter!(MAP_FAILURES, "buf_type" => buf_type).increment(1);
}

/// Record one parameter batch committed in `direction` ("set" or "get").
#[inline]
pub fn record_param_commit(direction: &'static str, entries: usize) {
    counter!(PARAM_COMMITS, "direction" => direction).increment(1);
    tracing::trace!(direction, entries, "param commit recorded");
}

/// Record the buffer count of a pool.
#[inline]
pub fn record_pool_buffers(kind: &'static str, buffers: usize) {
    gauge!(POOL_BUFFERS, "kind" => kind).set(buffers as f64);
}

/// Metrics collector for one stream.
///
/// Provides a convenient way to record metrics with pre-configured labels.
#[derive(Clone)]
pub struct StreamMetrics {
    channel: u32,
    stream: u32,
    mapped: Counter,
    unmapped: Counter,
    map_failures: Counter,
}

impl std::fmt::Debug for StreamMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamMetrics")
            .field("channel", &self.channel)
            .field("stream", &self.stream)
            .finish()
    }
}

impl StreamMetrics {
    /// Create a collector labelled with the device-assigned ids.
    pub fn new(channel: u32, stream: u32) -> Self {
        Self {
            channel,
            stream,
            mapped: counter!(
                "camhal_stream_buffers_mapped",
                "channel" => channel.to_string(),
                "stream" => stream.to_string()
            ),
            unmapped: counter!(
                "camhal_stream_buffers_unmapped",
                "channel" => channel.to_string(),
                "stream" => stream.to_string()
            ),
            map_failures: counter!(
                MAP_FAILURES,
                "buf_type" => "stream_buf",
                "channel" => channel.to_string(),
                "stream" => stream.to_string()
            ),
        }
    }

    /// Record a buffer mapped.
    #[inline]
    pub fn record_mapped(&self) {
        self.mapped.increment(1);
    }

    /// Record a buffer unmapped.
    #[inline]
    pub fn record_unmapped(&self) {
        self.unmapped.increment(1);
    }

    /// Record a rejected map.
    #[inline]
    pub fn record_map_failure(&self) {
        self.map_failures.increment(1);
    }

    /// Channel id label.
    pub fn channel(&self) -> u32 {
        self.channel
    }

    /// Stream id label.
    pub fn stream(&self) -> u32 {
        self.stream
    }
}
