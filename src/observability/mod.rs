//! Observability features: metrics and tracing.
//!
//! - **Metrics**: counters and gauges via `metrics-rs`
//! - **Tracing**: structured logging and spans via `tracing`
//!
//! ## Metrics
//!
//! | Metric | Type | Description |
//! |--------|------|-------------|
//! | `camhal_blocks_acquired` | Counter | Kernel blocks allocated and mapped |
//! | `camhal_blocks_released` | Counter | Kernel blocks torn down |
//! | `camhal_bytes_acquired` | Counter | Page-rounded bytes allocated |
//! | `camhal_map_failures` | Counter | Map requests rejected by the device |
//! | `camhal_param_commits` | Counter | Parameter batches sent to the device |
//! | `camhal_pool_buffers` | Gauge | Buffers held per pool kind |
//!
//! ## Tracing
//!
//! Spans are emitted per camera session and per stream; buffer and
//! parameter lifecycle edges log at `debug`, failures at `warn`/`error`.
//!
//! ## Example
//!
//! ```rust,ignore
//! use camhal::observability::init_metrics;
//!
//! // Call once at startup, then install any metrics exporter.
//! init_metrics();
//! ```

pub(crate) mod metrics;
mod tracing_support;

pub use metrics::{
    StreamMetrics, init_metrics, record_block_acquired, record_block_released,
    record_map_failure, record_param_commit, record_pool_buffers,
};
pub use tracing_support::{instrument_stream, span_camera, span_stream, trace_teardown_error};
