//! # camhal
//!
//! Buffer and parameter plumbing for a camera hardware abstraction layer.
//!
//! camhal sits between a camera application and a vendor imaging pipeline.
//! It allocates frame buffers from kernel shared memory, hands them to the
//! device for mapping, batches device parameters into a single table, and
//! decides which streams must run together.
//!
//! ## Features
//!
//! - **Kernel memory**: page-aligned, cache-maintained blocks from ION
//!   (or memfd on hosts), mapped into this process
//! - **Buffer negotiation**: per-stream allocate and map with exact rollback
//! - **Parameter batches**: typed entries committed in one device call
//! - **Topology planning**: preview, snapshot, video, and zero-shutter-lag
//!   stream sets
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use camhal::prelude::*;
//!
//! let allocator = MemoryAllocator::new(IonAllocator::open()?);
//! let mut camera = CameraContext::open(&module, 0, allocator, CameraConfig::default())?;
//!
//! camera.set_features(Features { zsl: true, video: false });
//! camera.start_stream_config(CaptureMode::Preview)?;
//! camera.set_white_balance(WhiteBalance::Daylight)?;
//! camera.close()?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod camera;
pub mod config;
pub mod error;
pub mod format;
pub mod memory;
pub mod observability;
pub mod params;
pub mod session;
pub mod stream;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::camera::CameraContext;
    pub use crate::config::CameraConfig;
    pub use crate::error::{Error, Result};
    pub use crate::format::{Dimension, StreamTopology, StreamType};
    pub use crate::memory::{FrameLayout, IonAllocator, MemfdAllocator, MemoryAllocator};
    pub use crate::params::{ParameterTable, WhiteBalance};
    pub use crate::session::{DeviceModule, DeviceSession};
    pub use crate::stream::{CaptureMode, ChannelType, Features};
}

pub use error::{Error, Result};
