//! Error types for camhal.

use thiserror::Error;

use crate::params::ParamKind;
use crate::session::DeviceError;

/// Result type alias using camhal's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Step of a kernel allocation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocStage {
    /// The allocation request itself.
    Allocate,
    /// Exporting the allocation as a shareable descriptor.
    Share,
    /// Mapping the descriptor into this process.
    Map,
    /// Unmapping during release.
    Unmap,
    /// Freeing the kernel handle during release.
    Free,
    /// Cache maintenance on a mapped region.
    Cache,
}

impl std::fmt::Display for AllocStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AllocStage::Allocate => "allocate",
            AllocStage::Share => "share",
            AllocStage::Map => "mmap",
            AllocStage::Unmap => "munmap",
            AllocStage::Free => "free",
            AllocStage::Cache => "cache maintenance",
        };
        f.write_str(s)
    }
}

/// Main error type for camhal operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Kernel allocation, descriptor sharing, or mapping failed.
    #[error("kernel memory {stage} failed: {source}")]
    Alloc {
        /// Which step failed.
        stage: AllocStage,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// The device session rejected a buffer map.
    #[error("device rejected map of buffer {index}: {source}")]
    Map {
        /// Buffer index that failed.
        index: u32,
        /// Device-side error.
        #[source]
        source: DeviceError,
    },

    /// The device session rejected a buffer unmap.
    #[error("device rejected unmap of buffer {index}: {source}")]
    Unmap {
        /// Buffer index that failed.
        index: u32,
        /// Device-side error.
        #[source]
        source: DeviceError,
    },

    /// A value lies outside the range the device advertised.
    #[error("{kind:?} value {value} outside supported range [{min}, {max}]")]
    OutOfRange {
        /// Parameter being validated.
        kind: ParamKind,
        /// Rejected value.
        value: i64,
        /// Lowest accepted value.
        min: i64,
        /// Highest accepted value.
        max: i64,
    },

    /// A parameter tag outside the known enumeration.
    #[error("unknown parameter tag {0}")]
    UnknownParam(u32),

    /// A value was written under a kind whose declared shape differs.
    #[error("parameter shape mismatch: slot is {expected:?}, value is {found:?}")]
    ShapeMismatch {
        /// Kind of the table slot.
        expected: ParamKind,
        /// Kind the value belongs to.
        found: ParamKind,
    },

    /// Read of a parameter that was never set in this batch.
    #[error("parameter {0:?} is not set")]
    NotSet(ParamKind),

    /// The parameter buffer cannot hold a batch, or holds a malformed one.
    #[error("parameter buffer: {0}")]
    ParamBuf(&'static str),

    /// Buffer pool request outside the supported bounds.
    #[error("invalid buffer request: {0}")]
    InvalidRequest(String),

    /// The protocol was used out of order.
    #[error("protocol violation: {0}")]
    Protocol(&'static str),

    /// Any other device session call failed.
    #[error("device {op} failed: {source}")]
    Device {
        /// Name of the session operation.
        op: &'static str,
        /// Device-side error.
        #[source]
        source: DeviceError,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// System call error (via rustix).
    #[error("system error: {0}")]
    System(#[from] rustix::io::Errno),
}

impl Error {
    /// Wrap a device error with the name of the session call that produced it.
    pub(crate) fn device(op: &'static str) -> impl FnOnce(DeviceError) -> Self {
        move |source| Error::Device { op, source }
    }

    pub(crate) fn alloc(stage: AllocStage, source: impl Into<std::io::Error>) -> Self {
        Error::Alloc {
            stage,
            source: source.into(),
        }
    }

    /// Whether this error signals a programming mistake rather than a runtime failure.
    pub fn is_programming_error(&self) -> bool {
        matches!(self, Error::ShapeMismatch { .. })
    }
}
