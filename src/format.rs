//! Stream formats and topology descriptors.
//!
//! These types describe *which* streams exist and at what size; how their
//! bytes are carved into planes lives in [`crate::memory::FrameLayout`].

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

/// Maximum number of streams one topology entry can describe.
pub const MAX_NUM_STREAMS: usize = 8;

/// Width and height in pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Dimension {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimension {
    /// Create a new dimension.
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// True when either side is zero (i.e. "not configured").
    pub const fn is_unset(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Return `self`, or `fallback` if unset.
    pub const fn or(self, fallback: Dimension) -> Dimension {
        if self.is_unset() { fallback } else { self }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Role of a stream within a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StreamType {
    /// Viewfinder output.
    Preview,
    /// Post-capture review frame.
    Postview,
    /// Full-resolution still.
    Snapshot,
    /// Recording output.
    Video,
    /// Raw sensor dump (RDI).
    Raw,
    /// Per-frame metadata.
    Metadata,
    /// Offline reprocessing input.
    OfflineProc,
}

impl StreamType {
    /// Number of stream types.
    pub const COUNT: usize = 7;

    /// Stable index for per-type tables.
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Post-processing feature mask.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct PpMask(pub u32);

impl PpMask {
    /// No post-processing.
    pub const NONE: PpMask = PpMask(0);
    /// Face detection.
    pub const FACE_DETECTION: PpMask = PpMask(1 << 0);
    /// 2D denoise.
    pub const DENOISE_2D: PpMask = PpMask(1 << 1);
    /// Crop.
    pub const CROP: PpMask = PpMask(1 << 2);
    /// Rotation.
    pub const ROTATION: PpMask = PpMask(1 << 3);
    /// Flip.
    pub const FLIP: PpMask = PpMask(1 << 4);
    /// HDR merge.
    pub const HDR: PpMask = PpMask(1 << 5);
    /// Sharpening.
    pub const SHARPNESS: PpMask = PpMask(1 << 7);
    /// Video HDR.
    pub const VIDEO_HDR: PpMask = PpMask(1 << 8);
    /// Chromatic aberration correction.
    pub const CAC: PpMask = PpMask(1 << 9);
    /// Scaling.
    pub const SCALE: PpMask = PpMask(1 << 10);
    /// Color effects.
    pub const EFFECT: PpMask = PpMask(1 << 11);

    /// Whether every bit of `other` is set in `self`.
    pub const fn contains(self, other: PpMask) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether no bit is set.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for PpMask {
    type Output = PpMask;

    fn bitor(self, rhs: PpMask) -> PpMask {
        PpMask(self.0 | rhs.0)
    }
}

impl BitOrAssign for PpMask {
    fn bitor_assign(&mut self, rhs: PpMask) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for PpMask {
    type Output = PpMask;

    fn bitand(self, rhs: PpMask) -> PpMask {
        PpMask(self.0 & rhs.0)
    }
}

impl fmt::LowerHex for PpMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

/// One stream of a topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSize {
    /// Stream role.
    pub stream_type: StreamType,
    /// Output size.
    pub dim: Dimension,
    /// Post-processing the stream needs.
    pub pp_mask: PpMask,
}

/// The set of streams that must coexist, committed as one parameter entry.
///
/// An empty topology is valid and distinct: it tells the device to drop the
/// current configuration before a new one is submitted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamTopology {
    streams: Vec<StreamSize>,
}

impl StreamTopology {
    /// Empty topology (reset).
    pub fn reset() -> Self {
        Self::default()
    }

    /// Append a stream.
    ///
    /// Returns `false` without modifying the topology if it is already full.
    pub fn push(&mut self, stream: StreamSize) -> bool {
        if self.streams.len() >= MAX_NUM_STREAMS {
            return false;
        }
        self.streams.push(stream);
        true
    }

    /// Streams in submission order.
    pub fn streams(&self) -> &[StreamSize] {
        &self.streams
    }

    /// Number of streams.
    pub fn len(&self) -> usize {
        self.streams.len()
    }

    /// True for the reset topology.
    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}
