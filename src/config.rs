//! Camera session configuration.

use crate::format::Dimension;
use crate::memory::{HeapPolicy, defaults};
use crate::params::HalVersion;
use crate::stream::{DEFAULT_PREVIEW_DIM, DumpContext, DumpPolicy};

/// Camera session configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraConfig {
    /// ION heap id reserved for camera stream buffers.
    pub stream_heap_id: u32,
    /// ION heap id every allocation may fall back to.
    pub fallback_heap_id: u32,
    /// Stream buffer lengths are rounded to a multiple of this (0 = no rounding).
    ///
    /// Set it to the storage sector size when frames are written straight
    /// to disk.
    pub slice_size: usize,
    /// Buffers per stream. Clamped to [`defaults::MAX_BUFS_PER_STREAM`].
    pub num_stream_bufs: usize,
    /// Preview size. Unset falls back to 640x480.
    pub preview_dim: Dimension,
    /// Snapshot size.
    pub snapshot_dim: Dimension,
    /// Video size.
    pub video_dim: Dimension,
    /// Largest picture the encoder session is opened for.
    pub encoder_max_dim: Dimension,
    /// Frame-dump control word (see [`DumpPolicy`]).
    pub dump_mask: u32,
    /// HAL generation seeded into every parameter batch.
    pub hal_version: HalVersion,
    /// Capability descriptor buffer size.
    pub capability_buf_len: usize,
    /// Parameter table buffer size.
    pub param_buf_len: usize,
    /// Per-stream info descriptor size.
    pub stream_info_buf_len: usize,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            stream_heap_id: defaults::STREAM_HEAP_ID,
            fallback_heap_id: defaults::FALLBACK_HEAP_ID,
            slice_size: 0,
            num_stream_bufs: defaults::NUM_STREAM_BUFS,
            preview_dim: DEFAULT_PREVIEW_DIM,
            snapshot_dim: Dimension::new(4000, 3000),
            video_dim: Dimension::new(1920, 1080),
            encoder_max_dim: Dimension::new(4000, 3000),
            dump_mask: 0,
            hal_version: HalVersion::V1,
            capability_buf_len: defaults::CAPABILITY_BUF_LEN,
            param_buf_len: defaults::PARAM_BUF_LEN,
            stream_info_buf_len: defaults::STREAM_INFO_BUF_LEN,
        }
    }
}

impl CameraConfig {
    /// Set the stream buffer quantum.
    pub fn with_slice_size(mut self, slice_size: usize) -> Self {
        self.slice_size = slice_size;
        self
    }

    /// Set the buffers per stream.
    pub fn with_num_stream_bufs(mut self, num: usize) -> Self {
        self.num_stream_bufs = num;
        self
    }

    /// Set the preview size.
    pub fn with_preview_dim(mut self, dim: Dimension) -> Self {
        self.preview_dim = dim;
        self
    }

    /// Set the snapshot size.
    pub fn with_snapshot_dim(mut self, dim: Dimension) -> Self {
        self.snapshot_dim = dim;
        self
    }

    /// Set the video size.
    pub fn with_video_dim(mut self, dim: Dimension) -> Self {
        self.video_dim = dim;
        self
    }

    /// Set the heaps.
    pub fn with_heaps(mut self, stream_heap_id: u32, fallback_heap_id: u32) -> Self {
        self.stream_heap_id = stream_heap_id;
        self.fallback_heap_id = fallback_heap_id;
        self
    }

    /// Set the frame-dump control word.
    pub fn with_dump_mask(mut self, mask: u32) -> Self {
        self.dump_mask = mask;
        self
    }

    /// Set the HAL generation.
    pub fn with_hal_version(mut self, hal_version: HalVersion) -> Self {
        self.hal_version = hal_version;
        self
    }

    /// Buffers per stream after clamping.
    pub fn stream_buf_count(&self) -> usize {
        self.num_stream_bufs.min(defaults::MAX_BUFS_PER_STREAM)
    }

    /// Heap selection derived from the heap ids.
    pub fn heap_policy(&self) -> HeapPolicy {
        HeapPolicy {
            stream_heap: self.stream_heap_id,
            fallback_heap: self.fallback_heap_id,
        }
    }

    /// Decoded dump control word.
    pub fn dump_policy(&self) -> DumpPolicy {
        DumpPolicy::from_mask(self.dump_mask)
    }

    /// Sizes used to name dump files.
    pub fn dump_context(&self) -> DumpContext {
        DumpContext {
            preview_dim: self.preview_dim.or(DEFAULT_PREVIEW_DIM),
            snapshot_dim: self.snapshot_dim,
            video_dim: self.video_dim,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CameraConfig::default();
        assert_eq!(config.stream_heap_id, 8);
        assert_eq!(config.fallback_heap_id, 25);
        assert_eq!(config.slice_size, 0);
        assert_eq!(config.stream_buf_count(), 7);
        assert_eq!(config.preview_dim, Dimension::new(640, 480));
        assert_eq!(config.hal_version, HalVersion::V1);
        assert!(!config.dump_policy().is_enabled());
    }

    #[test]
    fn test_buf_count_clamped() {
        let config = CameraConfig::default().with_num_stream_bufs(100);
        assert_eq!(config.stream_buf_count(), defaults::MAX_BUFS_PER_STREAM);
    }

    #[test]
    fn test_heap_policy() {
        let policy = CameraConfig::default().with_heaps(3, 4).heap_policy();
        assert_eq!(policy.stream_heap, 3);
        assert_eq!(policy.fallback_heap, 4);
    }

    #[test]
    fn test_dump_context_uses_preview_fallback() {
        let config = CameraConfig::default().with_preview_dim(Dimension::default());
        assert_eq!(config.dump_context().preview_dim, DEFAULT_PREVIEW_DIM);
    }
}
