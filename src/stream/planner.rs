//! Stream topology planning.

use tracing::debug;

use crate::format::{Dimension, PpMask, StreamSize, StreamTopology, StreamType};

/// Preview size used when none is configured.
pub const DEFAULT_PREVIEW_DIM: Dimension = Dimension::new(640, 480);

/// What the topology is being built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMode {
    /// Viewfinder running, optionally recording.
    Preview,
    /// Still capture without a viewfinder.
    Capture,
}

/// Features that change the topology.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Features {
    /// Zero-shutter-lag: snapshots are taken from a stream running alongside preview.
    pub zsl: bool,
    /// Video recording alongside preview.
    pub video: bool,
}

/// Builds the set of streams that must coexist.
///
/// Precedence is fixed: a zero-shutter-lag topology wins over a video one,
/// which wins over the plain preview or capture topology.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfigPlanner {
    preview_dim: Dimension,
    snapshot_dim: Dimension,
    video_dim: Dimension,
    required_pp: PpMask,
}

impl StreamConfigPlanner {
    /// Planner for a device requiring `required_pp` post-processing.
    pub fn new(required_pp: PpMask) -> Self {
        Self {
            preview_dim: Dimension::default(),
            snapshot_dim: Dimension::default(),
            video_dim: Dimension::default(),
            required_pp,
        }
    }

    /// Preview size; unset falls back to [`DEFAULT_PREVIEW_DIM`].
    pub fn with_preview_dim(mut self, dim: Dimension) -> Self {
        self.preview_dim = dim;
        self
    }

    /// Snapshot size.
    pub fn with_snapshot_dim(mut self, dim: Dimension) -> Self {
        self.snapshot_dim = dim;
        self
    }

    /// Video size.
    pub fn with_video_dim(mut self, dim: Dimension) -> Self {
        self.video_dim = dim;
        self
    }

    /// Empty topology, sent to drop the current configuration.
    pub fn reset_plan() -> StreamTopology {
        StreamTopology::reset()
    }

    /// Plan the topology for `mode` with `features` enabled.
    pub fn plan(&self, mode: CaptureMode, features: Features) -> StreamTopology {
        let mut topo = StreamTopology::default();
        let mut add = |stream_type: StreamType, dim: Dimension| {
            let pp_mask = self.feature_mask(stream_type, features);
            let pushed = topo.push(StreamSize {
                stream_type,
                dim,
                pp_mask,
            });
            debug_assert!(pushed, "planned topology exceeds stream capacity");
        };

        let preview = self.preview_dim.or(DEFAULT_PREVIEW_DIM);
        if features.zsl {
            add(StreamType::Preview, preview);
            add(StreamType::Snapshot, self.snapshot_dim);
        } else if mode == CaptureMode::Preview {
            if features.video {
                add(StreamType::Snapshot, self.snapshot_dim);
                add(StreamType::Video, self.video_dim);
            }
            add(StreamType::Preview, preview);
        } else {
            add(StreamType::Snapshot, self.snapshot_dim);
        }

        for stream in topo.streams() {
            debug!(
                stream_type = ?stream.stream_type,
                dim = %stream.dim,
                pp_mask = format_args!("{:#x}", stream.pp_mask),
                "planned stream"
            );
        }
        topo
    }

    /// Post-processing a stream needs.
    ///
    /// The device's minimum required mask, limited to sharpness and effects.
    /// A zero-shutter-lag snapshot gets none: it is reprocessed later.
    pub fn feature_mask(&self, stream_type: StreamType, features: Features) -> PpMask {
        if features.zsl && stream_type == StreamType::Snapshot {
            PpMask::NONE
        } else {
            self.required_pp & (PpMask::SHARPNESS | PpMask::EFFECT)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::MAX_NUM_STREAMS;

    fn planner() -> StreamConfigPlanner {
        StreamConfigPlanner::new(PpMask::SHARPNESS | PpMask::CROP)
            .with_snapshot_dim(Dimension::new(4000, 3000))
            .with_video_dim(Dimension::new(1920, 1080))
    }

    fn shape(topo: &StreamTopology) -> Vec<(StreamType, u32, u32)> {
        topo.streams()
            .iter()
            .map(|s| (s.stream_type, s.dim.width, s.dim.height))
            .collect()
    }

    #[test]
    fn test_zsl_topology() {
        let topo = planner()
            .with_preview_dim(Dimension::new(640, 480))
            .plan(
                CaptureMode::Preview,
                Features {
                    zsl: true,
                    video: true,
                },
            );
        assert_eq!(
            shape(&topo),
            vec![
                (StreamType::Preview, 640, 480),
                (StreamType::Snapshot, 4000, 3000)
            ]
        );
        assert_eq!(topo.streams()[0].pp_mask, PpMask::SHARPNESS);
        assert_eq!(topo.streams()[1].pp_mask, PpMask::NONE);
    }

    #[test]
    fn test_video_topology() {
        let topo = planner().plan(
            CaptureMode::Preview,
            Features {
                zsl: false,
                video: true,
            },
        );
        assert_eq!(
            shape(&topo),
            vec![
                (StreamType::Snapshot, 4000, 3000),
                (StreamType::Video, 1920, 1080),
                (StreamType::Preview, 640, 480),
            ]
        );
        assert!(topo.streams().iter().all(|s| s.pp_mask == PpMask::SHARPNESS));
    }

    #[test]
    fn test_preview_defaults_when_unset() {
        let topo = planner().plan(CaptureMode::Preview, Features::default());
        assert_eq!(shape(&topo), vec![(StreamType::Preview, 640, 480)]);
    }

    #[test]
    fn test_capture_topology() {
        let topo = planner().plan(CaptureMode::Capture, Features::default());
        assert_eq!(shape(&topo), vec![(StreamType::Snapshot, 4000, 3000)]);
    }

    #[test]
    fn test_every_plan_fits_topology() {
        let planner = planner();
        for mode in [CaptureMode::Preview, CaptureMode::Capture] {
            for (zsl, video) in [(false, false), (true, false), (false, true), (true, true)] {
                let topo = planner.plan(mode, Features { zsl, video });
                assert!(!topo.is_empty());
                assert!(topo.len() <= MAX_NUM_STREAMS, "{mode:?} zsl={zsl} video={video}");
            }
        }
    }

    #[test]
    fn test_reset_plan_is_empty() {
        assert!(StreamConfigPlanner::reset_plan().is_empty());
    }
}
