//! Frame-dump selection and naming.
//!
//! A 32-bit control word decides which frames are worth dumping:
//!
//! | Bits | Meaning |
//! |------|---------|
//! | 0-7 | dump types ([`DumpType::bit`]) |
//! | 8-15 | dump every n-th frame (0 means every frame) |
//! | 16-31 | frames to dump (0 means 10, capped at 256) |
//!
//! With the cap of 256 the numbering cycles back to 0 instead of stopping.
//! Writing the bytes out is left to the caller.

use crate::format::Dimension;

/// Frame count when the control word leaves it at zero.
pub const DEFAULT_DUMP_FRAMES: u32 = 10;

/// Frame count at which numbering cycles.
pub const MAX_DUMP_FRAMES: u32 = 256;

/// Kind of frame being dumped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DumpType {
    /// Viewfinder frame.
    Preview,
    /// Recording frame.
    Video,
    /// Full-size still.
    Snapshot,
    /// Thumbnail.
    Thumbnail,
    /// Raw sensor frame.
    Raw,
    /// Encoded still.
    Jpeg,
}

impl DumpType {
    /// Bit selecting this type in the control word.
    pub const fn bit(self) -> u32 {
        match self {
            DumpType::Preview => 0x01,
            DumpType::Video => 0x02,
            DumpType::Snapshot => 0x04,
            DumpType::Thumbnail => 0x08,
            DumpType::Raw => 0x10,
            DumpType::Jpeg => 0x20,
        }
    }

    fn suffix(self) -> char {
        match self {
            DumpType::Preview => 'p',
            DumpType::Video => 'v',
            DumpType::Snapshot => 's',
            DumpType::Thumbnail => 't',
            DumpType::Raw => 'r',
            DumpType::Jpeg => 'j',
        }
    }

    fn extension(self) -> &'static str {
        match self {
            DumpType::Raw => "raw",
            _ => "yuv",
        }
    }
}

/// Decoded control word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DumpPolicy {
    types: u32,
    skip: u32,
    frames: u32,
}

impl DumpPolicy {
    /// Decode a control word.
    pub fn from_mask(mask: u32) -> Self {
        let skip = match (mask >> 8) & 0xff {
            0 => 1,
            n => n,
        };
        let frames = match mask >> 16 {
            0 => DEFAULT_DUMP_FRAMES,
            n => n.min(MAX_DUMP_FRAMES),
        };
        Self {
            types: mask & 0xff,
            skip,
            frames,
        }
    }

    /// Policy that never dumps.
    pub fn disabled() -> Self {
        Self::from_mask(0)
    }

    /// Whether any dump type is selected.
    pub fn is_enabled(&self) -> bool {
        self.types != 0
    }

    /// Whether `dump_type` is selected.
    pub fn wants(&self, dump_type: DumpType) -> bool {
        self.types & dump_type.bit() != 0
    }

    /// Dump every n-th eligible frame.
    pub fn skip(&self) -> u32 {
        self.skip
    }

    /// Frames to dump.
    pub fn frames(&self) -> u32 {
        self.frames
    }
}

impl Default for DumpPolicy {
    fn default() -> Self {
        Self::disabled()
    }
}

/// Per-stream dump progress.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DumpCounter {
    frame: u32,
    seen: u32,
}

impl DumpCounter {
    /// Decide whether the next frame of `dump_type` is dumped.
    ///
    /// Returns the frame number to use in the file name and advances. A
    /// policy with no type selected resets the counter.
    pub fn next(&mut self, policy: &DumpPolicy, dump_type: DumpType) -> Option<u32> {
        if !policy.is_enabled() {
            self.frame = 0;
            return None;
        }
        if !policy.wants(dump_type) {
            return None;
        }

        if self.seen == 0 {
            self.seen = 1;
        }
        let due = self.seen % policy.skip == 0;
        self.seen = self.seen.wrapping_add(1);
        if !due {
            return None;
        }

        if policy.frames == MAX_DUMP_FRAMES && self.frame >= MAX_DUMP_FRAMES {
            self.frame = 0;
        }
        if self.frame >= policy.frames {
            return None;
        }
        let frame = self.frame;
        self.frame += 1;
        Some(frame)
    }

    /// Frames dumped since the last reset.
    pub fn frame(&self) -> u32 {
        self.frame
    }
}

/// Sizes needed to name dump files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DumpContext {
    /// Preview (and thumbnail) size.
    pub preview_dim: Dimension,
    /// Snapshot, raw, and JPEG size.
    pub snapshot_dim: Dimension,
    /// Video size.
    pub video_dim: Dimension,
}

impl DumpContext {
    fn dim_for(&self, dump_type: DumpType) -> Dimension {
        match dump_type {
            DumpType::Preview | DumpType::Thumbnail => self.preview_dim,
            DumpType::Video => self.video_dim,
            DumpType::Snapshot | DumpType::Raw | DumpType::Jpeg => self.snapshot_dim,
        }
    }
}

/// File name for a dumped frame: `{ts}_{n}{type}_{w}x{h}_{idx}.{ext}`.
pub fn dump_file_name(
    ctx: &DumpContext,
    dump_type: DumpType,
    frame_num: u32,
    frame_idx: u32,
    timestamp: &str,
) -> String {
    let dim = ctx.dim_for(dump_type);
    format!(
        "{timestamp}_{frame_num}{}_{}x{}_{frame_idx}.{}",
        dump_type.suffix(),
        dim.width,
        dim.height,
        dump_type.extension()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_decoding() {
        let policy = DumpPolicy::from_mask(0x0005_0301);
        assert!(policy.wants(DumpType::Preview));
        assert!(!policy.wants(DumpType::Video));
        assert_eq!(policy.skip(), 3);
        assert_eq!(policy.frames(), 5);

        let policy = DumpPolicy::from_mask(0x01);
        assert_eq!(policy.skip(), 1);
        assert_eq!(policy.frames(), DEFAULT_DUMP_FRAMES);

        let policy = DumpPolicy::from_mask(0xffff_0001);
        assert_eq!(policy.frames(), MAX_DUMP_FRAMES);
    }

    #[test]
    fn test_counter_stops_after_frames() {
        let policy = DumpPolicy::from_mask(0x0003_0001);
        let mut counter = DumpCounter::default();
        let dumped: Vec<_> = (0..6)
            .map(|_| counter.next(&policy, DumpType::Preview))
            .collect();
        assert_eq!(dumped, vec![Some(0), Some(1), Some(2), None, None, None]);
    }

    #[test]
    fn test_counter_skips() {
        let policy = DumpPolicy::from_mask(0x0003_0201);
        let mut counter = DumpCounter::default();
        let dumped: Vec<_> = (0..6)
            .filter_map(|_| counter.next(&policy, DumpType::Preview))
            .collect();
        assert_eq!(dumped, vec![0, 1, 2]);
        assert_eq!(counter.frame(), 3);
    }

    #[test]
    fn test_counter_cycles_at_cap() {
        let policy = DumpPolicy::from_mask(0x0100_0001);
        assert_eq!(policy.frames(), MAX_DUMP_FRAMES);
        let mut counter = DumpCounter::default();
        for expected in 0..MAX_DUMP_FRAMES {
            assert_eq!(counter.next(&policy, DumpType::Preview), Some(expected));
        }
        assert_eq!(counter.next(&policy, DumpType::Preview), Some(0));
    }

    #[test]
    fn test_disabled_resets() {
        let mut counter = DumpCounter::default();
        let policy = DumpPolicy::from_mask(0x01);
        counter.next(&policy, DumpType::Preview);
        counter.next(&policy, DumpType::Preview);
        assert_eq!(counter.frame(), 2);

        assert_eq!(counter.next(&DumpPolicy::disabled(), DumpType::Preview), None);
        assert_eq!(counter.frame(), 0);
    }

    #[test]
    fn test_unselected_type_ignored() {
        let policy = DumpPolicy::from_mask(0x04);
        let mut counter = DumpCounter::default();
        assert_eq!(counter.next(&policy, DumpType::Preview), None);
        assert_eq!(counter.next(&policy, DumpType::Snapshot), Some(0));
    }

    #[test]
    fn test_file_names() {
        let ctx = DumpContext {
            preview_dim: Dimension::new(640, 480),
            snapshot_dim: Dimension::new(4000, 3000),
            video_dim: Dimension::new(1920, 1080),
        };
        assert_eq!(
            dump_file_name(&ctx, DumpType::Preview, 3, 1, "20260101120000"),
            "20260101120000_3p_640x480_1.yuv"
        );
        assert_eq!(
            dump_file_name(&ctx, DumpType::Raw, 0, 7, "ts"),
            "ts_0r_4000x3000_7.raw"
        );
        assert_eq!(
            dump_file_name(&ctx, DumpType::Video, 2, 0, "ts"),
            "ts_2v_1920x1080_0.yuv"
        );
        assert_eq!(
            dump_file_name(&ctx, DumpType::Thumbnail, 1, 0, "ts"),
            "ts_1t_640x480_0.yuv"
        );
    }
}
