//! Frame and plane layout.
//!
//! The pipeline decides how a frame is carved into planes and reports it as
//! a [`FrameLayout`]. When a pool is populated, each buffer gets a
//! [`PlaneDesc`] list derived from that layout and its block's descriptor.

use std::os::fd::RawFd;

use smallvec::SmallVec;

/// Planes most formats need without spilling to the heap.
pub const INLINE_PLANES: usize = 4;

/// One image plane within a frame, as reported by the pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaneLayout {
    /// Offset of the plane's data from the start of its region.
    pub offset: u32,
    /// Plane length in bytes.
    pub len: u32,
    /// Row stride in bytes.
    pub stride: i32,
    /// Number of rows (scanlines).
    pub rows: i32,
}

/// Frame length plus its ordered planes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameLayout {
    /// Total bytes one frame needs.
    pub frame_len: u32,
    planes: SmallVec<[PlaneLayout; INLINE_PLANES]>,
}

impl FrameLayout {
    /// Layout with the given planes.
    pub fn new(frame_len: u32, planes: impl IntoIterator<Item = PlaneLayout>) -> Self {
        Self {
            frame_len,
            planes: planes.into_iter().collect(),
        }
    }

    /// Single plane spanning the whole frame (descriptors, metadata).
    pub fn single_plane(frame_len: u32) -> Self {
        Self::new(
            frame_len,
            [PlaneLayout {
                offset: 0,
                len: frame_len,
                stride: frame_len as i32,
                rows: 1,
            }],
        )
    }

    /// Planes in order.
    pub fn planes(&self) -> &[PlaneLayout] {
        &self.planes
    }

    /// Number of planes.
    pub fn num_planes(&self) -> usize {
        self.planes.len()
    }
}

/// Addressing for one plane of one pool buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneDesc {
    /// Plane length in bytes.
    pub length: u32,
    /// Offset of the plane's data within its reserved region.
    pub data_offset: u32,
    /// Offset of the plane's reserved region within the buffer.
    pub reserved_offset: u32,
    /// Shared descriptor of the backing block.
    pub fd: RawFd,
}

/// Plane descriptors for one buffer.
pub type PlaneDescs = SmallVec<[PlaneDesc; INLINE_PLANES]>;

/// Derive the per-buffer plane descriptors from `layout`.
///
/// Plane 0 reserves from its own data offset; every following plane reserves
/// directly after the previous plane's region. All planes address `fd`.
pub fn derive_planes(layout: &FrameLayout, fd: RawFd) -> PlaneDescs {
    let mut descs = PlaneDescs::with_capacity(layout.num_planes());
    let mut reserved = layout.planes.first().map_or(0, |p| p.offset);

    for plane in &layout.planes {
        descs.push(PlaneDesc {
            length: plane.len,
            data_offset: plane.offset,
            reserved_offset: reserved,
            fd,
        });
        reserved = reserved.wrapping_add(plane.len);
    }
    descs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(first_offset: u32, lens: &[u32]) -> FrameLayout {
        let planes = lens.iter().enumerate().map(|(idx, &len)| PlaneLayout {
            offset: if idx == 0 { first_offset } else { 0 },
            len,
            stride: 0,
            rows: 0,
        });
        FrameLayout::new(lens.iter().sum::<u32>() + first_offset, planes)
    }

    #[test]
    fn test_reserved_offsets_accumulate() {
        let cases: [(u32, &[u32]); 3] = [
            (0, &[4096][..]),
            (128, &[307_200, 153_600][..]),
            (64, &[1000, 17, 4096, 3][..]),
        ];

        for (first_offset, lens) in cases {
            let descs = derive_planes(&layout(first_offset, lens), 9);
            assert_eq!(descs.len(), lens.len());

            let mut expected = first_offset;
            for (desc, &len) in descs.iter().zip(lens) {
                assert_eq!(desc.reserved_offset, expected);
                assert_eq!(desc.length, len);
                assert_eq!(desc.fd, 9);
                expected += len;
            }
        }
    }

    #[test]
    fn test_data_offsets_copied() {
        let layout = FrameLayout::new(
            100,
            [
                PlaneLayout {
                    offset: 4,
                    len: 60,
                    stride: 10,
                    rows: 6,
                },
                PlaneLayout {
                    offset: 8,
                    len: 30,
                    stride: 10,
                    rows: 3,
                },
            ],
        );
        let descs = derive_planes(&layout, 3);
        assert_eq!(descs[0].data_offset, 4);
        assert_eq!(descs[1].data_offset, 8);
        assert_eq!(descs[1].reserved_offset, 64);
    }

    #[test]
    fn test_single_plane() {
        let layout = FrameLayout::single_plane(512);
        assert_eq!(layout.num_planes(), 1);
        let descs = derive_planes(&layout, 5);
        assert_eq!(descs[0].length, 512);
        assert_eq!(descs[0].reserved_offset, 0);
    }
}
