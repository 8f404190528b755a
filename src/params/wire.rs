//! Byte layout of a parameter table inside the shared parameter buffer.
//!
//! ```text
//! header  u32 hal version (1 or 3) | u32 valid mask (bit n = tag n)
//! entry   u32 tag | u32 payload len | payload, zero-padded to 4 bytes
//! ```
//!
//! One entry follows the header per set bit, in tag order. All integers are
//! little endian, floats are IEEE-754 single precision.

use crate::error::{Error, Result};
use crate::format::{Dimension, PpMask, StreamSize, StreamTopology, StreamType};
use crate::params::value::{
    Antibanding, DenoiseParams, DenoisePlates, EztuneCommand, FlashMode, FocusMode, FpsRange,
    HalVersion, IsoMode, MeteringMode, SceneMode, TuneCommand, TuningBlob, WhiteBalance,
};

/// Bytes taken by the header.
pub const HEADER_LEN: usize = 8;

const ALIGN: usize = 4;

/// Cursor writing into a caller-owned byte slice.
pub(crate) struct Writer<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> Writer<'a> {
    pub(crate) fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub(crate) fn pos(&self) -> usize {
        self.pos
    }

    fn put(&mut self, bytes: &[u8]) -> Result<()> {
        let end = self
            .pos
            .checked_add(bytes.len())
            .filter(|end| *end <= self.buf.len())
            .ok_or(Error::ParamBuf("batch does not fit"))?;
        self.buf[self.pos..end].copy_from_slice(bytes);
        self.pos = end;
        Ok(())
    }

    pub(crate) fn u32(&mut self, value: u32) -> Result<()> {
        self.put(&value.to_le_bytes())
    }

    fn i32(&mut self, value: i32) -> Result<()> {
        self.put(&value.to_le_bytes())
    }

    fn f32(&mut self, value: f32) -> Result<()> {
        self.put(&value.to_le_bytes())
    }

    /// Overwrite a u32 written earlier at `at`.
    pub(crate) fn patch_u32(&mut self, at: usize, value: u32) {
        self.buf[at..at + 4].copy_from_slice(&value.to_le_bytes());
    }

    pub(crate) fn pad(&mut self) -> Result<()> {
        let pad = self.pos.next_multiple_of(ALIGN) - self.pos;
        self.put(&[0; ALIGN][..pad])
    }
}

/// Cursor reading from a byte slice.
pub(crate) struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub(crate) fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.buf.len())
            .ok_or(Error::ParamBuf("truncated record"))?;
        let bytes = &self.buf[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn word(&mut self) -> Result<[u8; 4]> {
        let b = self.take(4)?;
        Ok([b[0], b[1], b[2], b[3]])
    }

    pub(crate) fn u32(&mut self) -> Result<u32> {
        self.word().map(u32::from_le_bytes)
    }

    fn i32(&mut self) -> Result<i32> {
        self.word().map(i32::from_le_bytes)
    }

    fn f32(&mut self) -> Result<f32> {
        self.word().map(f32::from_le_bytes)
    }

    fn rest(&mut self) -> &'a [u8] {
        let bytes = &self.buf[self.pos..];
        self.pos = self.buf.len();
        bytes
    }

    pub(crate) fn skip_pad(&mut self) -> Result<()> {
        let pad = self.pos.next_multiple_of(ALIGN) - self.pos;
        self.take(pad).map(drop)
    }

    /// Fail unless every byte was consumed.
    pub(crate) fn finish(&self) -> Result<()> {
        if self.pos == self.buf.len() {
            Ok(())
        } else {
            Err(Error::ParamBuf("trailing bytes in payload"))
        }
    }
}

/// A value with a fixed byte encoding.
pub(crate) trait Payload: Sized {
    fn put(&self, w: &mut Writer<'_>) -> Result<()>;
    fn get(r: &mut Reader<'_>) -> Result<Self>;
}

impl Payload for bool {
    fn put(&self, w: &mut Writer<'_>) -> Result<()> {
        w.u32(u32::from(*self))
    }

    fn get(r: &mut Reader<'_>) -> Result<Self> {
        match r.u32()? {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(Error::ParamBuf("invalid flag")),
        }
    }
}

impl Payload for i32 {
    fn put(&self, w: &mut Writer<'_>) -> Result<()> {
        w.i32(*self)
    }

    fn get(r: &mut Reader<'_>) -> Result<Self> {
        r.i32()
    }
}

impl Payload for HalVersion {
    fn put(&self, w: &mut Writer<'_>) -> Result<()> {
        w.u32(match self {
            HalVersion::V1 => 1,
            HalVersion::V3 => 3,
        })
    }

    fn get(r: &mut Reader<'_>) -> Result<Self> {
        match r.u32()? {
            1 => Ok(HalVersion::V1),
            3 => Ok(HalVersion::V3),
            _ => Err(Error::ParamBuf("unknown HAL version")),
        }
    }
}

/// Fieldless enums travel as their declaration index.
macro_rules! wire_enum {
    ($($ty:ident => [$($variant:ident),* $(,)?];)*) => {$(
        impl Payload for $ty {
            fn put(&self, w: &mut Writer<'_>) -> Result<()> {
                w.u32(*self as u32)
            }

            fn get(r: &mut Reader<'_>) -> Result<Self> {
                let code = r.u32()?;
                [$($ty::$variant),*]
                    .into_iter()
                    .find(|v| *v as u32 == code)
                    .ok_or(Error::ParamBuf(concat!("unknown ", stringify!($ty), " code")))
            }
        }
    )*};
}

wire_enum! {
    FocusMode => [Auto, Infinity, Macro, Fixed, Edof, ContinuousVideo, ContinuousPicture, Manual];
    Antibanding => [Off, Hz60, Hz50, Auto];
    WhiteBalance => [
        Auto, Incandescent, Fluorescent, WarmFluorescent, Daylight, CloudyDaylight, Twilight,
        Shade, Manual,
    ];
    MeteringMode => [FrameAverage, CenterWeighted, Spot, Smart, User];
    IsoMode => [Auto, Deblur, Iso100, Iso200, Iso400, Iso800, Iso1600, Iso3200];
    SceneMode => [
        Off, Auto, Landscape, Snow, Beach, Sunset, Night, Portrait, Backlight, Sports, AntiShake,
        Flowers, CandleLight, Fireworks, Party, NightPortrait, Theatre, Action, Hdr,
    ];
    FlashMode => [Off, Auto, On, Torch];
    DenoisePlates => [Y, CbCr, YCbCr, StreamlineYCbCr];
    StreamType => [Preview, Postview, Snapshot, Video, Raw, Metadata, OfflineProc];
}

impl Payload for FpsRange {
    fn put(&self, w: &mut Writer<'_>) -> Result<()> {
        w.f32(self.min_fps)?;
        w.f32(self.max_fps)?;
        w.f32(self.video_min_fps)?;
        w.f32(self.video_max_fps)
    }

    fn get(r: &mut Reader<'_>) -> Result<Self> {
        Ok(Self {
            min_fps: r.f32()?,
            max_fps: r.f32()?,
            video_min_fps: r.f32()?,
            video_max_fps: r.f32()?,
        })
    }
}

impl Payload for DenoiseParams {
    fn put(&self, w: &mut Writer<'_>) -> Result<()> {
        self.enabled.put(w)?;
        self.process_plates.put(w)
    }

    fn get(r: &mut Reader<'_>) -> Result<Self> {
        Ok(Self {
            enabled: bool::get(r)?,
            process_plates: DenoisePlates::get(r)?,
        })
    }
}

impl Payload for EztuneCommand {
    fn put(&self, w: &mut Writer<'_>) -> Result<()> {
        w.u32(self.cmd)?;
        w.i32(self.value)
    }

    fn get(r: &mut Reader<'_>) -> Result<Self> {
        Ok(Self {
            cmd: r.u32()?,
            value: r.i32()?,
        })
    }
}

impl Payload for TuneCommand {
    fn put(&self, w: &mut Writer<'_>) -> Result<()> {
        w.u32(self.module)?;
        w.u32(self.kind)?;
        w.i32(self.value)
    }

    fn get(r: &mut Reader<'_>) -> Result<Self> {
        Ok(Self {
            module: r.u32()?,
            kind: r.u32()?,
            value: r.i32()?,
        })
    }
}

impl Payload for StreamTopology {
    fn put(&self, w: &mut Writer<'_>) -> Result<()> {
        w.u32(self.len() as u32)?;
        for stream in self.streams() {
            stream.stream_type.put(w)?;
            w.u32(stream.dim.width)?;
            w.u32(stream.dim.height)?;
            w.u32(stream.pp_mask.0)?;
        }
        Ok(())
    }

    fn get(r: &mut Reader<'_>) -> Result<Self> {
        let count = r.u32()?;
        let mut topo = StreamTopology::reset();
        for _ in 0..count {
            let stream = StreamSize {
                stream_type: StreamType::get(r)?,
                dim: Dimension::new(r.u32()?, r.u32()?),
                pp_mask: PpMask(r.u32()?),
            };
            if !topo.push(stream) {
                return Err(Error::ParamBuf("too many streams in topology"));
            }
        }
        Ok(topo)
    }
}

/// The payload is the raw table; its length is the record length.
impl Payload for TuningBlob {
    fn put(&self, w: &mut Writer<'_>) -> Result<()> {
        w.put(self.as_bytes())
    }

    fn get(r: &mut Reader<'_>) -> Result<Self> {
        Ok(TuningBlob::from_bytes(r.rest()))
    }
}
