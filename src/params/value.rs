//! Value shapes carried by parameter entries.

/// HAL generation seeded into every batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum HalVersion {
    /// Legacy HAL1 semantics.
    #[default]
    V1,
    /// HAL3 semantics.
    V3,
}

/// Autofocus mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum FocusMode {
    /// Single sweep triggered by `do_auto_focus`.
    #[default]
    Auto,
    /// Lens parked at infinity.
    Infinity,
    /// Close-up range.
    Macro,
    /// Fixed-focus module.
    Fixed,
    /// Extended depth of field.
    Edof,
    /// Continuous, tuned for video.
    ContinuousVideo,
    /// Continuous, tuned for stills.
    ContinuousPicture,
    /// Manual lens position.
    Manual,
}

/// Mains-flicker compensation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Antibanding {
    /// Disabled.
    Off,
    /// 60 Hz mains.
    Hz60,
    /// 50 Hz mains.
    Hz50,
    /// Detect automatically.
    #[default]
    Auto,
}

/// White balance preset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum WhiteBalance {
    /// Automatic.
    #[default]
    Auto,
    /// Incandescent light.
    Incandescent,
    /// Fluorescent light.
    Fluorescent,
    /// Warm fluorescent light.
    WarmFluorescent,
    /// Daylight.
    Daylight,
    /// Cloudy daylight.
    CloudyDaylight,
    /// Twilight.
    Twilight,
    /// Shade.
    Shade,
    /// Manual color temperature.
    Manual,
}

/// Exposure metering strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum MeteringMode {
    /// Average of the whole frame.
    #[default]
    FrameAverage,
    /// Center weighted.
    CenterWeighted,
    /// Spot.
    Spot,
    /// Scene-adaptive.
    Smart,
    /// User-defined regions.
    User,
}

/// Sensor sensitivity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum IsoMode {
    /// Automatic.
    #[default]
    Auto,
    /// Motion deblur.
    Deblur,
    /// ISO 100.
    Iso100,
    /// ISO 200.
    Iso200,
    /// ISO 400.
    Iso400,
    /// ISO 800.
    Iso800,
    /// ISO 1600.
    Iso1600,
    /// ISO 3200.
    Iso3200,
}

/// Best-shot scene preset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SceneMode {
    /// No preset.
    #[default]
    Off,
    /// Automatic scene detection.
    Auto,
    /// Landscape.
    Landscape,
    /// Snow.
    Snow,
    /// Beach.
    Beach,
    /// Sunset.
    Sunset,
    /// Night.
    Night,
    /// Portrait.
    Portrait,
    /// Backlit subject.
    Backlight,
    /// Sports.
    Sports,
    /// Anti-shake.
    AntiShake,
    /// Flowers.
    Flowers,
    /// Candle light.
    CandleLight,
    /// Fireworks.
    Fireworks,
    /// Party.
    Party,
    /// Night portrait.
    NightPortrait,
    /// Theatre.
    Theatre,
    /// Action.
    Action,
    /// HDR.
    Hdr,
}

/// LED flash behavior.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum FlashMode {
    /// Never fire.
    #[default]
    Off,
    /// Fire when the scene needs it.
    Auto,
    /// Always fire.
    On,
    /// Continuous light.
    Torch,
}

/// Frame-rate window in frames per second.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FpsRange {
    /// Lowest preview rate.
    pub min_fps: f32,
    /// Highest preview rate.
    pub max_fps: f32,
    /// Lowest video rate.
    pub video_min_fps: f32,
    /// Highest video rate.
    pub video_max_fps: f32,
}

impl FpsRange {
    /// Same window for preview and video.
    pub fn new(min_fps: f32, max_fps: f32) -> Self {
        Self {
            min_fps,
            max_fps,
            video_min_fps: min_fps,
            video_max_fps: max_fps,
        }
    }
}

/// Which planes wavelet denoise processes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum DenoisePlates {
    /// Luma only.
    Y,
    /// Chroma only.
    CbCr,
    /// Luma and chroma.
    #[default]
    YCbCr,
    /// Luma and chroma, streamlined.
    StreamlineYCbCr,
}

/// Wavelet noise reduction settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DenoiseParams {
    /// Whether denoise runs.
    pub enabled: bool,
    /// Planes to process.
    pub process_plates: DenoisePlates,
}

/// Tuning-server 3A command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EztuneCommand {
    /// Command identifier.
    pub cmd: u32,
    /// Command argument.
    pub value: i32,
}

/// Command for a pipeline block (VFE or post-processing).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TuneCommand {
    /// Target module.
    pub module: u32,
    /// Command type.
    pub kind: u32,
    /// Command argument.
    pub value: i32,
}

/// Opaque tuning data (chromatix, autofocus, actuator tables).
///
/// Read batches use a zeroed blob of the expected size as a placeholder the
/// device overwrites.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TuningBlob(Box<[u8]>);

impl TuningBlob {
    /// Zero-filled blob of `len` bytes.
    pub fn zeroed(len: usize) -> Self {
        Self(vec![0; len].into_boxed_slice())
    }

    /// Blob holding a copy of `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(bytes.into())
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Raw bytes, mutable.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.0
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True for an empty blob.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
