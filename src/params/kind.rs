//! Parameter kinds and their value shapes.
//!
//! Every kind is declared exactly once in the table below, together with its
//! wire tag and the Rust type of its value. The macro derives the
//! [`ParamKind`] tag enum, the [`ParamValue`] sum type, and one zero-sized
//! marker per kind in [`typed`], so a value can never be stored under a kind
//! of a different shape when the typed API is used.

use crate::error::{Error, Result};
use crate::format::StreamTopology;
use crate::params::value as v;
use crate::params::wire::{Payload, Reader, Writer};

/// Broad storage class of a parameter value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamShape {
    /// A single number, flag, or mode.
    Scalar,
    /// A small fixed record.
    Struct,
    /// A large opaque tuning table.
    Blob,
}

/// Compile-time link between a marker type and its parameter kind.
pub trait TypedParam {
    /// Kind this marker stands for.
    const KIND: ParamKind;

    /// Value type stored under the kind.
    type Value;

    /// Wrap a value into the sum type.
    fn wrap(value: Self::Value) -> ParamValue;

    /// Borrow the payload if `value` belongs to this kind.
    fn peek(value: &ParamValue) -> Option<&Self::Value>;
}

macro_rules! define_params {
    ($(
        $(#[$doc:meta])*
        $name:ident = $tag:literal => $ty:ty, $shape:ident;
    )*) => {
        /// Closed enumeration of parameter kinds, keyed by wire tag.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(u32)]
        pub enum ParamKind {
            $( $(#[$doc])* $name = $tag, )*
        }

        impl ParamKind {
            /// Every kind, in tag order.
            pub const ALL: &'static [ParamKind] = &[$(ParamKind::$name,)*];

            /// Number of kinds.
            pub const COUNT: usize = Self::ALL.len();

            /// Wire tag.
            pub const fn tag(self) -> u32 {
                self as u32
            }

            /// Declared value shape.
            pub const fn shape(self) -> ParamShape {
                match self {
                    $( ParamKind::$name => ParamShape::$shape, )*
                }
            }

            /// Storage slot inside a table. Tags are dense from zero.
            pub(crate) const fn slot(self) -> usize {
                self as usize
            }
        }

        impl TryFrom<u32> for ParamKind {
            type Error = Error;

            fn try_from(tag: u32) -> Result<Self> {
                match tag {
                    $( $tag => Ok(ParamKind::$name), )*
                    other => Err(Error::UnknownParam(other)),
                }
            }
        }

        /// A parameter value tagged with its kind.
        #[derive(Debug, Clone, PartialEq)]
        pub enum ParamValue {
            $( $(#[$doc])* $name($ty), )*
        }

        impl ParamValue {
            /// Kind this value belongs to.
            pub const fn kind(&self) -> ParamKind {
                match self {
                    $( ParamValue::$name(_) => ParamKind::$name, )*
                }
            }

            pub(crate) fn put_payload(&self, w: &mut Writer<'_>) -> Result<()> {
                match self {
                    $( ParamValue::$name(inner) => inner.put(w), )*
                }
            }

            pub(crate) fn get_payload(kind: ParamKind, r: &mut Reader<'_>) -> Result<Self> {
                match kind {
                    $( ParamKind::$name => <$ty as Payload>::get(r).map(ParamValue::$name), )*
                }
            }
        }

        /// Zero-sized markers, one per [`ParamKind`], for typed table access.
        pub mod typed {
            use super::{ParamKind, ParamValue, TypedParam};
            #[allow(unused_imports)]
            use super::{v, StreamTopology};

            $(
                $(#[$doc])*
                #[derive(Debug, Clone, Copy, PartialEq, Eq)]
                pub struct $name;

                impl TypedParam for $name {
                    const KIND: ParamKind = ParamKind::$name;
                    type Value = $ty;

                    fn wrap(value: Self::Value) -> ParamValue {
                        ParamValue::$name(value)
                    }

                    #[allow(unreachable_patterns)]
                    fn peek(value: &ParamValue) -> Option<&Self::Value> {
                        match value {
                            ParamValue::$name(inner) => Some(inner),
                            _ => None,
                        }
                    }
                }
            )*
        }
    };
}

define_params! {
    /// HAL generation the batch is written for.
    HalVersion = 0 => v::HalVersion, Scalar;
    /// Auto-exposure lock.
    AecLock = 1 => bool, Scalar;
    /// Auto-white-balance lock.
    AwbLock = 2 => bool, Scalar;
    /// Focus mode.
    FocusMode = 3 => v::FocusMode, Scalar;
    /// Exposure compensation in device steps.
    ExposureCompensation = 4 => i32, Scalar;
    /// Antibanding mode.
    Antibanding = 5 => v::Antibanding, Scalar;
    /// White balance preset.
    WhiteBalance = 6 => v::WhiteBalance, Scalar;
    /// Exposure metering mode.
    ExposureMetering = 7 => v::MeteringMode, Scalar;
    /// Brightness level.
    Brightness = 8 => i32, Scalar;
    /// Contrast level.
    Contrast = 9 => i32, Scalar;
    /// Saturation level.
    Saturation = 10 => i32, Scalar;
    /// Sharpness applied during reprocessing.
    Sharpness = 11 => i32, Scalar;
    /// Tintless correction.
    Tintless = 12 => bool, Scalar;
    /// ISO mode.
    Iso = 13 => v::IsoMode, Scalar;
    /// Zoom step.
    Zoom = 14 => i32, Scalar;
    /// Preview and video frame-rate window.
    FpsRange = 15 => v::FpsRange, Struct;
    /// Best-shot scene preset.
    SceneMode = 16 => v::SceneMode, Scalar;
    /// LED flash mode.
    FlashMode = 17 => v::FlashMode, Scalar;
    /// Wavelet noise reduction applied during reprocessing.
    WaveletDenoise = 18 => v::DenoiseParams, Struct;
    /// Stream topology descriptor.
    StreamInfo = 19 => StreamTopology, Struct;
    /// Tuning-server 3A command.
    EztuneCmd = 20 => v::EztuneCommand, Struct;
    /// Read the active chromatix tables.
    GetChromatix = 21 => v::TuningBlob, Blob;
    /// Replace the chromatix tables.
    ReloadChromatix = 22 => v::TuningBlob, Blob;
    /// Read the autofocus tuning tables.
    GetAfTune = 23 => v::TuningBlob, Blob;
    /// Replace the autofocus tuning tables.
    ReloadAfTune = 24 => v::TuningBlob, Blob;
    /// Autofocus actuator tuning.
    AutofocusTuning = 25 => v::TuningBlob, Blob;
    /// VFE block command.
    VfeCommand = 26 => v::TuneCommand, Struct;
    /// Post-processing block command.
    PpCommand = 27 => v::TuneCommand, Struct;
}
