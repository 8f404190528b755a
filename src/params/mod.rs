//! Batched device parameters.
//!
//! Device settings travel in a [`ParameterTable`]: a batch is started, any
//! number of entries are written, and the whole table is flushed to the
//! device in a single call. Reads work the same way: the wanted kinds are
//! set to placeholder values, the device overwrites them, and the caller
//! reads the results back.
//!
//! # Example
//!
//! ```rust,ignore
//! use camhal::params::{typed, HalVersion, ParameterTable, WhiteBalance};
//!
//! let mut table = ParameterTable::begin_batch(HalVersion::V1);
//! table.write::<typed::WhiteBalance>(WhiteBalance::Daylight);
//! table.write::<typed::AwbLock>(true);
//! table.commit_set(session.as_mut())?;
//! ```

mod kind;
mod table;
mod value;
pub mod wire;

pub use kind::{ParamKind, ParamShape, ParamValue, TypedParam, typed};
pub use table::ParameterTable;
pub use value::{
    Antibanding, DenoiseParams, DenoisePlates, EztuneCommand, FlashMode, FocusMode, FpsRange,
    HalVersion, IsoMode, MeteringMode, SceneMode, TuneCommand, TuningBlob, WhiteBalance,
};
