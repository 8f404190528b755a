//! Batched control setters.
//!
//! Each setter starts a fresh batch, writes one entry, and commits it with a
//! single device round trip. Getters commit a placeholder and read the
//! device's answer back out of the same table.
//!
//! Before every commit the batch is encoded into the mapped parameter
//! buffer, and after a read the answer is encoded again, so the buffer always
//! holds the last batch exchanged with the device.

use tracing::{debug, trace};

use super::{CameraContext, live};
use crate::error::{Error, Result};
use crate::format::StreamTopology;
use crate::memory::BufferPool;
use crate::params::{
    Antibanding, DenoiseParams, DenoisePlates, EztuneCommand, FlashMode, FocusMode, FpsRange,
    IsoMode, MeteringMode, ParamKind, ParameterTable, SceneMode, TuneCommand, TuningBlob,
    TypedParam, WhiteBalance, typed,
};
use crate::stream::{CaptureMode, StreamConfigPlanner};

impl CameraContext {
    fn batch(&self) -> ParameterTable {
        ParameterTable::begin_batch(self.config.hal_version)
    }

    fn apply<P: TypedParam>(&mut self, value: P::Value) -> Result<()> {
        let mut table = self.batch();
        table.write::<P>(value);
        let session = live(&mut self.session)?;
        stage(&mut self.parm_buf, &table)?;
        table.commit_set(session)
    }

    fn fetch<P: TypedParam>(&mut self, placeholder: P::Value) -> Result<P::Value>
    where
        P::Value: Clone,
    {
        let mut table = self.batch();
        table.write::<P>(placeholder);
        let session = live(&mut self.session)?;
        stage(&mut self.parm_buf, &table)?;
        table.commit_get(session)?;
        stage(&mut self.parm_buf, &table)?;
        table.read::<P>().cloned()
    }

    /// Lock or unlock auto exposure.
    pub fn set_aec_lock(&mut self, locked: bool) -> Result<()> {
        self.apply::<typed::AecLock>(locked)
    }

    /// Lock or unlock auto white balance.
    pub fn set_awb_lock(&mut self, locked: bool) -> Result<()> {
        self.apply::<typed::AwbLock>(locked)
    }

    /// Set the focus mode.
    pub fn set_focus_mode(&mut self, mode: FocusMode) -> Result<()> {
        self.apply::<typed::FocusMode>(mode)
    }

    /// Set the exposure compensation step.
    ///
    /// Values outside the range the device advertised are rejected with
    /// [`Error::OutOfRange`] and never reach the device.
    pub fn set_exposure_compensation(&mut self, ev: i32) -> Result<()> {
        let min = self.capability.exposure_compensation_min;
        let max = self.capability.exposure_compensation_max;
        if !(min..=max).contains(&ev) {
            return Err(Error::OutOfRange {
                kind: ParamKind::ExposureCompensation,
                value: i64::from(ev),
                min: i64::from(min),
                max: i64::from(max),
            });
        }
        self.apply::<typed::ExposureCompensation>(ev)?;
        debug!(ev, "exposure compensation set");
        Ok(())
    }

    /// Set mains-flicker compensation.
    pub fn set_antibanding(&mut self, mode: Antibanding) -> Result<()> {
        self.apply::<typed::Antibanding>(mode)
    }

    /// Set the white balance preset.
    pub fn set_white_balance(&mut self, mode: WhiteBalance) -> Result<()> {
        self.apply::<typed::WhiteBalance>(mode)
    }

    /// Set the exposure metering strategy.
    pub fn set_exposure_metering(&mut self, mode: MeteringMode) -> Result<()> {
        self.apply::<typed::ExposureMetering>(mode)
    }

    /// Set brightness.
    pub fn set_brightness(&mut self, value: i32) -> Result<()> {
        self.apply::<typed::Brightness>(value)
    }

    /// Set contrast.
    pub fn set_contrast(&mut self, value: i32) -> Result<()> {
        self.apply::<typed::Contrast>(value)
    }

    /// Set saturation.
    pub fn set_saturation(&mut self, value: i32) -> Result<()> {
        self.apply::<typed::Saturation>(value)
    }

    /// Set sharpness. Reprocessing picks up the same value.
    pub fn set_sharpness(&mut self, value: i32) -> Result<()> {
        self.apply::<typed::Sharpness>(value)?;
        self.reproc_sharpness = value;
        debug!(value, "sharpness set");
        Ok(())
    }

    /// Sharpness last applied, for reprocessing.
    pub fn reproc_sharpness(&self) -> i32 {
        self.reproc_sharpness
    }

    /// Enable or disable tintless correction.
    pub fn set_tintless(&mut self, enabled: bool) -> Result<()> {
        self.apply::<typed::Tintless>(enabled)
    }

    /// Set sensor sensitivity.
    pub fn set_iso(&mut self, mode: IsoMode) -> Result<()> {
        self.apply::<typed::Iso>(mode)
    }

    /// Set the zoom step.
    pub fn set_zoom(&mut self, value: i32) -> Result<()> {
        self.apply::<typed::Zoom>(value)
    }

    /// Set the frame-rate window.
    pub fn set_fps_range(&mut self, range: FpsRange) -> Result<()> {
        self.apply::<typed::FpsRange>(range)
    }

    /// Set the best-shot scene.
    pub fn set_scene_mode(&mut self, mode: SceneMode) -> Result<()> {
        self.apply::<typed::SceneMode>(mode)
    }

    /// Set the flash mode.
    pub fn set_flash_mode(&mut self, mode: FlashMode) -> Result<()> {
        self.apply::<typed::FlashMode>(mode)
    }

    /// Enable or disable wavelet denoise on luma and chroma.
    /// Reprocessing picks up the same settings.
    pub fn set_wavelet_denoise(&mut self, enabled: bool) -> Result<()> {
        let params = DenoiseParams {
            enabled,
            process_plates: DenoisePlates::YCbCr,
        };
        self.apply::<typed::WaveletDenoise>(params)?;
        self.reproc_denoise = params;
        debug!(enabled, "wavelet denoise set");
        Ok(())
    }

    /// Denoise settings last applied, for reprocessing.
    pub fn reproc_denoise(&self) -> DenoiseParams {
        self.reproc_denoise
    }

    // Tuning

    /// Send a 3A tuning command.
    pub fn send_eztune_command(&mut self, cmd: EztuneCommand) -> Result<()> {
        self.apply::<typed::EztuneCmd>(cmd)
    }

    /// Read the active chromatix table; `len` is its expected size.
    pub fn get_chromatix(&mut self, len: usize) -> Result<TuningBlob> {
        self.fetch::<typed::GetChromatix>(TuningBlob::zeroed(len))
    }

    /// Replace the active chromatix table.
    pub fn reload_chromatix(&mut self, table: TuningBlob) -> Result<()> {
        self.apply::<typed::ReloadChromatix>(table)
    }

    /// Read the active autofocus tuning; `len` is its expected size.
    pub fn get_af_tune(&mut self, len: usize) -> Result<TuningBlob> {
        self.fetch::<typed::GetAfTune>(TuningBlob::zeroed(len))
    }

    /// Replace the active autofocus tuning.
    pub fn reload_af_tune(&mut self, table: TuningBlob) -> Result<()> {
        self.apply::<typed::ReloadAfTune>(table)
    }

    /// Send actuator tuning data.
    pub fn set_autofocus_tuning(&mut self, tuning: TuningBlob) -> Result<()> {
        self.apply::<typed::AutofocusTuning>(tuning)
    }

    /// Send a VFE block command.
    pub fn send_vfe_command(&mut self, cmd: TuneCommand) -> Result<()> {
        self.apply::<typed::VfeCommand>(cmd)
    }

    /// Send a post-processing block command.
    pub fn send_pp_command(&mut self, cmd: TuneCommand) -> Result<()> {
        self.apply::<typed::PpCommand>(cmd)
    }

    // Stream topology

    /// Tell the device which streams will coexist.
    pub fn send_stream_config(&mut self, topology: StreamTopology) -> Result<()> {
        let streams = topology.len();
        self.apply::<typed::StreamInfo>(topology)?;
        debug!(streams, "stream topology sent");
        Ok(())
    }

    /// Plan the topology for `mode` from the configured sizes and the
    /// current features, and send it.
    pub fn start_stream_config(&mut self, mode: CaptureMode) -> Result<()> {
        let planner = StreamConfigPlanner::new(self.capability.min_required_pp_mask)
            .with_preview_dim(self.config.preview_dim)
            .with_snapshot_dim(self.config.snapshot_dim)
            .with_video_dim(self.config.video_dim);
        let topology = planner.plan(mode, self.features);
        self.send_stream_config(topology)
    }

    /// Drop the current topology.
    pub fn reset_stream_config(&mut self) -> Result<()> {
        self.send_stream_config(StreamConfigPlanner::reset_plan())
    }
}

/// Encode `table` into the shared parameter buffer.
fn stage(parm_buf: &mut BufferPool, table: &ParameterTable) -> Result<()> {
    let buffer = parm_buf
        .get_mut(0)
        .ok_or(Error::Protocol("parameter buffer not mapped"))?;
    let written = table.encode_into(buffer.block_mut().as_mut_slice())?;
    trace!(written, entries = table.len(), "parameter batch staged");
    Ok(())
}
