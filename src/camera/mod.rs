//! One open camera: session lifecycle, channels, streams, and controls.
//!
//! [`CameraContext`] ties the pieces of this crate to a live
//! [`DeviceSession`]. Opening maps the capability and parameter buffers and
//! opens the encoder client; every later call goes through the context so
//! buffers are always unmapped before they are released.
//!
//! # Example
//!
//! ```rust,ignore
//! use camhal::camera::CameraContext;
//! use camhal::config::CameraConfig;
//! use camhal::memory::{FrameLayout, IonAllocator, MemoryAllocator};
//! use camhal::stream::ChannelType;
//!
//! let allocator = MemoryAllocator::new(IonAllocator::open()?);
//! let mut camera = CameraContext::open(&module, 0, allocator, CameraConfig::default())?;
//!
//! camera.add_channel(ChannelType::Preview)?;
//! let stream = camera.add_stream(ChannelType::Preview)?;
//! camera.init_stream_bufs(ChannelType::Preview, stream, &FrameLayout::single_plane(460_800))?;
//! camera.start_channel(ChannelType::Preview)?;
//! ```

mod controls;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, trace, warn};

use crate::config::CameraConfig;
use crate::error::{Error, Result};
use crate::memory::{BufferPool, FrameLayout, MemoryAllocator, PoolBuffer, PoolKind};
use crate::observability::{StreamMetrics, instrument_stream, span_camera, trace_teardown_error};
use crate::observability::metrics as m;
use crate::params::DenoiseParams;
use crate::session::{
    Capability, ChannelId, DeviceEvent, DeviceModule, DeviceSession, EncoderSession,
    EventCallback, MappingBufType, Notifier, StreamConfig, StreamId, WaitStatus,
};
use crate::stream::{
    BufferRegistration, Channel, ChannelType, DumpType, Features, NegotiatorState, Stream,
    StreamBufferNegotiator, StreamMapOps, dump_file_name,
};

/// Callback handed each preview frame by the host's frame loop.
pub type PreviewCallback = Box<dyn Fn(&PoolBuffer) + Send + Sync>;

/// An open camera session and everything mapped into it.
pub struct CameraContext {
    camera_id: u8,
    session: Option<Box<dyn DeviceSession>>,
    encoder: Option<Box<dyn EncoderSession>>,
    allocator: MemoryAllocator,
    config: CameraConfig,
    cap_buf: BufferPool,
    parm_buf: BufferPool,
    capability: Capability,
    notifier: Arc<Notifier>,
    channels: [Option<Channel>; ChannelType::COUNT],
    preview_cb: Option<PreviewCallback>,
    focus_supported: bool,
    reproc_sharpness: i32,
    reproc_denoise: DenoiseParams,
    features: Features,
}

/// Resources acquired so far while opening; undone in reverse on failure.
struct Opening {
    session: Box<dyn DeviceSession>,
    cap_buf: BufferPool,
    parm_buf: BufferPool,
    cap_mapped: bool,
    parm_mapped: bool,
}

impl Opening {
    fn unwind(mut self) {
        if self.parm_mapped {
            if let Err(source) = self.session.unmap_buf(MappingBufType::ParmBuf) {
                trace_teardown_error("unmap_buf(parm_buf)", &source);
            }
        }
        if let Err(err) = self.parm_buf.release() {
            trace_teardown_error("release(parm_buf)", &err);
        }
        if self.cap_mapped {
            if let Err(source) = self.session.unmap_buf(MappingBufType::Capability) {
                trace_teardown_error("unmap_buf(capability)", &source);
            }
        }
        if let Err(err) = self.cap_buf.release() {
            trace_teardown_error("release(capability)", &err);
        }
        if let Err(source) = self.session.close() {
            trace_teardown_error("close", &source);
        }
    }
}

fn live(
    session: &mut Option<Box<dyn DeviceSession>>,
) -> Result<&mut (dyn DeviceSession + 'static)> {
    session
        .as_deref_mut()
        .ok_or(Error::Protocol("camera session closed"))
}

fn map_aux(
    session: &mut dyn DeviceSession,
    pool: &BufferPool,
    buf_type: MappingBufType,
) -> Result<()> {
    let buffer = pool
        .get(0)
        .ok_or(Error::Protocol("auxiliary pool is empty"))?;
    let fd = buffer
        .fd()
        .ok_or(Error::Protocol("auxiliary buffer has no descriptor"))?;
    session
        .map_buf(buf_type, fd, buffer.len())
        .map_err(|source| {
            m::record_map_failure(buf_type.label());
            Error::Map { index: 0, source }
        })
}

fn map_stream_info(
    session: &mut dyn DeviceSession,
    channel: ChannelId,
    stream: StreamId,
    pool: &BufferPool,
) -> Result<()> {
    let buffer = pool
        .get(0)
        .ok_or(Error::Protocol("stream info pool is empty"))?;
    let fd = buffer
        .fd()
        .ok_or(Error::Protocol("stream info buffer has no descriptor"))?;
    session
        .map_stream_buf(
            channel,
            stream,
            MappingBufType::StreamInfo,
            0,
            -1,
            fd,
            buffer.len(),
        )
        .map_err(|source| {
            m::record_map_failure(MappingBufType::StreamInfo.label());
            Error::Map { index: 0, source }
        })
}

fn event_callback(notifier: Arc<Notifier>) -> EventCallback {
    Box::new(move |event: &DeviceEvent| {
        if event.releases_wait() {
            debug!(?event, "device event, releasing waiter");
            notifier.signal();
        } else {
            trace!(?event, "device event ignored");
        }
    })
}

fn keep_first(slot: &mut Option<Error>, op: &str, result: Result<()>) {
    if let Err(err) = result {
        trace_teardown_error(op, &err);
        slot.get_or_insert(err);
    }
}

impl CameraContext {
    /// Number of cameras `module` exposes.
    pub fn number_of_cameras(module: &dyn DeviceModule) -> u8 {
        module.num_cameras()
    }

    /// Open camera `camera_id`.
    ///
    /// Opens the session, allocates and maps the capability and parameter
    /// buffers, registers for device events, queries the capabilities, and
    /// opens the encoder client. A failure at any step undoes the steps
    /// before it in reverse order and closes the session.
    pub fn open(
        module: &dyn DeviceModule,
        camera_id: u8,
        allocator: MemoryAllocator,
        config: CameraConfig,
    ) -> Result<Self> {
        let _span = span_camera(camera_id).entered();

        let session = module.open(camera_id).map_err(Error::device("open"))?;
        let mut opening = Opening {
            session,
            cap_buf: BufferPool::empty(PoolKind::Auxiliary),
            parm_buf: BufferPool::empty(PoolKind::Auxiliary),
            cap_mapped: false,
            parm_mapped: false,
        };
        let notifier = Arc::new(Notifier::new());

        match Self::open_stages(module, &allocator, &config, &notifier, &mut opening) {
            Ok((capability, encoder)) => {
                let focus_supported = capability.focus_supported();
                info!(camera_id, focus_supported, "camera opened");
                Ok(Self {
                    camera_id,
                    session: Some(opening.session),
                    encoder: Some(encoder),
                    allocator,
                    config,
                    cap_buf: opening.cap_buf,
                    parm_buf: opening.parm_buf,
                    capability,
                    notifier,
                    channels: Default::default(),
                    preview_cb: None,
                    focus_supported,
                    reproc_sharpness: 0,
                    reproc_denoise: DenoiseParams::default(),
                    features: Features::default(),
                })
            }
            Err(err) => {
                warn!(camera_id, error = %err, "camera open failed, unwinding");
                opening.unwind();
                Err(err)
            }
        }
    }

    fn open_stages(
        module: &dyn DeviceModule,
        allocator: &MemoryAllocator,
        config: &CameraConfig,
        notifier: &Arc<Notifier>,
        opening: &mut Opening,
    ) -> Result<(Capability, Box<dyn EncoderSession>)> {
        let heaps = config.heap_policy();

        opening.cap_buf = BufferPool::auxiliary(allocator, config.capability_buf_len, heaps)?;
        map_aux(
            opening.session.as_mut(),
            &opening.cap_buf,
            MappingBufType::Capability,
        )?;
        opening.cap_mapped = true;

        opening.parm_buf = BufferPool::auxiliary(allocator, config.param_buf_len, heaps)?;
        map_aux(
            opening.session.as_mut(),
            &opening.parm_buf,
            MappingBufType::ParmBuf,
        )?;
        opening.parm_mapped = true;

        opening
            .session
            .register_event_notify(event_callback(Arc::clone(notifier)))
            .map_err(Error::device("register_event_notify"))?;

        let capability = opening
            .session
            .query_capability()
            .map_err(Error::device("query_capability"))?;

        let encoder = module
            .open_encoder(config.encoder_max_dim)
            .map_err(Error::device("open_encoder"))?;

        Ok((capability, encoder))
    }

    /// Close the camera.
    ///
    /// Unmaps the capability and parameter buffers, closes the session and
    /// the encoder client, then releases both buffers. Every step runs even
    /// if an earlier one failed; the first failure is returned. Streams
    /// still present are released without further device calls.
    pub fn close(&mut self) -> Result<()> {
        let Some(mut session) = self.session.take() else {
            return Err(Error::Protocol("camera not open"));
        };
        let _span = span_camera(self.camera_id).entered();
        let mut first_err = None;

        keep_first(
            &mut first_err,
            "unmap_buf(capability)",
            session
                .unmap_buf(MappingBufType::Capability)
                .map_err(Error::device("unmap_buf")),
        );
        keep_first(
            &mut first_err,
            "unmap_buf(parm_buf)",
            session
                .unmap_buf(MappingBufType::ParmBuf)
                .map_err(Error::device("unmap_buf")),
        );
        keep_first(
            &mut first_err,
            "close",
            session.close().map_err(Error::device("close")),
        );
        if let Some(mut encoder) = self.encoder.take() {
            keep_first(
                &mut first_err,
                "encoder close",
                encoder.close().map_err(Error::device("encoder close")),
            );
        }

        let orphans = self.channels.iter_mut().filter_map(Option::take).count();
        if orphans > 0 {
            warn!(channels = orphans, "channels still present at close, dropping");
        }

        keep_first(&mut first_err, "release(capability)", self.cap_buf.release());
        keep_first(&mut first_err, "release(parm_buf)", self.parm_buf.release());
        self.preview_cb = None;

        info!(camera_id = self.camera_id, ok = first_err.is_none(), "camera closed");
        first_err.map_or(Ok(()), Err)
    }

    /// Whether the session is still open.
    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    /// Camera index this context was opened with.
    pub fn camera_id(&self) -> u8 {
        self.camera_id
    }

    /// Configuration in use.
    pub fn config(&self) -> &CameraConfig {
        &self.config
    }

    /// Capabilities reported at open.
    pub fn capability(&self) -> &Capability {
        &self.capability
    }

    /// Whether the lens can be focused.
    pub fn focus_supported(&self) -> bool {
        self.focus_supported
    }

    /// Features the stream topology is planned for.
    pub fn features(&self) -> Features {
        self.features
    }

    /// Change the features used by [`start_stream_config`](Self::start_stream_config).
    pub fn set_features(&mut self, features: Features) {
        self.features = features;
    }

    /// Capability descriptor buffer.
    pub fn capability_buf(&self) -> &BufferPool {
        &self.cap_buf
    }

    /// Parameter buffer shared with the device.
    pub fn param_buf(&self) -> &BufferPool {
        &self.parm_buf
    }

    /// Wait handle released by autofocus-done and zoom-done events.
    pub fn notifier(&self) -> &Arc<Notifier> {
        &self.notifier
    }

    /// Block until a device event releases the notifier.
    pub fn wait_for_event(&self) {
        self.notifier.wait();
    }

    /// Like [`wait_for_event`](Self::wait_for_event), giving up after `timeout`.
    pub fn wait_for_event_timeout(&self, timeout: Duration) -> WaitStatus {
        self.notifier.wait_timeout(timeout)
    }

    /// Install the preview frame callback. Only one may ever be installed.
    pub fn set_preview_callback(&mut self, callback: PreviewCallback) -> Result<()> {
        if self.preview_cb.is_some() {
            return Err(Error::Protocol("preview callback already set"));
        }
        self.preview_cb = Some(callback);
        Ok(())
    }

    /// Installed preview callback.
    pub fn preview_callback(&self) -> Option<&PreviewCallback> {
        self.preview_cb.as_ref()
    }

    /// Run one autofocus sweep and wait for it to finish.
    ///
    /// A no-op on fixed-focus modules.
    pub fn do_auto_focus(&mut self) -> Result<()> {
        if !self.focus_supported {
            debug!("fixed focus module, skipping autofocus");
            return Ok(());
        }
        live(&mut self.session)?
            .do_auto_focus()
            .map_err(Error::device("do_auto_focus"))?;
        self.notifier.wait();
        debug!("autofocus done");
        Ok(())
    }

    /// Abort a running autofocus sweep.
    pub fn cancel_auto_focus(&mut self) -> Result<()> {
        live(&mut self.session)?
            .cancel_auto_focus()
            .map_err(Error::device("cancel_auto_focus"))
    }

    // Channels

    /// Create the channel for `ch_type`.
    pub fn add_channel(&mut self, ch_type: ChannelType) -> Result<ChannelId> {
        let slot = &mut self.channels[ch_type.index()];
        if slot.is_some() {
            return Err(Error::Protocol("channel already added"));
        }
        let id = live(&mut self.session)?
            .add_channel()
            .map_err(Error::device("add_channel"))?;
        *slot = Some(Channel::new(id));
        debug!(?ch_type, channel = id.0, "channel added");
        Ok(id)
    }

    /// Destroy the channel for `ch_type`, deleting any stream it still holds.
    pub fn delete_channel(&mut self, ch_type: ChannelType) -> Result<()> {
        let stream_ids = self.channel_ref(ch_type)?.stream_ids();
        let mut first_err = None;
        for stream in stream_ids {
            keep_first(
                &mut first_err,
                "delete_stream",
                self.delete_stream(ch_type, stream),
            );
        }

        let session = live(&mut self.session)?;
        let Some(channel) = self.channels[ch_type.index()].take() else {
            return Err(Error::Protocol("channel not added"));
        };
        keep_first(
            &mut first_err,
            "delete_channel",
            session
                .delete_channel(channel.id())
                .map_err(Error::device("delete_channel")),
        );
        debug!(?ch_type, channel = channel.id().0, "channel deleted");
        first_err.map_or(Ok(()), Err)
    }

    /// Channel for `ch_type`, if added.
    pub fn channel(&self, ch_type: ChannelType) -> Option<&Channel> {
        self.channels[ch_type.index()].as_ref()
    }

    fn channel_ref(&self, ch_type: ChannelType) -> Result<&Channel> {
        self.channel(ch_type)
            .ok_or(Error::Protocol("channel not added"))
    }

    fn stream_ref(&self, ch_type: ChannelType, stream: StreamId) -> Result<&Stream> {
        self.channel_ref(ch_type)?
            .stream(stream)
            .ok_or(Error::Protocol("no such stream in channel"))
    }

    /// Start every stream of the channel.
    pub fn start_channel(&mut self, ch_type: ChannelType) -> Result<()> {
        let id = self.channel_ref(ch_type)?.id();
        live(&mut self.session)?
            .start_channel(id)
            .map_err(Error::device("start_channel"))?;
        debug!(?ch_type, channel = id.0, "channel started");
        Ok(())
    }

    /// Stop every stream of the channel.
    pub fn stop_channel(&mut self, ch_type: ChannelType) -> Result<()> {
        let id = self.channel_ref(ch_type)?.id();
        live(&mut self.session)?
            .stop_channel(id)
            .map_err(Error::device("stop_channel"))?;
        debug!(?ch_type, channel = id.0, "channel stopped");
        Ok(())
    }

    // Streams

    /// Create a stream in the channel and map its info buffer.
    ///
    /// If the info buffer cannot be allocated or mapped, it is released and
    /// the stream is deleted again before the error is returned.
    pub fn add_stream(&mut self, ch_type: ChannelType) -> Result<StreamId> {
        let session = live(&mut self.session)?;
        let channel = self.channels[ch_type.index()]
            .as_mut()
            .ok_or(Error::Protocol("channel not added"))?;
        if !channel.has_room() {
            return Err(Error::Protocol("channel stream table full"));
        }
        let ch_id = channel.id();
        let heaps = self.config.heap_policy();

        let stream_id = session
            .add_stream(ch_id)
            .map_err(Error::device("add_stream"))?;
        let _span = instrument_stream(ch_id, stream_id);

        let mut info_buf =
            match BufferPool::auxiliary(&self.allocator, self.config.stream_info_buf_len, heaps) {
                Ok(pool) => pool,
                Err(err) => {
                    warn!(error = %err, "stream info allocation failed, deleting stream");
                    if let Err(source) = session.delete_stream(ch_id, stream_id) {
                        trace_teardown_error("delete_stream", &source);
                    }
                    return Err(err);
                }
            };
        if let Err(err) = map_stream_info(&mut *session, ch_id, stream_id, &info_buf) {
            warn!(error = %err, "stream info map failed, deleting stream");
            if let Err(cleanup) = info_buf.release() {
                trace_teardown_error("release(stream_info)", &cleanup);
            }
            if let Err(source) = session.delete_stream(ch_id, stream_id) {
                trace_teardown_error("delete_stream", &source);
            }
            return Err(err);
        }

        let negotiator = StreamBufferNegotiator::new(self.allocator.clone(), heaps)
            .with_metrics(StreamMetrics::new(ch_id.0, stream_id.0));
        channel.push(Stream::new(
            stream_id,
            self.config.slice_size,
            info_buf,
            negotiator,
        ))?;
        debug!("stream added");
        Ok(stream_id)
    }

    /// Delete a stream: release its data buffers if still bound, unmap and
    /// release its info buffer, then delete it on the device.
    ///
    /// Every step runs; the first failure is returned.
    pub fn delete_stream(&mut self, ch_type: ChannelType, stream_id: StreamId) -> Result<()> {
        let session = live(&mut self.session)?;
        let channel = self.channels[ch_type.index()]
            .as_mut()
            .ok_or(Error::Protocol("channel not added"))?;
        let ch_id = channel.id();
        let mut stream = channel
            .remove(stream_id)
            .ok_or(Error::Protocol("no such stream in channel"))?;
        let _span = instrument_stream(ch_id, stream_id);
        let mut first_err = None;

        if stream.negotiator().state() != NegotiatorState::Unbound {
            let mut ops = StreamMapOps::new(&mut *session, ch_id, stream_id);
            keep_first(
                &mut first_err,
                "deinit stream buffers",
                stream.negotiator_mut().deinit(&mut ops),
            );
        }
        keep_first(
            &mut first_err,
            "unmap_stream_buf(stream_info)",
            session
                .unmap_stream_buf(ch_id, stream_id, MappingBufType::StreamInfo, 0, -1)
                .map_err(|source| Error::Unmap { index: 0, source }),
        );
        keep_first(
            &mut first_err,
            "release(stream_info)",
            stream.info_buf_mut().release(),
        );
        keep_first(
            &mut first_err,
            "delete_stream",
            session
                .delete_stream(ch_id, stream_id)
                .map_err(Error::device("delete_stream")),
        );
        debug!(ok = first_err.is_none(), "stream deleted");
        first_err.map_or(Ok(()), Err)
    }

    /// Configure a stream before its channel starts.
    pub fn config_stream(
        &mut self,
        ch_type: ChannelType,
        stream: StreamId,
        config: &StreamConfig,
    ) -> Result<()> {
        self.stream_ref(ch_type, stream)?;
        let ch_id = self.channel_ref(ch_type)?.id();
        live(&mut self.session)?
            .config_stream(ch_id, stream, config)
            .map_err(Error::device("config_stream"))
    }

    /// Stream by channel role and id.
    pub fn stream(&self, ch_type: ChannelType, stream: StreamId) -> Option<&Stream> {
        self.channel(ch_type)?.stream(stream)
    }

    /// Allocate the stream's data buffers and map them into the device.
    ///
    /// The buffer count comes from the configuration and the buffer
    /// quantum from the stream. See [`StreamBufferNegotiator::init`].
    pub fn init_stream_bufs(
        &mut self,
        ch_type: ChannelType,
        stream_id: StreamId,
        layout: &FrameLayout,
    ) -> Result<BufferRegistration<'_>> {
        let session = live(&mut self.session)?;
        let channel = self.channels[ch_type.index()]
            .as_mut()
            .ok_or(Error::Protocol("channel not added"))?;
        let ch_id = channel.id();
        let stream = channel
            .stream_mut(stream_id)
            .ok_or(Error::Protocol("no such stream in channel"))?;
        let _span = instrument_stream(ch_id, stream_id);

        let quantum = stream.quantum();
        let mut ops = StreamMapOps::new(session, ch_id, stream_id);
        stream
            .negotiator_mut()
            .init(&mut ops, layout, self.config.stream_buf_count(), quantum)
    }

    /// Unmap and release the stream's data buffers.
    pub fn deinit_stream_bufs(&mut self, ch_type: ChannelType, stream_id: StreamId) -> Result<()> {
        let session = live(&mut self.session)?;
        let channel = self.channels[ch_type.index()]
            .as_mut()
            .ok_or(Error::Protocol("channel not added"))?;
        let ch_id = channel.id();
        let stream = channel
            .stream_mut(stream_id)
            .ok_or(Error::Protocol("no such stream in channel"))?;
        let _span = instrument_stream(ch_id, stream_id);

        let mut ops = StreamMapOps::new(session, ch_id, stream_id);
        stream.negotiator_mut().deinit(&mut ops)
    }

    /// Invalidate the CPU cache over data buffer `index` of a stream.
    pub fn invalidate_buf(
        &self,
        ch_type: ChannelType,
        stream: StreamId,
        index: u32,
    ) -> Result<()> {
        self.stream_ref(ch_type, stream)?
            .negotiator()
            .invalidate(index)
    }

    /// Clean and invalidate the CPU cache over data buffer `index` of a stream.
    pub fn clean_invalidate_buf(
        &self,
        ch_type: ChannelType,
        stream: StreamId,
        index: u32,
    ) -> Result<()> {
        self.stream_ref(ch_type, stream)?
            .negotiator()
            .clean_invalidate(index)
    }

    /// Name for the next dumped frame of a stream, if the dump policy wants it.
    ///
    /// Advances the stream's dump counter. Writing the file is up to the
    /// caller.
    pub fn dump_frame_name(
        &mut self,
        ch_type: ChannelType,
        stream_id: StreamId,
        dump_type: DumpType,
        frame_idx: u32,
        timestamp: &str,
    ) -> Result<Option<String>> {
        let policy = self.config.dump_policy();
        let ctx = self.config.dump_context();
        let stream = self.channels[ch_type.index()]
            .as_mut()
            .and_then(|channel| channel.stream_mut(stream_id))
            .ok_or(Error::Protocol("no such stream in channel"))?;
        Ok(stream
            .dump_counter_mut()
            .next(&policy, dump_type)
            .map(|frame_num| dump_file_name(&ctx, dump_type, frame_num, frame_idx, timestamp)))
    }
}

impl Drop for CameraContext {
    fn drop(&mut self) {
        if self.session.is_none() {
            return;
        }
        if let Err(err) = self.close() {
            warn!(camera_id = self.camera_id, error = %err, "close on drop failed");
        }
    }
}

impl fmt::Debug for CameraContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CameraContext")
            .field("camera_id", &self.camera_id)
            .field("open", &self.session.is_some())
            .field("encoder", &self.encoder.is_some())
            .field("capability", &self.capability)
            .field("channels", &self.channels)
            .field("focus_supported", &self.focus_supported)
            .field("features", &self.features)
            .finish_non_exhaustive()
    }
}
