//! Fakes shared by the integration tests.
//!
//! - [`CountingAllocator`]: memfd-backed allocator that counts live handles
//!   and can be told to fail the n-th allocation
//! - [`FakeModule`] / [`FakeSession`]: device that records every call and
//!   can be scripted to reject one of them

#![allow(dead_code)]

use std::io;
use std::os::fd::{BorrowedFd, OwnedFd};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use camhal::format::Dimension;
use camhal::memory::{
    AllocFlags, AllocHandle, CacheOp, CacheRegion, HeapMask, KernelAllocator, MemfdAllocator,
    MemoryAllocator,
};
use camhal::params::{ParamKind, ParamValue, ParameterTable, TuningBlob};
use camhal::session::{
    Capability, ChannelId, DeviceError, DeviceEvent, DeviceModule, DeviceResult, DeviceSession,
    EncoderSession, EventCallback, MappingBufType, StreamConfig, StreamId,
};

// ============================================================================
// Allocator
// ============================================================================

/// Memfd allocator with a live-handle count and an optional failure point.
#[derive(Debug, Default)]
pub struct CountingAllocator {
    inner: MemfdAllocator,
    allocations: AtomicUsize,
    fail_at: AtomicUsize,
}

impl CountingAllocator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fail the allocation with zero-based ordinal `n` (counted from now).
    pub fn fail_allocation(&self, n: usize) {
        let done = self.allocations.load(Ordering::SeqCst);
        self.fail_at.store(done + n + 1, Ordering::SeqCst);
    }

    pub fn live_handles(&self) -> usize {
        self.inner.live_handles()
    }

    pub fn allocator(self: &Arc<Self>) -> MemoryAllocator {
        MemoryAllocator::from_arc(Arc::clone(self) as Arc<dyn KernelAllocator>)
    }
}

impl KernelAllocator for CountingAllocator {
    fn name(&self) -> &'static str {
        "counting"
    }

    fn allocate(
        &self,
        len: usize,
        align: usize,
        heaps: HeapMask,
        flags: AllocFlags,
    ) -> io::Result<AllocHandle> {
        let ordinal = self.allocations.fetch_add(1, Ordering::SeqCst) + 1;
        if ordinal == self.fail_at.load(Ordering::SeqCst) {
            return Err(io::Error::from_raw_os_error(libc::ENOMEM));
        }
        self.inner.allocate(len, align, heaps, flags)
    }

    fn share(&self, handle: AllocHandle) -> io::Result<OwnedFd> {
        self.inner.share(handle)
    }

    fn free(&self, handle: AllocHandle) -> io::Result<()> {
        self.inner.free(handle)
    }

    fn cache_maintenance(&self, op: CacheOp, region: &CacheRegion<'_>) -> io::Result<()> {
        self.inner.cache_maintenance(op, region)
    }
}

// ============================================================================
// Device
// ============================================================================

/// One recorded session call.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Close,
    QueryCapability,
    SetParms(Vec<ParamKind>),
    GetParms(Vec<ParamKind>),
    AddChannel,
    DeleteChannel(u32),
    AddStream(u32),
    DeleteStream(u32, u32),
    ConfigStream(u32, u32),
    StartChannel(u32),
    StopChannel(u32),
    MapBuf(MappingBufType),
    UnmapBuf(MappingBufType),
    MapStreamBuf {
        buf_type: MappingBufType,
        idx: u32,
        plane: i32,
        len: usize,
    },
    UnmapStreamBuf {
        buf_type: MappingBufType,
        idx: u32,
        plane: i32,
    },
    RegisterEventNotify,
    DoAutoFocus,
    CancelAutoFocus,
    EncoderClose,
}

/// Which call the fake device should reject.
#[derive(Debug, Clone, Default)]
pub struct Script {
    pub fail_open: bool,
    pub fail_map_buf: Option<MappingBufType>,
    pub fail_stream_map_at: Option<u32>,
    pub fail_stream_info_map: bool,
    pub fail_register: bool,
    pub fail_query: bool,
    pub fail_open_encoder: bool,
    pub fail_set_parms: bool,
    /// Fire autofocus-done from inside `do_auto_focus`.
    pub af_done_inline: bool,
    pub capability: Capability,
    /// Blob the device hands back for tuning reads.
    pub tuning_reply: Vec<u8>,
}

#[derive(Default)]
pub struct DeviceState {
    pub calls: Mutex<Vec<Call>>,
    pub script: Mutex<Script>,
    pub tables: Mutex<Vec<ParameterTable>>,
    pub callback: Mutex<Option<EventCallback>>,
    next_id: AtomicU32,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl DeviceState {
    pub fn calls(&self) -> Vec<Call> {
        lock(&self.calls).clone()
    }

    pub fn clear_calls(&self) {
        lock(&self.calls).clear();
    }

    pub fn script(&self) -> MutexGuard<'_, Script> {
        lock(&self.script)
    }

    /// Tables received by `set_parms`, in order.
    pub fn tables(&self) -> Vec<ParameterTable> {
        lock(&self.tables).clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        lock(&self.calls).iter().filter(|c| pred(c)).count()
    }

    /// Deliver an event through the registered callback.
    pub fn fire(&self, event: DeviceEvent) {
        if let Some(cb) = lock(&self.callback).as_ref() {
            cb(&event);
        }
    }

    fn record(&self, call: Call) {
        lock(&self.calls).push(call);
    }

    fn next_id(&self) -> u32 {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }
}

fn fail_if(cond: bool) -> DeviceResult<()> {
    if cond {
        Err(DeviceError::GENERAL)
    } else {
        Ok(())
    }
}

/// Module that opens [`FakeSession`]s sharing one [`DeviceState`].
pub struct FakeModule {
    pub state: Arc<DeviceState>,
}

impl FakeModule {
    pub fn new() -> Self {
        Self {
            state: Arc::new(DeviceState::default()),
        }
    }
}

impl DeviceModule for FakeModule {
    fn num_cameras(&self) -> u8 {
        2
    }

    fn open(&self, _camera_id: u8) -> DeviceResult<Box<dyn DeviceSession>> {
        fail_if(self.state.script().fail_open)?;
        Ok(Box::new(FakeSession {
            state: Arc::clone(&self.state),
        }))
    }

    fn open_encoder(&self, _max_dim: Dimension) -> DeviceResult<Box<dyn EncoderSession>> {
        fail_if(self.state.script().fail_open_encoder)?;
        Ok(Box::new(FakeEncoder {
            state: Arc::clone(&self.state),
        }))
    }
}

pub struct FakeEncoder {
    state: Arc<DeviceState>,
}

impl EncoderSession for FakeEncoder {
    fn close(&mut self) -> DeviceResult<()> {
        self.state.record(Call::EncoderClose);
        Ok(())
    }
}

pub struct FakeSession {
    state: Arc<DeviceState>,
}

impl DeviceSession for FakeSession {
    fn close(&mut self) -> DeviceResult<()> {
        self.state.record(Call::Close);
        Ok(())
    }

    fn query_capability(&mut self) -> DeviceResult<Capability> {
        self.state.record(Call::QueryCapability);
        let script = self.state.script();
        fail_if(script.fail_query)?;
        Ok(script.capability.clone())
    }

    fn set_parms(&mut self, table: &ParameterTable) -> DeviceResult<()> {
        self.state.record(Call::SetParms(table.kinds().collect()));
        fail_if(self.state.script().fail_set_parms)?;
        lock(&self.state.tables).push(table.clone());
        Ok(())
    }

    fn get_parms(&mut self, table: &mut ParameterTable) -> DeviceResult<()> {
        self.state.record(Call::GetParms(table.kinds().collect()));
        let reply = self.state.script().tuning_reply.clone();
        let kinds: Vec<_> = table.kinds().collect();
        for kind in kinds {
            let value = match kind {
                ParamKind::GetChromatix => ParamValue::GetChromatix(TuningBlob::from_bytes(&reply)),
                ParamKind::GetAfTune => ParamValue::GetAfTune(TuningBlob::from_bytes(&reply)),
                _ => continue,
            };
            table.set(value);
        }
        Ok(())
    }

    fn add_channel(&mut self) -> DeviceResult<ChannelId> {
        self.state.record(Call::AddChannel);
        Ok(ChannelId(self.state.next_id()))
    }

    fn delete_channel(&mut self, channel: ChannelId) -> DeviceResult<()> {
        self.state.record(Call::DeleteChannel(channel.0));
        Ok(())
    }

    fn add_stream(&mut self, channel: ChannelId) -> DeviceResult<StreamId> {
        self.state.record(Call::AddStream(channel.0));
        Ok(StreamId(self.state.next_id()))
    }

    fn delete_stream(&mut self, channel: ChannelId, stream: StreamId) -> DeviceResult<()> {
        self.state.record(Call::DeleteStream(channel.0, stream.0));
        Ok(())
    }

    fn config_stream(
        &mut self,
        channel: ChannelId,
        stream: StreamId,
        _config: &StreamConfig,
    ) -> DeviceResult<()> {
        self.state.record(Call::ConfigStream(channel.0, stream.0));
        Ok(())
    }

    fn start_channel(&mut self, channel: ChannelId) -> DeviceResult<()> {
        self.state.record(Call::StartChannel(channel.0));
        Ok(())
    }

    fn stop_channel(&mut self, channel: ChannelId) -> DeviceResult<()> {
        self.state.record(Call::StopChannel(channel.0));
        Ok(())
    }

    fn map_buf(
        &mut self,
        buf_type: MappingBufType,
        _fd: BorrowedFd<'_>,
        _len: usize,
    ) -> DeviceResult<()> {
        self.state.record(Call::MapBuf(buf_type));
        fail_if(self.state.script().fail_map_buf == Some(buf_type))
    }

    fn unmap_buf(&mut self, buf_type: MappingBufType) -> DeviceResult<()> {
        self.state.record(Call::UnmapBuf(buf_type));
        Ok(())
    }

    fn map_stream_buf(
        &mut self,
        _channel: ChannelId,
        _stream: StreamId,
        buf_type: MappingBufType,
        buf_idx: u32,
        plane_idx: i32,
        _fd: BorrowedFd<'_>,
        len: usize,
    ) -> DeviceResult<()> {
        self.state.record(Call::MapStreamBuf {
            buf_type,
            idx: buf_idx,
            plane: plane_idx,
            len,
        });
        let script = self.state.script();
        match buf_type {
            MappingBufType::StreamInfo => fail_if(script.fail_stream_info_map),
            _ => fail_if(script.fail_stream_map_at == Some(buf_idx)),
        }
    }

    fn unmap_stream_buf(
        &mut self,
        _channel: ChannelId,
        _stream: StreamId,
        buf_type: MappingBufType,
        buf_idx: u32,
        plane_idx: i32,
    ) -> DeviceResult<()> {
        self.state.record(Call::UnmapStreamBuf {
            buf_type,
            idx: buf_idx,
            plane: plane_idx,
        });
        Ok(())
    }

    fn register_event_notify(&mut self, callback: EventCallback) -> DeviceResult<()> {
        self.state.record(Call::RegisterEventNotify);
        fail_if(self.state.script().fail_register)?;
        *lock(&self.state.callback) = Some(callback);
        Ok(())
    }

    fn do_auto_focus(&mut self) -> DeviceResult<()> {
        self.state.record(Call::DoAutoFocus);
        if self.state.script().af_done_inline {
            self.state.fire(DeviceEvent::AutoFocusDone);
        }
        Ok(())
    }

    fn cancel_auto_focus(&mut self) -> DeviceResult<()> {
        self.state.record(Call::CancelAutoFocus);
        Ok(())
    }
}
