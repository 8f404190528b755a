//! Batched parameter table.

use std::fmt;

use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::observability::metrics as m;
use crate::params::kind::{ParamKind, ParamValue, TypedParam};
use crate::params::value::HalVersion;
use crate::params::wire::{Payload, Reader, Writer};
use crate::session::DeviceSession;

// The valid mask holds one bit per tag.
const _: () = assert!(ParamKind::COUNT <= u32::BITS as usize);

/// One batch of parameter writes or reads.
///
/// Each kind owns one slot. A slot is either empty (flag clear) or holds a
/// value whose variant matches the slot's kind, so the "is set" flag and the
/// value cannot drift apart.
///
/// The HAL version is a header field of the batch, not a slot: seeding it
/// does not count as a set entry, which keeps an otherwise empty batch from
/// reaching the device.
///
/// # Example
///
/// ```rust,ignore
/// use camhal::params::{typed, HalVersion, ParameterTable};
///
/// let mut table = ParameterTable::begin_batch(HalVersion::V1);
/// table.write::<typed::Zoom>(4);
/// table.commit_set(session.as_mut())?;
/// ```
#[derive(Clone, PartialEq)]
pub struct ParameterTable {
    hal_version: HalVersion,
    slots: [Option<ParamValue>; ParamKind::COUNT],
}

impl ParameterTable {
    /// Start a batch: every flag cleared, header seeded with `hal_version`.
    pub fn begin_batch(hal_version: HalVersion) -> Self {
        Self {
            hal_version,
            slots: std::array::from_fn(|_| None),
        }
    }

    /// Reuse this table for a new batch.
    pub fn reset(&mut self, hal_version: HalVersion) {
        self.hal_version = hal_version;
        self.slots.iter_mut().for_each(|slot| *slot = None);
    }

    /// HAL generation this batch was seeded with.
    pub fn hal_version(&self) -> HalVersion {
        self.hal_version
    }

    /// Store a value under its own kind, setting the flag.
    pub fn set(&mut self, value: ParamValue) {
        let kind = value.kind();
        trace!(?kind, "param set");
        self.slots[kind.slot()] = Some(value);
    }

    /// Store `value` under `kind`.
    ///
    /// Fails with [`Error::ShapeMismatch`] when the value belongs to another
    /// kind. The table is left untouched in that case.
    pub fn set_entry(&mut self, kind: ParamKind, value: ParamValue) -> Result<()> {
        if value.kind() != kind {
            return Err(Error::ShapeMismatch {
                expected: kind,
                found: value.kind(),
            });
        }
        self.set(value);
        Ok(())
    }

    /// Typed write.
    pub fn write<P: TypedParam>(&mut self, value: P::Value) {
        self.set(P::wrap(value));
    }

    /// Value stored under `kind`.
    pub fn get(&self, kind: ParamKind) -> Result<&ParamValue> {
        self.slots[kind.slot()].as_ref().ok_or(Error::NotSet(kind))
    }

    /// Mutable access to a set value, used by the device to fill read batches.
    pub fn get_mut(&mut self, kind: ParamKind) -> Result<&mut ParamValue> {
        self.slots[kind.slot()].as_mut().ok_or(Error::NotSet(kind))
    }

    /// Typed read.
    pub fn read<P: TypedParam>(&self) -> Result<&P::Value> {
        let value = self.get(P::KIND)?;
        P::peek(value).ok_or(Error::ShapeMismatch {
            expected: P::KIND,
            found: value.kind(),
        })
    }

    /// Clear one flag.
    pub fn clear(&mut self, kind: ParamKind) -> Option<ParamValue> {
        self.slots[kind.slot()].take()
    }

    /// Whether `kind`'s flag is set.
    pub fn is_set(&self, kind: ParamKind) -> bool {
        self.slots[kind.slot()].is_some()
    }

    /// Number of set flags.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// True when no flag is set.
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    /// Set entries in tag order.
    pub fn iter(&self) -> impl Iterator<Item = &ParamValue> {
        self.slots.iter().flatten()
    }

    /// Kinds whose flag is set, in tag order.
    pub fn kinds(&self) -> impl Iterator<Item = ParamKind> + '_ {
        self.iter().map(ParamValue::kind)
    }

    /// Flags as a bit mask, bit `n` standing for tag `n`.
    pub fn valid_mask(&self) -> u32 {
        self.kinds().fold(0, |mask, kind| mask | (1 << kind.tag()))
    }

    /// Write the batch into `buf` in the parameter buffer layout (see
    /// [`wire`](crate::params::wire)). Returns the number of bytes written.
    pub fn encode_into(&self, buf: &mut [u8]) -> Result<usize> {
        let mut w = Writer::new(buf);
        self.hal_version.put(&mut w)?;
        w.u32(self.valid_mask())?;
        for value in self.iter() {
            w.u32(value.kind().tag())?;
            let len_at = w.pos();
            w.u32(0)?;
            let start = w.pos();
            value.put_payload(&mut w)?;
            let len = w.pos() - start;
            w.patch_u32(len_at, len as u32);
            w.pad()?;
        }
        Ok(w.pos())
    }

    /// Rebuild a batch from the parameter buffer layout.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        let mut r = Reader::new(buf);
        let mut table = Self::begin_batch(HalVersion::get(&mut r)?);
        let mask = r.u32()?;

        for _ in 0..mask.count_ones() {
            let kind = ParamKind::try_from(r.u32()?)?;
            if mask & (1 << kind.tag()) == 0 || table.is_set(kind) {
                return Err(Error::ParamBuf("entry does not match valid mask"));
            }
            let len = r.u32()? as usize;
            let mut payload = Reader::new(r.take(len)?);
            let value = ParamValue::get_payload(kind, &mut payload)?;
            payload.finish()?;
            r.skip_pad()?;
            table.set(value);
        }
        Ok(table)
    }

    /// Apply the batch with one `set_parms` call.
    ///
    /// A batch with no set flag is a successful no-op and the session is not
    /// called.
    pub fn commit_set(&self, session: &mut dyn DeviceSession) -> Result<()> {
        let entries = self.len();
        if entries == 0 {
            trace!("empty batch, skipping set_parms");
            return Ok(());
        }

        session
            .set_parms(self)
            .map_err(Error::device("set_parms"))?;
        m::record_param_commit("set", entries);
        debug!(entries, "parameter batch applied");
        Ok(())
    }

    /// Refresh every set entry from the device with one `get_parms` call.
    ///
    /// Same gating as [`commit_set`](Self::commit_set).
    pub fn commit_get(&mut self, session: &mut dyn DeviceSession) -> Result<()> {
        let entries = self.len();
        if entries == 0 {
            trace!("empty batch, skipping get_parms");
            return Ok(());
        }

        session
            .get_parms(self)
            .map_err(Error::device("get_parms"))?;
        m::record_param_commit("get", entries);
        debug!(entries, "parameter batch read back");
        Ok(())
    }
}

impl Default for ParameterTable {
    fn default() -> Self {
        Self::begin_batch(HalVersion::default())
    }
}

impl fmt::Debug for ParameterTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParameterTable")
            .field("hal_version", &self.hal_version)
            .field("entries", &self.iter().collect::<Vec<_>>())
            .finish()
    }
}
