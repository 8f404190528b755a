//! Legacy Android ION allocator (`/dev/ion`).
//!
//! Talks to the pre-4.12 ION ABI with its MSM cache-maintenance extension.
//! The crate does not expose these structs; they mirror the kernel UAPI
//! headers and are passed straight to `ioctl`.

use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::path::Path;

use rustix::fs::{Mode, OFlags};
use tracing::debug;

use super::allocator::{AllocFlags, AllocHandle, CacheOp, CacheRegion, HeapMask, KernelAllocator};
use crate::error::Result;

/// Default ION device node.
pub const ION_DEVICE: &str = "/dev/ion";

const ION_IOC_MAGIC: u8 = b'I';
const ION_IOC_MSM_MAGIC: u8 = b'M';

const fn iowr(ty: u8, nr: u8, size: usize) -> libc::c_ulong {
    ((3 << 30) | ((size as u32) << 16) | ((ty as u32) << 8) | nr as u32) as libc::c_ulong
}

/// ion_allocation_data
#[repr(C)]
struct IonAllocationData {
    len: libc::size_t,
    align: libc::size_t,
    heap_id_mask: u32,
    flags: u32,
    /// OUTPUT: allocation handle.
    handle: i32,
}

/// ion_handle_data
#[repr(C)]
struct IonHandleData {
    handle: i32,
}

/// ion_fd_data
#[repr(C)]
struct IonFdData {
    handle: i32,
    /// OUTPUT: shared dma-buf descriptor.
    fd: i32,
}

/// ion_custom_data
#[repr(C)]
struct IonCustomData {
    cmd: u32,
    arg: libc::c_ulong,
}

/// ion_flush_data (MSM)
#[repr(C)]
struct IonFlushData {
    handle: i32,
    fd: i32,
    vaddr: *mut libc::c_void,
    offset: u32,
    length: u32,
}

const ION_IOC_ALLOC: libc::c_ulong =
    iowr(ION_IOC_MAGIC, 0, std::mem::size_of::<IonAllocationData>());
const ION_IOC_FREE: libc::c_ulong = iowr(ION_IOC_MAGIC, 1, std::mem::size_of::<IonHandleData>());
const ION_IOC_SHARE: libc::c_ulong = iowr(ION_IOC_MAGIC, 4, std::mem::size_of::<IonFdData>());
const ION_IOC_CUSTOM: libc::c_ulong = iowr(ION_IOC_MAGIC, 6, std::mem::size_of::<IonCustomData>());

const ION_IOC_CLEAN_CACHES: libc::c_ulong =
    iowr(ION_IOC_MSM_MAGIC, 0, std::mem::size_of::<IonFlushData>());
const ION_IOC_INV_CACHES: libc::c_ulong =
    iowr(ION_IOC_MSM_MAGIC, 1, std::mem::size_of::<IonFlushData>());
const ION_IOC_CLEAN_INV_CACHES: libc::c_ulong =
    iowr(ION_IOC_MSM_MAGIC, 2, std::mem::size_of::<IonFlushData>());

/// ION client bound to an open device node.
#[derive(Debug)]
pub struct IonAllocator {
    device: OwnedFd,
}

impl IonAllocator {
    /// Open the default ION device.
    pub fn open() -> Result<Self> {
        Self::open_path(ION_DEVICE)
    }

    /// Open an ION device at `path`.
    pub fn open_path(path: impl AsRef<Path>) -> Result<Self> {
        let device = rustix::fs::open(path.as_ref(), OFlags::RDONLY | OFlags::CLOEXEC, Mode::empty())?;
        debug!(path = %path.as_ref().display(), "ion device opened");
        Ok(Self { device })
    }

    /// # Safety
    ///
    /// `request` must be an ION ioctl whose argument has the layout of `T`.
    unsafe fn ioctl<T>(&self, request: libc::c_ulong, arg: &mut T) -> io::Result<()> {
        // SAFETY: upheld by the caller; `arg` is a valid exclusive pointer.
        let ret = unsafe { libc::ioctl(self.device.as_raw_fd(), request, arg as *mut T) };
        if ret < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }
}

impl KernelAllocator for IonAllocator {
    fn name(&self) -> &'static str {
        "ion"
    }

    fn allocate(
        &self,
        len: usize,
        align: usize,
        heaps: HeapMask,
        flags: AllocFlags,
    ) -> io::Result<AllocHandle> {
        let mut data = IonAllocationData {
            len,
            align,
            heap_id_mask: heaps.0,
            flags: flags.0,
            handle: 0,
        };
        // SAFETY: ION_IOC_ALLOC takes ion_allocation_data.
        unsafe { self.ioctl(ION_IOC_ALLOC, &mut data)? };
        Ok(AllocHandle(data.handle))
    }

    fn share(&self, handle: AllocHandle) -> io::Result<OwnedFd> {
        let mut data = IonFdData {
            handle: handle.0,
            fd: -1,
        };
        // SAFETY: ION_IOC_SHARE takes ion_fd_data.
        unsafe { self.ioctl(ION_IOC_SHARE, &mut data)? };
        if data.fd < 0 {
            return Err(io::Error::from_raw_os_error(libc::EBADF));
        }
        // SAFETY: on success the kernel installed a new descriptor we now own.
        Ok(unsafe { OwnedFd::from_raw_fd(data.fd) })
    }

    fn free(&self, handle: AllocHandle) -> io::Result<()> {
        let mut data = IonHandleData { handle: handle.0 };
        // SAFETY: ION_IOC_FREE takes ion_handle_data.
        unsafe { self.ioctl(ION_IOC_FREE, &mut data) }
    }

    fn cache_maintenance(&self, op: CacheOp, region: &CacheRegion<'_>) -> io::Result<()> {
        let cmd = match op {
            CacheOp::Clean => ION_IOC_CLEAN_CACHES,
            CacheOp::Invalidate => ION_IOC_INV_CACHES,
            CacheOp::CleanInvalidate => ION_IOC_CLEAN_INV_CACHES,
        };
        let offset = u32::try_from(region.offset)
            .map_err(|_| io::Error::from_raw_os_error(libc::EINVAL))?;
        let length =
            u32::try_from(region.len).map_err(|_| io::Error::from_raw_os_error(libc::EINVAL))?;

        let mut flush = IonFlushData {
            handle: region.handle.0,
            fd: region.fd.as_raw_fd(),
            vaddr: region.addr.as_ptr().cast(),
            offset,
            length,
        };
        let mut custom = IonCustomData {
            cmd: cmd as u32,
            arg: &mut flush as *mut IonFlushData as libc::c_ulong,
        };
        // SAFETY: ION_IOC_CUSTOM takes ion_custom_data whose `arg` points to
        // the ion_flush_data expected by `cmd`; `flush` outlives the call.
        unsafe { self.ioctl(ION_IOC_CUSTOM, &mut custom) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ioctl_numbers() {
        assert_eq!(ION_IOC_FREE, 0xc004_4901);
        assert_eq!(ION_IOC_SHARE, 0xc008_4904);
        #[cfg(target_pointer_width = "64")]
        {
            assert_eq!(ION_IOC_ALLOC, 0xc020_4900);
            assert_eq!(ION_IOC_CUSTOM, 0xc010_4906);
            assert_eq!(ION_IOC_CLEAN_INV_CACHES, 0xc018_4d02);
        }
    }

    #[test]
    fn test_open_missing_device_fails() {
        assert!(IonAllocator::open_path("/nonexistent/ion").is_err());
    }
}
