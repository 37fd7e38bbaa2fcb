//! Owning raw allocations on host or accelerator memory.
//!
//! `RawBuffer` is the allocation handle a typed storage sits on: it knows
//! its size, alignment and device, and releases itself through the right
//! primitive exactly once when dropped. All byte movement across devices
//! goes through [`copy_bytes`].

use std::alloc::{self, Layout};
use std::ptr::{self, NonNull};

use tracing::trace;

use crate::device::{self, Device};
use crate::error::{Result, StorageError};

/// An owned, untyped allocation.
///
/// Host allocations are always zero-initialized, so every byte of a host
/// buffer is a defined value.
#[derive(Debug)]
pub(crate) struct RawBuffer {
    ptr: Option<NonNull<u8>>,
    bytes: usize,
    align: usize,
    device: Device,
}

impl RawBuffer {
    /// A buffer with no allocation.
    pub(crate) fn empty(device: Device) -> Self {
        Self {
            ptr: None,
            bytes: 0,
            align: 1,
            device,
        }
    }

    /// Allocate `bytes` bytes on `device`. A zero-byte request yields an
    /// empty buffer without touching the allocator.
    ///
    /// # Errors
    ///
    /// `AllocationFailure` if the allocator returns null, `UnknownDevice`
    /// if `device` has no registered backend.
    pub(crate) fn allocate(
        bytes: usize,
        align: usize,
        device: Device,
        zeroed: bool,
    ) -> Result<Self> {
        if bytes == 0 {
            return Ok(Self::empty(device));
        }
        let ptr = if device.is_host() {
            let layout = Layout::from_size_align(bytes, align)
                .map_err(|_| StorageError::AllocationFailure { bytes, device })?;
            // SAFETY: layout has nonzero size.
            NonNull::new(unsafe { alloc::alloc_zeroed(layout) })
        } else {
            device::backend(device)?.allocate(bytes, align, zeroed)
        };
        let ptr = ptr.ok_or(StorageError::AllocationFailure { bytes, device })?;
        trace!(bytes, %device, "allocated");
        Ok(Self {
            ptr: Some(ptr),
            bytes,
            align,
            device,
        })
    }

    #[inline]
    pub(crate) fn device(&self) -> Device {
        self.device
    }

    #[inline]
    pub(crate) fn bytes(&self) -> usize {
        self.bytes
    }

    #[inline]
    pub(crate) fn as_ptr(&self) -> Option<NonNull<u8>> {
        self.ptr
    }

    /// Copy the first `bytes` bytes of `src` into the start of `self`,
    /// whatever devices the two live on.
    pub(crate) fn copy_from(&mut self, src: &RawBuffer, bytes: usize) -> Result<()> {
        if bytes == 0 {
            return Ok(());
        }
        check_span(self.bytes, 0, bytes)?;
        check_span(src.bytes, 0, bytes)?;
        match (self.ptr, src.ptr) {
            // SAFETY: both spans were checked against the allocation sizes.
            (Some(dst), Some(s)) => unsafe { copy_bytes(dst, s, bytes, self.device, src.device) },
            _ => Ok(()),
        }
    }

    /// Read `dst.len()` bytes starting at byte `offset` into host memory.
    pub(crate) fn read_to_host(&self, offset: usize, dst: &mut [u8]) -> Result<()> {
        if dst.is_empty() {
            return Ok(());
        }
        check_span(self.bytes, offset, dst.len())?;
        let Some(base) = self.ptr else {
            return Ok(());
        };
        // SAFETY: offset + len is within the allocation.
        let src = unsafe { NonNull::new_unchecked(base.as_ptr().add(offset)) };
        if self.device.is_host() {
            // SAFETY: host memory of at least dst.len() bytes at src.
            unsafe { ptr::copy_nonoverlapping(src.as_ptr(), dst.as_mut_ptr(), dst.len()) };
        } else {
            let backend = device::backend(self.device)?;
            // SAFETY: span checked above.
            unsafe { backend.copy_to_host(dst.as_mut_ptr(), src, dst.len()) };
        }
        Ok(())
    }

    /// Write host bytes starting at byte `offset`.
    pub(crate) fn write_from_host(&mut self, offset: usize, src: &[u8]) -> Result<()> {
        if src.is_empty() {
            return Ok(());
        }
        check_span(self.bytes, offset, src.len())?;
        let Some(base) = self.ptr else {
            return Ok(());
        };
        // SAFETY: offset + len is within the allocation.
        let dst = unsafe { NonNull::new_unchecked(base.as_ptr().add(offset)) };
        if self.device.is_host() {
            // SAFETY: host memory of at least src.len() bytes at dst.
            unsafe { ptr::copy_nonoverlapping(src.as_ptr(), dst.as_ptr(), src.len()) };
        } else {
            let backend = device::backend(self.device)?;
            // SAFETY: span checked above.
            unsafe { backend.copy_from_host(dst, src.as_ptr(), src.len()) };
        }
        Ok(())
    }
}

impl Drop for RawBuffer {
    fn drop(&mut self) {
        let Some(ptr) = self.ptr.take() else {
            return;
        };
        if self.device.is_host() {
            // SAFETY: allocated in `allocate` with this exact layout.
            unsafe {
                alloc::dealloc(
                    ptr.as_ptr(),
                    Layout::from_size_align_unchecked(self.bytes, self.align),
                );
            }
        } else if let Ok(backend) = device::backend(self.device) {
            // SAFETY: allocated by this backend with this size/align.
            unsafe { backend.free(ptr, self.bytes, self.align) };
        }
        trace!(bytes = self.bytes, device = %self.device, "freed");
    }
}

fn check_span(capacity: usize, offset: usize, len: usize) -> Result<()> {
    match offset.checked_add(len) {
        Some(end) if end <= capacity => Ok(()),
        _ => Err(StorageError::OutOfRange {
            index: offset.saturating_add(len),
            len: capacity,
        }),
    }
}

/// Copy `bytes` bytes from `src` on `src_device` to `dst` on `dst_device`.
///
/// Copies between two different accelerators are staged through host
/// memory.
///
/// # Safety
///
/// `dst` and `src` must be valid for `bytes` bytes on their devices and
/// must not overlap.
pub(crate) unsafe fn copy_bytes(
    dst: NonNull<u8>,
    src: NonNull<u8>,
    bytes: usize,
    dst_device: Device,
    src_device: Device,
) -> Result<()> {
    // SAFETY: every branch forwards the caller's guarantees.
    unsafe {
        match (dst_device.is_host(), src_device.is_host()) {
            (true, true) => ptr::copy_nonoverlapping(src.as_ptr(), dst.as_ptr(), bytes),
            (false, true) => {
                device::backend(dst_device)?.copy_from_host(dst, src.as_ptr(), bytes)
            }
            (true, false) => device::backend(src_device)?.copy_to_host(dst.as_ptr(), src, bytes),
            (false, false) if dst_device == src_device => {
                device::backend(dst_device)?.copy_on_device(dst, src, bytes)
            }
            (false, false) => {
                let from = device::backend(src_device)?;
                let to = device::backend(dst_device)?;
                let mut staging = vec![0u8; bytes];
                from.copy_to_host(staging.as_mut_ptr(), src, bytes);
                to.copy_from_host(dst, staging.as_ptr(), bytes);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::device::{SimulatedDevice, register_device};

    #[test]
    fn test_zero_bytes_is_null() {
        let buf = RawBuffer::allocate(0, 8, Device::CPU, true).unwrap();
        assert!(buf.as_ptr().is_none());
        assert_eq!(buf.bytes(), 0);
    }

    #[test]
    fn test_host_write_read() {
        let mut buf = RawBuffer::allocate(8, 8, Device::CPU, false).unwrap();
        buf.write_from_host(2, &[7, 8, 9]).unwrap();
        let mut out = [0u8; 8];
        buf.read_to_host(0, &mut out).unwrap();
        assert_eq!(out, [0, 0, 7, 8, 9, 0, 0, 0]);
    }

    #[test]
    fn test_span_checked() {
        let buf = RawBuffer::allocate(4, 1, Device::CPU, true).unwrap();
        let mut out = [0u8; 4];
        assert!(matches!(
            buf.read_to_host(1, &mut out),
            Err(StorageError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_cross_device_copy_and_free() {
        let sim = Arc::new(SimulatedDevice::new("sim"));
        let dev = register_device(sim.clone());

        let mut host = RawBuffer::allocate(4, 1, Device::CPU, true).unwrap();
        host.write_from_host(0, &[1, 2, 3, 4]).unwrap();

        let mut on_dev = RawBuffer::allocate(4, 1, dev, true).unwrap();
        on_dev.copy_from(&host, 4).unwrap();
        assert_eq!(sim.live_bytes(), 4);

        let mut back = RawBuffer::allocate(4, 1, Device::CPU, true).unwrap();
        back.copy_from(&on_dev, 4).unwrap();
        let mut out = [0u8; 4];
        back.read_to_host(0, &mut out).unwrap();
        assert_eq!(out, [1, 2, 3, 4]);

        drop(on_dev);
        assert_eq!(sim.live_bytes(), 0);
        assert_eq!(sim.live_allocations(), 0);
    }

    #[test]
    fn test_allocation_failure() {
        let dev = register_device(Arc::new(SimulatedDevice::with_limit("tiny", 8)));
        let err = RawBuffer::allocate(16, 8, dev, true).unwrap_err();
        assert!(matches!(err, StorageError::AllocationFailure { bytes: 16, .. }));
    }

    #[test]
    fn test_unknown_device() {
        let err = RawBuffer::allocate(16, 8, Device::accelerator(u16::MAX), true).unwrap_err();
        assert!(matches!(err, StorageError::UnknownDevice { .. }));
    }
}
