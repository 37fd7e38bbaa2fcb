//! Host-memory-backed accelerator.

use std::alloc::{self, Layout};
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicUsize, Ordering};

use super::DeviceBackend;

/// An accelerator whose "device memory" is ordinary heap memory.
///
/// The core treats it exactly like a real accelerator: its memory is only
/// reached through the copy primitives, never dereferenced directly. It
/// keeps allocation counters so callers can check that every allocation is
/// released exactly once, and can be given a byte limit to provoke
/// allocation failures.
#[derive(Debug)]
pub struct SimulatedDevice {
    name: String,
    limit: Option<usize>,
    live_bytes: AtomicUsize,
    live_allocations: AtomicUsize,
}

impl SimulatedDevice {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            limit: None,
            live_bytes: AtomicUsize::new(0),
            live_allocations: AtomicUsize::new(0),
        }
    }

    /// A device that refuses allocations once `limit` bytes are live.
    pub fn with_limit(name: impl Into<String>, limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::new(name)
        }
    }

    /// Bytes currently allocated.
    pub fn live_bytes(&self) -> usize {
        self.live_bytes.load(Ordering::SeqCst)
    }

    /// Allocations not yet freed.
    pub fn live_allocations(&self) -> usize {
        self.live_allocations.load(Ordering::SeqCst)
    }
}

impl DeviceBackend for SimulatedDevice {
    fn name(&self) -> &str {
        &self.name
    }

    // Memory is always zeroed so staged reads never observe uninitialized bytes.
    fn allocate(&self, bytes: usize, align: usize, _zeroed: bool) -> Option<NonNull<u8>> {
        if let Some(limit) = self.limit {
            if self.live_bytes() + bytes > limit {
                return None;
            }
        }
        let layout = Layout::from_size_align(bytes, align).ok()?;
        // SAFETY: `bytes` is nonzero per the trait contract.
        let ptr = NonNull::new(unsafe { alloc::alloc_zeroed(layout) })?;
        self.live_bytes.fetch_add(bytes, Ordering::SeqCst);
        self.live_allocations.fetch_add(1, Ordering::SeqCst);
        Some(ptr)
    }

    unsafe fn free(&self, ptr: NonNull<u8>, bytes: usize, align: usize) {
        // SAFETY: the caller passes the size/align used in `allocate`.
        unsafe {
            let layout = Layout::from_size_align_unchecked(bytes, align);
            alloc::dealloc(ptr.as_ptr(), layout);
        }
        self.live_bytes.fetch_sub(bytes, Ordering::SeqCst);
        self.live_allocations.fetch_sub(1, Ordering::SeqCst);
    }

    unsafe fn copy_from_host(&self, dst: NonNull<u8>, src: *const u8, bytes: usize) {
        // SAFETY: forwarded from the caller.
        unsafe { ptr::copy_nonoverlapping(src, dst.as_ptr(), bytes) }
    }

    unsafe fn copy_to_host(&self, dst: *mut u8, src: NonNull<u8>, bytes: usize) {
        // SAFETY: forwarded from the caller.
        unsafe { ptr::copy_nonoverlapping(src.as_ptr(), dst, bytes) }
    }

    unsafe fn copy_on_device(&self, dst: NonNull<u8>, src: NonNull<u8>, bytes: usize) {
        // SAFETY: forwarded from the caller.
        unsafe { ptr::copy_nonoverlapping(src.as_ptr(), dst.as_ptr(), bytes) }
    }
}
