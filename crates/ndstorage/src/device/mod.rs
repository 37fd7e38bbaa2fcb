//! Device identifiers and accelerator backends.
//!
//! Host memory is always available and handled directly by
//! [`crate::memory`]. Accelerators are supplied at runtime through
//! [`register_device`], which hands out consecutive ids starting at 0.
//!
//! ```text
//! Device(-1)          host (std::alloc)
//! Device(0..)         ACCELERATORS[id]: Arc<dyn DeviceBackend>
//! ```

mod simulated;

use std::fmt;
use std::ptr::NonNull;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use crate::error::{Result, StorageError};

pub use simulated::SimulatedDevice;

/// Device id reserved for host memory.
pub const HOST_DEVICE_ID: i32 = -1;

/// Where a buffer's memory lives.
///
/// # Examples
///
/// ```
/// use ndstorage::Device;
///
/// assert!(Device::CPU.is_host());
/// assert_eq!(Device::accelerator(2).id(), 2);
/// assert_eq!(format!("{}", Device::CPU), "cpu");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Device(i32);

impl Device {
    /// Host memory.
    pub const CPU: Device = Device(HOST_DEVICE_ID);

    /// Accelerator with the given id. The id does not need to be registered
    /// yet; operations touching its memory fail with `UnknownDevice` until
    /// it is.
    pub fn accelerator(id: u16) -> Device {
        Device(i32::from(id))
    }

    /// Build a device from its raw id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::InvalidArgument` for ids below `-1`.
    pub fn from_id(id: i32) -> Result<Device> {
        if id < HOST_DEVICE_ID {
            return Err(StorageError::invalid_argument(format!(
                "device id {id} is neither host (-1) nor an accelerator (>= 0)"
            )));
        }
        Ok(Device(id))
    }

    #[inline]
    pub fn id(self) -> i32 {
        self.0
    }

    #[inline]
    pub fn is_host(self) -> bool {
        self.0 == HOST_DEVICE_ID
    }

    /// Human-readable name: `"cpu"`, or `"<backend name>:<id>"` for a
    /// registered accelerator.
    pub fn name(self) -> String {
        if self.is_host() {
            return "cpu".to_string();
        }
        match backend(self) {
            Ok(b) => format!("{}:{}", b.name(), self.0),
            Err(_) => self.to_string(),
        }
    }
}

impl Default for Device {
    fn default() -> Self {
        Device::CPU
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_host() {
            f.write_str("cpu")
        } else {
            write!(f, "accel:{}", self.0)
        }
    }
}

/// Memory primitives of one accelerator.
///
/// Pointers handed to and returned by a backend are opaque device
/// addresses; the core never dereferences them.
pub trait DeviceBackend: Send + Sync {
    /// Short backend name used in `Device::name`.
    fn name(&self) -> &str;

    /// Allocate `bytes` bytes aligned to `align`. Returns `None` when the
    /// device is out of memory. `bytes` is never zero.
    fn allocate(&self, bytes: usize, align: usize, zeroed: bool) -> Option<NonNull<u8>>;

    /// Release an allocation made by `allocate` with the same size/align.
    ///
    /// # Safety
    ///
    /// `ptr` must come from this backend's `allocate(bytes, align, _)` and
    /// must not be used afterwards.
    unsafe fn free(&self, ptr: NonNull<u8>, bytes: usize, align: usize);

    /// Copy `bytes` host bytes into device memory.
    ///
    /// # Safety
    ///
    /// `dst` must be valid for `bytes` device bytes and `src` for `bytes`
    /// host bytes.
    unsafe fn copy_from_host(&self, dst: NonNull<u8>, src: *const u8, bytes: usize);

    /// Copy `bytes` device bytes into host memory.
    ///
    /// # Safety
    ///
    /// `src` must be valid for `bytes` device bytes and `dst` for `bytes`
    /// host bytes.
    unsafe fn copy_to_host(&self, dst: *mut u8, src: NonNull<u8>, bytes: usize);

    /// Copy between two allocations of this device.
    ///
    /// # Safety
    ///
    /// Both pointers must be valid for `bytes` bytes and not overlap.
    unsafe fn copy_on_device(&self, dst: NonNull<u8>, src: NonNull<u8>, bytes: usize);
}

static ACCELERATORS: RwLock<Vec<Arc<dyn DeviceBackend>>> = RwLock::new(Vec::new());

/// Register an accelerator backend and return the device id assigned to it.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use ndstorage::{Device, SimulatedDevice, register_device};
///
/// let dev = register_device(Arc::new(SimulatedDevice::new("sim")));
/// assert!(!dev.is_host());
/// assert!(dev.name().starts_with("sim:"));
/// ```
pub fn register_device(backend: Arc<dyn DeviceBackend>) -> Device {
    let mut table = ACCELERATORS
        .write()
        .unwrap_or_else(PoisonError::into_inner);
    let id = table.len() as i32;
    debug!(device = id, backend = backend.name(), "registered accelerator");
    table.push(backend);
    Device(id)
}

/// Number of registered accelerators.
pub fn device_count() -> usize {
    ACCELERATORS
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .len()
}

/// Backend owning the memory of `device`.
pub(crate) fn backend(device: Device) -> Result<Arc<dyn DeviceBackend>> {
    let table = ACCELERATORS.read().unwrap_or_else(PoisonError::into_inner);
    usize::try_from(device.0)
        .ok()
        .and_then(|idx| table.get(idx).cloned())
        .ok_or(StorageError::UnknownDevice { device })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_id() {
        assert_eq!(Device::from_id(-1).unwrap(), Device::CPU);
        assert_eq!(Device::from_id(3).unwrap(), Device::accelerator(3));
        assert!(Device::from_id(-2).is_err());
    }

    #[test]
    fn test_default_is_host() {
        assert_eq!(Device::default(), Device::CPU);
    }

    #[test]
    fn test_register_assigns_ids() {
        let a = register_device(Arc::new(SimulatedDevice::new("a")));
        let b = register_device(Arc::new(SimulatedDevice::new("b")));
        assert!(b.id() > a.id());
        assert!(device_count() > b.id() as usize);
        assert!(backend(a).is_ok());
    }

    #[test]
    fn test_unknown_device() {
        let dev = Device::accelerator(u16::MAX);
        assert!(matches!(
            backend(dev),
            Err(StorageError::UnknownDevice { .. })
        ));
        assert_eq!(dev.name(), format!("accel:{}", u16::MAX));
    }
}
