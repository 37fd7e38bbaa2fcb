//! ndstorage - flat, typed, device-resident storage for n-dimensional tensors
//!
//! A [`Storage`] is a reference-counted handle to a contiguous buffer of one
//! of eleven element kinds ([`DType`]) living in host memory or on a
//! registered accelerator ([`Device`]). Tensor layers above it own shape and
//! strides; this crate owns bytes, capacity, casts, transfers and
//! persistence.
//!
//! # Architecture
//!
//! ```text
//! Level 1: Storage handle (storage module)
//!     → share / clone / astype / to / get_elem_by_shape / save
//!
//! Level 2: Type-erased variants (storage::registry)
//!     → DType id → TypedStorage<T> factory
//!
//! Level 3: Engines and memory
//!     → backend::GenericBackend      (Move_memory permutation)
//!     → operations::Selection        (shape-indexed gather/scatter)
//!     → memory::RawBuffer            (host alloc or DeviceBackend)
//! ```
//!
//! # Example
//!
//! ```
//! use ndstorage::{DType, Device, Storage};
//!
//! // 2x3 row-major buffer [0 1 2; 3 4 5]
//! let s = Storage::from_vec((0..6).map(f64::from).collect()).unwrap();
//!
//! // Transpose the memory layout
//! let t = s.move_memory(&[2, 3], &[1, 0], &[1, 0]).unwrap();
//! assert_eq!(t.vector::<f64>().unwrap(), vec![0.0, 3.0, 1.0, 4.0, 2.0, 5.0]);
//!
//! // Cast to int32
//! let i = t.astype(DType::Int32).unwrap();
//! assert_eq!(i.at::<i32>(1).unwrap(), 3);
//! assert_eq!(i.device().unwrap(), Device::CPU);
//! ```

pub mod backend;
pub mod device;
pub mod dtype;
pub mod error;
pub mod io;
mod memory;
pub mod operations;
pub mod scalar;
pub mod storage;
pub mod strides;

pub use device::{
    Device, DeviceBackend, HOST_DEVICE_ID, SimulatedDevice, device_count, register_device,
};
pub use dtype::{DType, Element};
pub use error::{Result, StorageError};
pub use io::STORAGE_EXTENSION;
pub use num_complex::{Complex32, Complex64};
pub use scalar::Scalar;
pub use storage::{DEFAULT_MIN_CAPACITY, GROWTH_FACTOR, Storage};
