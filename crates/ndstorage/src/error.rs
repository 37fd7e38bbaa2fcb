//! Error types for ndstorage.

use thiserror::Error;

use crate::device::Device;
use crate::dtype::DType;

/// Errors that can occur in storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Argument rejected before any work was done (bad dtype id, bad
    /// shape/mapper/locators, bad element count).
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    /// Element index past the logical length.
    #[error("index out of range: index {index} is out of range for length {len}")]
    OutOfRange { index: usize, len: usize },

    /// Complex value narrowed into a real-valued buffer.
    #[error("unsupported cast from {from} to {to}")]
    UnsupportedCast { from: DType, to: DType },

    /// The allocator returned null for a nonzero request.
    #[error("failed to allocate {bytes} bytes on {device}")]
    AllocationFailure { bytes: usize, device: Device },

    /// Operation forwarded through a handle that owns no buffer.
    #[error("storage is not initialized")]
    UninitializedStorage,

    /// Malformed or truncated file content.
    #[error("format error: {message}")]
    FormatError { message: String },

    /// Typed access with an element type that is not the storage dtype.
    #[error("dtype mismatch: storage holds {actual}, requested {expected}")]
    DTypeMismatch { expected: DType, actual: DType },

    /// Device id with no registered backend.
    #[error("unknown device {device}")]
    UnknownDevice { device: Device },

    /// Underlying file I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    pub(crate) fn format(message: impl Into<String>) -> Self {
        Self::FormatError {
            message: message.into(),
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StorageError>;
