//! Storage persistence.
//!
//! Two formats:
//!
//! ```text
//! .cyst   u32 dtype id | i32 device id (always -1) | u64 length | payload
//! raw     payload
//! ```
//!
//! The payload is `length * dtype.size_of()` bytes in the native byte order
//! of the writing machine. Accelerator content is copied to the host
//! before it is written, and loaded storage always lives on the host.

use std::ffi::OsStr;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use byteorder::{NativeEndian, ReadBytesExt, WriteBytesExt};
use tracing::debug;

use crate::device::HOST_DEVICE_ID;
use crate::dtype::DType;
use crate::error::{Result, StorageError};
use crate::storage::{Storage, StorageImpl, registry};

/// Extension of the self-describing format.
pub const STORAGE_EXTENSION: &str = "cyst";

fn write_cyst<W: Write>(imp: &dyn StorageImpl, w: &mut W) -> Result<()> {
    w.write_u32::<NativeEndian>(imp.dtype().id())?;
    w.write_i32::<NativeEndian>(HOST_DEVICE_ID)?;
    w.write_u64::<NativeEndian>(imp.len() as u64)?;
    imp.write_payload(w)
}

/// `path` with `.cyst` appended unless it already ends in it.
fn with_storage_extension(path: &Path) -> PathBuf {
    if path.extension() == Some(OsStr::new(STORAGE_EXTENSION)) {
        return path.to_path_buf();
    }
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(STORAGE_EXTENSION);
    PathBuf::from(name)
}

fn header_field<T>(field: &str, value: io::Result<T>) -> Result<T> {
    value.map_err(|err| match err.kind() {
        io::ErrorKind::UnexpectedEof => {
            StorageError::format(format!("truncated header: missing {field}"))
        }
        _ => StorageError::Io(err),
    })
}

impl Storage {
    /// Write the self-describing format to `path`, appending `.cyst` when
    /// the path lacks it. Returns the path actually written.
    ///
    /// # Example
    ///
    /// ```
    /// use ndstorage::Storage;
    ///
    /// let dir = tempfile::tempdir().unwrap();
    /// let s = Storage::from_vec(vec![1u32, 2, 3]).unwrap();
    /// let path = s.save(dir.path().join("ids")).unwrap();
    /// assert_eq!(path.extension().unwrap(), "cyst");
    /// assert_eq!(Storage::load(&path).unwrap(), s);
    /// ```
    pub fn save(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let path = with_storage_extension(path.as_ref());
        // Borrow before creating the file so a failing handle leaves it intact.
        let imp = self.borrow()?;
        let mut w = BufWriter::new(File::create(&path)?);
        write_cyst(&**imp, &mut w)?;
        w.flush()?;
        debug!(path = %path.display(), "saved storage");
        Ok(path)
    }

    /// Write the self-describing format to `w`.
    pub fn save_to_writer<W: Write>(&self, w: &mut W) -> Result<()> {
        write_cyst(&**self.borrow()?, w)
    }

    /// Read a storage written by [`save`](Storage::save). The path is used
    /// as given.
    ///
    /// # Errors
    ///
    /// `FormatError` for an unrecognized dtype id or a truncated file.
    pub fn load(path: impl AsRef<Path>) -> Result<Storage> {
        let path = path.as_ref();
        let mut r = BufReader::new(File::open(path)?);
        let s = Self::load_from_reader(&mut r)?;
        debug!(path = %path.display(), "loaded storage");
        Ok(s)
    }

    /// Read the self-describing format from `r`.
    pub fn load_from_reader<R: Read>(r: &mut R) -> Result<Storage> {
        let id = header_field("dtype id", r.read_u32::<NativeEndian>())?;
        // The device field is informational; content always lands on the host.
        let _device = header_field("device id", r.read_i32::<NativeEndian>())?;
        let len = header_field("length", r.read_u64::<NativeEndian>())?;

        let dtype = DType::from_id(id)
            .ok_or_else(|| StorageError::format(format!("unrecognized dtype id {id}")))?;
        let len = usize::try_from(len)
            .map_err(|_| StorageError::format(format!("length {len} does not fit in memory")))?;

        let mut imp = registry::create(dtype)?;
        imp.read_payload(r, len)?;
        Ok(Storage::from_impl(imp))
    }

    /// Write only the raw payload to `path`.
    pub fn tofile(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let imp = self.borrow()?;
        let mut w = BufWriter::new(File::create(path)?);
        imp.write_payload(&mut w)?;
        w.flush()?;
        debug!(path = %path.display(), "wrote raw storage");
        Ok(())
    }

    /// Write only the raw payload to `w`.
    pub fn tofile_writer<W: Write>(&self, w: &mut W) -> Result<()> {
        self.borrow()?.write_payload(w)
    }

    /// Read `count` raw elements of `dtype` from `path`; `count == -1`
    /// reads the whole file.
    ///
    /// Nothing in a raw file records its dtype: reading with the wrong
    /// `dtype` silently reinterprets the bytes.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for `count == 0` or `count < -1`, `FormatError` if
    /// the file holds fewer than `count` elements (or, with `-1`, a byte
    /// count that is not a whole number of elements).
    pub fn fromfile(path: impl AsRef<Path>, dtype: DType, count: i64) -> Result<Storage> {
        if count == 0 || count < -1 {
            return Err(StorageError::invalid_argument(format!(
                "element count must be positive or -1, got {count}"
            )));
        }
        let path = path.as_ref();
        let file = File::open(path)?;
        let available = file.metadata()?.len();
        let elem = dtype.size_of() as u64;

        let len = if count == -1 {
            if available % elem != 0 {
                return Err(StorageError::format(format!(
                    "file size {available} is not a multiple of the {dtype} size {elem}"
                )));
            }
            available / elem
        } else {
            count as u64
        };
        if len.saturating_mul(elem) > available {
            return Err(StorageError::format(format!(
                "requested {len} elements of {dtype}, file holds {}",
                available / elem
            )));
        }
        let len = usize::try_from(len)
            .map_err(|_| StorageError::format(format!("length {len} does not fit in memory")))?;

        let mut imp = registry::create(dtype)?;
        imp.read_payload(&mut BufReader::new(file), len)?;
        debug!(path = %path.display(), %dtype, len, "read raw storage");
        Ok(Storage::from_impl(imp))
    }
}
