//! Kind-specific buffer variant.

use std::any::Any;
use std::io::{Read, Write};
use std::marker::PhantomData;
use std::slice;

use tracing::{debug, trace};

use crate::backend::{GenericBackend, PermutationBackend, check_permutation, permuted_shape};
use crate::device::Device;
use crate::dtype::{DType, Element};
use crate::error::{Result, StorageError};
use crate::memory::RawBuffer;
use crate::operations::Selection;
use crate::scalar::Scalar;
use crate::storage::base::StorageImpl;
use crate::storage::{format, registry};

/// Smallest capacity handed out by `init`.
pub const DEFAULT_MIN_CAPACITY: usize = 2;

/// Capacity multiplier applied when `resize` outgrows the allocation.
pub const GROWTH_FACTOR: usize = 2;

/// Flat storage of `T` elements on one device.
///
/// Holds an owning [`RawBuffer`] of `capacity * size_of::<T>()` bytes and a
/// logical length `len <= capacity`. Element kernels run directly on host
/// memory; accelerator memory is reached through a host staging copy.
#[derive(Debug)]
pub(crate) struct TypedStorage<T: Element> {
    buf: RawBuffer,
    len: usize,
    _marker: PhantomData<T>,
}

impl<T: Element> TypedStorage<T> {
    /// Empty host storage with no allocation.
    pub(crate) fn empty() -> Self {
        Self {
            buf: RawBuffer::empty(Device::CPU),
            len: 0,
            _marker: PhantomData,
        }
    }

    /// Registry factory.
    pub(crate) fn boxed_empty() -> Box<dyn StorageImpl> {
        Box::new(Self::empty())
    }

    fn with_capacity(len: usize, capacity: usize, device: Device, zeroed: bool) -> Result<Self> {
        debug_assert!(len <= capacity);
        let bytes = capacity
            .checked_mul(size_of::<T>())
            .ok_or_else(|| {
                StorageError::invalid_argument(format!("capacity {capacity} overflows"))
            })?;
        let buf = RawBuffer::allocate(bytes, align_of::<T>(), device, zeroed)?;
        Ok(Self {
            buf,
            len,
            _marker: PhantomData,
        })
    }

    /// Storage on `device` holding a copy of `values`.
    pub(crate) fn from_slice(values: &[T], device: Device) -> Result<Self> {
        let capacity = values.len().max(DEFAULT_MIN_CAPACITY);
        let mut out = Self::with_capacity(values.len(), capacity, device, false)?;
        out.upload_at(0, values)?;
        Ok(out)
    }

    /// Borrow the logical elements. Only valid for host memory.
    pub(crate) fn host_slice(&self) -> &[T] {
        debug_assert!(self.buf.device().is_host());
        match self.buf.as_ptr() {
            // SAFETY: host allocations are zero-initialized, aligned for T and
            // hold `capacity >= len` elements; all-zero bytes are a valid T.
            Some(ptr) => unsafe { slice::from_raw_parts(ptr.cast::<T>().as_ptr(), self.len) },
            None => &[],
        }
    }

    fn host_slice_mut(&mut self) -> &mut [T] {
        debug_assert!(self.buf.device().is_host());
        match self.buf.as_ptr() {
            // SAFETY: as in `host_slice`; `&mut self` guarantees exclusivity.
            Some(ptr) => unsafe { slice::from_raw_parts_mut(ptr.cast::<T>().as_ptr(), self.len) },
            None => &mut [],
        }
    }

    /// Copy the logical elements to a host vector, from any device.
    pub(crate) fn download(&self) -> Result<Vec<T>> {
        if self.buf.device().is_host() {
            return Ok(self.host_slice().to_vec());
        }
        let mut bytes = vec![0u8; self.len * size_of::<T>()];
        self.buf.read_to_host(0, &mut bytes)?;
        let mut out = vec![T::default(); self.len];
        T::decode_bytes(&mut out, &bytes);
        Ok(out)
    }

    fn read_at(&self, idx: usize) -> Result<T> {
        if self.buf.device().is_host() {
            return Ok(self.host_slice()[idx]);
        }
        let mut bytes = vec![0u8; size_of::<T>()];
        self.buf.read_to_host(idx * size_of::<T>(), &mut bytes)?;
        let mut out = [T::default()];
        T::decode_bytes(&mut out, &bytes);
        Ok(out[0])
    }

    /// Write `values` at element offset `start`, within `[0, len)`.
    fn upload_at(&mut self, start: usize, values: &[T]) -> Result<()> {
        let end = start + values.len();
        if end > self.len {
            return Err(StorageError::OutOfRange {
                index: end - 1,
                len: self.len,
            });
        }
        if self.buf.device().is_host() {
            self.host_slice_mut()[start..end].copy_from_slice(values);
            Ok(())
        } else {
            self.buf
                .write_from_host(start * size_of::<T>(), T::encode_bytes(values))
        }
    }

    /// Run `f` over the elements; accelerator content is staged on the host.
    fn with_host<R>(&self, f: impl FnOnce(&[T]) -> R) -> Result<R> {
        if self.buf.device().is_host() {
            Ok(f(self.host_slice()))
        } else {
            let staged = self.download()?;
            Ok(f(&staged))
        }
    }

    /// Mutable variant of `with_host`; staged content is written back.
    fn with_host_mut<R>(&mut self, f: impl FnOnce(&mut [T]) -> R) -> Result<R> {
        if self.buf.device().is_host() {
            Ok(f(self.host_slice_mut()))
        } else {
            let mut staged = self.download()?;
            let out = f(&mut staged);
            self.upload_at(0, &staged)?;
            Ok(out)
        }
    }

    fn overwrite(&mut self, value: T) -> Result<()> {
        if self.buf.device().is_host() {
            self.host_slice_mut().fill(value);
            Ok(())
        } else {
            let values = vec![value; self.len];
            self.upload_at(0, &values)
        }
    }

    fn check_index(&self, idx: usize) -> Result<()> {
        if idx >= self.len {
            return Err(StorageError::OutOfRange {
                index: idx,
                len: self.len,
            });
        }
        Ok(())
    }

    fn downcast(src: &dyn StorageImpl) -> Result<&Self> {
        src.as_any()
            .downcast_ref::<Self>()
            .ok_or(StorageError::DTypeMismatch {
                expected: T::DTYPE,
                actual: src.dtype(),
            })
    }

    fn boxed_from(values: &[T], device: Device) -> Result<Box<dyn StorageImpl>> {
        Ok(Box::new(Self::from_slice(values, device)?))
    }

    /// Copy of the content with the same capacity, on `device`.
    fn copy_to(&self, device: Device) -> Result<Self> {
        let mut out = Self::with_capacity(self.len, self.capacity(), device, false)?;
        out.buf.copy_from(&self.buf, self.len * size_of::<T>())?;
        Ok(out)
    }

    fn component(&self, part: fn(Scalar) -> Scalar, name: &str) -> Result<Box<dyn StorageImpl>> {
        let dtype = T::DTYPE.component_dtype().ok_or_else(|| {
            StorageError::invalid_argument(format!(
                "{name}() requires a complex storage, got {}",
                T::DTYPE
            ))
        })?;
        let values: Vec<Scalar> =
            self.with_host(|s| s.iter().map(|&v| part(v.into_scalar())).collect())?;
        let mut out = registry::create(dtype)?;
        out.init(self.len, self.device(), false)?;
        out.assign_scalars(&values)?;
        Ok(out)
    }
}

impl<T: Element> StorageImpl for TypedStorage<T> {
    fn dtype(&self) -> DType {
        T::DTYPE
    }

    fn device(&self) -> Device {
        self.buf.device()
    }

    fn len(&self) -> usize {
        self.len
    }

    fn capacity(&self) -> usize {
        self.buf.bytes() / size_of::<T>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn init(&mut self, len: usize, device: Device, zero_fill: bool) -> Result<()> {
        let capacity = len.max(DEFAULT_MIN_CAPACITY);
        *self = Self::with_capacity(len, capacity, device, zero_fill)?;
        Ok(())
    }

    fn clone_boxed(&self) -> Result<Box<dyn StorageImpl>> {
        Ok(Box::new(self.copy_to(self.device())?))
    }

    fn to_device(&self, device: Device) -> Result<Box<dyn StorageImpl>> {
        debug!(from = %self.device(), to = %device, len = self.len, "copying storage to device");
        Ok(Box::new(self.copy_to(device)?))
    }

    fn to_device_(&mut self, device: Device) -> Result<()> {
        if device == self.device() {
            return Ok(());
        }
        debug!(from = %self.device(), to = %device, len = self.len, "moving storage to device");
        *self = self.copy_to(device)?;
        Ok(())
    }

    fn resize(&mut self, len: usize) -> Result<()> {
        let capacity = self.capacity();
        if len <= capacity {
            self.len = len;
            return Ok(());
        }
        let new_capacity = len.max(capacity * GROWTH_FACTOR);
        let mut grown = Self::with_capacity(len, new_capacity, self.device(), true)?;
        grown.buf.copy_from(&self.buf, self.len * size_of::<T>())?;
        debug!(
            dtype = T::DTYPE.name(),
            old_capacity = capacity,
            new_capacity,
            "reallocated storage"
        );
        *self = grown;
        Ok(())
    }

    fn set_zeros(&mut self) -> Result<()> {
        self.overwrite(T::default())
    }

    fn fill(&mut self, value: Scalar) -> Result<()> {
        let value = T::from_scalar(value)?;
        self.overwrite(value)
    }

    fn append(&mut self, value: Scalar) -> Result<()> {
        // Convert first so a rejected value leaves the storage untouched.
        let value = T::from_scalar(value)?;
        self.resize(self.len + 1)?;
        self.upload_at(self.len - 1, &[value])
    }

    fn set_item(&mut self, idx: usize, value: Scalar) -> Result<()> {
        self.check_index(idx)?;
        let value = T::from_scalar(value)?;
        self.upload_at(idx, &[value])
    }

    fn get_item(&self, idx: usize) -> Result<Scalar> {
        self.check_index(idx)?;
        Ok(self.read_at(idx)?.into_scalar())
    }

    fn assign_scalars(&mut self, values: &[Scalar]) -> Result<()> {
        if values.len() != self.len {
            return Err(StorageError::invalid_argument(format!(
                "expected {} values, got {}",
                self.len,
                values.len()
            )));
        }
        let converted = values
            .iter()
            .map(|&v| T::from_scalar(v))
            .collect::<Result<Vec<T>>>()?;
        self.upload_at(0, &converted)
    }

    fn astype(&self, dtype: DType) -> Result<Box<dyn StorageImpl>> {
        if !T::DTYPE.can_cast_to(dtype) {
            return Err(StorageError::UnsupportedCast {
                from: T::DTYPE,
                to: dtype,
            });
        }
        let values: Vec<Scalar> =
            self.with_host(|s| s.iter().map(|&v| v.into_scalar()).collect())?;
        let mut out = registry::create(dtype)?;
        out.init(self.len, self.device(), false)?;
        out.assign_scalars(&values)?;
        Ok(out)
    }

    fn real(&self) -> Result<Box<dyn StorageImpl>> {
        self.component(Scalar::real, "real")
    }

    fn imag(&self) -> Result<Box<dyn StorageImpl>> {
        self.component(Scalar::imag, "imag")
    }

    fn move_memory(
        &self,
        old_shape: &[usize],
        mapper: &[usize],
        invmapper: &[usize],
    ) -> Result<Box<dyn StorageImpl>> {
        check_permutation(old_shape, mapper, invmapper, self.len)?;
        trace!(?old_shape, new_shape = ?permuted_shape(old_shape, mapper), "move_memory");
        let permuted = self.with_host(|src| permute(src, old_shape, invmapper))?;
        Self::boxed_from(&permuted, self.device())
    }

    fn move_memory_(
        &mut self,
        old_shape: &[usize],
        mapper: &[usize],
        invmapper: &[usize],
    ) -> Result<()> {
        check_permutation(old_shape, mapper, invmapper, self.len)?;
        trace!(?old_shape, new_shape = ?permuted_shape(old_shape, mapper), "move_memory_");
        let permuted = self.with_host(|src| permute(src, old_shape, invmapper))?;
        self.upload_at(0, &permuted)
    }

    fn get_elem_by_shape(
        &self,
        shape: &[usize],
        mapper: &[usize],
        len: &[usize],
        locators: &[Vec<usize>],
    ) -> Result<Box<dyn StorageImpl>> {
        let sel = Selection::new(shape, mapper, len, locators, self.len)?;
        trace!(?shape, ?len, selected = sel.count(), "get_elem_by_shape");
        let out = self.with_host(|src| sel.gather(src))?;
        Self::boxed_from(&out, self.device())
    }

    fn set_elem_by_shape(
        &mut self,
        src: &dyn StorageImpl,
        shape: &[usize],
        mapper: &[usize],
        len: &[usize],
        locators: &[Vec<usize>],
        is_scalar: bool,
    ) -> Result<()> {
        let values = Self::downcast(src)?.download()?;
        let sel = Selection::new(shape, mapper, len, locators, self.len)?;
        sel.check_source(values.len(), is_scalar)?;
        trace!(?shape, ?len, selected = sel.count(), is_scalar, "set_elem_by_shape");
        self.with_host_mut(|dst| sel.scatter(dst, &values, is_scalar))
    }

    fn get_elem_by_shape_v2(
        &self,
        shape: &[usize],
        locators: &[Vec<usize>],
        nunit: usize,
    ) -> Result<Box<dyn StorageImpl>> {
        let sel = Selection::contiguous(shape, locators, nunit, self.len)?;
        trace!(?shape, nunit, runs = sel.count(), "get_elem_by_shape_v2");
        let out = self.with_host(|src| sel.gather(src))?;
        Self::boxed_from(&out, self.device())
    }

    fn set_elem_by_shape_v2(
        &mut self,
        src: &dyn StorageImpl,
        shape: &[usize],
        locators: &[Vec<usize>],
        nunit: usize,
        is_scalar: bool,
    ) -> Result<()> {
        let values = Self::downcast(src)?.download()?;
        let sel = Selection::contiguous(shape, locators, nunit, self.len)?;
        sel.check_source(values.len(), is_scalar)?;
        trace!(?shape, nunit, runs = sel.count(), is_scalar, "set_elem_by_shape_v2");
        self.with_host_mut(|dst| sel.scatter(dst, &values, is_scalar))
    }

    fn format_elems_by_shape(&self, shape: &[usize], mapper: &[usize]) -> Result<String> {
        let locators = vec![Vec::new(); shape.len()];
        let sel = Selection::new(shape, mapper, shape, &locators, self.len)?;
        let values = self.with_host(|src| sel.gather(src))?;
        Ok(format::format_nested(&values, shape))
    }

    fn content_eq(&self, other: &dyn StorageImpl) -> Result<bool> {
        if other.dtype() != T::DTYPE || other.device() != self.device() || other.len() != self.len
        {
            return Ok(false);
        }
        let other = Self::downcast(other)?;
        if self.device().is_host() {
            return Ok(self.host_slice() == other.host_slice());
        }
        Ok(self.download()? == other.download()?)
    }

    fn write_payload(&self, w: &mut dyn Write) -> Result<()> {
        if self.device().is_host() {
            w.write_all(T::encode_bytes(self.host_slice()))?;
        } else {
            let values = self.download()?;
            w.write_all(T::encode_bytes(&values))?;
        }
        Ok(())
    }

    fn read_payload(&mut self, r: &mut dyn Read, len: usize) -> Result<()> {
        let expected = len.checked_mul(size_of::<T>()).ok_or_else(|| {
            StorageError::format(format!("element count {len} overflows the address space"))
        })?;
        let mut bytes = Vec::new();
        r.take(expected as u64).read_to_end(&mut bytes)?;
        if bytes.len() != expected {
            return Err(StorageError::format(format!(
                "truncated payload: expected {expected} bytes of {}, found {}",
                T::DTYPE,
                bytes.len()
            )));
        }
        self.init(len, Device::CPU, false)?;
        T::decode_bytes(self.host_slice_mut(), &bytes);
        Ok(())
    }
}

fn permute<T: Element>(src: &[T], old_shape: &[usize], invmapper: &[usize]) -> Vec<T> {
    let mut dest = vec![T::default(); src.len()];
    GenericBackend::permute_into(&mut dest, src, old_shape, invmapper);
    dest
}
