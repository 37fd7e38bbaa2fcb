//! Type-erased, reference-counted storage.
//!
//! ```text
//! Storage (handle)
//!   └── Rc<RefCell<Box<dyn StorageImpl>>>     shared by `share()`
//!         └── TypedStorage<T>                 one per element kind
//!               └── RawBuffer                 host or accelerator bytes
//! ```
//!
//! The concrete variant is picked at runtime from a [`DType`] through the
//! factory table in [`registry`].

mod base;
mod format;
pub mod registry;
mod typed;

use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

use tracing::warn;

use crate::device::Device;
use crate::dtype::{DType, Element};
use crate::error::{Result, StorageError};
use crate::scalar::Scalar;

pub(crate) use base::StorageImpl;
use typed::TypedStorage;

pub use typed::{DEFAULT_MIN_CAPACITY, GROWTH_FACTOR};

type Shared = Rc<RefCell<Box<dyn StorageImpl>>>;

/// Handle to a flat, typed, device-resident buffer.
///
/// Handles are cheap to [`share`](Storage::share): every shared handle
/// sees the same buffer, and mutations through one are visible through
/// all. [`clone`](Storage::clone) is the deep copy. Equality (`==`)
/// compares content, [`is_same`](Storage::is_same) compares identity.
///
/// A default-constructed handle owns nothing; every forwarding call on
/// it fails with [`StorageError::UninitializedStorage`].
///
/// # Example
///
/// ```
/// use ndstorage::{DType, Device, Storage};
///
/// let mut s = Storage::zeros(3, DType::Double, Device::CPU).unwrap();
/// s.set_item(1, 2.5).unwrap();
/// s.append(4).unwrap();
/// assert_eq!(s.vector::<f64>().unwrap(), vec![0.0, 2.5, 0.0, 4.0]);
///
/// let alias = s.share();
/// assert!(alias.is_same(&s));
/// let copy = s.clone().unwrap();
/// assert!(!copy.is_same(&s));
/// assert_eq!(copy, s);
/// ```
#[derive(Default)]
pub struct Storage {
    inner: Option<Shared>,
}

impl Storage {
    /// An uninitialized handle.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_impl(imp: Box<dyn StorageImpl>) -> Self {
        Self {
            inner: Some(Rc::new(RefCell::new(imp))),
        }
    }

    fn shared(&self) -> Result<&Shared> {
        self.inner.as_ref().ok_or(StorageError::UninitializedStorage)
    }

    pub(crate) fn borrow(&self) -> Result<Ref<'_, Box<dyn StorageImpl>>> {
        self.shared()?
            .try_borrow()
            .map_err(|_| StorageError::invalid_argument("storage is already mutably borrowed"))
    }

    fn borrow_mut(&mut self) -> Result<RefMut<'_, Box<dyn StorageImpl>>> {
        self.shared()?
            .try_borrow_mut()
            .map_err(|_| StorageError::invalid_argument("storage is already borrowed"))
    }

    /// (Re)initialize this handle with `size` elements of `dtype` on
    /// `device`. Other handles sharing the previous buffer keep it.
    ///
    /// # Errors
    ///
    /// `AllocationFailure` or `UnknownDevice` from the allocation.
    pub fn init(
        &mut self,
        size: usize,
        dtype: DType,
        device: Device,
        zero_fill: bool,
    ) -> Result<()> {
        let mut imp = registry::create(dtype)?;
        imp.init(size, device, zero_fill)?;
        *self = Self::from_impl(imp);
        Ok(())
    }

    /// Like [`init`](Storage::init) with a raw dtype id.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if `dtype_id` is not a recognized element kind.
    pub fn init_by_id(
        &mut self,
        size: usize,
        dtype_id: u32,
        device: Device,
        zero_fill: bool,
    ) -> Result<()> {
        let mut imp = registry::create_by_id(dtype_id)?;
        imp.init(size, device, zero_fill)?;
        *self = Self::from_impl(imp);
        Ok(())
    }

    /// A zero-filled storage of `size` elements.
    pub fn zeros(size: usize, dtype: DType, device: Device) -> Result<Self> {
        let mut s = Self::new();
        s.init(size, dtype, device, true)?;
        Ok(s)
    }

    /// Host storage holding a copy of `values`.
    pub fn from_vec<T: Element>(values: Vec<T>) -> Result<Self> {
        Self::from_vector(&values, Device::CPU)
    }

    /// Storage on `device` holding a copy of `values`.
    pub fn from_vector<T: Element>(values: &[T], device: Device) -> Result<Self> {
        Ok(Self::from_impl(Box::new(TypedStorage::from_slice(
            values, device,
        )?)))
    }

    /// Another handle to the same buffer.
    pub fn share(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }

    /// Whether both handles refer to the same buffer.
    pub fn is_same(&self, other: &Storage) -> bool {
        match (&self.inner, &other.inner) {
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Number of handles sharing this buffer (0 when uninitialized).
    pub fn ref_count(&self) -> usize {
        self.inner.as_ref().map_or(0, Rc::strong_count)
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.is_some()
    }

    /// Deep copy into an independent buffer with the same dtype, device,
    /// length and capacity.
    #[allow(clippy::should_implement_trait)]
    pub fn clone(&self) -> Result<Storage> {
        Ok(Self::from_impl(self.borrow()?.clone_boxed()?))
    }

    pub fn dtype(&self) -> Result<DType> {
        Ok(self.borrow()?.dtype())
    }

    pub fn dtype_str(&self) -> Result<&'static str> {
        Ok(self.dtype()?.name())
    }

    pub fn device(&self) -> Result<Device> {
        Ok(self.borrow()?.device())
    }

    pub fn device_str(&self) -> Result<String> {
        Ok(self.device()?.name())
    }

    /// Logical number of elements.
    pub fn size(&self) -> Result<usize> {
        Ok(self.borrow()?.len())
    }

    /// Number of elements the current allocation can hold.
    pub fn capacity(&self) -> Result<usize> {
        Ok(self.borrow()?.capacity())
    }

    fn check_dtype<T: Element>(&self) -> Result<()> {
        let actual = self.dtype()?;
        if actual != T::DTYPE {
            return Err(StorageError::DTypeMismatch {
                expected: T::DTYPE,
                actual,
            });
        }
        Ok(())
    }

    /// Element `idx` as a runtime-typed value.
    pub fn get_item(&self, idx: usize) -> Result<Scalar> {
        self.borrow()?.get_item(idx)
    }

    /// Element `idx`; `T` must match the storage dtype.
    pub fn at<T: Element>(&self, idx: usize) -> Result<T> {
        self.check_dtype::<T>()?;
        self.get_item(idx)?.cast()
    }

    /// Last element; `T` must match the storage dtype.
    pub fn back<T: Element>(&self) -> Result<T> {
        let len = self.size()?;
        if len == 0 {
            return Err(StorageError::OutOfRange { index: 0, len: 0 });
        }
        self.at(len - 1)
    }

    /// Borrow the elements of a host storage.
    ///
    /// # Errors
    ///
    /// `DTypeMismatch` if `T` is not the storage dtype, `InvalidArgument`
    /// if the buffer is not in host memory.
    pub fn data<T: Element>(&self) -> Result<Ref<'_, [T]>> {
        self.check_dtype::<T>()?;
        let device = self.device()?;
        if !device.is_host() {
            return Err(StorageError::invalid_argument(format!(
                "data() needs host memory, storage lives on {device}"
            )));
        }
        Ref::filter_map(self.borrow()?, |imp| {
            imp.as_any()
                .downcast_ref::<TypedStorage<T>>()
                .map(TypedStorage::host_slice)
        })
        .map_err(|imp| StorageError::DTypeMismatch {
            expected: T::DTYPE,
            actual: imp.dtype(),
        })
    }

    /// Copy the elements into a `Vec`, from any device.
    pub fn vector<T: Element>(&self) -> Result<Vec<T>> {
        self.check_dtype::<T>()?;
        let imp = self.borrow()?;
        match imp.as_any().downcast_ref::<TypedStorage<T>>() {
            Some(typed) => typed.download(),
            None => Err(StorageError::DTypeMismatch {
                expected: T::DTYPE,
                actual: imp.dtype(),
            }),
        }
    }

    /// Change the logical length. Growing past the capacity reallocates
    /// to `max(size, GROWTH_FACTOR * capacity)` and zero-fills the new
    /// tail; shrinking keeps the allocation.
    pub fn resize(&mut self, size: usize) -> Result<()> {
        self.borrow_mut()?.resize(size)
    }

    /// Push one value, converted to the storage dtype.
    pub fn append(&mut self, value: impl Into<Scalar>) -> Result<()> {
        self.borrow_mut()?.append(value.into())
    }

    /// Set every element to `value`, converted to the storage dtype.
    pub fn fill(&mut self, value: impl Into<Scalar>) -> Result<()> {
        self.borrow_mut()?.fill(value.into())
    }

    pub fn set_item(&mut self, idx: usize, value: impl Into<Scalar>) -> Result<()> {
        self.borrow_mut()?.set_item(idx, value.into())
    }

    pub fn set_zeros(&mut self) -> Result<()> {
        self.borrow_mut()?.set_zeros()
    }

    /// Convert to `dtype` on the same device. Converting to the current
    /// dtype returns a shared handle.
    ///
    /// # Errors
    ///
    /// `UnsupportedCast` for complex → real or complex → bool.
    pub fn astype(&self, dtype: DType) -> Result<Storage> {
        if self.dtype()? == dtype {
            return Ok(self.share());
        }
        Ok(Self::from_impl(self.borrow()?.astype(dtype)?))
    }

    /// Real parts of a complex storage.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the storage is not complex.
    pub fn real(&self) -> Result<Storage> {
        Ok(Self::from_impl(self.borrow()?.real()?))
    }

    /// Imaginary parts of a complex storage.
    pub fn imag(&self) -> Result<Storage> {
        Ok(Self::from_impl(self.borrow()?.imag()?))
    }

    /// Copy onto `device`. Targeting the current device returns a shared
    /// handle.
    pub fn to(&self, device: Device) -> Result<Storage> {
        if self.device()? == device {
            return Ok(self.share());
        }
        Ok(Self::from_impl(self.borrow()?.to_device(device)?))
    }

    /// Move this buffer onto `device`; every sharing handle follows.
    pub fn to_(&mut self, device: Device) -> Result<()> {
        self.borrow_mut()?.to_device_(device)
    }

    /// Permuted copy: axis `i` of the result is axis `mapper[i]` of a
    /// row-major buffer of shape `old_shape`.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` unless `mapper` and `invmapper` are inverse
    /// permutations of `0..old_shape.len()` and `old_shape` covers the
    /// whole buffer.
    pub fn move_memory(
        &self,
        old_shape: &[usize],
        mapper: &[usize],
        invmapper: &[usize],
    ) -> Result<Storage> {
        Ok(Self::from_impl(
            self.borrow()?.move_memory(old_shape, mapper, invmapper)?,
        ))
    }

    /// In-place variant of [`move_memory`](Storage::move_memory).
    pub fn move_memory_(
        &mut self,
        old_shape: &[usize],
        mapper: &[usize],
        invmapper: &[usize],
    ) -> Result<()> {
        self.borrow_mut()?.move_memory_(old_shape, mapper, invmapper)
    }

    /// Gather the block selected by `locators` into a new contiguous
    /// storage.
    ///
    /// The buffer holds a physical layout whose axis `mapper[i]` is the
    /// logical axis `i` of extent `shape[i]`; an empty `mapper` is the
    /// identity. `locators[i]` lists the chosen indices on logical axis
    /// `i` (`len[i]` of them); an empty list selects the whole axis.
    pub fn get_elem_by_shape(
        &self,
        shape: &[usize],
        mapper: &[usize],
        len: &[usize],
        locators: &[Vec<usize>],
    ) -> Result<Storage> {
        Ok(Self::from_impl(
            self.borrow()?
                .get_elem_by_shape(shape, mapper, len, locators)?,
        ))
    }

    /// Scatter `src` into the block selected by `locators`. With
    /// `is_scalar`, `src[0]` is broadcast to every selected element.
    pub fn set_elem_by_shape(
        &mut self,
        src: &Storage,
        shape: &[usize],
        mapper: &[usize],
        len: &[usize],
        locators: &[Vec<usize>],
        is_scalar: bool,
    ) -> Result<()> {
        let src = self.prepare_source(src)?;
        let src = src.borrow()?;
        self.borrow_mut()?
            .set_elem_by_shape(&**src, shape, mapper, len, locators, is_scalar)
    }

    /// Run-batched gather: `shape` covers the leading axes, each selected
    /// position copies `nunit` contiguous elements.
    pub fn get_elem_by_shape_v2(
        &self,
        shape: &[usize],
        locators: &[Vec<usize>],
        nunit: usize,
    ) -> Result<Storage> {
        Ok(Self::from_impl(
            self.borrow()?.get_elem_by_shape_v2(shape, locators, nunit)?,
        ))
    }

    /// Run-batched scatter; see [`get_elem_by_shape_v2`](Storage::get_elem_by_shape_v2).
    pub fn set_elem_by_shape_v2(
        &mut self,
        src: &Storage,
        shape: &[usize],
        locators: &[Vec<usize>],
        nunit: usize,
        is_scalar: bool,
    ) -> Result<()> {
        let src = self.prepare_source(src)?;
        let src = src.borrow()?;
        self.borrow_mut()?
            .set_elem_by_shape_v2(&**src, shape, locators, nunit, is_scalar)
    }

    // The source is converted to our dtype, and detached if it aliases us.
    fn prepare_source(&self, src: &Storage) -> Result<Storage> {
        let dtype = self.dtype()?;
        if src.dtype()? != dtype {
            src.astype(dtype)
        } else if self.is_same(src) {
            src.clone()
        } else {
            Ok(src.share())
        }
    }

    /// Render the elements as a nested array of logical `shape`, reading
    /// through `mapper` as in [`get_elem_by_shape`](Storage::get_elem_by_shape).
    pub fn format_elems_by_shape(&self, shape: &[usize], mapper: &[usize]) -> Result<String> {
        self.borrow()?.format_elems_by_shape(shape, mapper)
    }

    fn info(&self) -> String {
        match self.borrow() {
            Ok(imp) => format!(
                "dtype   : {}\ndevice  : {}\nsize    : {}\ncapacity: {}",
                imp.dtype(),
                imp.device().name(),
                imp.len(),
                imp.capacity()
            ),
            Err(err) => format!("{err}"),
        }
    }

    /// Print dtype, device, size and capacity to stdout.
    pub fn print_info(&self) {
        println!("{}", self.info());
    }

    /// Print the info block and the elements to stdout.
    pub fn print(&self) {
        println!("{self}");
    }
}

impl fmt::Display for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.info())?;
        if let Ok(len) = self.size() {
            match self.format_elems_by_shape(&[len], &[]) {
                Ok(elems) => write!(f, "{elems}")?,
                Err(err) => write!(f, "<{err}>")?,
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            None => f.write_str("Storage(uninitialized)"),
            Some(shared) => match shared.try_borrow() {
                Ok(imp) => f
                    .debug_struct("Storage")
                    .field("dtype", &imp.dtype())
                    .field("device", &imp.device())
                    .field("size", &imp.len())
                    .field("capacity", &imp.capacity())
                    .field("ref_count", &Rc::strong_count(shared))
                    .finish(),
                Err(_) => f.write_str("Storage(<borrowed>)"),
            },
        }
    }
}

impl PartialEq for Storage {
    /// Content equality: dtype, device, size and every element.
    fn eq(&self, other: &Self) -> bool {
        match (&self.inner, &other.inner) {
            (None, None) => true,
            (Some(a), Some(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                let (Ok(a), Ok(b)) = (a.try_borrow(), b.try_borrow()) else {
                    warn!("comparing a storage that is mutably borrowed");
                    return false;
                };
                a.content_eq(&**b).unwrap_or_else(|err| {
                    warn!(%err, "storage comparison failed");
                    false
                })
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_complex::Complex64;

    #[test]
    fn test_uninitialized_forwarding() {
        let mut s = Storage::new();
        assert!(!s.is_initialized());
        assert_eq!(s.ref_count(), 0);
        assert!(matches!(s.size(), Err(StorageError::UninitializedStorage)));
        assert!(matches!(s.append(1.0), Err(StorageError::UninitializedStorage)));
        assert!(matches!(s.clone(), Err(StorageError::UninitializedStorage)));
        assert_eq!(format!("{s:?}"), "Storage(uninitialized)");
    }

    #[test]
    fn test_share_and_ref_count() {
        let mut a = Storage::zeros(2, DType::Int32, Device::CPU).unwrap();
        let b = a.share();
        assert_eq!(a.ref_count(), 2);
        a.set_item(0, 5i32).unwrap();
        assert_eq!(b.at::<i32>(0).unwrap(), 5);
        drop(b);
        assert_eq!(a.ref_count(), 1);
    }

    #[test]
    fn test_init_replaces_only_this_handle() {
        let mut a = Storage::zeros(2, DType::Int16, Device::CPU).unwrap();
        let b = a.share();
        a.init(4, DType::Float, Device::CPU, true).unwrap();
        assert!(!a.is_same(&b));
        assert_eq!(b.dtype().unwrap(), DType::Int16);
        assert_eq!(a.size().unwrap(), 4);
    }

    #[test]
    fn test_typed_access_mismatch() {
        let s = Storage::from_vec(vec![1.0f32, 2.0]).unwrap();
        assert!(matches!(
            s.at::<f64>(0),
            Err(StorageError::DTypeMismatch { .. })
        ));
        assert!(matches!(
            s.data::<i32>(),
            Err(StorageError::DTypeMismatch { .. })
        ));
        assert_eq!(&*s.data::<f32>().unwrap(), &[1.0, 2.0]);
    }

    #[test]
    fn test_set_elem_with_aliasing_source() {
        let mut s = Storage::from_vec(vec![1i64, 2, 3, 4]).unwrap();
        let alias = s.share();
        let locators = vec![vec![]];
        s.set_elem_by_shape(&alias, &[4], &[], &[4], &locators, false)
            .unwrap();
        assert_eq!(s.vector::<i64>().unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_set_elem_casts_source() {
        let mut s = Storage::zeros(3, DType::Double, Device::CPU).unwrap();
        let src = Storage::from_vec(vec![7i32]).unwrap();
        let locators = vec![vec![1]];
        s.set_elem_by_shape(&src, &[3], &[], &[1], &locators, false)
            .unwrap();
        assert_eq!(s.vector::<f64>().unwrap(), vec![0.0, 7.0, 0.0]);

        let complex = Storage::from_vec(vec![Complex64::new(1.0, 1.0)]).unwrap();
        assert!(matches!(
            s.set_elem_by_shape(&complex, &[3], &[], &[1], &locators, true),
            Err(StorageError::UnsupportedCast { .. })
        ));
    }

    #[test]
    fn test_display() {
        let s = Storage::from_vec(vec![1i32, 2, 3]).unwrap();
        let text = s.to_string();
        assert!(text.starts_with("dtype   : int32\n"));
        assert!(text.ends_with("[1 2 3]"));
    }
}
