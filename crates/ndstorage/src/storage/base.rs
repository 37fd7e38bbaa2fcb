//! Type-erased capability set shared by every buffer variant.

use std::any::Any;
use std::fmt::Debug;
use std::io::{Read, Write};

use crate::device::Device;
use crate::dtype::DType;
use crate::error::Result;
use crate::scalar::Scalar;

/// Object-safe interface over `TypedStorage<T>` for all element types.
///
/// The `Storage` handle holds a `Box<dyn StorageImpl>` and forwards every
/// call here; no type parameter ever reaches the caller. Methods that
/// produce a new buffer return a fresh boxed variant.
pub(crate) trait StorageImpl: Debug {
    fn dtype(&self) -> DType;

    fn device(&self) -> Device;

    /// Logical number of elements.
    fn len(&self) -> usize;

    /// Allocated number of elements.
    fn capacity(&self) -> usize;

    fn as_any(&self) -> &dyn Any;

    /// (Re)initialize to `len` elements on `device`, dropping old content.
    fn init(&mut self, len: usize, device: Device, zero_fill: bool) -> Result<()>;

    /// Deep copy on the same device.
    fn clone_boxed(&self) -> Result<Box<dyn StorageImpl>>;

    /// Copy onto `device`.
    fn to_device(&self, device: Device) -> Result<Box<dyn StorageImpl>>;

    /// Move onto `device` in place.
    fn to_device_(&mut self, device: Device) -> Result<()>;

    fn resize(&mut self, len: usize) -> Result<()>;

    fn set_zeros(&mut self) -> Result<()>;

    fn fill(&mut self, value: Scalar) -> Result<()>;

    fn append(&mut self, value: Scalar) -> Result<()>;

    fn set_item(&mut self, idx: usize, value: Scalar) -> Result<()>;

    fn get_item(&self, idx: usize) -> Result<Scalar>;

    /// Overwrite every element from `values` (one per element, converted).
    fn assign_scalars(&mut self, values: &[Scalar]) -> Result<()>;

    /// Convert into a new variant of `dtype` on the same device.
    fn astype(&self, dtype: DType) -> Result<Box<dyn StorageImpl>>;

    fn real(&self) -> Result<Box<dyn StorageImpl>>;

    fn imag(&self) -> Result<Box<dyn StorageImpl>>;

    fn move_memory(
        &self,
        old_shape: &[usize],
        mapper: &[usize],
        invmapper: &[usize],
    ) -> Result<Box<dyn StorageImpl>>;

    fn move_memory_(&mut self, old_shape: &[usize], mapper: &[usize], invmapper: &[usize])
    -> Result<()>;

    fn get_elem_by_shape(
        &self,
        shape: &[usize],
        mapper: &[usize],
        len: &[usize],
        locators: &[Vec<usize>],
    ) -> Result<Box<dyn StorageImpl>>;

    /// `src` must have the same dtype as `self`.
    fn set_elem_by_shape(
        &mut self,
        src: &dyn StorageImpl,
        shape: &[usize],
        mapper: &[usize],
        len: &[usize],
        locators: &[Vec<usize>],
        is_scalar: bool,
    ) -> Result<()>;

    fn get_elem_by_shape_v2(
        &self,
        shape: &[usize],
        locators: &[Vec<usize>],
        nunit: usize,
    ) -> Result<Box<dyn StorageImpl>>;

    /// `src` must have the same dtype as `self`.
    fn set_elem_by_shape_v2(
        &mut self,
        src: &dyn StorageImpl,
        shape: &[usize],
        locators: &[Vec<usize>],
        nunit: usize,
        is_scalar: bool,
    ) -> Result<()>;

    /// Render elements as a nested array of the given logical shape.
    fn format_elems_by_shape(&self, shape: &[usize], mapper: &[usize]) -> Result<String>;

    /// Equality of dtype, device, length and every element.
    fn content_eq(&self, other: &dyn StorageImpl) -> Result<bool>;

    /// Write the raw bytes of `[0, len)`.
    fn write_payload(&self, w: &mut dyn Write) -> Result<()>;

    /// Reinitialize on the host with `len` elements read from `r`.
    fn read_payload(&mut self, r: &mut dyn Read, len: usize) -> Result<()>;
}
