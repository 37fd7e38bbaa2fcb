//! Shape-driven gather/scatter over flat buffers.
//!
//! A [`Selection`] describes a (possibly non-contiguous) multi-dimensional
//! sub-block of a flat buffer: one list of chosen indices per logical axis.
//! Enumerating the Cartesian product of those lists in row-major order
//! yields the flat offsets of the selected elements.
//!
//! ```text
//! v1: Selection::new(shape, mapper, len, locators, n)   one element per offset
//! v2: Selection::contiguous(shape, locators, nunit, n)  one run of `nunit` per offset
//! ```

use smallvec::SmallVec;

use crate::error::{Result, StorageError};
use crate::strides::{compute_strides, is_permutation, shape_len};

/// One logical axis of a selection.
#[derive(Debug, Clone)]
struct Axis<'a> {
    /// Flat-offset step for one index along this axis.
    stride: usize,
    /// Number of selected indices.
    extent: usize,
    /// Selected indices; empty means `0..extent`.
    locator: &'a [usize],
}

impl Axis<'_> {
    #[inline]
    fn index_at(&self, i: usize) -> usize {
        if self.locator.is_empty() {
            i
        } else {
            self.locator[i]
        }
    }
}

/// Validated selection over a flat buffer.
#[derive(Debug, Clone)]
pub struct Selection<'a> {
    axes: SmallVec<[Axis<'a>; 8]>,
    total: usize,
    unit: usize,
}

impl<'a> Selection<'a> {
    /// Build a selection over a buffer of `data_len` elements that stores a
    /// permuted layout.
    ///
    /// # Arguments
    ///
    /// * `shape` - Logical shape
    /// * `mapper` - `mapper[i]` is the physical axis holding logical axis `i`;
    ///   empty means identity
    /// * `len` - Number of selected indices per logical axis
    /// * `locators` - Selected indices per logical axis; an empty list selects
    ///   the whole axis
    /// * `data_len` - Length of the underlying buffer
    ///
    /// # Errors
    ///
    /// `InvalidArgument` on rank/length mismatches or a bad mapper,
    /// `OutOfRange` if a locator exceeds its axis extent.
    pub fn new(
        shape: &[usize],
        mapper: &[usize],
        len: &[usize],
        locators: &'a [Vec<usize>],
        data_len: usize,
    ) -> Result<Self> {
        let rank = shape.len();
        let identity: SmallVec<[usize; 8]>;
        let mapper = if mapper.is_empty() && rank > 0 {
            identity = (0..rank).collect();
            identity.as_slice()
        } else {
            mapper
        };
        if mapper.len() != rank || len.len() != rank || locators.len() != rank {
            return Err(StorageError::invalid_argument(format!(
                "rank mismatch: shape has {rank} axes, mapper {}, len {}, locators {}",
                mapper.len(),
                len.len(),
                locators.len()
            )));
        }
        if !is_permutation(mapper) {
            return Err(StorageError::invalid_argument(format!(
                "invalid mapper {mapper:?} for rank {rank}"
            )));
        }
        check_data_len(shape, 1, data_len)?;

        // Physical layout: physical axis mapper[i] has extent shape[i].
        let mut physical: SmallVec<[usize; 8]> = SmallVec::from_elem(0, rank);
        for (i, &m) in mapper.iter().enumerate() {
            physical[m] = shape[i];
        }
        let physical_strides = compute_strides(&physical);

        let axes = (0..rank)
            .map(|i| {
                let stride = physical_strides[mapper[i]];
                make_axis(i, shape[i], stride, len[i], &locators[i])
            })
            .collect::<Result<SmallVec<[Axis<'a>; 8]>>>()?;

        Self::from_axes(axes, 1)
    }

    /// Build a selection over a contiguous buffer of `data_len` elements
    /// whose trailing axes are folded into runs of `nunit` elements.
    ///
    /// `shape` covers only the leading axes; each selected offset addresses
    /// a whole run.
    pub fn contiguous(
        shape: &[usize],
        locators: &'a [Vec<usize>],
        nunit: usize,
        data_len: usize,
    ) -> Result<Self> {
        let rank = shape.len();
        if locators.len() != rank {
            return Err(StorageError::invalid_argument(format!(
                "rank mismatch: shape has {rank} axes, locators {}",
                locators.len()
            )));
        }
        if nunit == 0 {
            return Err(StorageError::invalid_argument("Nunit must be positive"));
        }
        check_data_len(shape, nunit, data_len)?;

        let strides = compute_strides(shape);
        let axes = (0..rank)
            .map(|i| {
                let extent = if locators[i].is_empty() {
                    shape[i]
                } else {
                    locators[i].len()
                };
                make_axis(i, shape[i], strides[i], extent, &locators[i])
            })
            .collect::<Result<SmallVec<[Axis<'a>; 8]>>>()?;

        Self::from_axes(axes, nunit)
    }

    fn from_axes(axes: SmallVec<[Axis<'a>; 8]>, unit: usize) -> Result<Self> {
        // Locators may repeat indices, so the selection can outgrow the buffer.
        let total = axes
            .iter()
            .try_fold(1usize, |acc, a| acc.checked_mul(a.extent))
            .filter(|n| n.checked_mul(unit).is_some())
            .ok_or_else(|| StorageError::invalid_argument("selection size overflows usize"))?;
        Ok(Self { axes, total, unit })
    }

    /// Number of selected offsets (runs for a contiguous selection).
    #[inline]
    pub fn count(&self) -> usize {
        self.total
    }

    /// Number of selected elements.
    #[inline]
    pub fn num_elements(&self) -> usize {
        self.total * self.unit
    }

    /// Flat offsets, in units of one run of elements, in row-major order of
    /// the selection.
    pub fn offsets(&self) -> Offsets<'_, 'a> {
        Offsets {
            axes: &self.axes,
            counter: SmallVec::from_elem(0, self.axes.len()),
            remaining: self.total,
        }
    }

    /// Check a scatter source of `source_len` elements.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if a broadcast source is empty while elements are
    /// selected, or a non-broadcast source does not match the selection.
    pub fn check_source(&self, source_len: usize, is_scalar: bool) -> Result<()> {
        let wanted = self.num_elements();
        if is_scalar {
            if source_len == 0 && wanted > 0 {
                return Err(StorageError::invalid_argument(
                    "scalar broadcast requires a non-empty source",
                ));
            }
        } else if source_len != wanted {
            return Err(StorageError::invalid_argument(format!(
                "source has {source_len} elements, selection addresses {wanted}"
            )));
        }
        Ok(())
    }

    /// Copy the selected elements of `src` into a new contiguous vector.
    pub fn gather<T: Copy>(&self, src: &[T]) -> Vec<T> {
        let unit = self.unit;
        let mut out = Vec::with_capacity(self.num_elements());
        if unit == 1 {
            out.extend(self.offsets().map(|off| src[off]));
        } else {
            for off in self.offsets() {
                let start = off * unit;
                out.extend_from_slice(&src[start..start + unit]);
            }
        }
        out
    }

    /// Write `values` into the selected elements of `dst`, consuming one
    /// element per selected position, or broadcasting `values[0]` when
    /// `is_scalar` is set. The source must have passed `check_source`.
    pub fn scatter<T: Copy>(&self, dst: &mut [T], values: &[T], is_scalar: bool) {
        let unit = self.unit;
        if is_scalar {
            let Some(&value) = values.first() else {
                return;
            };
            for off in self.offsets() {
                let start = off * unit;
                dst[start..start + unit].fill(value);
            }
        } else {
            for (n, off) in self.offsets().enumerate() {
                let start = off * unit;
                dst[start..start + unit].copy_from_slice(&values[n * unit..(n + 1) * unit]);
            }
        }
    }
}

fn make_axis<'a>(
    axis: usize,
    dim: usize,
    stride: usize,
    len: usize,
    locator: &'a [usize],
) -> Result<Axis<'a>> {
    if locator.is_empty() {
        if len != dim {
            return Err(StorageError::invalid_argument(format!(
                "axis {axis}: full selection of extent {dim} declared with len {len}"
            )));
        }
    } else {
        if len != locator.len() {
            return Err(StorageError::invalid_argument(format!(
                "axis {axis}: locator has {} entries, len says {len}",
                locator.len()
            )));
        }
        if let Some(&bad) = locator.iter().find(|&&idx| idx >= dim) {
            return Err(StorageError::OutOfRange {
                index: bad,
                len: dim,
            });
        }
    }
    Ok(Axis {
        stride,
        extent: len,
        locator,
    })
}

fn check_data_len(shape: &[usize], unit: usize, data_len: usize) -> Result<()> {
    let expected = shape_len(shape)
        .and_then(|n| n.checked_mul(unit))
        .ok_or_else(|| {
            StorageError::invalid_argument(format!(
                "shape {shape:?} x {unit} describes more elements than fit in memory"
            ))
        })?;
    if expected != data_len {
        return Err(StorageError::invalid_argument(format!(
            "shape {shape:?} x {unit} describes {expected} elements, storage holds {data_len}"
        )));
    }
    Ok(())
}

/// Iterator over the flat offsets of a [`Selection`].
pub struct Offsets<'s, 'a> {
    axes: &'s [Axis<'a>],
    counter: SmallVec<[usize; 8]>,
    remaining: usize,
}

impl Iterator for Offsets<'_, '_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let offset = self
            .axes
            .iter()
            .zip(self.counter.iter())
            .map(|(axis, &c)| axis.index_at(c) * axis.stride)
            .sum();

        for (axis, c) in self.axes.iter().zip(self.counter.iter_mut()).rev() {
            *c += 1;
            if *c < axis.extent {
                break;
            }
            *c = 0;
        }

        Some(offset)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for Offsets<'_, '_> {}
