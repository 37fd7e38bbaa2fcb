//! Stride computation utilities.
//!
//! Storage is laid out in row-major (C) order: the last axis is contiguous.

use smallvec::SmallVec;

/// Per-axis scratch vectors; ranks above 8 spill to the heap.
pub type AxisVec = SmallVec<[usize; 8]>;

/// Compute row-major strides from shape.
///
/// For shape [d0, d1, d2], returns strides [d1*d2, d2, 1].
///
/// # Examples
///
/// ```
/// use ndstorage::strides::compute_strides;
///
/// assert_eq!(compute_strides(&[3, 4, 5]).as_slice(), &[20, 5, 1]);
/// assert_eq!(compute_strides(&[2, 3]).as_slice(), &[3, 1]);
/// assert_eq!(compute_strides(&[5]).as_slice(), &[1]);
/// assert!(compute_strides(&[]).is_empty());
/// ```
pub fn compute_strides(shape: &[usize]) -> AxisVec {
    let mut strides: AxisVec = SmallVec::from_elem(0, shape.len());
    let mut stride = 1;

    for (s, &dim) in strides.iter_mut().zip(shape.iter()).rev() {
        *s = stride;
        // Saturates only for zero-extent shapes, which address no element.
        stride = stride.saturating_mul(dim);
    }

    strides
}

/// Number of elements addressed by `shape` (1 for a rank-0 shape), or
/// `None` if the count overflows `usize`.
///
/// ```
/// use ndstorage::strides::shape_len;
///
/// assert_eq!(shape_len(&[2, 3, 4]), Some(24));
/// assert_eq!(shape_len(&[]), Some(1));
/// assert_eq!(shape_len(&[1 << 63, 2]), None);
/// ```
#[inline]
pub fn shape_len(shape: &[usize]) -> Option<usize> {
    shape.iter().try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
}

/// Convert cartesian indices to a linear offset.
#[inline]
pub fn cartesian_to_linear(indices: &[usize], strides: &[usize]) -> usize {
    indices
        .iter()
        .zip(strides.iter())
        .map(|(&idx, &stride)| idx * stride)
        .sum()
}

/// Convert a linear offset to cartesian indices using row-major order.
pub fn linear_to_cartesian(mut linear: usize, shape: &[usize]) -> AxisVec {
    let mut indices: AxisVec = SmallVec::from_elem(0, shape.len());

    for (idx, &dim) in indices.iter_mut().zip(shape.iter()).rev() {
        *idx = linear % dim;
        linear /= dim;
    }

    indices
}

/// Check that `perm` is a permutation of `0..perm.len()`.
pub fn is_permutation(perm: &[usize]) -> bool {
    let mut seen: SmallVec<[bool; 8]> = SmallVec::from_elem(false, perm.len());
    perm.iter().all(|&p| {
        if p >= seen.len() || seen[p] {
            return false;
        }
        seen[p] = true;
        true
    })
}
