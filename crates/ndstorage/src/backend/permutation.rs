//! Permutation backend trait and argument checks.

use crate::error::{Result, StorageError};
use crate::strides::{AxisVec, is_permutation, shape_len};

/// Backend trait for flat-buffer permutation.
///
/// Implementations can provide optimized permutation algorithms; the
/// storage layer only relies on this trait.
pub trait PermutationBackend {
    /// Write the permutation of `src` into `dest`.
    ///
    /// # Arguments
    ///
    /// * `dest` - Output buffer, same length as `src`
    /// * `src` - Input buffer in row-major order for `old_shape`
    /// * `old_shape` - Shape of the input
    /// * `invmapper` - Inverse permutation: input axis `k` becomes output
    ///   axis `invmapper[k]`
    ///
    /// Arguments are expected to have passed [`check_permutation`].
    fn permute_into<T: Copy>(dest: &mut [T], src: &[T], old_shape: &[usize], invmapper: &[usize]);
}

/// Validate a permutation request against a buffer of `len` elements.
///
/// # Errors
///
/// Returns `StorageError::InvalidArgument` if the ranks differ, if `mapper`
/// is not a permutation, if `invmapper` is not its inverse, or if
/// `old_shape` does not describe exactly `len` elements.
pub fn check_permutation(
    old_shape: &[usize],
    mapper: &[usize],
    invmapper: &[usize],
    len: usize,
) -> Result<()> {
    let rank = old_shape.len();
    if mapper.len() != rank || invmapper.len() != rank {
        return Err(StorageError::invalid_argument(format!(
            "permutation rank mismatch: shape {old_shape:?}, mapper {mapper:?}, invmapper {invmapper:?}"
        )));
    }
    if !is_permutation(mapper) {
        return Err(StorageError::invalid_argument(format!(
            "invalid permutation {mapper:?} for rank {rank}"
        )));
    }
    if mapper.iter().enumerate().any(|(i, &m)| invmapper[m] != i) {
        return Err(StorageError::invalid_argument(format!(
            "invmapper {invmapper:?} is not the inverse of mapper {mapper:?}"
        )));
    }
    let expected = shape_len(old_shape).ok_or_else(|| {
        StorageError::invalid_argument(format!(
            "shape {old_shape:?} describes more elements than fit in memory"
        ))
    })?;
    if expected != len {
        return Err(StorageError::invalid_argument(format!(
            "shape {old_shape:?} describes {expected} elements, storage holds {len}"
        )));
    }
    Ok(())
}

/// Shape after permutation: `new_shape[i] = old_shape[mapper[i]]`.
pub fn permuted_shape(old_shape: &[usize], mapper: &[usize]) -> AxisVec {
    mapper.iter().map(|&m| old_shape[m]).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_permutation_ok() {
        assert!(check_permutation(&[2, 3, 4], &[2, 0, 1], &[1, 2, 0], 24).is_ok());
        assert!(check_permutation(&[], &[], &[], 1).is_ok());
    }

    #[test]
    fn test_check_permutation_rejects() {
        // not a permutation
        assert!(check_permutation(&[2, 3], &[0, 0], &[0, 1], 6).is_err());
        // inverse mismatch
        assert!(check_permutation(&[2, 3, 4], &[2, 0, 1], &[2, 0, 1], 24).is_err());
        // rank mismatch
        assert!(check_permutation(&[2, 3], &[1, 0], &[1], 6).is_err());
        // element count mismatch
        assert!(check_permutation(&[2, 3], &[1, 0], &[1, 0], 5).is_err());
    }

    #[test]
    fn test_check_permutation_overflowing_shape() {
        // [2^63, 2] wraps to 0 under unchecked multiplication.
        let err = check_permutation(&[1 << 63, 2], &[1, 0], &[1, 0], 0).unwrap_err();
        assert!(matches!(err, StorageError::InvalidArgument { .. }));
    }

    #[test]
    fn test_permuted_shape() {
        assert_eq!(permuted_shape(&[2, 3, 4], &[2, 0, 1]).as_slice(), &[4, 2, 3]);
    }
}
