//! Generic (loop-based) backend implementation.

use smallvec::SmallVec;

use crate::backend::PermutationBackend;
use crate::strides::{AxisVec, compute_strides};

/// Generic backend: walks the source once in row-major order and scatters
/// each element to its permuted offset.
pub struct GenericBackend;

impl PermutationBackend for GenericBackend {
    fn permute_into<T: Copy>(dest: &mut [T], src: &[T], old_shape: &[usize], invmapper: &[usize]) {
        let rank = old_shape.len();

        // new_shape[invmapper[k]] = old_shape[k]
        let mut new_shape: AxisVec = SmallVec::from_elem(0, rank);
        for (k, &dim) in old_shape.iter().enumerate() {
            new_shape[invmapper[k]] = dim;
        }
        let new_strides = compute_strides(&new_shape);

        // Output stride contributed by one step along input axis k.
        let scatter: AxisVec = (0..rank).map(|k| new_strides[invmapper[k]]).collect();

        let mut index: AxisVec = SmallVec::from_elem(0, rank);
        let mut offset = 0;
        for &value in src {
            dest[offset] = value;

            // Odometer increment, last axis fastest.
            for k in (0..rank).rev() {
                index[k] += 1;
                offset += scatter[k];
                if index[k] < old_shape[k] {
                    break;
                }
                offset -= index[k] * scatter[k];
                index[k] = 0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strides::{cartesian_to_linear, linear_to_cartesian};

    fn inverse(mapper: &[usize]) -> Vec<usize> {
        let mut inv = vec![0; mapper.len()];
        for (i, &m) in mapper.iter().enumerate() {
            inv[m] = i;
        }
        inv
    }

    #[test]
    fn test_generic_permute_transpose() {
        let src: Vec<i32> = (0..6).collect();
        let mut dest = vec![0; 6];

        GenericBackend::permute_into(&mut dest, &src, &[2, 3], &[1, 0]);

        assert_eq!(dest, vec![0, 3, 1, 4, 2, 5]);
    }

    #[test]
    fn test_generic_permute_3d() {
        let old_shape = [2, 3, 4];
        let mapper = [2, 0, 1];
        let src: Vec<usize> = (0..24).collect();
        let mut dest = vec![0; 24];

        GenericBackend::permute_into(&mut dest, &src, &old_shape, &inverse(&mapper));

        // dest[k, i, j] == src[i, j, k]
        let new_shape = [4, 2, 3];
        let new_strides = compute_strides(&new_shape);
        for (linear, &value) in src.iter().enumerate() {
            let old = linear_to_cartesian(linear, &old_shape);
            let new: Vec<usize> = mapper.iter().map(|&m| old[m]).collect();
            assert_eq!(dest[cartesian_to_linear(&new, &new_strides)], value);
        }
    }

    #[test]
    fn test_generic_permute_identity() {
        let src = [1.0, 2.0, 3.0, 4.0];
        let mut dest = [0.0; 4];
        GenericBackend::permute_into(&mut dest, &src, &[2, 2], &[0, 1]);
        assert_eq!(dest, src);
    }

    #[test]
    fn test_generic_permute_rank0() {
        let src = [7u8];
        let mut dest = [0u8];
        GenericBackend::permute_into(&mut dest, &src, &[], &[]);
        assert_eq!(dest, [7]);
    }

    #[test]
    fn test_generic_permute_zero_extent() {
        let src: [f64; 0] = [];
        let mut dest: [f64; 0] = [];
        GenericBackend::permute_into(&mut dest, &src, &[0, 3], &[1, 0]);
    }
}
