//! Memory permutation backends.
//!
//! A permutation reorders a flat row-major buffer so that axis `i` of the
//! result is axis `mapper[i]` of the input. This is the memory-level
//! primitive beneath transpose-like layout changes.
//!
//! # Backends
//!
//! - `GenericBackend`: odometer loop over the source (always available)

mod generic;
mod permutation;

pub use generic::GenericBackend;
pub use permutation::{PermutationBackend, check_permutation, permuted_shape};
