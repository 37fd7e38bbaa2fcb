//! Shape-level operations on flat buffers.
//!
//! ```text
//! get_elem_by_shape(shape, mapper, len, locators)   # storage layer
//!     → Selection::new (validate, per-axis strides through mapper)
//!     → Selection::gather / Selection::scatter
//! ```

mod indexing;

pub use indexing::{Offsets, Selection};
