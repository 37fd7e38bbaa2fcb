//! Dtype id → empty-variant factory table.

use std::sync::OnceLock;

use num_complex::{Complex32, Complex64};
use tracing::debug;

use crate::dtype::{DType, Element};
use crate::error::{Result, StorageError};
use crate::storage::base::StorageImpl;
use crate::storage::typed::TypedStorage;

/// Constructor for an empty, uninitialized variant.
pub(crate) type StorageFactory = fn() -> Box<dyn StorageImpl>;

type FactoryTable = [Option<StorageFactory>; DType::COUNT + 1];

static REGISTRY: OnceLock<FactoryTable> = OnceLock::new();

macro_rules! register {
    ($table:ident: $($t:ty),* $(,)?) => {$(
        $table[<$t as Element>::DTYPE.id() as usize] =
            Some(TypedStorage::<$t>::boxed_empty as StorageFactory);
    )*};
}

fn table() -> &'static FactoryTable {
    REGISTRY.get_or_init(|| {
        let mut table: FactoryTable = [None; DType::COUNT + 1];
        register!(table: Complex64, Complex32, f64, f32, u64, i64, u32, i32, u16, i16, bool);
        debug!(kinds = DType::COUNT, "initialized storage registry");
        table
    })
}

/// Build the factory table now instead of on first use.
///
/// Safe to call any number of times from any thread.
pub fn initialize() {
    table();
}

/// Whether the factory table has been built.
pub fn is_initialized() -> bool {
    REGISTRY.get().is_some()
}

/// Fresh empty variant for `dtype`.
pub(crate) fn create(dtype: DType) -> Result<Box<dyn StorageImpl>> {
    create_by_id(dtype.id())
}

/// Fresh empty variant for a raw dtype id.
///
/// # Errors
///
/// `InvalidArgument` if no factory is registered for `id` (including the
/// reserved id 0).
pub(crate) fn create_by_id(id: u32) -> Result<Box<dyn StorageImpl>> {
    table()
        .get(id as usize)
        .copied()
        .flatten()
        .map(|factory| factory())
        .ok_or_else(|| StorageError::invalid_argument(format!("unrecognized dtype id {id}")))
}
