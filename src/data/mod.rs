//! Column store: typed column-major storage plus dataset assembly.
//!
//! - [`Column`] / [`ColumnValues`]: per-column encoded values with
//!   missing-value sentinels.
//! - [`Dictionary`]: frozen categorical vocabularies with an OOV sentinel.
//! - [`Dataset`] / [`DatasetBuilder`]: validated, immutable collections of
//!   columns with role assignment.

mod column;
mod dataset;
mod dictionary;

pub use column::{Column, ColumnSemantic, ColumnValues, MISSING_BOOLEAN, MISSING_CATEGORICAL};
pub use dataset::{Dataset, DatasetBuilder, SchemaError};
pub use dictionary::{Dictionary, OOV_CODE, OOV_TOKEN, UNLIMITED_VOCAB};
