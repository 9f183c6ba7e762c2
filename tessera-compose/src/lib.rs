pub mod composer;
pub mod matrix;
pub mod sku;

pub use composer::{
    BulkCreateReport, BulkFailure, ComposeError, MatrixEntry, VariantComposer,
};
pub use matrix::{combination_count, combinations, AxisValues};
