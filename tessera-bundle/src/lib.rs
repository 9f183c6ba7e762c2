pub mod graph;
pub mod grouped;
pub mod stock;


pub use graph::{BundleError, BundleGraph};
pub use grouped::{GroupedError, GroupedSet};
pub use stock::{DecrementOutcome, DecrementedProduct, StockOperations, StockValidation};
