pub mod attribute;
pub mod config;
pub mod registry;

pub use attribute::{AttributeSource, StaticAttributeSource};
pub use config::EngineRules;
pub use registry::{
    AppliedDelta, InMemoryRegistry, ProductRecord, ProductRegistry, ProductType, RegistryError,
    StockDelta,
};
