pub mod axis;
pub mod composition;
pub mod transition;

pub use axis::{AxisCatalog, AxisError, VariantAxis};
pub use composition::{
    BundleComponent, Composition, CompositionStore, GroupedItem, ProductUsage, StoreError, Variant,
    VariantConfig,
};
pub use transition::{ProductTypeInfo, TransitionError, TypeTransitionGuard};
