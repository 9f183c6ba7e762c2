use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;
use tessera_core::ProductType;
use uuid::Uuid;

/// Axis set and SKU template for a configurable product.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VariantConfig {
    /// Ordered: axis order drives SKU value order and matrix order.
    pub axis_ids: Vec<Uuid>,
    pub sku_pattern: Option<String>,
}

/// A concrete purchasable combination under a configurable parent.
/// `id` is also the variant's registry row id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variant {
    pub id: Uuid,
    pub parent_id: Uuid,
    pub sku: String,
    /// One value per configured axis, keyed by axis id.
    pub axis_values: BTreeMap<Uuid, String>,
    pub created_at: DateTime<Utc>,
}

/// One weighted edge of a bundle: `quantity` units of `component_id`
/// per bundle sold.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BundleComponent {
    pub component_id: Uuid,
    pub quantity: i32,
    pub position: i32,
    pub special_price_cents: Option<i64>,
}

/// A suggested child of a grouped product, sold independently.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupedItem {
    pub child_id: Uuid,
    pub default_quantity: i32,
    pub min_quantity: i32,
    pub max_quantity: Option<i32>,
    pub position: i32,
}

/// Type-specific composition structure of a product. Each case carries
/// only the fields its type needs; switching type swaps the whole case.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Composition {
    Simple,
    Virtual,
    Configurable {
        config: Option<VariantConfig>,
        variants: Vec<Variant>,
    },
    Bundle {
        components: Vec<BundleComponent>,
    },
    Grouped {
        items: Vec<GroupedItem>,
    },
}

impl Composition {
    /// The unpopulated structure a product gets right after converting
    /// to `product_type`.
    pub fn empty_for(product_type: ProductType) -> Self {
        match product_type {
            ProductType::Simple => Composition::Simple,
            ProductType::Virtual => Composition::Virtual,
            ProductType::Configurable => Composition::Configurable {
                config: None,
                variants: Vec::new(),
            },
            ProductType::Bundle => Composition::Bundle {
                components: Vec::new(),
            },
            ProductType::Grouped => Composition::Grouped { items: Vec::new() },
        }
    }

    pub fn product_type(&self) -> ProductType {
        match self {
            Composition::Simple => ProductType::Simple,
            Composition::Virtual => ProductType::Virtual,
            Composition::Configurable { .. } => ProductType::Configurable,
            Composition::Bundle { .. } => ProductType::Bundle,
            Composition::Grouped { .. } => ProductType::Grouped,
        }
    }
}

/// Which products reference a given product.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductUsage {
    /// Bundles listing the product as a component.
    pub bundles: Vec<Uuid>,
    /// Grouped parents listing the product as a child.
    pub grouped_parents: Vec<Uuid>,
}

impl ProductUsage {
    pub fn is_referenced(&self) -> bool {
        !self.bundles.is_empty() || !self.grouped_parents.is_empty()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("No composition registered for product {0}")]
    NotFound(Uuid),

    #[error("Composition store access failed: {0}")]
    Access(String),
}

/// Holds the composition structure of every product the engine knows.
/// All edits go through one write lock, which is what serializes
/// concurrent edits to the same bundle during its own cycle check.
pub struct CompositionStore {
    inner: RwLock<HashMap<Uuid, Composition>>,
}

impl CompositionStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Ensure a composition entry exists for the product, leaving an
    /// existing entry untouched.
    pub fn register(&self, product_id: Uuid, product_type: ProductType) -> Result<(), StoreError> {
        let mut inner = self
            .inner
            .write()
            .map_err(|e| StoreError::Access(e.to_string()))?;
        inner
            .entry(product_id)
            .or_insert_with(|| Composition::empty_for(product_type));
        Ok(())
    }

    pub fn get(&self, product_id: Uuid) -> Result<Option<Composition>, StoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|e| StoreError::Access(e.to_string()))?;
        Ok(inner.get(&product_id).cloned())
    }

    /// Swap in a new composition, returning the previous one if any.
    pub fn replace(
        &self,
        product_id: Uuid,
        composition: Composition,
    ) -> Result<Option<Composition>, StoreError> {
        let mut inner = self
            .inner
            .write()
            .map_err(|e| StoreError::Access(e.to_string()))?;
        Ok(inner.insert(product_id, composition))
    }

    /// Read-only view over all compositions.
    pub fn read<T>(
        &self,
        f: impl FnOnce(&HashMap<Uuid, Composition>) -> T,
    ) -> Result<T, StoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|e| StoreError::Access(e.to_string()))?;
        Ok(f(&inner))
    }

    /// Run an edit under the store's write lock. The closure sees the
    /// whole map so bundle edits can run their cycle check against the
    /// same snapshot they mutate.
    pub fn modify<T, E>(
        &self,
        f: impl FnOnce(&mut HashMap<Uuid, Composition>) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        let mut inner = self
            .inner
            .write()
            .map_err(|e| E::from(StoreError::Access(e.to_string())))?;
        f(&mut inner)
    }

    /// Scan for products that reference `product_id` as a bundle
    /// component or grouped child.
    pub fn usage(&self, product_id: Uuid) -> Result<ProductUsage, StoreError> {
        self.read(|all| {
            let mut usage = ProductUsage::default();
            for (owner, composition) in all {
                match composition {
                    Composition::Bundle { components } => {
                        if components.iter().any(|c| c.component_id == product_id) {
                            usage.bundles.push(*owner);
                        }
                    }
                    Composition::Grouped { items } => {
                        if items.iter().any(|i| i.child_id == product_id) {
                            usage.grouped_parents.push(*owner);
                        }
                    }
                    _ => {}
                }
            }
            usage.bundles.sort();
            usage.grouped_parents.sort();
            usage
        })
    }
}

impl Default for CompositionStore {
    fn default() -> Self {
        Self::new()
    }
}
