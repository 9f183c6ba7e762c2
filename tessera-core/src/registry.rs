use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::info;
use uuid::Uuid;

/// Product types in the catalog
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProductType {
    Simple,
    Configurable,
    Bundle,
    Grouped,
    Virtual,
}

impl ProductType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductType::Simple => "SIMPLE",
            ProductType::Configurable => "CONFIGURABLE",
            ProductType::Bundle => "BUNDLE",
            ProductType::Grouped => "GROUPED",
            ProductType::Virtual => "VIRTUAL",
        }
    }

    /// Whether this type tracks sellable stock on its own row.
    /// Bundles derive stock from components; configurable and grouped
    /// parents are sold through their children.
    pub fn has_own_stock(&self) -> bool {
        matches!(self, ProductType::Simple | ProductType::Virtual)
    }
}

/// A product row as the registry sees it. Prices are integer cents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductRecord {
    pub id: Uuid,
    pub sku: String,
    pub name: String,
    pub product_type: ProductType,
    pub price_cents: Option<i64>,
    pub stock_quantity: i32,
    pub is_active: bool,
    /// Incremented on every write to this row.
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub metadata: serde_json::Value,
}

impl ProductRecord {
    pub fn new(sku: impl Into<String>, name: impl Into<String>, product_type: ProductType) -> Self {
        Self {
            id: Uuid::new_v4(),
            sku: sku.into(),
            name: name.into(),
            product_type,
            price_cents: None,
            stock_quantity: 0,
            is_active: true,
            version: 0,
            created_at: Utc::now(),
            metadata: serde_json::json!({}),
        }
    }
}

/// A planned stock change for one product row. Negative deltas are
/// decrements; a delta that would take the row below zero aborts the
/// whole batch it belongs to.
#[derive(Debug, Clone, Copy)]
pub struct StockDelta {
    pub product_id: Uuid,
    pub delta: i32,
}

/// One row actually written by `apply_deltas`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppliedDelta {
    pub product_id: Uuid,
    pub sku: String,
    pub previous_stock: i32,
    pub new_stock: i32,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Product not found: {0}")]
    NotFound(Uuid),

    #[error("Duplicate SKU: {0}")]
    DuplicateSku(String),

    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: Uuid,
        requested: i32,
        available: i32,
    },

    #[error("Registry access failed: {0}")]
    Access(String),
}

/// The Product Registry seam. The engine reads product rows and writes
/// stock through this trait; product lifecycle stays with the caller.
#[async_trait]
pub trait ProductRegistry: Send + Sync {
    /// Insert a new row. SKUs are unique registry-wide.
    async fn create(&self, record: ProductRecord) -> Result<Uuid, RegistryError>;

    async fn get(&self, id: Uuid) -> Result<Option<ProductRecord>, RegistryError>;

    async fn get_required(&self, id: Uuid) -> Result<ProductRecord, RegistryError> {
        self.get(id).await?.ok_or(RegistryError::NotFound(id))
    }

    async fn set_type(&self, id: Uuid, product_type: ProductType) -> Result<(), RegistryError>;

    async fn delete(&self, id: Uuid) -> Result<(), RegistryError>;

    async fn sku_exists(&self, sku: &str) -> Result<bool, RegistryError>;

    /// Apply a batch of stock deltas as one unit of work: every row is
    /// re-read and re-checked immediately before writing, and either all
    /// deltas are applied or none is. Rows are processed in product-id
    /// order so overlapping batches acquire them consistently.
    async fn apply_deltas(&self, deltas: &[StockDelta]) -> Result<Vec<AppliedDelta>, RegistryError>;
}

/// In-memory registry used in tests and single-process deployments.
/// A database-backed implementation would map `apply_deltas` onto
/// `SELECT ... FOR UPDATE` ordered by id inside one transaction.
pub struct InMemoryRegistry {
    products: RwLock<HashMap<Uuid, ProductRecord>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self {
            products: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProductRegistry for InMemoryRegistry {
    async fn create(&self, record: ProductRecord) -> Result<Uuid, RegistryError> {
        let mut products = self
            .products
            .write()
            .map_err(|e| RegistryError::Access(e.to_string()))?;

        if products.values().any(|p| p.sku == record.sku) {
            return Err(RegistryError::DuplicateSku(record.sku));
        }

        let id = record.id;
        products.insert(id, record);
        Ok(id)
    }

    async fn get(&self, id: Uuid) -> Result<Option<ProductRecord>, RegistryError> {
        let products = self
            .products
            .read()
            .map_err(|e| RegistryError::Access(e.to_string()))?;
        Ok(products.get(&id).cloned())
    }

    async fn set_type(&self, id: Uuid, product_type: ProductType) -> Result<(), RegistryError> {
        let mut products = self
            .products
            .write()
            .map_err(|e| RegistryError::Access(e.to_string()))?;
        let record = products.get_mut(&id).ok_or(RegistryError::NotFound(id))?;
        record.product_type = product_type;
        record.version += 1;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), RegistryError> {
        let mut products = self
            .products
            .write()
            .map_err(|e| RegistryError::Access(e.to_string()))?;
        products.remove(&id).ok_or(RegistryError::NotFound(id))?;
        Ok(())
    }

    async fn sku_exists(&self, sku: &str) -> Result<bool, RegistryError> {
        let products = self
            .products
            .read()
            .map_err(|e| RegistryError::Access(e.to_string()))?;
        Ok(products.values().any(|p| p.sku == sku))
    }

    async fn apply_deltas(&self, deltas: &[StockDelta]) -> Result<Vec<AppliedDelta>, RegistryError> {
        // Merge duplicate rows, then order by id for consistent acquisition.
        let mut merged: HashMap<Uuid, i32> = HashMap::new();
        for d in deltas {
            *merged.entry(d.product_id).or_insert(0) += d.delta;
        }
        let mut ordered: Vec<(Uuid, i32)> = merged.into_iter().collect();
        ordered.sort_by_key(|(id, _)| *id);

        let mut products = self
            .products
            .write()
            .map_err(|e| RegistryError::Access(e.to_string()))?;

        // Stage first: re-check every row against its current value so a
        // failure anywhere leaves the registry untouched.
        let mut staged: Vec<(Uuid, i32)> = Vec::with_capacity(ordered.len());
        for (product_id, delta) in &ordered {
            let record = products
                .get(product_id)
                .ok_or(RegistryError::NotFound(*product_id))?;
            let new_stock = record.stock_quantity + delta;
            if new_stock < 0 {
                return Err(RegistryError::InsufficientStock {
                    product_id: *product_id,
                    requested: -delta,
                    available: record.stock_quantity,
                });
            }
            staged.push((*product_id, new_stock));
        }

        let mut applied = Vec::with_capacity(staged.len());
        for (product_id, new_stock) in staged {
            let record = products
                .get_mut(&product_id)
                .ok_or(RegistryError::NotFound(product_id))?;
            applied.push(AppliedDelta {
                product_id,
                sku: record.sku.clone(),
                previous_stock: record.stock_quantity,
                new_stock,
            });
            record.stock_quantity = new_stock;
            record.version += 1;
        }

        info!(rows = applied.len(), "stock deltas applied");
        Ok(applied)
    }
}
