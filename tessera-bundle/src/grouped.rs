use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tessera_catalog::composition::{Composition, CompositionStore, GroupedItem, StoreError};
use tessera_core::{ProductRegistry, ProductType, RegistryError};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum GroupedError {
    #[error("Product not found: {0}")]
    NotFound(Uuid),

    #[error("Product {product_id} is not a grouped product (type {found:?})")]
    InvalidType { product_id: Uuid, found: ProductType },

    #[error("Grouped product {parent_id} has no item for child {child_id}")]
    ItemNotFound { parent_id: Uuid, child_id: Uuid },

    #[error("A grouped product cannot list itself: {0}")]
    SelfReference(Uuid),

    #[error("Child {0} listed more than once")]
    DuplicateChild(Uuid),

    #[error("Invalid quantity bounds: min {min}, default {default}, max {max:?}")]
    InvalidQuantityBounds {
        min: i32,
        default: i32,
        max: Option<i32>,
    },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Maintains the child list of grouped products. Grouped items are a
/// display and ordering composition only: no aggregate price or stock
/// is derived, every child sells through its own lifecycle.
pub struct GroupedSet {
    registry: Arc<dyn ProductRegistry>,
    compositions: Arc<CompositionStore>,
}

impl GroupedSet {
    pub fn new(registry: Arc<dyn ProductRegistry>, compositions: Arc<CompositionStore>) -> Self {
        Self {
            registry,
            compositions,
        }
    }

    async fn ensure_grouped(&self, parent_id: Uuid) -> Result<(), GroupedError> {
        let record = self
            .registry
            .get(parent_id)
            .await?
            .ok_or(GroupedError::NotFound(parent_id))?;
        if record.product_type != ProductType::Grouped {
            return Err(GroupedError::InvalidType {
                product_id: parent_id,
                found: record.product_type,
            });
        }
        Ok(())
    }

    async fn validate_item(&self, parent_id: Uuid, item: &GroupedItem) -> Result<(), GroupedError> {
        if item.child_id == parent_id {
            return Err(GroupedError::SelfReference(parent_id));
        }
        validate_bounds(item)?;
        self.registry
            .get(item.child_id)
            .await?
            .ok_or(GroupedError::NotFound(item.child_id))?;
        Ok(())
    }

    /// Add an item, or overwrite the existing item for the same child.
    pub async fn add_item(&self, parent_id: Uuid, item: GroupedItem) -> Result<(), GroupedError> {
        self.ensure_grouped(parent_id).await?;
        self.validate_item(parent_id, &item).await?;

        self.compositions.modify::<(), GroupedError>(|all| {
            let items = grouped_items_mut(all, parent_id)?;
            items.retain(|i| i.child_id != item.child_id);
            items.push(item.clone());
            items.sort_by_key(|i| i.position);
            Ok(())
        })
    }

    pub async fn update_item(
        &self,
        parent_id: Uuid,
        child_id: Uuid,
        default_quantity: Option<i32>,
        min_quantity: Option<i32>,
        max_quantity: Option<Option<i32>>,
        position: Option<i32>,
    ) -> Result<GroupedItem, GroupedError> {
        self.ensure_grouped(parent_id).await?;

        self.compositions.modify::<GroupedItem, GroupedError>(|all| {
            let items = grouped_items_mut(all, parent_id)?;
            let item = items
                .iter_mut()
                .find(|i| i.child_id == child_id)
                .ok_or(GroupedError::ItemNotFound { parent_id, child_id })?;

            let mut updated = item.clone();
            if let Some(default_quantity) = default_quantity {
                updated.default_quantity = default_quantity;
            }
            if let Some(min_quantity) = min_quantity {
                updated.min_quantity = min_quantity;
            }
            if let Some(max_quantity) = max_quantity {
                updated.max_quantity = max_quantity;
            }
            if let Some(position) = position {
                updated.position = position;
            }
            validate_bounds(&updated)?;

            *item = updated.clone();
            items.sort_by_key(|i| i.position);
            Ok(updated)
        })
    }

    pub async fn remove_item(&self, parent_id: Uuid, child_id: Uuid) -> Result<(), GroupedError> {
        self.ensure_grouped(parent_id).await?;
        self.compositions.modify::<(), GroupedError>(|all| {
            let items = grouped_items_mut(all, parent_id)?;
            let before = items.len();
            items.retain(|i| i.child_id != child_id);
            if items.len() == before {
                return Err(GroupedError::ItemNotFound { parent_id, child_id });
            }
            Ok(())
        })
    }

    /// Full replace of the item set.
    pub async fn set_items(
        &self,
        parent_id: Uuid,
        items: Vec<GroupedItem>,
    ) -> Result<(), GroupedError> {
        self.ensure_grouped(parent_id).await?;

        let mut seen = HashSet::new();
        for item in &items {
            if !seen.insert(item.child_id) {
                return Err(GroupedError::DuplicateChild(item.child_id));
            }
            self.validate_item(parent_id, item).await?;
        }

        self.compositions.modify::<(), GroupedError>(|all| {
            let slot = grouped_items_mut(all, parent_id)?;
            let mut replacement = items;
            replacement.sort_by_key(|i| i.position);
            *slot = replacement;
            Ok(())
        })
    }

    pub async fn items(&self, parent_id: Uuid) -> Result<Vec<GroupedItem>, GroupedError> {
        self.ensure_grouped(parent_id).await?;
        match self.compositions.get(parent_id)? {
            Some(Composition::Grouped { items }) => Ok(items),
            _ => Ok(Vec::new()),
        }
    }
}

/// min <= default <= max (when max is set), everything non-negative.
fn validate_bounds(item: &GroupedItem) -> Result<(), GroupedError> {
    let out_of_bounds = item.min_quantity < 0
        || item.default_quantity < item.min_quantity
        || item
            .max_quantity
            .is_some_and(|max| max < item.min_quantity || item.default_quantity > max);
    if out_of_bounds {
        return Err(GroupedError::InvalidQuantityBounds {
            min: item.min_quantity,
            default: item.default_quantity,
            max: item.max_quantity,
        });
    }
    Ok(())
}

fn grouped_items_mut(
    all: &mut HashMap<Uuid, Composition>,
    parent_id: Uuid,
) -> Result<&mut Vec<GroupedItem>, GroupedError> {
    match all
        .entry(parent_id)
        .or_insert_with(|| Composition::empty_for(ProductType::Grouped))
    {
        Composition::Grouped { items } => Ok(items),
        _ => Err(GroupedError::InvalidType {
            product_id: parent_id,
            found: ProductType::Grouped,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::{InMemoryRegistry, ProductRecord};

    struct Fixture {
        grouped: GroupedSet,
        registry: Arc<InMemoryRegistry>,
        compositions: Arc<CompositionStore>,
    }

    fn fixture() -> Fixture {
        let registry = Arc::new(InMemoryRegistry::new());
        let compositions = Arc::new(CompositionStore::new());
        let grouped = GroupedSet::new(registry.clone(), compositions.clone());
        Fixture {
            grouped,
            registry,
            compositions,
        }
    }

    async fn seed(f: &Fixture, sku: &str, product_type: ProductType) -> Uuid {
        let id = f
            .registry
            .create(ProductRecord::new(sku, sku, product_type))
            .await
            .unwrap();
        f.compositions.register(id, product_type).unwrap();
        id
    }

    fn item(child_id: Uuid, default: i32, min: i32, max: Option<i32>, position: i32) -> GroupedItem {
        GroupedItem {
            child_id,
            default_quantity: default,
            min_quantity: min,
            max_quantity: max,
            position,
        }
    }

    #[tokio::test]
    async fn bounds_are_enforced_at_write_time() {
        let f = fixture();
        let parent = seed(&f, "SET", ProductType::Grouped).await;
        let child = seed(&f, "C", ProductType::Simple).await;

        // min 2 > max 1
        let err = f
            .grouped
            .add_item(parent, item(child, 2, 2, Some(1), 0))
            .await
            .unwrap_err();
        assert!(matches!(err, GroupedError::InvalidQuantityBounds { .. }));

        // default below min
        let err = f
            .grouped
            .add_item(parent, item(child, 0, 1, None, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, GroupedError::InvalidQuantityBounds { .. }));

        f.grouped
            .add_item(parent, item(child, 1, 0, Some(3), 0))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn update_revalidates_bounds() {
        let f = fixture();
        let parent = seed(&f, "SET", ProductType::Grouped).await;
        let child = seed(&f, "C", ProductType::Simple).await;
        f.grouped
            .add_item(parent, item(child, 1, 0, Some(3), 0))
            .await
            .unwrap();

        let err = f
            .grouped
            .update_item(parent, child, Some(5), None, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, GroupedError::InvalidQuantityBounds { .. }));

        // Failed update leaves the stored item untouched.
        let items = f.grouped.items(parent).await.unwrap();
        assert_eq!(items[0].default_quantity, 1);
    }

    #[tokio::test]
    async fn parent_cannot_list_itself() {
        let f = fixture();
        let parent = seed(&f, "SET", ProductType::Grouped).await;

        let err = f
            .grouped
            .add_item(parent, item(parent, 1, 0, None, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, GroupedError::SelfReference(_)));
    }

    #[tokio::test]
    async fn set_items_replaces_and_orders() {
        let f = fixture();
        let parent = seed(&f, "SET", ProductType::Grouped).await;
        let a = seed(&f, "A", ProductType::Simple).await;
        let b = seed(&f, "B", ProductType::Simple).await;

        f.grouped
            .add_item(parent, item(a, 1, 0, None, 0))
            .await
            .unwrap();
        f.grouped
            .set_items(parent, vec![item(b, 1, 0, None, 0), item(a, 2, 0, None, 1)])
            .await
            .unwrap();

        let children: Vec<Uuid> = f
            .grouped
            .items(parent)
            .await
            .unwrap()
            .iter()
            .map(|i| i.child_id)
            .collect();
        assert_eq!(children, vec![b, a]);
    }

    #[tokio::test]
    async fn non_grouped_parent_is_invalid_type() {
        let f = fixture();
        let simple = seed(&f, "P", ProductType::Simple).await;
        let child = seed(&f, "C", ProductType::Simple).await;

        let err = f
            .grouped
            .add_item(simple, item(child, 1, 0, None, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, GroupedError::InvalidType { .. }));
    }
}
