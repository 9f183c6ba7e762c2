use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tessera_catalog::composition::{BundleComponent, Composition, CompositionStore, ProductUsage, StoreError};
use tessera_core::{ProductRegistry, ProductType, RegistryError};
use tracing::info;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum BundleError {
    #[error("Product not found: {0}")]
    NotFound(Uuid),

    #[error("Product {product_id} is not a bundle (type {found:?})")]
    InvalidType { product_id: Uuid, found: ProductType },

    #[error("Bundle {bundle_id} has no component {component_id}")]
    ComponentNotFound { bundle_id: Uuid, component_id: Uuid },

    #[error("Component {0} listed more than once")]
    DuplicateComponent(Uuid),

    #[error("Component quantity must be at least 1, got {0}")]
    InvalidQuantity(i32),

    #[error("Adding component {component_id} to bundle {bundle_id} would create a cycle")]
    CyclicBundle { bundle_id: Uuid, component_id: Uuid },

    #[error("Insufficient stock: requested {requested}, available {available}")]
    InsufficientStock { requested: i32, available: i32 },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Maintains the weighted component edges of bundle products and the
/// prices derived from them. Edits run under the composition store's
/// write lock, so a bundle's cycle check cannot race edits to that
/// same bundle.
pub struct BundleGraph {
    registry: Arc<dyn ProductRegistry>,
    compositions: Arc<CompositionStore>,
}

impl BundleGraph {
    pub fn new(registry: Arc<dyn ProductRegistry>, compositions: Arc<CompositionStore>) -> Self {
        Self {
            registry,
            compositions,
        }
    }

    async fn ensure_bundle(&self, bundle_id: Uuid) -> Result<(), BundleError> {
        let record = self
            .registry
            .get(bundle_id)
            .await?
            .ok_or(BundleError::NotFound(bundle_id))?;
        if record.product_type != ProductType::Bundle {
            return Err(BundleError::InvalidType {
                product_id: bundle_id,
                found: record.product_type,
            });
        }
        Ok(())
    }

    async fn validate_component(
        &self,
        bundle_id: Uuid,
        component: &BundleComponent,
    ) -> Result<(), BundleError> {
        if component.quantity < 1 {
            return Err(BundleError::InvalidQuantity(component.quantity));
        }
        if component.component_id == bundle_id {
            return Err(BundleError::CyclicBundle {
                bundle_id,
                component_id: component.component_id,
            });
        }
        self.registry
            .get(component.component_id)
            .await?
            .ok_or(BundleError::NotFound(component.component_id))?;
        Ok(())
    }

    /// Add a component edge, or overwrite the existing edge for the same
    /// component. Fails with `CyclicBundle` if the component's own
    /// edges already lead back to this bundle.
    pub async fn add_component(
        &self,
        bundle_id: Uuid,
        component: BundleComponent,
    ) -> Result<(), BundleError> {
        self.ensure_bundle(bundle_id).await?;
        self.validate_component(bundle_id, &component).await?;

        self.compositions.modify::<(), BundleError>(|all| {
            if reaches(all, component.component_id, bundle_id) {
                return Err(BundleError::CyclicBundle {
                    bundle_id,
                    component_id: component.component_id,
                });
            }
            let components = bundle_components_mut(all, bundle_id)?;
            components.retain(|c| c.component_id != component.component_id);
            components.push(component.clone());
            components.sort_by_key(|c| c.position);
            Ok(())
        })?;

        info!(bundle_id = %bundle_id, component_id = %component.component_id, "bundle component added");
        Ok(())
    }

    pub async fn update_component(
        &self,
        bundle_id: Uuid,
        component_id: Uuid,
        quantity: Option<i32>,
        position: Option<i32>,
        special_price_cents: Option<Option<i64>>,
    ) -> Result<BundleComponent, BundleError> {
        self.ensure_bundle(bundle_id).await?;
        if let Some(quantity) = quantity {
            if quantity < 1 {
                return Err(BundleError::InvalidQuantity(quantity));
            }
        }

        self.compositions.modify::<BundleComponent, BundleError>(|all| {
            let components = bundle_components_mut(all, bundle_id)?;
            let component = components
                .iter_mut()
                .find(|c| c.component_id == component_id)
                .ok_or(BundleError::ComponentNotFound {
                    bundle_id,
                    component_id,
                })?;
            if let Some(quantity) = quantity {
                component.quantity = quantity;
            }
            if let Some(position) = position {
                component.position = position;
            }
            if let Some(special) = special_price_cents {
                component.special_price_cents = special;
            }
            let updated = component.clone();
            components.sort_by_key(|c| c.position);
            Ok(updated)
        })
    }

    pub async fn remove_component(
        &self,
        bundle_id: Uuid,
        component_id: Uuid,
    ) -> Result<(), BundleError> {
        self.ensure_bundle(bundle_id).await?;
        self.compositions.modify::<(), BundleError>(|all| {
            let components = bundle_components_mut(all, bundle_id)?;
            let before = components.len();
            components.retain(|c| c.component_id != component_id);
            if components.len() == before {
                return Err(BundleError::ComponentNotFound {
                    bundle_id,
                    component_id,
                });
            }
            Ok(())
        })
    }

    /// Full replace of the component set: rows not in `components` are
    /// dropped, the rest are upserted, all in one edit.
    pub async fn set_components(
        &self,
        bundle_id: Uuid,
        components: Vec<BundleComponent>,
    ) -> Result<(), BundleError> {
        self.ensure_bundle(bundle_id).await?;

        let mut seen = HashSet::new();
        for component in &components {
            if !seen.insert(component.component_id) {
                return Err(BundleError::DuplicateComponent(component.component_id));
            }
            self.validate_component(bundle_id, component).await?;
        }

        self.compositions.modify::<(), BundleError>(|all| {
            for component in &components {
                if reaches(all, component.component_id, bundle_id) {
                    return Err(BundleError::CyclicBundle {
                        bundle_id,
                        component_id: component.component_id,
                    });
                }
            }
            let slot = bundle_components_mut(all, bundle_id)?;
            let mut replacement = components.clone();
            replacement.sort_by_key(|c| c.position);
            *slot = replacement;
            Ok(())
        })?;

        info!(bundle_id = %bundle_id, components = components.len(), "bundle components replaced");
        Ok(())
    }

    pub async fn components(&self, bundle_id: Uuid) -> Result<Vec<BundleComponent>, BundleError> {
        self.ensure_bundle(bundle_id).await?;
        match self.compositions.get(bundle_id)? {
            Some(Composition::Bundle { components }) => Ok(components),
            _ => Ok(Vec::new()),
        }
    }

    /// Derived bundle price: Σ (special price, else component price,
    /// else 0) × quantity, in cents. An empty bundle prices at 0.
    pub async fn calculate_price(&self, bundle_id: Uuid) -> Result<i64, BundleError> {
        let components = self.components(bundle_id).await?;
        let mut total: i64 = 0;
        for component in &components {
            let record = self
                .registry
                .get(component.component_id)
                .await?
                .ok_or(BundleError::NotFound(component.component_id))?;
            let unit = component
                .special_price_cents
                .or(record.price_cents)
                .unwrap_or(0);
            total += unit * component.quantity as i64;
        }
        Ok(total)
    }

    /// Which bundles and grouped parents reference this product, for
    /// callers that must block or warn before deleting it.
    pub async fn usage(&self, product_id: Uuid) -> Result<ProductUsage, BundleError> {
        Ok(self.compositions.usage(product_id)?)
    }
}

fn bundle_components_mut(
    all: &mut HashMap<Uuid, Composition>,
    bundle_id: Uuid,
) -> Result<&mut Vec<BundleComponent>, BundleError> {
    match all
        .entry(bundle_id)
        .or_insert_with(|| Composition::empty_for(ProductType::Bundle))
    {
        Composition::Bundle { components } => Ok(components),
        _ => Err(BundleError::InvalidType {
            product_id: bundle_id,
            found: ProductType::Bundle,
        }),
    }
}

/// Breadth-first reachability over the current component edges. The
/// visited set bounds the walk even if the stored graph is malformed.
fn reaches(all: &HashMap<Uuid, Composition>, start: Uuid, target: Uuid) -> bool {
    let mut visited: HashSet<Uuid> = HashSet::new();
    let mut queue: VecDeque<Uuid> = VecDeque::new();
    queue.push_back(start);

    while let Some(node) = queue.pop_front() {
        if node == target {
            return true;
        }
        if !visited.insert(node) {
            continue;
        }
        if let Some(Composition::Bundle { components }) = all.get(&node) {
            for component in components {
                if !visited.contains(&component.component_id) {
                    queue.push_back(component.component_id);
                }
            }
        }
    }
    false
}
