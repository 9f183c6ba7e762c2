use crate::composition::{Composition, CompositionStore, StoreError};
use std::sync::Arc;
use tessera_core::{EngineRules, ProductRegistry, ProductType, RegistryError};
use tracing::{info, warn};
use uuid::Uuid;

/// Result of a type conversion: what the product was, what it is now,
/// and how many type-specific child rows were cleared on the way.
#[derive(Debug, Clone)]
pub struct ProductTypeInfo {
    pub product_id: Uuid,
    pub previous_type: ProductType,
    pub new_type: ProductType,
    pub cleared_variants: usize,
    pub cleared_components: usize,
    pub cleared_items: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum TransitionError {
    #[error("Product not found: {0}")]
    NotFound(Uuid),

    #[error("Invalid type transition from {from:?} to {to:?}")]
    InvalidTransition { from: ProductType, to: ProductType },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Validates and executes conversions between the five product types.
/// Every type may convert to every other; conversion away from a type
/// clears that type's structure, conversion to a type never populates it.
pub struct TypeTransitionGuard {
    registry: Arc<dyn ProductRegistry>,
    compositions: Arc<CompositionStore>,
    rules: EngineRules,
}

impl TypeTransitionGuard {
    pub fn new(
        registry: Arc<dyn ProductRegistry>,
        compositions: Arc<CompositionStore>,
        rules: EngineRules,
    ) -> Self {
        Self {
            registry,
            compositions,
            rules,
        }
    }

    /// Convert a product to `target`. The composition store and the
    /// registry are separate stores, so the steps are ordered to fail
    /// safe: the old structure is cleared first, then variant rows are
    /// deleted, then the type column is written. An error partway
    /// leaves the product on its old type with an already-emptied
    /// structure, never on a new type with stale children.
    pub async fn convert_type(
        &self,
        product_id: Uuid,
        target: ProductType,
    ) -> Result<ProductTypeInfo, TransitionError> {
        let record = self
            .registry
            .get(product_id)
            .await?
            .ok_or(TransitionError::NotFound(product_id))?;
        let current = record.product_type;

        if current == target {
            if self.rules.reject_noop_conversion {
                return Err(TransitionError::InvalidTransition {
                    from: current,
                    to: target,
                });
            }
            self.compositions.register(product_id, current)?;
            return Ok(ProductTypeInfo {
                product_id,
                previous_type: current,
                new_type: target,
                cleared_variants: 0,
                cleared_components: 0,
                cleared_items: 0,
            });
        }

        // Clear the old type's child structure before flipping the type
        // column, so a failure mid-way never leaves a product carrying
        // stale structure under a new type.
        let previous = self
            .compositions
            .replace(product_id, Composition::empty_for(target))?;

        let mut info = ProductTypeInfo {
            product_id,
            previous_type: current,
            new_type: target,
            cleared_variants: 0,
            cleared_components: 0,
            cleared_items: 0,
        };

        match previous {
            Some(Composition::Configurable { variants, .. }) => {
                info.cleared_variants = variants.len();
                for variant in variants {
                    match self.registry.delete(variant.id).await {
                        Ok(()) => {}
                        Err(RegistryError::NotFound(_)) => {
                            warn!(
                                variant_id = %variant.id,
                                parent_id = %product_id,
                                "variant row already gone during type conversion"
                            );
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
            }
            Some(Composition::Bundle { components }) => {
                info.cleared_components = components.len();
            }
            Some(Composition::Grouped { items }) => {
                info.cleared_items = items.len();
            }
            _ => {}
        }

        self.registry.set_type(product_id, target).await?;

        info!(
            product_id = %product_id,
            from = current.as_str(),
            to = target.as_str(),
            cleared_variants = info.cleared_variants,
            cleared_components = info.cleared_components,
            cleared_items = info.cleared_items,
            "product type converted"
        );

        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composition::{BundleComponent, Variant};
    use chrono::Utc;
    use std::collections::BTreeMap;
    use tessera_core::{InMemoryRegistry, ProductRecord};

    async fn guard_with(
        rules: EngineRules,
    ) -> (TypeTransitionGuard, Arc<InMemoryRegistry>, Arc<CompositionStore>) {
        let registry = Arc::new(InMemoryRegistry::new());
        let compositions = Arc::new(CompositionStore::new());
        let guard = TypeTransitionGuard::new(registry.clone(), compositions.clone(), rules);
        (guard, registry, compositions)
    }

    async fn seed_product(
        registry: &InMemoryRegistry,
        compositions: &CompositionStore,
        sku: &str,
        product_type: ProductType,
    ) -> Uuid {
        let id = registry
            .create(ProductRecord::new(sku, sku, product_type))
            .await
            .unwrap();
        compositions.register(id, product_type).unwrap();
        id
    }

    #[tokio::test]
    async fn converting_away_from_configurable_deletes_variants() {
        let (guard, registry, compositions) = guard_with(EngineRules::default()).await;
        let parent = seed_product(&registry, &compositions, "TEE", ProductType::Configurable).await;

        // Five materialized variants, each with a registry row.
        let mut variant_rows = Vec::new();
        for i in 0..5 {
            let sku = format!("TEE-V{}", i);
            let row = registry
                .create(ProductRecord::new(&sku, &sku, ProductType::Simple))
                .await
                .unwrap();
            variant_rows.push((row, sku));
        }
        compositions
            .replace(
                parent,
                Composition::Configurable {
                    config: None,
                    variants: variant_rows
                        .iter()
                        .map(|(id, sku)| Variant {
                            id: *id,
                            parent_id: parent,
                            sku: sku.clone(),
                            axis_values: BTreeMap::new(),
                            created_at: Utc::now(),
                        })
                        .collect(),
                },
            )
            .unwrap();

        let info = guard
            .convert_type(parent, ProductType::Simple)
            .await
            .unwrap();
        assert_eq!(info.cleared_variants, 5);
        assert_eq!(info.previous_type, ProductType::Configurable);
        assert_eq!(info.new_type, ProductType::Simple);

        for (row, _) in &variant_rows {
            assert!(registry.get(*row).await.unwrap().is_none());
        }
        assert_eq!(
            registry.get_required(parent).await.unwrap().product_type,
            ProductType::Simple
        );

        // Converting back yields an empty variant set, nothing resurrects.
        guard
            .convert_type(parent, ProductType::Configurable)
            .await
            .unwrap();
        match compositions.get(parent).unwrap().unwrap() {
            Composition::Configurable { config, variants } => {
                assert!(config.is_none());
                assert!(variants.is_empty());
            }
            other => panic!("Expected configurable composition, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn converting_away_from_bundle_clears_components() {
        let (guard, registry, compositions) = guard_with(EngineRules::default()).await;
        let bundle = seed_product(&registry, &compositions, "KIT", ProductType::Bundle).await;
        compositions
            .replace(
                bundle,
                Composition::Bundle {
                    components: vec![BundleComponent {
                        component_id: Uuid::new_v4(),
                        quantity: 2,
                        position: 0,
                        special_price_cents: None,
                    }],
                },
            )
            .unwrap();

        let info = guard
            .convert_type(bundle, ProductType::Grouped)
            .await
            .unwrap();
        assert_eq!(info.cleared_components, 1);
        assert!(matches!(
            compositions.get(bundle).unwrap().unwrap(),
            Composition::Grouped { .. }
        ));
    }

    #[tokio::test]
    async fn noop_conversion_succeeds_by_default() {
        let (guard, registry, compositions) = guard_with(EngineRules::default()).await;
        let id = seed_product(&registry, &compositions, "P", ProductType::Simple).await;

        let info = guard.convert_type(id, ProductType::Simple).await.unwrap();
        assert_eq!(info.previous_type, ProductType::Simple);
        assert_eq!(info.cleared_variants, 0);
    }

    #[tokio::test]
    async fn noop_conversion_fails_under_strict_policy() {
        let rules = EngineRules {
            reject_noop_conversion: true,
            ..EngineRules::default()
        };
        let (guard, registry, compositions) = guard_with(rules).await;
        let id = seed_product(&registry, &compositions, "P", ProductType::Bundle).await;

        let err = guard.convert_type(id, ProductType::Bundle).await.unwrap_err();
        assert!(matches!(err, TransitionError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn unknown_product_is_not_found() {
        let (guard, _registry, _compositions) = guard_with(EngineRules::default()).await;
        let err = guard
            .convert_type(Uuid::new_v4(), ProductType::Simple)
            .await
            .unwrap_err();
        assert!(matches!(err, TransitionError::NotFound(_)));
    }
}
