use crate::matrix::{combination_count, combinations, AxisValues};
use crate::sku::render_sku;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tessera_catalog::axis::{AxisCatalog, AxisError, VariantAxis};
use tessera_catalog::composition::{Composition, CompositionStore, StoreError, Variant, VariantConfig};
use tessera_core::{
    AttributeSource, EngineRules, ProductRecord, ProductRegistry, ProductType, RegistryError,
};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum ComposeError {
    #[error("Product not found: {0}")]
    NotFound(Uuid),

    #[error("Product {product_id} is not configurable (type {found:?})")]
    InvalidType { product_id: Uuid, found: ProductType },

    #[error("Product {0} has no variant configuration")]
    NotConfigured(Uuid),

    #[error("At least one axis is required")]
    NoAxes,

    #[error("Matrix of {count} combinations exceeds the ceiling of {limit}")]
    TooManyCombinations { count: usize, limit: usize },

    #[error("Duplicate SKU: {0}")]
    DuplicateSku(String),

    #[error("Invalid combination: {0}")]
    InvalidCombination(String),

    #[error(transparent)]
    Axis(#[from] AxisError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// One entry of the candidate matrix: a full axis-value assignment plus
/// whether a variant already materializes it.
#[derive(Debug, Clone)]
pub struct MatrixEntry {
    pub axis_values: BTreeMap<Uuid, String>,
    pub exists: bool,
    pub variant_id: Option<Uuid>,
}

/// A batch entry that could not be created. The rest of the batch is
/// unaffected.
#[derive(Debug)]
pub struct BulkFailure {
    pub axis_values: BTreeMap<Uuid, String>,
    pub error: ComposeError,
}

/// Outcome of `bulk_create`: partial-success semantics, per entry.
#[derive(Debug, Default)]
pub struct BulkCreateReport {
    pub created: Vec<Variant>,
    pub skipped: Vec<BTreeMap<Uuid, String>>,
    pub failed: Vec<BulkFailure>,
}

/// Associates a configurable product with its axes and materializes
/// concrete variants out of the combination matrix.
pub struct VariantComposer {
    registry: Arc<dyn ProductRegistry>,
    compositions: Arc<CompositionStore>,
    axes: Arc<AxisCatalog>,
    attributes: Arc<dyn AttributeSource>,
    rules: EngineRules,
}

impl VariantComposer {
    pub fn new(
        registry: Arc<dyn ProductRegistry>,
        compositions: Arc<CompositionStore>,
        axes: Arc<AxisCatalog>,
        attributes: Arc<dyn AttributeSource>,
        rules: EngineRules,
    ) -> Self {
        Self {
            registry,
            compositions,
            axes,
            attributes,
            rules,
        }
    }

    async fn configurable_record(&self, product_id: Uuid) -> Result<ProductRecord, ComposeError> {
        let record = self
            .registry
            .get(product_id)
            .await?
            .ok_or(ComposeError::NotFound(product_id))?;
        if record.product_type != ProductType::Configurable {
            return Err(ComposeError::InvalidType {
                product_id,
                found: record.product_type,
            });
        }
        Ok(record)
    }

    /// Resolve each configured axis with its allowed values, in order.
    async fn resolve_axes(
        &self,
        axis_ids: &[Uuid],
    ) -> Result<Vec<(VariantAxis, Vec<String>)>, ComposeError> {
        let mut resolved = Vec::with_capacity(axis_ids.len());
        for id in axis_ids {
            let axis = self.axes.get(*id)?;
            let values = self.axes.allowed_values(*id, self.attributes.as_ref()).await?;
            resolved.push((axis, values));
        }
        Ok(resolved)
    }

    fn check_ceiling(&self, axes: &[AxisValues]) -> Result<usize, ComposeError> {
        let count = combination_count(axes);
        if count > self.rules.max_combinations {
            return Err(ComposeError::TooManyCombinations {
                count,
                limit: self.rules.max_combinations,
            });
        }
        Ok(count)
    }

    /// Bind a configurable product to an ordered axis set and SKU
    /// pattern, replacing any previous configuration. Existing variants
    /// are left in place; stale ones are flagged, not repaired.
    pub async fn configure(
        &self,
        product_id: Uuid,
        axis_ids: Vec<Uuid>,
        sku_pattern: Option<String>,
    ) -> Result<VariantConfig, ComposeError> {
        if axis_ids.is_empty() {
            return Err(ComposeError::NoAxes);
        }
        let distinct: HashSet<Uuid> = axis_ids.iter().copied().collect();
        if distinct.len() != axis_ids.len() {
            return Err(ComposeError::InvalidCombination(
                "axis set contains duplicates".to_string(),
            ));
        }

        self.configurable_record(product_id).await?;

        let resolved = self.resolve_axes(&axis_ids).await?;
        for (axis, _) in &resolved {
            if !axis.is_active {
                return Err(ComposeError::Axis(AxisError::Inactive(axis.code.clone())));
            }
        }
        let axis_values: Vec<AxisValues> = resolved
            .iter()
            .map(|(axis, values)| AxisValues {
                axis_id: axis.id,
                values: values.clone(),
            })
            .collect();
        self.check_ceiling(&axis_values)?;

        let config = VariantConfig {
            axis_ids: axis_ids.clone(),
            sku_pattern,
        };

        let stale = self.compositions.modify::<usize, ComposeError>(|all| {
            let entry = all
                .entry(product_id)
                .or_insert_with(|| Composition::empty_for(ProductType::Configurable));
            match entry {
                Composition::Configurable { config: slot, variants } => {
                    *slot = Some(config.clone());
                    Ok(variants
                        .iter()
                        .filter(|v| {
                            let keys: HashSet<Uuid> = v.axis_values.keys().copied().collect();
                            keys != distinct
                        })
                        .count())
                }
                // Registry says configurable; refresh a stale structure.
                other => {
                    *other = Composition::Configurable {
                        config: Some(config.clone()),
                        variants: Vec::new(),
                    };
                    Ok(0)
                }
            }
        })?;

        if stale > 0 {
            warn!(
                product_id = %product_id,
                stale_variants = stale,
                "re-configured axes leave existing variants referencing old axis set"
            );
        }

        Ok(config)
    }

    /// Enumerate the full candidate matrix, annotating combinations that
    /// already have a variant. Recomputed on every call, never persisted.
    pub async fn matrix(&self, product_id: Uuid) -> Result<Vec<MatrixEntry>, ComposeError> {
        self.configurable_record(product_id).await?;
        let (config, existing) = self.config_and_variants(product_id)?;

        let resolved = self.resolve_axes(&config.axis_ids).await?;
        let axis_values: Vec<AxisValues> = resolved
            .iter()
            .map(|(axis, values)| AxisValues {
                axis_id: axis.id,
                values: values.clone(),
            })
            .collect();
        self.check_ceiling(&axis_values)?;

        Ok(combinations(&axis_values)
            .map(|combination| {
                let variant_id = existing.get(&combination).copied();
                MatrixEntry {
                    exists: variant_id.is_some(),
                    variant_id,
                    axis_values: combination,
                }
            })
            .collect())
    }

    /// Materialize variants for the requested combinations. Existing
    /// combinations are skipped; a SKU collision or malformed
    /// combination fails that entry and the batch continues.
    pub async fn bulk_create(
        &self,
        product_id: Uuid,
        requested: Vec<BTreeMap<Uuid, String>>,
    ) -> Result<BulkCreateReport, ComposeError> {
        let record = self.configurable_record(product_id).await?;
        let (config, mut existing) = self.config_and_variants(product_id)?;

        let resolved = self.resolve_axes(&config.axis_ids).await?;
        let allowed: HashMap<Uuid, (String, HashSet<String>)> = resolved
            .iter()
            .map(|(axis, values)| {
                (
                    axis.id,
                    (axis.code.clone(), values.iter().cloned().collect()),
                )
            })
            .collect();
        let configured: HashSet<Uuid> = config.axis_ids.iter().copied().collect();

        let mut report = BulkCreateReport::default();
        let mut batch_skus: HashSet<String> = HashSet::new();

        for combination in requested {
            if let Err(error) = validate_combination(&combination, &configured, &allowed) {
                report.failed.push(BulkFailure {
                    axis_values: combination,
                    error,
                });
                continue;
            }

            if existing.contains_key(&combination) {
                report.skipped.push(combination);
                continue;
            }

            // Axis order drives value order in the SKU.
            let ordered_values: Vec<(String, String)> = config
                .axis_ids
                .iter()
                .map(|axis_id| {
                    let (code, _) = &allowed[axis_id];
                    (code.clone(), combination[axis_id].clone())
                })
                .collect();
            let sku = render_sku(
                config.sku_pattern.as_deref(),
                &record.sku,
                &ordered_values,
                &self.rules.sku_separator,
            );

            if batch_skus.contains(&sku) || self.registry.sku_exists(&sku).await? {
                report.failed.push(BulkFailure {
                    axis_values: combination,
                    error: ComposeError::DuplicateSku(sku),
                });
                continue;
            }

            let mut row = ProductRecord::new(&sku, format!("{} {}", record.name, sku), ProductType::Simple);
            row.price_cents = record.price_cents;
            row.metadata = serde_json::json!({ "parent_id": product_id });
            let variant_id = match self.registry.create(row).await {
                Ok(id) => id,
                Err(RegistryError::DuplicateSku(sku)) => {
                    report.failed.push(BulkFailure {
                        axis_values: combination,
                        error: ComposeError::DuplicateSku(sku),
                    });
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let variant = Variant {
                id: variant_id,
                parent_id: product_id,
                sku: sku.clone(),
                axis_values: combination.clone(),
                created_at: Utc::now(),
            };
            self.compositions.modify::<(), ComposeError>(|all| {
                match all.get_mut(&product_id) {
                    Some(Composition::Configurable { variants, .. }) => {
                        variants.push(variant.clone());
                        Ok(())
                    }
                    _ => Err(ComposeError::NotConfigured(product_id)),
                }
            })?;

            batch_skus.insert(sku);
            existing.insert(combination, variant_id);
            report.created.push(variant);
        }

        info!(
            product_id = %product_id,
            created = report.created.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "bulk variant creation finished"
        );

        Ok(report)
    }

    /// Current config plus a lookup from axis-value assignment to
    /// variant id.
    fn config_and_variants(
        &self,
        product_id: Uuid,
    ) -> Result<(VariantConfig, HashMap<BTreeMap<Uuid, String>, Uuid>), ComposeError> {
        match self.compositions.get(product_id)? {
            Some(Composition::Configurable { config, variants }) => {
                let config = config.ok_or(ComposeError::NotConfigured(product_id))?;
                let existing = variants
                    .into_iter()
                    .map(|v| (v.axis_values, v.id))
                    .collect();
                Ok((config, existing))
            }
            _ => Err(ComposeError::NotConfigured(product_id)),
        }
    }
}

fn validate_combination(
    combination: &BTreeMap<Uuid, String>,
    configured: &HashSet<Uuid>,
    allowed: &HashMap<Uuid, (String, HashSet<String>)>,
) -> Result<(), ComposeError> {
    let keys: HashSet<Uuid> = combination.keys().copied().collect();
    if keys != *configured {
        return Err(ComposeError::InvalidCombination(
            "combination must assign exactly one value per configured axis".to_string(),
        ));
    }
    for (axis_id, value) in combination {
        let (code, values) = &allowed[axis_id];
        if !values.contains(value) {
            return Err(ComposeError::InvalidCombination(format!(
                "value '{}' is not allowed for axis {}",
                value, code
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::{InMemoryRegistry, StaticAttributeSource};

    struct Fixture {
        composer: VariantComposer,
        registry: Arc<InMemoryRegistry>,
        compositions: Arc<CompositionStore>,
        axes: Arc<AxisCatalog>,
    }

    fn fixture(rules: EngineRules) -> Fixture {
        let registry = Arc::new(InMemoryRegistry::new());
        let compositions = Arc::new(CompositionStore::new());
        let axes = Arc::new(AxisCatalog::new());
        let attributes = Arc::new(StaticAttributeSource::new());
        let composer = VariantComposer::new(
            registry.clone(),
            compositions.clone(),
            axes.clone(),
            attributes,
            rules,
        );
        Fixture {
            composer,
            registry,
            compositions,
            axes,
        }
    }

    async fn seed_parent(f: &Fixture, sku: &str) -> Uuid {
        let id = f
            .registry
            .create(ProductRecord::new(sku, sku, ProductType::Configurable))
            .await
            .unwrap();
        f.compositions.register(id, ProductType::Configurable).unwrap();
        id
    }

    fn color_size_axes(f: &Fixture) -> (Uuid, Uuid) {
        let color = f
            .axes
            .create("color", "Color", None, vec!["Red".into(), "Blue".into(), "Green".into()], 0)
            .unwrap();
        let size = f
            .axes
            .create("size", "Size", None, vec!["S".into(), "M".into()], 1)
            .unwrap();
        (color.id, size.id)
    }

    fn assignment(pairs: &[(Uuid, &str)]) -> BTreeMap<Uuid, String> {
        pairs.iter().map(|(id, v)| (*id, v.to_string())).collect()
    }

    #[tokio::test]
    async fn configure_rejects_wrong_type_and_empty_axes() {
        let f = fixture(EngineRules::default());
        let simple = f
            .registry
            .create(ProductRecord::new("P", "P", ProductType::Simple))
            .await
            .unwrap();
        let (color, _) = color_size_axes(&f);

        let err = f
            .composer
            .configure(simple, vec![color], None)
            .await
            .unwrap_err();
        assert!(matches!(err, ComposeError::InvalidType { .. }));

        let parent = seed_parent(&f, "TEE").await;
        let err = f.composer.configure(parent, vec![], None).await.unwrap_err();
        assert!(matches!(err, ComposeError::NoAxes));
    }

    #[tokio::test]
    async fn matrix_enumerates_full_cartesian_product() {
        let f = fixture(EngineRules::default());
        let parent = seed_parent(&f, "TEE").await;
        let (color, size) = color_size_axes(&f);

        f.composer
            .configure(parent, vec![color, size], None)
            .await
            .unwrap();

        let matrix = f.composer.matrix(parent).await.unwrap();
        assert_eq!(matrix.len(), 6);
        assert!(matrix.iter().all(|e| !e.exists && e.axis_values.len() == 2));
    }

    #[tokio::test]
    async fn ceiling_rejects_oversized_configurations() {
        let rules = EngineRules {
            max_combinations: 4,
            ..EngineRules::default()
        };
        let f = fixture(rules);
        let parent = seed_parent(&f, "TEE").await;
        let (color, size) = color_size_axes(&f);

        // 3 x 2 = 6 > 4
        let err = f
            .composer
            .configure(parent, vec![color, size], None)
            .await
            .unwrap_err();
        match err {
            ComposeError::TooManyCombinations { count, limit } => {
                assert_eq!(count, 6);
                assert_eq!(limit, 4);
            }
            other => panic!("Expected TooManyCombinations, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn bulk_create_is_idempotent_and_marks_matrix() {
        let f = fixture(EngineRules::default());
        let parent = seed_parent(&f, "TEE").await;
        let (color, size) = color_size_axes(&f);
        f.composer
            .configure(parent, vec![color, size], None)
            .await
            .unwrap();

        let wanted = vec![
            assignment(&[(color, "Red"), (size, "S")]),
            assignment(&[(color, "Blue"), (size, "M")]),
        ];

        let first = f.composer.bulk_create(parent, wanted.clone()).await.unwrap();
        assert_eq!(first.created.len(), 2);
        assert!(first.skipped.is_empty());
        assert!(first.failed.is_empty());
        assert_eq!(first.created[0].sku, "TEE-RED-S");

        // Second call with the same set: everything skips, nothing errors.
        let second = f.composer.bulk_create(parent, wanted).await.unwrap();
        assert!(second.created.is_empty());
        assert_eq!(second.skipped.len(), 2);
        assert!(second.failed.is_empty());

        let matrix = f.composer.matrix(parent).await.unwrap();
        assert_eq!(matrix.iter().filter(|e| e.exists).count(), 2);
    }

    #[tokio::test]
    async fn duplicate_sku_fails_only_its_entry() {
        let f = fixture(EngineRules::default());
        let parent = seed_parent(&f, "TEE").await;
        let (color, size) = color_size_axes(&f);
        // Constant pattern: every combination renders the same SKU.
        f.composer
            .configure(parent, vec![color, size], Some("FIXED".to_string()))
            .await
            .unwrap();

        let report = f
            .composer
            .bulk_create(
                parent,
                vec![
                    assignment(&[(color, "Red"), (size, "S")]),
                    assignment(&[(color, "Blue"), (size, "S")]),
                ],
            )
            .await
            .unwrap();

        assert_eq!(report.created.len(), 1);
        assert_eq!(report.failed.len(), 1);
        assert!(matches!(
            report.failed[0].error,
            ComposeError::DuplicateSku(_)
        ));
    }

    #[tokio::test]
    async fn malformed_combinations_fail_per_entry() {
        let f = fixture(EngineRules::default());
        let parent = seed_parent(&f, "TEE").await;
        let (color, size) = color_size_axes(&f);
        f.composer
            .configure(parent, vec![color, size], None)
            .await
            .unwrap();

        let report = f
            .composer
            .bulk_create(
                parent,
                vec![
                    // Missing the size axis.
                    assignment(&[(color, "Red")]),
                    // Value outside the allowed set.
                    assignment(&[(color, "Mauve"), (size, "S")]),
                    assignment(&[(color, "Green"), (size, "M")]),
                ],
            )
            .await
            .unwrap();

        assert_eq!(report.created.len(), 1);
        assert_eq!(report.failed.len(), 2);
        assert!(report
            .failed
            .iter()
            .all(|fail| matches!(fail.error, ComposeError::InvalidCombination(_))));
    }

    #[tokio::test]
    async fn reconfigure_keeps_existing_variants() {
        let f = fixture(EngineRules::default());
        let parent = seed_parent(&f, "TEE").await;
        let (color, size) = color_size_axes(&f);
        f.composer
            .configure(parent, vec![color, size], None)
            .await
            .unwrap();
        f.composer
            .bulk_create(parent, vec![assignment(&[(color, "Red"), (size, "S")])])
            .await
            .unwrap();

        // Re-configure down to a single axis: the old variant stays.
        f.composer.configure(parent, vec![color], None).await.unwrap();
        match f.compositions.get(parent).unwrap().unwrap() {
            Composition::Configurable { variants, config } => {
                assert_eq!(variants.len(), 1);
                assert_eq!(config.unwrap().axis_ids, vec![color]);
            }
            other => panic!("Expected configurable composition, got {:?}", other),
        }
    }
}
