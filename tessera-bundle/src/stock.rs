use crate::graph::BundleError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tessera_catalog::composition::{BundleComponent, Composition, CompositionStore};
use tessera_core::{AppliedDelta, ProductRegistry, ProductType, RegistryError, StockDelta};
use tracing::{info, warn};
use uuid::Uuid;

/// Pre-check result for a requested sale/reservation quantity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockValidation {
    pub is_valid: bool,
    pub message: Option<String>,
    /// How many units are satisfiable right now, when derivable.
    pub available_quantity: Option<i32>,
    pub requested_quantity: i32,
}

impl StockValidation {
    fn valid(available: i32, requested: i32) -> Self {
        Self {
            is_valid: true,
            message: None,
            available_quantity: Some(available),
            requested_quantity: requested,
        }
    }

    fn invalid(message: impl Into<String>, available: Option<i32>, requested: i32) -> Self {
        Self {
            is_valid: false,
            message: Some(message.into()),
            available_quantity: available,
            requested_quantity: requested,
        }
    }
}

/// One row written by a decrement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecrementedProduct {
    pub product_id: Uuid,
    pub sku: String,
    pub previous_stock: i32,
    pub new_stock: i32,
    pub decremented_amount: i32,
}

impl From<AppliedDelta> for DecrementedProduct {
    fn from(applied: AppliedDelta) -> Self {
        Self {
            product_id: applied.product_id,
            sku: applied.sku,
            decremented_amount: applied.previous_stock - applied.new_stock,
            previous_stock: applied.previous_stock,
            new_stock: applied.new_stock,
        }
    }
}

/// Result of a decrement attempt. `success = false` always means no
/// stock row changed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecrementOutcome {
    pub success: bool,
    pub message: Option<String>,
    pub decremented_products: Vec<DecrementedProduct>,
}

/// Validates and applies stock-changing operations across whatever set
/// of rows a product's type implies: one row for simple/virtual
/// products, every component row for bundles.
pub struct StockOperations {
    registry: Arc<dyn ProductRegistry>,
    compositions: Arc<CompositionStore>,
}

impl StockOperations {
    pub fn new(registry: Arc<dyn ProductRegistry>, compositions: Arc<CompositionStore>) -> Self {
        Self {
            registry,
            compositions,
        }
    }

    fn bundle_components(&self, bundle_id: Uuid) -> Result<Vec<BundleComponent>, BundleError> {
        match self.compositions.get(bundle_id)? {
            Some(Composition::Bundle { components }) => Ok(components),
            _ => Ok(Vec::new()),
        }
    }

    /// Can `quantity` units of this product be sold right now?
    /// For bundles the answer is the binding constraint: the component
    /// that satisfies the fewest whole bundles.
    pub async fn validate(
        &self,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<StockValidation, BundleError> {
        let record = self
            .registry
            .get(product_id)
            .await?
            .ok_or(BundleError::NotFound(product_id))?;

        if quantity <= 0 {
            return Ok(StockValidation::invalid(
                "requested quantity must be positive",
                None,
                quantity,
            ));
        }

        match record.product_type {
            ProductType::Simple | ProductType::Virtual => {
                let available = record.stock_quantity;
                if available >= quantity {
                    Ok(StockValidation::valid(available, quantity))
                } else {
                    Ok(StockValidation::invalid(
                        format!("insufficient stock: requested {}, available {}", quantity, available),
                        Some(available),
                        quantity,
                    ))
                }
            }
            ProductType::Bundle => {
                let components = self.bundle_components(product_id)?;
                if components.is_empty() {
                    return Ok(StockValidation::invalid(
                        "bundle has no components",
                        Some(0),
                        quantity,
                    ));
                }

                let mut available = i32::MAX;
                for component in &components {
                    let row = self
                        .registry
                        .get(component.component_id)
                        .await?
                        .ok_or(BundleError::NotFound(component.component_id))?;
                    available = available.min(row.stock_quantity / component.quantity);
                }

                if available >= quantity {
                    Ok(StockValidation::valid(available, quantity))
                } else {
                    Ok(StockValidation::invalid(
                        format!(
                            "insufficient component stock: requested {}, available {}",
                            quantity, available
                        ),
                        Some(available),
                        quantity,
                    ))
                }
            }
            // Configurable parents are sold through their variants and
            // grouped children each through their own lifecycle.
            other => Err(BundleError::InvalidType {
                product_id,
                found: other,
            }),
        }
    }

    /// Decrement stock for a sale of `quantity` units. For bundles every
    /// component is decremented by `component.quantity x quantity`,
    /// all-or-nothing: a validation failure or a race-induced underflow
    /// leaves every row unchanged and reports `success = false`.
    pub async fn decrement(
        &self,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<DecrementOutcome, BundleError> {
        let validation = self.validate(product_id, quantity).await?;
        if !validation.is_valid {
            return Ok(DecrementOutcome {
                success: false,
                message: validation.message,
                decremented_products: Vec::new(),
            });
        }

        let record = self
            .registry
            .get(product_id)
            .await?
            .ok_or(BundleError::NotFound(product_id))?;
        let deltas: Vec<StockDelta> = match record.product_type {
            ProductType::Simple | ProductType::Virtual => vec![StockDelta {
                product_id,
                delta: -quantity,
            }],
            ProductType::Bundle => self
                .bundle_components(product_id)?
                .iter()
                .map(|component| StockDelta {
                    product_id: component.component_id,
                    delta: -(component.quantity * quantity),
                })
                .collect(),
            other => {
                return Err(BundleError::InvalidType {
                    product_id,
                    found: other,
                })
            }
        };

        // The registry re-checks every row under its lock; stock that
        // moved since validation surfaces here as an underflow.
        match self.registry.apply_deltas(&deltas).await {
            Ok(applied) => {
                info!(
                    product_id = %product_id,
                    quantity = quantity,
                    rows = applied.len(),
                    "stock decremented"
                );
                Ok(DecrementOutcome {
                    success: true,
                    message: None,
                    decremented_products: applied.into_iter().map(Into::into).collect(),
                })
            }
            Err(RegistryError::InsufficientStock {
                product_id: row,
                requested,
                available,
            }) => {
                warn!(
                    product_id = %product_id,
                    row = %row,
                    "stock changed between validation and apply; decrement aborted"
                );
                Ok(DecrementOutcome {
                    success: false,
                    message: Some(format!(
                        "stock changed during apply for {}: requested {}, available {}",
                        row, requested, available
                    )),
                    decremented_products: Vec::new(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Add stock back to a simple or virtual product's own row.
    pub async fn restock(&self, product_id: Uuid, quantity: i32) -> Result<AppliedDelta, BundleError> {
        if quantity <= 0 {
            return Err(BundleError::InvalidQuantity(quantity));
        }
        let record = self
            .registry
            .get(product_id)
            .await?
            .ok_or(BundleError::NotFound(product_id))?;
        if !record.product_type.has_own_stock() {
            return Err(BundleError::InvalidType {
                product_id,
                found: record.product_type,
            });
        }

        let applied = self
            .registry
            .apply_deltas(&[StockDelta {
                product_id,
                delta: quantity,
            }])
            .await?;
        // One delta in, one row out.
        applied
            .into_iter()
            .next()
            .ok_or(BundleError::NotFound(product_id))
    }
}
