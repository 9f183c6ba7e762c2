use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use tessera_core::AttributeSource;
use uuid::Uuid;

/// A named dimension of variation (e.g. "Color"). Axes are shared
/// between products: a configurable product references axes, it never
/// owns them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantAxis {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    /// When set, allowed values come from the attribute subsystem.
    pub attribute_id: Option<Uuid>,
    /// Fixed value list used when no attribute is bound.
    pub options: Vec<String>,
    pub position: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum AxisError {
    #[error("Axis not found: {0}")]
    NotFound(Uuid),

    #[error("Duplicate axis code: {0}")]
    DuplicateCode(String),

    #[error("Axis {0} is inactive")]
    Inactive(String),

    #[error("Axis {0} has no allowed values")]
    NoValues(String),

    #[error("Attribute source failed: {0}")]
    Source(String),

    #[error("Axis catalog access failed: {0}")]
    Access(String),
}

/// Administers the set of variant axes.
pub struct AxisCatalog {
    axes: RwLock<HashMap<Uuid, VariantAxis>>,
}

impl AxisCatalog {
    pub fn new() -> Self {
        Self {
            axes: RwLock::new(HashMap::new()),
        }
    }

    pub fn create(
        &self,
        code: impl Into<String>,
        name: impl Into<String>,
        attribute_id: Option<Uuid>,
        options: Vec<String>,
        position: i32,
    ) -> Result<VariantAxis, AxisError> {
        let code = code.into();
        let mut axes = self
            .axes
            .write()
            .map_err(|e| AxisError::Access(e.to_string()))?;

        if axes.values().any(|a| a.code == code) {
            return Err(AxisError::DuplicateCode(code));
        }

        let axis = VariantAxis {
            id: Uuid::new_v4(),
            code,
            name: name.into(),
            attribute_id,
            options,
            position,
            is_active: true,
            created_at: Utc::now(),
        };
        axes.insert(axis.id, axis.clone());
        Ok(axis)
    }

    pub fn update(
        &self,
        id: Uuid,
        name: Option<String>,
        position: Option<i32>,
        options: Option<Vec<String>>,
    ) -> Result<VariantAxis, AxisError> {
        let mut axes = self
            .axes
            .write()
            .map_err(|e| AxisError::Access(e.to_string()))?;
        let axis = axes.get_mut(&id).ok_or(AxisError::NotFound(id))?;

        if let Some(name) = name {
            axis.name = name;
        }
        if let Some(position) = position {
            axis.position = position;
        }
        if let Some(options) = options {
            axis.options = options;
        }
        Ok(axis.clone())
    }

    pub fn deactivate(&self, id: Uuid) -> Result<(), AxisError> {
        let mut axes = self
            .axes
            .write()
            .map_err(|e| AxisError::Access(e.to_string()))?;
        let axis = axes.get_mut(&id).ok_or(AxisError::NotFound(id))?;
        axis.is_active = false;
        Ok(())
    }

    pub fn get(&self, id: Uuid) -> Result<VariantAxis, AxisError> {
        let axes = self
            .axes
            .read()
            .map_err(|e| AxisError::Access(e.to_string()))?;
        axes.get(&id).cloned().ok_or(AxisError::NotFound(id))
    }

    /// All axes, ordered by position then code.
    pub fn list(&self) -> Result<Vec<VariantAxis>, AxisError> {
        let axes = self
            .axes
            .read()
            .map_err(|e| AxisError::Access(e.to_string()))?;
        let mut all: Vec<VariantAxis> = axes.values().cloned().collect();
        all.sort_by(|a, b| a.position.cmp(&b.position).then_with(|| a.code.cmp(&b.code)));
        Ok(all)
    }

    /// Resolve the allowed values for an axis: the bound attribute's
    /// options when one is bound and known to the source, otherwise the
    /// axis's own fixed list.
    pub async fn allowed_values(
        &self,
        id: Uuid,
        source: &dyn AttributeSource,
    ) -> Result<Vec<String>, AxisError> {
        let axis = self.get(id)?;

        if let Some(attribute_id) = axis.attribute_id {
            let values = source
                .option_values(attribute_id)
                .await
                .map_err(|e| AxisError::Source(e.to_string()))?;
            if let Some(values) = values {
                if !values.is_empty() {
                    return Ok(values);
                }
            }
        }

        if axis.options.is_empty() {
            return Err(AxisError::NoValues(axis.code));
        }
        Ok(axis.options.clone())
    }
}

impl Default for AxisCatalog {
    fn default() -> Self {
        Self::new()
    }
}
