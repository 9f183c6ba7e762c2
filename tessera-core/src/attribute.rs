use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

/// Source of allowed option values for attribute-bound variant axes.
/// Backed by the attribute subsystem in production; the engine only
/// ever reads from it.
#[async_trait]
pub trait AttributeSource: Send + Sync {
    /// Allowed values for the attribute, or `None` if the attribute is
    /// unknown to the source.
    async fn option_values(
        &self,
        attribute_id: Uuid,
    ) -> Result<Option<Vec<String>>, Box<dyn std::error::Error + Send + Sync>>;
}

/// Fixed-map attribute source for tests and standalone deployments.
pub struct StaticAttributeSource {
    options: RwLock<HashMap<Uuid, Vec<String>>>,
}

impl StaticAttributeSource {
    pub fn new() -> Self {
        Self {
            options: RwLock::new(HashMap::new()),
        }
    }

    pub fn set_options(&self, attribute_id: Uuid, values: Vec<String>) {
        if let Ok(mut options) = self.options.write() {
            options.insert(attribute_id, values);
        }
    }
}

impl Default for StaticAttributeSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AttributeSource for StaticAttributeSource {
    async fn option_values(
        &self,
        attribute_id: Uuid,
    ) -> Result<Option<Vec<String>>, Box<dyn std::error::Error + Send + Sync>> {
        let options = self
            .options
            .read()
            .map_err(|e| format!("attribute source access failed: {}", e))?;
        Ok(options.get(&attribute_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_configured_values() {
        let source = StaticAttributeSource::new();
        let color = Uuid::new_v4();
        source.set_options(color, vec!["Red".to_string(), "Blue".to_string()]);

        let values = source.option_values(color).await.unwrap().unwrap();
        assert_eq!(values, vec!["Red", "Blue"]);

        assert!(source.option_values(Uuid::new_v4()).await.unwrap().is_none());
    }
}
