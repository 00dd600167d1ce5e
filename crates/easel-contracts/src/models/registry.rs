use std::sync::Arc;

use crate::config::ModelConfig;
use crate::messages::AdvertisedModel;

/// Ordered, read-only view of the locally configured models.
///
/// Selectors are 1-based: selector `n` refers to `models[n - 1]`. The list is
/// loaded once at startup and shared between the session and the backend.
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    models: Arc<[ModelConfig]>,
}

impl ModelCatalog {
    pub fn new(models: Vec<ModelConfig>) -> Self {
        Self {
            models: models.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn get(&self, selector: u32) -> Option<&ModelConfig> {
        let index = usize::try_from(selector).ok()?.checked_sub(1)?;
        self.models.get(index)
    }

    pub fn list(&self) -> impl Iterator<Item = &ModelConfig> {
        self.models.iter()
    }

    /// Payload of the `models_update` message sent after authentication.
    pub fn advertisement(&self) -> Vec<AdvertisedModel> {
        self.models
            .iter()
            .zip(1u32..)
            .map(|(model, id)| AdvertisedModel {
                id,
                name: model.name.clone(),
            })
            .collect()
    }
}
