use thiserror::Error;

use super::registry::ModelCatalog;
use crate::config::ModelConfig;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectorError {
    #[error("model selector {selector} out of range (1..={available})")]
    OutOfRange { selector: u32, available: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelSelection<'a> {
    pub selector: u32,
    pub model: &'a ModelConfig,
}

/// Validates task model selectors against the local catalog.
#[derive(Debug, Clone)]
pub struct ModelSelector {
    pub catalog: ModelCatalog,
}

impl ModelSelector {
    pub fn new(catalog: ModelCatalog) -> Self {
        Self { catalog }
    }

    pub fn select(&self, selector: u32) -> Result<ModelSelection<'_>, SelectorError> {
        let Some(model) = self.catalog.get(selector) else {
            return Err(SelectorError::OutOfRange {
                selector,
                available: self.catalog.len(),
            });
        };
        Ok(ModelSelection { selector, model })
    }
}
