mod registry;
mod selectors;

pub use registry::ModelCatalog;
pub use selectors::{ModelSelection, ModelSelector, SelectorError};
