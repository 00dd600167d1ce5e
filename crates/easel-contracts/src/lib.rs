pub mod config;
pub mod envelope;
pub mod messages;
pub mod models;
pub mod task;

pub use config::{load_config, ApiConfig, ConfigError, ModelConfig, ServerConfig, WorkerConfig};
pub use envelope::{EnvelopeError, ResultEnvelope};
pub use messages::{AdvertisedModel, AuthRequest, AuthSuccess, ControlMessage};
pub use models::{ModelCatalog, ModelSelection, ModelSelector, SelectorError};
pub use task::{Task, TaskError, TaskKind, TaskStatus};
