use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskKind {
    #[serde(rename = "TTI")]
    TextToImage,
    #[serde(rename = "LLM")]
    LanguageModel,
    #[serde(rename = "RECON")]
    Recognition,
}

impl TaskKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TextToImage => "TTI",
            Self::LanguageModel => "LLM",
            Self::Recognition => "RECON",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    #[error("invalid task id: nil uuid")]
    NilId,
}

/// One unit of work received from the orchestration server.
///
/// Field names follow the wire format (`uuid`, `type`, `model`), so a task
/// decoded from a `task` frame re-encodes to the same JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    #[serde(rename = "uuid")]
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: TaskKind,
    pub prompt: String,
    /// 1-based index into the locally configured model list.
    #[serde(rename = "model")]
    pub model_selector: u32,
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
    #[serde(default)]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub status: TaskStatus,
}

impl Task {
    pub fn new(kind: TaskKind, prompt: impl Into<String>, model_selector: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            prompt: prompt.into(),
            model_selector,
            metadata: Some(Map::new()),
            created_at: Utc::now(),
            status: TaskStatus::Pending,
        }
    }

    pub fn update_status(&mut self, status: TaskStatus) {
        self.status = status;
    }

    pub fn add_metadata(&mut self, key: impl Into<String>, value: Value) {
        self.metadata
            .get_or_insert_with(Map::new)
            .insert(key.into(), value);
    }

    pub fn get_metadata(&self, key: &str) -> Option<&Value> {
        self.metadata.as_ref()?.get(key)
    }

    pub fn validate(&self) -> Result<(), TaskError> {
        if self.id.is_nil() {
            return Err(TaskError::NilId);
        }
        Ok(())
    }

    /// File name used for the image part of the result envelope.
    pub fn image_file_name(&self) -> String {
        format!("{}.png", self.id)
    }
}
