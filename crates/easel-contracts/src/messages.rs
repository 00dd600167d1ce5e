use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::task::Task;

/// `type` tags carried by control messages.
pub mod kinds {
    pub const AUTH: &str = "auth";
    pub const AUTH_SUCCESS: &str = "auth_success";
    pub const MODELS_UPDATE: &str = "models_update";
    pub const TASK: &str = "task";
    pub const TASK_UPDATE: &str = "task_update";
    pub const GET_MODELS: &str = "get_models";
}

/// JSON text frame exchanged with the orchestration server:
/// `{"type": <kind>, "payload": <any JSON>}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub payload: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthRequest {
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthSuccess {
    pub token: String,
}

/// One entry of a `models_update` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvertisedModel {
    pub id: u32,
    pub name: String,
}

impl ControlMessage {
    pub fn new(kind: &str, payload: &impl Serialize) -> serde_json::Result<Self> {
        Ok(Self {
            kind: kind.to_string(),
            payload: serde_json::to_value(payload)?,
        })
    }

    pub fn auth(passcode: &str) -> serde_json::Result<Self> {
        Self::new(
            kinds::AUTH,
            &AuthRequest {
                password: passcode.to_string(),
            },
        )
    }

    pub fn models_update(models: &[AdvertisedModel]) -> serde_json::Result<Self> {
        Self::new(kinds::MODELS_UPDATE, &models)
    }

    pub fn task_update(task: &Task) -> serde_json::Result<Self> {
        Self::new(kinds::TASK_UPDATE, task)
    }

    pub fn get_models() -> Self {
        Self {
            kind: kinds::GET_MODELS.to_string(),
            payload: Value::Null,
        }
    }

    pub fn is(&self, kind: &str) -> bool {
        self.kind == kind
    }

    pub fn decode(raw: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(raw)
    }

    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Decode the payload into a typed body. A missing payload decodes as
    /// `null`, which fails for any struct-shaped body.
    pub fn payload_as<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        T::deserialize(&self.payload)
    }
}
