use std::time::{Duration, Instant};

use easel_contracts::{ApiConfig, ModelCatalog, ModelConfig, ModelSelector, SelectorError};
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::debug;

const ERROR_BODY_MAX_CHARS: usize = 512;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error(transparent)]
    UnknownModel(#[from] SelectorError),
    #[error("{context} request failed: {source}")]
    Http {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{context} request failed ({code}): {body}")]
    Status {
        context: &'static str,
        code: u16,
        body: String,
    },
    #[error("{context} returned invalid JSON payload: {source}")]
    Decode {
        context: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("no images returned from response")]
    NoImages,
}

/// Black-box image generator invoked once per text-to-image task.
pub trait ImageBackend: Send + Sync {
    fn name(&self) -> &str;
    fn generate(&self, prompt: &str, model_selector: u32) -> Result<Vec<u8>, BackendError>;
}

/// Client for the local generation service's session/generate/view API.
pub struct HttpBackend {
    api_base: String,
    http: HttpClient,
    selector: ModelSelector,
}

impl HttpBackend {
    pub fn new(api: &ApiConfig, catalog: ModelCatalog) -> Result<Self, BackendError> {
        let http = HttpClient::builder()
            .timeout(api.timeout())
            .build()
            .map_err(|source| BackendError::Http {
                context: "http client",
                source,
            })?;
        Ok(Self {
            api_base: api.base_url(),
            http,
            selector: ModelSelector::new(catalog),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path.trim_start_matches('/'))
    }

    fn new_session(&self) -> Result<String, BackendError> {
        const CONTEXT: &str = "GetNewSession";
        let response = self
            .http
            .post(self.endpoint("/API/GetNewSession"))
            .json(&json!({}))
            .send()
            .map_err(|source| BackendError::Http {
                context: CONTEXT,
                source,
            })?;
        let payload = response_json_or_error(CONTEXT, response)?;
        payload
            .get("session_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| BackendError::Status {
                context: CONTEXT,
                code: 200,
                body: "response missing session_id".to_string(),
            })
    }

    fn generate_image_url(
        &self,
        session_id: &str,
        prompt: &str,
        model: &ModelConfig,
    ) -> Result<String, BackendError> {
        const CONTEXT: &str = "GenerateText2Image";
        let body = generate_body(session_id, prompt, model);
        let response = self
            .http
            .post(self.endpoint("/API/GenerateText2Image"))
            .json(&body)
            .send()
            .map_err(|source| BackendError::Http {
                context: CONTEXT,
                source,
            })?;
        let payload = response_json_or_error(CONTEXT, response)?;
        let first = payload
            .get("images")
            .and_then(Value::as_array)
            .and_then(|rows| rows.first())
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or(BackendError::NoImages)?;
        if first.starts_with("http://") || first.starts_with("https://") {
            return Ok(first.to_string());
        }
        Ok(self.endpoint(first))
    }

    fn download_image(&self, url: &str) -> Result<Vec<u8>, BackendError> {
        const CONTEXT: &str = "image download";
        let response = self
            .http
            .get(url)
            .send()
            .map_err(|source| BackendError::Http {
                context: CONTEXT,
                source,
            })?;
        if !response.status().is_success() {
            let code = response.status().as_u16();
            let body = response
                .text()
                .unwrap_or_else(|err| format!("<unreadable body: {err}>"));
            return Err(BackendError::Status {
                context: CONTEXT,
                code,
                body: truncate_text(&body, ERROR_BODY_MAX_CHARS),
            });
        }
        let bytes = response.bytes().map_err(|source| BackendError::Http {
            context: CONTEXT,
            source,
        })?;
        Ok(bytes.to_vec())
    }
}

impl ImageBackend for HttpBackend {
    fn name(&self) -> &str {
        "http"
    }

    fn generate(&self, prompt: &str, model_selector: u32) -> Result<Vec<u8>, BackendError> {
        let selection = self.selector.select(model_selector)?;
        let started = Instant::now();
        let session_id = self.new_session()?;
        let image_url = self.generate_image_url(&session_id, prompt, selection.model)?;
        let bytes = self.download_image(&image_url)?;
        debug!(
            model = %selection.model.name,
            bytes = bytes.len(),
            elapsed_ms = duration_ms(started.elapsed()),
            "image generated"
        );
        Ok(bytes)
    }
}

/// Request body for `GenerateText2Image`. Free-form model options are merged
/// last and may override the typed fields.
fn generate_body(session_id: &str, prompt: &str, model: &ModelConfig) -> Map<String, Value> {
    let mut body = Map::new();
    body.insert("session_id".to_string(), json!(session_id));
    body.insert("images".to_string(), json!(1));
    body.insert("prompt".to_string(), json!(prompt));
    body.insert("model".to_string(), json!(model.string_id));
    body.insert("width".to_string(), json!(model.width));
    body.insert("height".to_string(), json!(model.height));
    body.insert("steps".to_string(), json!(model.steps));
    body.insert("cfgscale".to_string(), json!(model.cfgscale));
    if let Some(loras) = model
        .loras
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
    {
        body.insert("loras".to_string(), json!(loras));
    }
    if let Some(weight) = model.loraweights.filter(|value| *value != 0.0) {
        body.insert("loraweights".to_string(), json!(weight));
    }
    for (key, value) in &model.options {
        body.insert(key.clone(), value.clone());
    }
    body
}

fn response_json_or_error(
    context: &'static str,
    response: HttpResponse,
) -> Result<Value, BackendError> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .map_err(|source| BackendError::Http { context, source })?;
    if !status.is_success() {
        return Err(BackendError::Status {
            context,
            code,
            body: truncate_text(&body, ERROR_BODY_MAX_CHARS),
        });
    }
    serde_json::from_str(&body).map_err(|source| BackendError::Decode { context, source })
}

/// Whole milliseconds, saturating at `u64::MAX`.
pub fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
