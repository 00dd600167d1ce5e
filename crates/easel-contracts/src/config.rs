use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "./config.yaml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level worker configuration document.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WorkerConfig {
    pub server: ServerConfig,
    pub api: ApiConfig,
    #[serde(default)]
    pub models: Vec<ModelConfig>,
}

/// Orchestration server endpoint plus connection tuning.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    #[serde(deserialize_with = "de_port")]
    pub port: String,
    #[serde(default)]
    pub passcode: String,
    #[serde(default = "default_scheme")]
    pub scheme: String,
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default = "default_connect_timeout_seconds")]
    pub connect_timeout_seconds: u64,
    #[serde(default = "default_write_timeout_seconds")]
    pub write_timeout_seconds: u64,
    #[serde(default = "default_keepalive_seconds")]
    pub keepalive_seconds: u64,
    #[serde(default = "default_retry_delay_seconds")]
    pub retry_delay_seconds: u64,
    #[serde(default)]
    pub request_models_on_connect: bool,
    /// Skip server certificate verification on `wss` connections. Only for
    /// orchestration servers running with self-signed certificates.
    #[serde(default)]
    pub tls_insecure: bool,
}

/// Local image-generation service.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    #[serde(default, deserialize_with = "de_port")]
    pub port: String,
    #[serde(default = "default_api_timeout", alias = "timeout_seconds")]
    pub timeout: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ModelConfig {
    pub name: String,
    /// Backend identifier of the model (`string` in the config document).
    #[serde(rename = "string", alias = "string_id")]
    pub string_id: String,
    pub width: u32,
    pub height: u32,
    pub steps: u32,
    pub cfgscale: f64,
    #[serde(default)]
    pub loras: Option<String>,
    #[serde(default)]
    pub loraweights: Option<f64>,
    /// Every other key is forwarded verbatim to the backend.
    #[serde(flatten)]
    pub options: Map<String, Value>,
}

impl ServerConfig {
    pub fn url(&self) -> String {
        let path = if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };
        if self.port.is_empty() {
            return format!("{}://{}{}", self.scheme, self.host, path);
        }
        format!("{}://{}:{}{}", self.scheme, self.host, self.port, path)
    }

    pub fn authority(&self) -> String {
        if self.port.is_empty() {
            let port = if self.scheme == "ws" { 80 } else { 443 };
            return format!("{}:{}", self.host, port);
        }
        format!("{}:{}", self.host, self.port)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds.max(1))
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_seconds.max(1))
    }

    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.keepalive_seconds.max(1))
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_seconds)
    }
}

impl ApiConfig {
    pub fn base_url(&self) -> String {
        if self.port.is_empty() {
            return format!("http://{}", self.host);
        }
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

impl WorkerConfig {
    pub fn from_yaml(raw: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: WorkerConfig =
            serde_yaml::from_str(raw).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.host.trim().is_empty() {
            return Err(ConfigError::Invalid("server.host is empty".to_string()));
        }
        if !matches!(self.server.scheme.as_str(), "ws" | "wss") {
            return Err(ConfigError::Invalid(format!(
                "server.scheme must be ws or wss, got '{}'",
                self.server.scheme
            )));
        }
        if self.api.host.trim().is_empty() {
            return Err(ConfigError::Invalid("api.host is empty".to_string()));
        }
        if self.models.is_empty() {
            return Err(ConfigError::Invalid("no models configured".to_string()));
        }
        for (idx, model) in self.models.iter().enumerate() {
            if model.name.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "models[{idx}].name is empty"
                )));
            }
            if model.string_id.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "models[{idx}].string is empty"
                )));
            }
        }
        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<WorkerConfig, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    WorkerConfig::from_yaml(&raw, path)
}

/// Ports show up both quoted and bare in hand-written YAML.
fn de_port<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Text(String),
        Number(u64),
    }
    Ok(match Port::deserialize(deserializer)? {
        Port::Text(text) => text.trim().to_string(),
        Port::Number(number) => number.to_string(),
    })
}

fn default_scheme() -> String {
    "wss".to_string()
}

fn default_path() -> String {
    "/ws".to_string()
}

fn default_connect_timeout_seconds() -> u64 {
    10
}

fn default_write_timeout_seconds() -> u64 {
    10
}

fn default_keepalive_seconds() -> u64 {
    10
}

fn default_retry_delay_seconds() -> u64 {
    5
}

fn default_api_timeout() -> u64 {
    120
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::time::Duration;

    use serde_json::json;

    use super::{load_config, ConfigError, WorkerConfig};

    const SAMPLE: &str = r#"
server:
  host: orchestrator.example
  port: "8443"
  passcode: hunter2
api:
  host: 127.0.0.1
  port: 7801
  timeout: 30
models:
  - name: demo
    string: sdxl/base.safetensors
    width: 1024
    height: 768
    steps: 30
    cfgscale: 7
    loras: detail_tweaker
    loraweights: 0.5
    sampler: euler
    refinercontrol: 0.2
  - name: plain
    string: sd15/plain.ckpt
    width: 512
    height: 512
    steps: 20
    cfgscale: 6.5
"#;

    #[test]
    fn parses_sample_document_with_defaults() -> anyhow::Result<()> {
        let config = WorkerConfig::from_yaml(SAMPLE, Path::new("config.yaml"))?;
        assert_eq!(config.server.url(), "wss://orchestrator.example:8443/ws");
        assert_eq!(config.server.passcode, "hunter2");
        assert_eq!(config.server.keepalive_interval(), Duration::from_secs(10));
        assert_eq!(config.server.retry_delay(), Duration::from_secs(5));
        assert!(!config.server.request_models_on_connect);
        assert!(!config.server.tls_insecure);
        assert_eq!(config.api.base_url(), "http://127.0.0.1:7801");
        assert_eq!(config.api.timeout(), Duration::from_secs(30));

        let demo = &config.models[0];
        assert_eq!(demo.string_id, "sdxl/base.safetensors");
        assert_eq!(demo.height, 768);
        assert_eq!(demo.cfgscale, 7.0);
        assert_eq!(demo.loras.as_deref(), Some("detail_tweaker"));
        assert_eq!(demo.loraweights, Some(0.5));
        assert_eq!(demo.options.get("sampler"), Some(&json!("euler")));
        assert_eq!(demo.options.get("refinercontrol"), Some(&json!(0.2)));
        assert!(!demo.options.contains_key("name"));

        let plain = &config.models[1];
        assert_eq!(plain.loras, None);
        assert!(plain.options.is_empty());
        Ok(())
    }

    #[test]
    fn load_reads_from_disk() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("config.yaml");
        std::fs::write(&path, SAMPLE)?;
        let config = load_config(&path)?;
        assert_eq!(config.models.len(), 2);
        Ok(())
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = load_config(Path::new("/definitely/not/here.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn malformed_yaml_is_a_parse_error() {
        let err = WorkerConfig::from_yaml("server: [", Path::new("bad.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn empty_model_list_is_rejected() {
        let raw = r#"
server: {host: a, port: 1}
api: {host: b}
models: []
"#;
        let err = WorkerConfig::from_yaml(raw, Path::new("x.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn unknown_scheme_is_rejected() {
        let raw = r#"
server: {host: a, port: 1, scheme: http}
api: {host: b}
models:
  - {name: m, string: s, width: 1, height: 1, steps: 1, cfgscale: 1}
"#;
        let err = WorkerConfig::from_yaml(raw, Path::new("x.yaml")).unwrap_err();
        assert!(err.to_string().contains("scheme"));
    }

    #[test]
    fn tls_verification_can_be_disabled() -> anyhow::Result<()> {
        let raw = r#"
server: {host: orchestrator.local, port: 8443, tls_insecure: true}
api: {host: b}
models:
  - {name: m, string: s, width: 1, height: 1, steps: 1, cfgscale: 1}
"#;
        let config = WorkerConfig::from_yaml(raw, Path::new("x.yaml"))?;
        assert!(config.server.tls_insecure);
        assert_eq!(config.server.url(), "wss://orchestrator.local:8443/ws");
        Ok(())
    }

    #[test]
    fn plain_scheme_and_empty_api_port() -> anyhow::Result<()> {
        let raw = r#"
server: {host: 127.0.0.1, port: 9000, scheme: ws, path: socket}
api: {host: "localhost:7801", timeout_seconds: 5}
models:
  - {name: m, string_id: s, width: 1, height: 1, steps: 1, cfgscale: 1}
"#;
        let config = WorkerConfig::from_yaml(raw, Path::new("x.yaml"))?;
        assert_eq!(config.server.url(), "ws://127.0.0.1:9000/socket");
        assert_eq!(config.server.authority(), "127.0.0.1:9000");
        assert_eq!(config.api.base_url(), "http://localhost:7801");
        assert_eq!(config.api.timeout, 5);
        assert_eq!(config.models[0].string_id, "s");
        Ok(())
    }
}
