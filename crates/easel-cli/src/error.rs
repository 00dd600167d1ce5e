use easel_contracts::{EnvelopeError, TaskError};
use easel_engine::BackendError;
use thiserror::Error;

/// Errors that end one connection attempt. All of them are retried by the
/// supervisor.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("dial failed: {0}")]
    Dial(String),
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("model advertisement failed: {0}")]
    Advertise(String),
    #[error("connection closed: {0}")]
    ConnectionClosed(String),
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl SessionError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Dial(_) => "dial",
            Self::Auth(_) => "auth",
            Self::Advertise(_) => "advertise",
            Self::ConnectionClosed(_) => "connection_closed",
            Self::Protocol(_) => "protocol",
        }
    }
}

/// Errors scoped to a single task. Logged where they happen; the session
/// keeps reading frames.
#[derive(Debug, Error)]
pub enum TaskFailure {
    #[error("malformed task payload: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("invalid task: {0}")]
    Validation(#[from] TaskError),
    #[error("generation failed: {0}")]
    Backend(#[from] BackendError),
    #[error("failed to encode {what}: {source}")]
    Encode {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to package result: {0}")]
    Package(#[from] EnvelopeError),
    #[error("failed to send {what}: {source}")]
    Transmit {
        what: &'static str,
        #[source]
        source: tungstenite::Error,
    },
}
