//! Fakes shared by the unit tests in this crate.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use easel_contracts::{messages::kinds, ControlMessage, ModelConfig, ServerConfig, Task};
use easel_engine::{BackendError, ImageBackend};
use serde_json::Map;
use tungstenite::Message as WsMessage;

use crate::socket::FrameSink;

fn broken_pipe() -> tungstenite::Error {
    tungstenite::Error::Io(std::io::Error::from(std::io::ErrorKind::BrokenPipe))
}

/// Records every frame; optionally rejects the first `n` writes.
#[derive(Default)]
pub struct RecordingSink {
    frames: Mutex<Vec<WsMessage>>,
    reject_remaining: AtomicUsize,
}

impl RecordingSink {
    pub fn failing_first(n: usize) -> Self {
        Self {
            frames: Mutex::new(Vec::new()),
            reject_remaining: AtomicUsize::new(n),
        }
    }

    pub fn frames(&self) -> Vec<WsMessage> {
        self.frames.lock().expect("frames lock").clone()
    }
}

impl FrameSink for RecordingSink {
    fn send_frame(&self, message: WsMessage) -> Result<(), tungstenite::Error> {
        let rejected = self
            .reject_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if rejected {
            return Err(broken_pipe());
        }
        self.frames.lock().expect("frames lock").push(message);
        Ok(())
    }
}

/// Fails every write and counts attempts.
#[derive(Default)]
pub struct FailingSink {
    attempts: AtomicUsize,
}

impl FailingSink {
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl FrameSink for FailingSink {
    fn send_frame(&self, _message: WsMessage) -> Result<(), tungstenite::Error> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(broken_pipe())
    }
}

/// Backend returning canned bytes (or `NoImages`) and recording its calls.
pub struct StubBackend {
    image: Option<Vec<u8>>,
    calls: Mutex<Vec<(String, u32)>>,
}

impl StubBackend {
    pub fn returning(image: Vec<u8>) -> Self {
        Self {
            image: Some(image),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            image: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(String, u32)> {
        self.calls.lock().expect("calls lock").clone()
    }
}

impl ImageBackend for StubBackend {
    fn name(&self) -> &str {
        "stub"
    }

    fn generate(&self, prompt: &str, model_selector: u32) -> Result<Vec<u8>, BackendError> {
        self.calls
            .lock()
            .expect("calls lock")
            .push((prompt.to_string(), model_selector));
        self.image.clone().ok_or(BackendError::NoImages)
    }
}

/// Plain-websocket loopback server config with a keepalive slow enough to
/// stay out of the way.
pub fn server_config(port: u16) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: port.to_string(),
        passcode: "hunter2".to_string(),
        scheme: "ws".to_string(),
        path: "/ws".to_string(),
        connect_timeout_seconds: 2,
        write_timeout_seconds: 2,
        keepalive_seconds: 60,
        retry_delay_seconds: 0,
        request_models_on_connect: false,
        tls_insecure: false,
    }
}

pub fn sample_models() -> Vec<ModelConfig> {
    ["first", "second"]
        .into_iter()
        .map(|name| ModelConfig {
            name: name.to_string(),
            string_id: format!("{name}.safetensors"),
            width: 512,
            height: 512,
            steps: 20,
            cfgscale: 7.0,
            loras: None,
            loraweights: None,
            options: Map::new(),
        })
        .collect()
}

/// Decodes the `task_update` text frames among `frames`, in order.
pub fn task_updates(frames: &[WsMessage]) -> Vec<Task> {
    frames
        .iter()
        .filter_map(|frame| match frame {
            WsMessage::Text(text) => Some(text.as_str().as_bytes()),
            _ => None,
        })
        .map(|raw| ControlMessage::decode(raw).expect("control message"))
        .filter(|message| message.is(kinds::TASK_UPDATE))
        .map(|message| message.payload_as::<Task>().expect("task payload"))
        .collect()
}

fn find(haystack: &[u8], needle: &[u8]) -> usize {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
        .expect("needle present")
}

/// Pulls the task and image bytes out of a binary result frame.
pub fn split_envelope(frame: &WsMessage) -> (Task, Vec<u8>) {
    let WsMessage::Binary(bytes) = frame else {
        panic!("expected binary frame, got {frame:?}");
    };
    let line_end = find(bytes, b"\n");
    let header = std::str::from_utf8(&bytes[..line_end]).expect("ascii boundary line");
    let boundary = header.strip_prefix("Boundary: ").expect("boundary prefix");
    let body = &bytes[line_end + 1..];

    let delimiter = format!("\r\n--{boundary}");
    let task_start = find(body, b"\r\n\r\n") + 4;
    let task_end = task_start + find(&body[task_start..], delimiter.as_bytes());
    let task: Task = serde_json::from_slice(&body[task_start..task_end]).expect("task part");

    let rest = &body[task_end + delimiter.len()..];
    let file_start = find(rest, b"\r\n\r\n") + 4;
    let file_end = file_start + find(&rest[file_start..], delimiter.as_bytes());
    (task, rest[file_start..file_end].to_vec())
}
