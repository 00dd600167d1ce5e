use std::sync::Arc;
use std::time::Instant;

use easel_contracts::{ControlMessage, ModelSelector, ResultEnvelope, Task, TaskKind, TaskStatus};
use easel_engine::{duration_ms, ImageBackend};
use serde_json::Value;
use tracing::{debug, info, warn};
use tungstenite::Message as WsMessage;

use crate::error::TaskFailure;
use crate::socket::FrameSink;

/// Runs tasks received on the dispatch loop and writes their status frames
/// and result envelopes back to the server.
pub struct TaskExecutor {
    selector: ModelSelector,
    backend: Arc<dyn ImageBackend>,
}

impl TaskExecutor {
    pub fn new(selector: ModelSelector, backend: Arc<dyn ImageBackend>) -> Self {
        Self { selector, backend }
    }

    /// Handles one `task` payload. Failures are logged here and never end
    /// the session.
    pub fn handle_payload(&self, sink: &impl FrameSink, payload: &Value) {
        let task = match decode_task(payload) {
            Ok(task) => task,
            Err(err) => {
                warn!(error = %err, "dropping task");
                return;
            }
        };
        match task.kind {
            TaskKind::TextToImage => {
                let task_id = task.id;
                if let Err(err) = self.run_text_to_image(sink, task) {
                    warn!(%task_id, error = %err, "task failed");
                }
            }
            TaskKind::LanguageModel | TaskKind::Recognition => {
                debug!(task_id = %task.id, kind = %task.kind, "no handler for task kind; ignoring");
            }
        }
    }

    fn run_text_to_image(&self, sink: &impl FrameSink, mut task: Task) -> Result<(), TaskFailure> {
        let started = Instant::now();
        task.update_status(TaskStatus::Processing);
        if let Err(err) = send_update(sink, &task) {
            warn!(task_id = %task.id, error = %err, "failed to report processing status");
        }

        let image = match self.generate(&task) {
            Ok(image) => image,
            Err(err) => {
                task.update_status(TaskStatus::Failed);
                if let Err(send_err) = send_update(sink, &task) {
                    warn!(task_id = %task.id, error = %send_err, "failed to report failed status");
                }
                return Err(err);
            }
        };

        // The envelope keeps status PROCESSING; the server finalizes on receipt.
        let envelope = ResultEnvelope::pack(&task, &image)?;
        let size = envelope.as_bytes().len();
        sink.send_frame(WsMessage::Binary(envelope.into_bytes().into()))
            .map_err(|source| TaskFailure::Transmit {
                what: "result envelope",
                source,
            })?;
        info!(
            task_id = %task.id,
            model = task.model_selector,
            bytes = size,
            elapsed_ms = duration_ms(started.elapsed()),
            "task completed"
        );
        Ok(())
    }

    fn generate(&self, task: &Task) -> Result<Vec<u8>, TaskFailure> {
        let selection = self
            .selector
            .select(task.model_selector)
            .map_err(easel_engine::BackendError::from)?;
        debug!(
            task_id = %task.id,
            backend = self.backend.name(),
            model = %selection.model.name,
            "generating image"
        );
        Ok(self.backend.generate(&task.prompt, selection.selector)?)
    }
}

fn decode_task(payload: &Value) -> Result<Task, TaskFailure> {
    let task: Task = serde_json::from_value(payload.clone()).map_err(TaskFailure::Decode)?;
    task.validate()?;
    Ok(task)
}

fn send_update(sink: &impl FrameSink, task: &Task) -> Result<(), TaskFailure> {
    let text = ControlMessage::task_update(task)
        .and_then(|message| message.encode())
        .map_err(|source| TaskFailure::Encode {
            what: "task_update",
            source,
        })?;
    sink.send_frame(WsMessage::Text(text.into()))
        .map_err(|source| TaskFailure::Transmit {
            what: "task_update",
            source,
        })
}
