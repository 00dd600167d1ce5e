use std::io::Read;

use reqwest::blocking::multipart::{Form, Part};
use thiserror::Error;

use crate::task::Task;

pub const BOUNDARY_HEADER: &str = "Boundary: ";
pub const TASK_FIELD: &str = "task";
pub const FILE_FIELD: &str = "file";
const FILE_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("failed to encode task part: {0}")]
    EncodeTask(#[from] serde_json::Error),
    #[error("invalid file part content type: {0}")]
    ContentType(#[source] reqwest::Error),
    #[error("failed to render multipart body: {0}")]
    Render(#[from] std::io::Error),
}

/// Binary result frame: a `Boundary: <token>\n` line followed by a
/// `multipart/form-data` body with a `task` field and a `file` part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultEnvelope {
    boundary: String,
    bytes: Vec<u8>,
}

impl ResultEnvelope {
    pub fn pack(task: &Task, image: &[u8]) -> Result<Self, EnvelopeError> {
        let mut task_json = serde_json::to_string(task)?;
        task_json.push('\n');

        let file = Part::bytes(image.to_vec())
            .file_name(task.image_file_name())
            .mime_str(FILE_CONTENT_TYPE)
            .map_err(EnvelopeError::ContentType)?;
        let form = Form::new().text(TASK_FIELD, task_json).part(FILE_FIELD, file);

        let boundary = form.boundary().to_string();
        let mut bytes = format!("{BOUNDARY_HEADER}{boundary}\n").into_bytes();
        form.into_reader().read_to_end(&mut bytes)?;
        Ok(Self { boundary, bytes })
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}
