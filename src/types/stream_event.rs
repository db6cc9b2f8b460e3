use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One decoded event from the `/chat/stream` wire.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// An incremental fragment of the assistant's reply.
    Fragment(String),

    /// Terminal marker: the reply is complete.
    Done,
}

/// The raw JSON payload carried by one `data:` line.
///
/// The gateway emits `{"message": {"content": ...}}` for fragments,
/// `{"done": true}` at the end, and `{"error": ...}` when the upstream
/// model fails mid-stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamPayload {
    /// Fragment carrier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<StreamFragment>,

    /// Terminal marker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub done: Option<bool>,

    /// Upstream error, reported in-band.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The nested `message` object of a fragment payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamFragment {
    /// The fragment text.  Absent content is treated as empty.
    #[serde(default)]
    pub content: String,
}

impl StreamPayload {
    /// Classifies the payload into a [`StreamEvent`].
    ///
    /// In-band `error` payloads become [`Error::Streaming`].  A payload with
    /// neither field decodes to an empty fragment, matching how the gateway
    /// pads keep-alive lines.
    pub fn into_event(self) -> Result<StreamEvent> {
        if let Some(error) = self.error {
            return Err(Error::streaming(error, None));
        }
        if self.done == Some(true) {
            return Ok(StreamEvent::Done);
        }
        let content = self.message.map(|m| m.content).unwrap_or_default();
        Ok(StreamEvent::Fragment(content))
    }
}
