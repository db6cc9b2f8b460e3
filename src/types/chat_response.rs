use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{Message, Role};

/// The nested `message` object in a non-streamed chat response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMessage {
    /// The role of the reply.  The gateway always answers as the assistant;
    /// tolerate its absence.
    #[serde(default = "assistant_role")]
    pub role: Role,

    /// The full reply text.
    pub content: String,
}

fn assistant_role() -> Role {
    Role::Assistant
}

/// Response body for the non-streamed `/chat` endpoint.
///
/// The gateway answers with either `{"message": {...}}` or `{"error": ...}`,
/// so both fields are optional and exactly one is expected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    /// The assistant's reply, when the request succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<ResponseMessage>,

    /// The gateway's error string, when it failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ChatResponse {
    /// Converts the response into a finalized assistant [`Message`], turning
    /// a gateway-level `error` field into an [`Error::Api`].
    pub fn into_message(self) -> Result<Message> {
        if let Some(error) = self.error {
            return Err(Error::api(200, error));
        }
        let message = self.message.ok_or_else(|| {
            Error::serialization("chat response carried neither message nor error", None)
        })?;
        Ok(Message::new(message.role, message.content))
    }
}
