use serde::{Deserialize, Serialize};

/// Role of a chat message.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System role, used for the conversation preamble.
    System,

    /// User role.
    User,

    /// Assistant role.
    Assistant,
}

/// A single chat message.
///
/// `is_streaming` is true only for the one in-flight assistant placeholder
/// that is being filled in from a streamed response.  It is omitted from the
/// wire format when false.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// The role of the message.
    pub role: Role,

    /// The text content.  Mutable while streaming, fixed once finalized.
    pub content: String,

    /// Whether this message is still being streamed into.
    #[serde(
        default,
        rename = "isStreaming",
        skip_serializing_if = "std::ops::Not::not"
    )]
    pub is_streaming: bool,
}

impl Message {
    /// Create a new `Message` with the given role and content.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            is_streaming: false,
        }
    }

    /// Create a new system `Message`.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Create a new user `Message`.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create a new assistant `Message`.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Create the empty assistant placeholder that a stream fills in.
    pub fn streaming_placeholder() -> Self {
        Self {
            role: Role::Assistant,
            content: String::new(),
            is_streaming: true,
        }
    }
}

impl From<&str> for Message {
    fn from(content: &str) -> Self {
        Self::user(content)
    }
}

impl From<String> for Message {
    fn from(content: String) -> Self {
        Self::user(content)
    }
}
