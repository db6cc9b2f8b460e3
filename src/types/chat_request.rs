use serde::{Deserialize, Serialize};

use crate::types::Message;

/// Request body for the `/chat` and `/chat/stream` endpoints.
///
/// The gateway forwards `temperature`, `top_p`, and `top_k` to the model
/// when present; they are omitted from the body otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    /// The conversation history, in chat order.
    pub messages: Vec<Message>,

    /// The model to generate with, e.g. `gemma3:1b`.
    pub model: String,

    /// Optional sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Optional top-p nucleus sampling value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    /// Optional top-k sampling limit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
}

impl ChatRequest {
    /// Create a new `ChatRequest` with the given history and model.
    pub fn new(messages: Vec<Message>, model: impl Into<String>) -> Self {
        Self {
            messages,
            model: model.into(),
            temperature: None,
            top_p: None,
            top_k: None,
        }
    }

    /// Sets the sampling temperature.
    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    /// Sets the top-p value.
    pub fn with_top_p(mut self, top_p: Option<f32>) -> Self {
        self.top_p = top_p;
        self
    }

    /// Sets the top-k value.
    pub fn with_top_k(mut self, top_k: Option<u32>) -> Self {
        self.top_k = top_k;
        self
    }
}
