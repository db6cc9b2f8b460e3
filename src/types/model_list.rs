use serde::{Deserialize, Serialize};

/// One model known to the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    /// The model tag, e.g. `gemma3:1b`.
    pub name: String,
}

/// Response body for the `/models` endpoint (the Ollama tag list the
/// gateway proxies through).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelList {
    /// The available models.
    #[serde(default)]
    pub models: Vec<ModelInfo>,
}

impl ModelList {
    /// Returns the model names in listing order.
    pub fn names(&self) -> Vec<String> {
        self.models.iter().map(|m| m.name.clone()).collect()
    }
}
