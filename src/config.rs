//! Configuration types for the chat session and REPL.
//!
//! This module provides CLI argument parsing via `arrrg` and configuration
//! structures for controlling session behavior.

use arrrg_derive::CommandLine;

use crate::conversation::DEFAULT_PREAMBLE;

/// Default model tag the gateway ships with.
const DEFAULT_MODEL: &str = "gemma3:1b";

/// Default per-character reveal delay, in milliseconds.
const DEFAULT_REVEAL_DELAY_MS: u64 = 40;

/// Command-line arguments for the palaver-chat tool.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct ChatArgs {
    /// Gateway base URL.
    #[arrrg(optional, "Gateway base URL (default: http://localhost:5000/api)", "URL")]
    pub base_url: Option<String>,

    /// Model to use for chat.
    #[arrrg(optional, "Model to use (default: gemma3:1b)", "MODEL")]
    pub model: Option<String>,

    /// System preamble to set context for the conversation.
    #[arrrg(optional, "System preamble for the conversation", "PROMPT")]
    pub system: Option<String>,

    /// Use the blocking /chat endpoint instead of /chat/stream.
    #[arrrg(flag, "Fetch whole replies instead of streaming them")]
    pub no_stream: bool,

    /// Per-character reveal delay for non-streamed replies.
    #[arrrg(optional, "Reveal delay in ms per character (default: 40)", "MS")]
    pub reveal_delay_ms: Option<u64>,

    /// Request timeout in seconds.
    #[arrrg(optional, "Request timeout in seconds (default: 60)", "SECS")]
    pub timeout_secs: Option<u64>,
}

/// Configuration for a chat session.
///
/// This struct holds the resolved configuration values after processing
/// command-line arguments with appropriate defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatConfig {
    /// Gateway base URL, `None` for the built-in local default.
    pub base_url: Option<String>,

    /// The model tag sent with every request.
    pub model: String,

    /// The system preamble the conversation starts with.
    pub preamble: String,

    /// Whether replies arrive via the streaming endpoint.  When false the
    /// blocking endpoint is used and the reveal controller animates replies.
    pub streaming: bool,

    /// Per-character reveal delay in milliseconds.
    pub reveal_delay_ms: u64,

    /// Optional sampling temperature.
    pub temperature: Option<f32>,

    /// Optional top-p nucleus sampling value.
    pub top_p: Option<f32>,

    /// Optional top-k sampling limit.
    pub top_k: Option<u32>,

    /// Request timeout in seconds, `None` for the client default.
    pub timeout_secs: Option<u64>,
}

impl ChatConfig {
    /// Creates a new ChatConfig with default values.
    ///
    /// Defaults:
    /// - Model: gemma3:1b
    /// - Transport: streaming
    /// - Reveal delay: 40ms per character
    pub fn new() -> Self {
        Self {
            base_url: None,
            model: DEFAULT_MODEL.to_string(),
            preamble: DEFAULT_PREAMBLE.to_string(),
            streaming: true,
            reveal_delay_ms: DEFAULT_REVEAL_DELAY_MS,
            temperature: None,
            top_p: None,
            top_k: None,
            timeout_secs: None,
        }
    }

    /// Sets the gateway base URL.
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = Some(base_url);
        self
    }

    /// Sets the model tag.
    pub fn with_model(mut self, model: String) -> Self {
        self.model = model;
        self
    }

    /// Sets the system preamble.
    pub fn with_preamble(mut self, preamble: String) -> Self {
        self.preamble = preamble;
        self
    }

    /// Selects the blocking transport.
    pub fn without_streaming(mut self) -> Self {
        self.streaming = false;
        self
    }

    /// Sets the per-character reveal delay.
    pub fn with_reveal_delay_ms(mut self, delay_ms: u64) -> Self {
        self.reveal_delay_ms = delay_ms;
        self
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

    /// Sets the request timeout in seconds.
    pub fn with_timeout_secs(mut self, timeout_secs: Option<u64>) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl From<ChatArgs> for ChatConfig {
    fn from(args: ChatArgs) -> Self {
        ChatConfig {
            base_url: args.base_url,
            model: args.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            preamble: args.system.unwrap_or_else(|| DEFAULT_PREAMBLE.to_string()),
            streaming: !args.no_stream,
            reveal_delay_ms: args.reveal_delay_ms.unwrap_or(DEFAULT_REVEAL_DELAY_MS),
            timeout_secs: args.timeout_secs,
            ..ChatConfig::new()
        }
    }
}
