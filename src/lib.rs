// Public modules
pub mod client;
pub mod config;
pub mod conversation;
pub mod error;
pub mod notify;
pub mod observability;
pub mod session;
pub mod sse;
pub mod typewriter;
pub mod types;

// Re-exports
pub use client::Gateway;
pub use config::{ChatArgs, ChatConfig};
pub use conversation::{Conversation, DEFAULT_PREAMBLE};
pub use error::{Error, Result};
pub use notify::{Notifier, NullNotifier};
pub use session::{ChatSession, ERROR_REPLY, Phase};
pub use typewriter::{RevealStep, RevealStream, Typewriter};
pub use types::*;
