//! The conversation state store.
//!
//! [`Conversation`] exclusively owns the ordered message sequence.  Every
//! mutation goes through its operation set, and each operation preserves the
//! structural invariant that at most one message is streaming at a time.

use crate::error::{Error, Result};
use crate::types::{Message, Role};

/// The fixed system preamble a fresh conversation starts with.
pub const DEFAULT_PREAMBLE: &str = "You are a helpful AI assistant.";

/// An ordered chat transcript: one system preamble followed by alternating
/// user and assistant messages, in insertion order.
///
/// At most one message (always the last) may have `is_streaming` set.
/// That placeholder is the only message whose content mutates after
/// insertion, and only via [`Conversation::append_fragment`].
#[derive(Debug, Clone)]
pub struct Conversation {
    messages: Vec<Message>,
    preamble: String,
}

impl Conversation {
    /// Creates a conversation holding only the default system preamble.
    pub fn new() -> Self {
        Self::with_preamble(DEFAULT_PREAMBLE)
    }

    /// Creates a conversation with a custom system preamble.
    pub fn with_preamble(preamble: impl Into<String>) -> Self {
        let preamble = preamble.into();
        Self {
            messages: vec![Message::system(preamble.clone())],
            preamble,
        }
    }

    /// The full message sequence, in chat order.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// The number of messages, preamble included.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Always false: the preamble is never removed.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// The most recent message.
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// The in-flight streaming placeholder, if one exists.
    pub fn streaming(&self) -> Option<&Message> {
        self.messages.last().filter(|m| m.is_streaming)
    }

    /// Snapshot of the history suitable for a request body.
    ///
    /// Excludes the streaming placeholder: the backend must not see the
    /// partial reply it is itself producing.
    pub fn history(&self) -> Vec<Message> {
        self.messages
            .iter()
            .filter(|m| !m.is_streaming)
            .cloned()
            .collect()
    }

    /// Appends a user message.
    pub fn append_user(&mut self, text: impl Into<String>) {
        self.messages.push(Message::user(text));
    }

    /// Appends an already-finalized assistant message.
    pub fn append_assistant(&mut self, text: impl Into<String>) {
        self.messages.push(Message::assistant(text));
    }

    /// Inserts the one empty assistant placeholder a stream will fill in.
    ///
    /// Errors if a placeholder is already in flight; succeeding would break
    /// the single-streaming-message invariant.
    pub fn begin_streaming_assistant(&mut self) -> Result<()> {
        if self.streaming().is_some() {
            return Err(Error::validation(
                "a streaming assistant message is already in flight",
                None,
            ));
        }
        self.messages.push(Message::streaming_placeholder());
        Ok(())
    }

    /// Concatenates a fragment onto the streaming placeholder.
    ///
    /// The placeholder must be the last message; anything else means a
    /// caller mutated the transcript out from under the stream.
    pub fn append_fragment(&mut self, fragment: &str) -> Result<()> {
        match self.messages.last_mut() {
            Some(last) if last.is_streaming => {
                last.content.push_str(fragment);
                Ok(())
            }
            _ => Err(Error::validation(
                "no streaming assistant message to append to",
                None,
            )),
        }
    }

    /// Clears the streaming flag on the placeholder, fixing its content.
    ///
    /// Calling this when nothing is streaming is a no-op, so finalizing
    /// twice is safe.
    pub fn finalize(&mut self) {
        if let Some(last) = self.messages.last_mut() {
            last.is_streaming = false;
        }
    }

    /// Replaces a failed reply with a plain assistant error message.
    ///
    /// If the last message is still the streaming placeholder it is removed
    /// first; otherwise the error message is simply appended.
    pub fn replace_with_error(&mut self, text: impl Into<String>) {
        if self.streaming().is_some() {
            self.messages.pop();
        }
        self.messages.push(Message::assistant(text));
    }

    /// Truncates the conversation back to the single system preamble.
    pub fn reset(&mut self) {
        self.messages.clear();
        self.messages.push(Message::system(self.preamble.clone()));
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}
