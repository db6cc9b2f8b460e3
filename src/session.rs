//! Core chat session management.
//!
//! [`ChatSession`] owns the conversation store and drives one request at a
//! time through the phase machine `Idle -> Connecting -> Streaming ->
//! {Completed, Failed}`.  Failures never escape as errors from `submit`;
//! they land in the conversation as the fixed error reply plus a
//! notification, exactly once per request.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::StreamExt;

use crate::client::Gateway;
use crate::config::ChatConfig;
use crate::conversation::Conversation;
use crate::error::Result;
use crate::notify::{Notifier, NullNotifier};
use crate::observability::{
    SESSION_FAILURES, SESSION_SUBMITS, STREAM_ABORTS, STREAM_ERRORS, STREAM_PARSE_SKIPPED,
};
use crate::types::{ChatRequest, StreamEvent};

/// The fixed assistant reply shown in place of a failed response.
pub const ERROR_REPLY: &str =
    "Sorry, I encountered an error while trying to respond. Please check if the backend server is running.";

/// Notification text for a failed reachability probe.
const CONNECT_ERROR: &str = "Could not connect to backend server. Make sure it is running.";

/// How often the interrupt flag is sampled while a stream is in flight.
const INTERRUPT_POLL: Duration = Duration::from_millis(10);

/// Where the session stands with respect to the current (or last) request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No request has been made since creation or the last clear.
    Idle,

    /// A submit was accepted; the gateway has not answered yet.
    Connecting,

    /// The placeholder exists and fragments are being applied.
    Streaming,

    /// The last request produced a finalized reply.
    Completed,

    /// The last request ended in the fixed error reply.
    Failed,
}

/// A chat session that manages conversation state and gateway interactions.
///
/// One request is in flight at a time: `submit` refuses re-entry while
/// loading, so fragments from two streams can never interleave.
pub struct ChatSession {
    client: Gateway,
    config: ChatConfig,
    conversation: Conversation,
    notifier: Arc<dyn Notifier>,
    phase: Phase,
    is_loading: bool,
    is_connected: bool,
}

impl ChatSession {
    /// Creates a new chat session with the given client and configuration.
    pub fn new(client: Gateway, config: ChatConfig) -> Self {
        let conversation = Conversation::with_preamble(config.preamble.clone());
        Self {
            client,
            config,
            conversation,
            notifier: Arc::new(NullNotifier),
            phase: Phase::Idle,
            is_loading: false,
            is_connected: false,
        }
    }

    /// Installs a notifier for transient notifications and diagnostics.
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// The conversation transcript.
    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// The current phase of the request machine.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Whether a request is currently in flight.
    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    /// The result of the most recent reachability probe.
    pub fn is_connected(&self) -> bool {
        self.is_connected
    }

    /// The model tag sent with requests.
    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Changes the model for subsequent requests.
    pub fn set_model(&mut self, model: String) {
        self.config.model = model;
    }

    /// Whether replies arrive via the streaming endpoint.
    pub fn is_streaming_transport(&self) -> bool {
        self.config.streaming
    }

    /// Switches between the streaming and blocking transports.
    pub fn set_streaming_transport(&mut self, streaming: bool) {
        self.config.streaming = streaming;
    }

    /// Probes the gateway and records the result.
    pub async fn check_connection(&mut self) -> bool {
        self.is_connected = self.client.probe().await;
        self.is_connected
    }

    /// Lists the models the backend advertises.
    pub async fn list_models(&self) -> Result<Vec<String>> {
        self.client.list_models().await
    }

    /// Clears the conversation back to the system preamble.
    pub fn clear(&mut self) {
        self.conversation.reset();
        self.phase = Phase::Idle;
    }

    /// Submits a user message and runs the request to a terminal phase.
    pub async fn submit(&mut self, text: &str) -> Result<()> {
        self.submit_with(text, None, |_| {}).await
    }

    /// Like [`ChatSession::submit`], with a cooperative interrupt flag.
    pub async fn submit_with_interrupt(
        &mut self,
        text: &str,
        interrupted: Option<Arc<AtomicBool>>,
    ) -> Result<()> {
        self.submit_with(text, interrupted, |_| {}).await
    }

    /// Submits a user message with an interrupt flag and a fragment hook.
    ///
    /// `on_fragment` fires for each streamed fragment after it has been
    /// applied to the conversation, letting a front-end echo tokens live.
    /// The interrupt flag is watched for the whole time the stream is in
    /// flight, including while it sits idle waiting for the next event;
    /// once set, the underlying stream is aborted and whatever arrived so
    /// far is kept as the reply.  An interrupt is not a failure and
    /// produces no error message.
    pub async fn submit_with(
        &mut self,
        text: &str,
        interrupted: Option<Arc<AtomicBool>>,
        on_fragment: impl FnMut(&str),
    ) -> Result<()> {
        let text = text.trim();
        if text.is_empty() || self.is_loading {
            return Ok(());
        }
        SESSION_SUBMITS.click();
        self.phase = Phase::Connecting;
        self.is_loading = true;
        self.conversation.append_user(text);

        // Reachability gate: if the probe fails the send is not attempted.
        if !self.client.probe().await {
            self.is_connected = false;
            self.fail(CONNECT_ERROR);
            self.is_loading = false;
            return Ok(());
        }
        self.is_connected = true;

        let request = self.request();
        let outcome = if self.config.streaming {
            self.run_streaming(&request, interrupted, on_fragment).await
        } else {
            self.run_blocking(&request).await
        };
        self.is_loading = false;
        outcome
    }

    /// Builds the request body from the current history.
    fn request(&self) -> ChatRequest {
        ChatRequest::new(self.conversation.history(), self.config.model.clone())
            .with_temperature(self.config.temperature)
            .with_top_p(self.config.top_p)
            .with_top_k(self.config.top_k)
    }

    /// Drives one streamed request to completion.
    async fn run_streaming(
        &mut self,
        request: &ChatRequest,
        interrupted: Option<Arc<AtomicBool>>,
        mut on_fragment: impl FnMut(&str),
    ) -> Result<()> {
        let (mut stream, abort) = match self.client.stream_abortable(request).await {
            Ok(pair) => pair,
            Err(e) => {
                self.fail(&e.to_string());
                return Ok(());
            }
        };

        // The gateway accepted the request: the placeholder goes in and the
        // session is streaming.
        self.conversation.begin_streaming_assistant()?;
        self.phase = Phase::Streaming;

        // Turn the shared flag into a stream abort.  The watcher fires even
        // while this task is parked in `stream.next()` on an idle
        // connection, so an interrupt releases the stream promptly instead
        // of waiting out the request timeout.
        let watcher = interrupted.map(|flag| {
            let abort = abort.clone();
            tokio::spawn(async move {
                while !flag.load(Ordering::Relaxed) {
                    tokio::time::sleep(INTERRUPT_POLL).await;
                }
                STREAM_ABORTS.click();
                abort.abort();
            })
        });

        let outcome = loop {
            match stream.next().await {
                Some(Ok(StreamEvent::Fragment(fragment))) => {
                    if let Err(e) = self.conversation.append_fragment(&fragment) {
                        break Err(e);
                    }
                    on_fragment(&fragment);
                }
                Some(Ok(StreamEvent::Done)) => {
                    // Terminal marker: stop reading even if the gateway has
                    // more to say.
                    self.conversation.finalize();
                    self.phase = Phase::Completed;
                    break Ok(());
                }
                Some(Err(e)) if e.is_recoverable_parse() => {
                    STREAM_PARSE_SKIPPED.click();
                    self.notifier.stream_event_skipped(&e);
                }
                Some(Err(e)) => {
                    STREAM_ERRORS.click();
                    self.fail(&e.to_string());
                    break Ok(());
                }
                None => {
                    // The stream ended without a done marker, either at EOF
                    // or because it was aborted.  Keep what arrived.
                    self.conversation.finalize();
                    self.phase = Phase::Completed;
                    break Ok(());
                }
            }
        };
        if let Some(watcher) = watcher {
            watcher.abort();
        }
        outcome
    }

    /// Drives one blocking request to completion.
    async fn run_blocking(&mut self, request: &ChatRequest) -> Result<()> {
        match self.client.send(request).await {
            Ok(message) => {
                self.conversation.append_assistant(message.content);
                self.phase = Phase::Completed;
            }
            Err(e) => {
                self.fail(&e.to_string());
            }
        }
        Ok(())
    }

    /// Records a failure: fixed in-chat error reply, notification, Failed
    /// phase.  Removes the streaming placeholder when one exists.
    fn fail(&mut self, notification: &str) {
        SESSION_FAILURES.click();
        self.conversation.replace_with_error(ERROR_REPLY);
        self.notifier.notify_error(notification);
        self.phase = Phase::Failed;
    }
}

impl std::fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSession")
            .field("model", &self.config.model)
            .field("phase", &self.phase)
            .field("is_loading", &self.is_loading)
            .field("is_connected", &self.is_connected)
            .field("messages", &self.conversation.len())
            .finish()
    }
}
