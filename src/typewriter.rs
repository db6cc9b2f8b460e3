//! Timer-paced reveal of completed replies.
//!
//! Replies fetched over the blocking endpoint arrive all at once; the
//! typewriter plays them back as a finite stream of progressively longer
//! prefixes so a front-end can animate them the way streamed replies
//! naturally animate themselves.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::Stream;
use tokio::time::{Instant, Sleep, sleep};

use crate::conversation::Conversation;
use crate::observability::REVEALS_STARTED;
use crate::types::{Message, Role};

/// Default per-character delay.
const DEFAULT_DELAY: Duration = Duration::from_millis(40);

/// Pause between the final prefix and the completion signal, giving the
/// front-end a beat to commit the full text before reacting.
const TRAILING_DELAY: Duration = Duration::from_millis(50);

/// One step of a reveal.
#[derive(Debug, Clone, PartialEq)]
pub enum RevealStep {
    /// The text to display so far: a prefix of the full reply on a char
    /// boundary, growing by one char per step.
    Prefix(String),

    /// Emitted exactly once, after the full text and a short trailing delay.
    Complete,
}

/// Controller that decides which message to reveal and hands out reveals.
///
/// Revealed content is tracked by content key so a message is never
/// animated twice, and so replies that were already displayed incrementally
/// (streamed ones) can be exempted up front.
#[derive(Debug)]
pub struct Typewriter {
    delay: Duration,
    revealed: HashSet<String>,
}

impl Typewriter {
    /// Creates a typewriter with the default per-character delay.
    pub fn new() -> Self {
        Self::with_delay(DEFAULT_DELAY)
    }

    /// Creates a typewriter with a custom per-character delay.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            revealed: HashSet::new(),
        }
    }

    /// The message that should be revealed next, if any.
    ///
    /// Only the most recent message qualifies, and only when it is an
    /// assistant message that is not streaming and has not already been
    /// revealed.
    pub fn candidate<'a>(&self, conversation: &'a Conversation) -> Option<&'a Message> {
        conversation.last().filter(|m| {
            m.role == Role::Assistant && !m.is_streaming && !self.revealed.contains(&m.content)
        })
    }

    /// Starts a reveal of the given text and marks it revealed.
    ///
    /// Dropping the returned stream cancels the reveal; beginning a reveal
    /// of different text restarts from the empty prefix.
    pub fn begin(&mut self, text: &str) -> RevealStream {
        REVEALS_STARTED.click();
        self.revealed.insert(text.to_string());
        RevealStream::new(text, self.delay)
    }

    /// Marks content as already shown without animating it.
    pub fn mark_revealed(&mut self, text: &str) {
        self.revealed.insert(text.to_string());
    }

    /// Forgets all revealed content.  Used when the conversation resets.
    pub fn reset(&mut self) {
        self.revealed.clear();
    }
}

impl Default for Typewriter {
    fn default() -> Self {
        Self::new()
    }
}

enum RevealState {
    Typing,
    Trailing,
    Done,
}

/// A finite, lazy, timer-paced reveal of one piece of text.
///
/// For a text of N chars it yields exactly N+1 `Prefix` items (from the
/// empty string through the full text, one per delay tick) followed by one
/// `Complete` after the trailing delay, then ends.
pub struct RevealStream {
    text: String,
    // Byte offset of the prefix of k chars, for k in 0..=N.
    boundaries: Vec<usize>,
    next: usize,
    delay: Duration,
    state: RevealState,
    // Armed on first poll, not at construction: a reveal can be created
    // outside a runtime and only needs the timer once it is driven.
    sleep: Option<Pin<Box<Sleep>>>,
}

impl RevealStream {
    fn new(text: &str, delay: Duration) -> Self {
        let mut boundaries: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
        boundaries.push(text.len());
        Self {
            text: text.to_string(),
            boundaries,
            next: 0,
            delay,
            state: RevealState::Typing,
            sleep: None,
        }
    }

    /// The full text being revealed.
    pub fn text(&self) -> &str {
        &self.text
    }
}

impl Stream for RevealStream {
    type Item = RevealStep;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if matches!(this.state, RevealState::Done) {
            return Poll::Ready(None);
        }
        let delay = this.delay;
        let timer = this.sleep.get_or_insert_with(|| Box::pin(sleep(delay)));
        match timer.as_mut().poll(cx) {
            Poll::Pending => return Poll::Pending,
            Poll::Ready(()) => {}
        }
        match this.state {
            RevealState::Typing => {
                let end = this.boundaries[this.next];
                let prefix = this.text[..end].to_string();
                this.next += 1;
                if this.next == this.boundaries.len() {
                    this.state = RevealState::Trailing;
                    timer.as_mut().reset(Instant::now() + TRAILING_DELAY);
                } else {
                    timer.as_mut().reset(Instant::now() + delay);
                }
                Poll::Ready(Some(RevealStep::Prefix(prefix)))
            }
            RevealState::Trailing => {
                this.state = RevealState::Done;
                Poll::Ready(Some(RevealStep::Complete))
            }
            RevealState::Done => Poll::Ready(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use tokio_test::{assert_pending, assert_ready_eq, task};

    async fn collect(stream: RevealStream) -> Vec<RevealStep> {
        stream.collect().await
    }

    #[tokio::test(start_paused = true)]
    async fn reveal_emits_n_plus_one_prefixes_then_complete() {
        let mut typewriter = Typewriter::with_delay(Duration::from_millis(10));
        let steps = collect(typewriter.begin("Hello")).await;

        let prefixes: Vec<&RevealStep> = steps
            .iter()
            .filter(|s| matches!(s, RevealStep::Prefix(_)))
            .collect();
        assert_eq!(prefixes.len(), 6);
        assert_eq!(steps[0], RevealStep::Prefix(String::new()));
        assert_eq!(steps[5], RevealStep::Prefix("Hello".to_string()));
        assert_eq!(steps.last(), Some(&RevealStep::Complete));
        assert_eq!(steps.len(), 7);
    }

    #[test]
    fn begin_does_not_require_a_runtime() {
        // The timer is armed on first poll, so creating and dropping a
        // reveal works from synchronous code.
        let mut typewriter = Typewriter::new();
        let reveal = typewriter.begin("Hello");
        assert_eq!(reveal.text(), "Hello");
        drop(reveal);
    }

    #[tokio::test(start_paused = true)]
    async fn reveal_ticks_only_when_the_delay_elapses() {
        let mut typewriter = Typewriter::with_delay(Duration::from_millis(10));
        let mut reveal = typewriter.begin("a");

        let mut step = task::spawn(reveal.next());
        assert_pending!(step.poll());

        tokio::time::advance(Duration::from_millis(10)).await;
        assert!(step.is_woken());
        assert_ready_eq!(step.poll(), Some(RevealStep::Prefix(String::new())));
    }

    #[tokio::test(start_paused = true)]
    async fn reveal_of_empty_text() {
        let mut typewriter = Typewriter::new();
        let steps = collect(typewriter.begin("")).await;
        assert_eq!(
            steps,
            vec![RevealStep::Prefix(String::new()), RevealStep::Complete]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn reveal_respects_char_boundaries() {
        let mut typewriter = Typewriter::with_delay(Duration::from_millis(1));
        let steps = collect(typewriter.begin("αβ")).await;
        assert_eq!(
            steps,
            vec![
                RevealStep::Prefix(String::new()),
                RevealStep::Prefix("α".to_string()),
                RevealStep::Prefix("αβ".to_string()),
                RevealStep::Complete,
            ]
        );
    }

    #[test]
    fn candidate_is_latest_finalized_assistant_message() {
        let mut conversation = Conversation::new();
        let typewriter = Typewriter::new();

        // Nothing but the preamble: no candidate.
        assert!(typewriter.candidate(&conversation).is_none());

        // Last message is the user's: no candidate.
        conversation.append_user("Hi");
        assert!(typewriter.candidate(&conversation).is_none());

        // Streaming placeholder: no candidate.
        conversation.begin_streaming_assistant().unwrap();
        assert!(typewriter.candidate(&conversation).is_none());

        conversation.append_fragment("Hello!").unwrap();
        conversation.finalize();
        let candidate = typewriter.candidate(&conversation).unwrap();
        assert_eq!(candidate.content, "Hello!");
    }

    #[test]
    fn revealed_content_is_not_offered_again() {
        let mut conversation = Conversation::new();
        conversation.append_user("Hi");
        conversation.append_assistant("Hello!");

        let mut typewriter = Typewriter::new();
        assert!(typewriter.candidate(&conversation).is_some());

        let _stream = typewriter.begin("Hello!");
        assert!(typewriter.candidate(&conversation).is_none());

        // Reset forgets the key and the reveal can run again.
        typewriter.reset();
        assert!(typewriter.candidate(&conversation).is_some());
    }

    #[test]
    fn mark_revealed_exempts_streamed_replies() {
        let mut conversation = Conversation::new();
        conversation.append_user("Hi");
        conversation.append_assistant("streamed reply");

        let mut typewriter = Typewriter::new();
        typewriter.mark_revealed("streamed reply");
        assert!(typewriter.candidate(&conversation).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn new_reveal_restarts_from_empty_prefix() {
        let mut typewriter = Typewriter::with_delay(Duration::from_millis(1));
        let mut first = typewriter.begin("first");
        // Partially drain, then drop: the reveal is cancelled.
        assert_eq!(first.next().await, Some(RevealStep::Prefix(String::new())));
        drop(first);

        let steps = collect(typewriter.begin("second")).await;
        assert_eq!(steps[0], RevealStep::Prefix(String::new()));
        assert_eq!(
            steps[steps.len() - 2],
            RevealStep::Prefix("second".to_string())
        );
    }
}
