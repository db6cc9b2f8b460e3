//! Notification hook for session events.
//!
//! This module provides the [`Notifier`] trait through which the session
//! surfaces transient, user-visible notifications (the toast popups of the
//! original UI) and per-event diagnostics.  The library never prints on its
//! own; a front-end implements this trait and decides how to show things.

use crate::error::Error;

/// A sink for transient notifications and stream diagnostics.
///
/// # Example
///
/// ```rust,ignore
/// use palaver::{Error, Notifier};
///
/// struct StderrNotifier;
///
/// impl Notifier for StderrNotifier {
///     fn notify_error(&self, message: &str) {
///         eprintln!("error: {message}");
///     }
///
///     fn stream_event_skipped(&self, error: &Error) {
///         eprintln!("skipped malformed stream event: {error}");
///     }
/// }
/// ```
pub trait Notifier: Send + Sync {
    /// Surface a user-visible error notification.
    ///
    /// Fired alongside the in-chat error message whenever a submit fails,
    /// whether from an unreachable gateway or a mid-stream transport error.
    fn notify_error(&self, message: &str);

    /// Record that one malformed stream event was skipped.
    ///
    /// The stream continues past the event; this is diagnostic only.
    fn stream_event_skipped(&self, error: &Error) {
        let _ = error;
    }
}

/// A notifier that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify_error(&self, _message: &str) {}
}
