//! Server-Sent Events (SSE) processing for streamed chat responses.
//!
//! This module turns the raw byte stream from `/chat/stream` into a stream
//! of [`StreamEvent`]s.  The gateway's wire format is a sequence of
//! `data: <json>` lines delimited by blank lines; events may arrive split
//! across HTTP chunks, so a buffer carries partial events between reads.

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};

use crate::error::{Error, Result};
use crate::observability::{STREAM_BYTES, STREAM_EVENTS};
use crate::types::{StreamEvent, StreamPayload};

/// Process a stream of bytes into a stream of chat events.
///
/// Transport failures and invalid UTF-8 surface as `Err` items and are
/// fatal to the request.  A malformed JSON payload in a single event also
/// surfaces as an `Err` item, but as a recoverable one
/// ([`Error::is_recoverable_parse`]) that callers log and skip without
/// abandoning the rest of the stream.
pub fn process_sse<S>(byte_stream: S) -> impl Stream<Item = Result<StreamEvent>>
where
    S: Stream<Item = std::result::Result<Bytes, reqwest::Error>> + Unpin + 'static,
{
    // Convert reqwest errors to our error type
    let stream = byte_stream.map(|result| {
        result
            .map_err(|e| Error::streaming(format!("Error in HTTP stream: {e}"), Some(Box::new(e))))
    });

    // Use a state machine to process the SSE stream
    let buffer = String::new();

    stream::unfold(
        (stream, buffer),
        move |(mut stream, mut buffer)| async move {
            loop {
                // First check if we have a complete event in the buffer
                if let Some((event_text, remaining)) = extract_event(&buffer) {
                    buffer = remaining;
                    match parse_event(&event_text) {
                        Some(item) => {
                            STREAM_EVENTS.click();
                            return Some((item, (stream, buffer)));
                        }
                        // Comment or empty event; keep reading.
                        None => continue,
                    }
                }

                // Read more data
                match stream.next().await {
                    Some(Ok(bytes)) => {
                        STREAM_BYTES.count(bytes.len() as u64);
                        match String::from_utf8(bytes.to_vec()) {
                            Ok(text) => buffer.push_str(&text),
                            Err(e) => {
                                return Some((
                                    Err(Error::encoding(
                                        format!("Invalid UTF-8 in stream: {e}"),
                                        Some(Box::new(e)),
                                    )),
                                    (stream, buffer),
                                ));
                            }
                        }
                    }
                    Some(Err(e)) => {
                        return Some((Err(e), (stream, buffer)));
                    }
                    None => {
                        // End of stream: flush whatever is left in the buffer.
                        if !buffer.trim().is_empty() {
                            let tail = std::mem::take(&mut buffer);
                            if let Some(item) = parse_event(&tail) {
                                STREAM_EVENTS.click();
                                return Some((item, (stream, buffer)));
                            }
                        }
                        return None;
                    }
                }
            }
        },
    )
}

/// Extract a complete SSE event from a buffer string.
///
/// Events are delimited by double newlines; the text before the delimiter
/// and the remainder of the buffer are returned separately.
fn extract_event(buffer: &str) -> Option<(String, String)> {
    let (event_text, rest) = buffer.split_once("\n\n")?;
    Some((event_text.to_string(), rest.to_string()))
}

/// Parse the text of one event into a stream item.
///
/// Returns `None` for events without a `data:` line (comments, padding);
/// those are silently dropped per the SSE convention.
fn parse_event(event_text: &str) -> Option<Result<StreamEvent>> {
    let data = event_text
        .lines()
        .find_map(|line| line.strip_prefix("data:"))
        .map(str::trim)?;
    if data.is_empty() {
        return None;
    }
    match serde_json::from_str::<StreamPayload>(data) {
        Ok(payload) => Some(payload.into_event()),
        Err(e) => Some(Err(Error::serialization(
            format!("Failed to parse event JSON: {e}"),
            Some(Box::new(e)),
        ))),
    }
}
