//! End-to-end tests for the chat session against a fixture gateway.
//!
//! The fixture is a minimal HTTP/1.1 server on a loopback socket; each test
//! wires a route table describing how the gateway answers the probe, chat,
//! and stream endpoints, then drives a real `ChatSession` through it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use palaver::{
    ChatConfig, ChatSession, ERROR_REPLY, Error, Gateway, Notifier, Phase, Role,
};

/// How the fixture answers one request.
#[derive(Clone)]
enum Reply {
    /// 200 with a JSON body.
    Json(&'static str),

    /// A bare status with an empty body.
    Status(u16),

    /// 200 `text/event-stream`; chunks are written in order, then the
    /// connection closes cleanly.
    Sse(Vec<&'static str>),

    /// Like `Sse`, but the chunked transfer encoding is cut off mid-frame
    /// so the client sees a transport error instead of a clean EOF.
    SseBroken(Vec<&'static str>),

    /// Like `Sse`, but the connection is held open afterwards instead of
    /// closing.  Used to exercise cancellation.
    SseHang(Vec<&'static str>),
}

type Router = Arc<dyn Fn(&str, &str) -> Reply + Send + Sync>;

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

async fn handle_connection(mut socket: TcpStream, router: Router) {
    let mut buf = Vec::new();
    let mut tmp = [0u8; 4096];

    // Read the request head.
    let header_end = loop {
        match socket.read(&mut tmp).await {
            Ok(0) | Err(_) => return,
            Ok(n) => buf.extend_from_slice(&tmp[..n]),
        }
        if let Some(pos) = find_subsequence(&buf, b"\r\n\r\n") {
            break pos + 4;
        }
    };
    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut request_line = head.lines().next().unwrap_or_default().split_whitespace();
    let method = request_line.next().unwrap_or_default().to_string();
    let path = request_line.next().unwrap_or_default().to_string();

    // Drain the body so the client is never blocked writing it.
    let content_length = head
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())
                .flatten()
        })
        .unwrap_or(0);
    while buf.len() < header_end + content_length {
        match socket.read(&mut tmp).await {
            Ok(0) | Err(_) => break,
            Ok(n) => buf.extend_from_slice(&tmp[..n]),
        }
    }

    match router(&method, &path) {
        Reply::Json(body) => {
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            let _ = socket.write_all(response.as_bytes()).await;
        }
        Reply::Status(code) => {
            let response = format!(
                "HTTP/1.1 {code} Fixture\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
            );
            let _ = socket.write_all(response.as_bytes()).await;
        }
        Reply::Sse(chunks) => {
            let head =
                "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nConnection: close\r\n\r\n";
            let _ = socket.write_all(head.as_bytes()).await;
            for chunk in chunks {
                let _ = socket.write_all(chunk.as_bytes()).await;
                let _ = socket.flush().await;
            }
        }
        Reply::SseBroken(chunks) => {
            let head = "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n";
            let _ = socket.write_all(head.as_bytes()).await;
            for chunk in chunks {
                let frame = format!("{:x}\r\n{}\r\n", chunk.len(), chunk);
                let _ = socket.write_all(frame.as_bytes()).await;
                let _ = socket.flush().await;
            }
            // Announce a frame that never arrives, then close.
            let _ = socket.write_all(b"ff\r\ntruncated").await;
        }
        Reply::SseHang(chunks) => {
            let head =
                "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nConnection: close\r\n\r\n";
            let _ = socket.write_all(head.as_bytes()).await;
            for chunk in chunks {
                let _ = socket.write_all(chunk.as_bytes()).await;
                let _ = socket.flush().await;
            }
            tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
        }
    }
    let _ = socket.shutdown().await;
}

/// Spawns the fixture gateway and returns its base URL.
async fn spawn_gateway(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((socket, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(handle_connection(socket, router.clone()));
        }
    });
    format!("http://{addr}/api")
}

/// Captures notifications so tests can assert on them.
#[derive(Default)]
struct RecordingNotifier {
    errors: Mutex<Vec<String>>,
    skipped: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }

    fn skipped(&self) -> Vec<String> {
        self.skipped.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify_error(&self, message: &str) {
        self.errors.lock().unwrap().push(message.to_string());
    }

    fn stream_event_skipped(&self, error: &Error) {
        self.skipped.lock().unwrap().push(error.to_string());
    }
}

const MODELS_OK: &str = r#"{"models":[{"name":"gemma3:1b"}]}"#;

fn session_for(base_url: String, streaming: bool) -> (ChatSession, Arc<RecordingNotifier>) {
    let mut config = ChatConfig::new().with_base_url(base_url);
    if !streaming {
        config = config.without_streaming();
    }
    let client = Gateway::with_options(config.base_url.clone(), None).unwrap();
    let notifier = Arc::new(RecordingNotifier::default());
    let session = ChatSession::new(client, config).with_notifier(notifier.clone());
    (session, notifier)
}

#[tokio::test]
async fn blocking_reply_lands_finalized() {
    let base = spawn_gateway(Arc::new(|method: &str, path: &str| match (method, path) {
        ("GET", "/api/models") => Reply::Json(MODELS_OK),
        ("POST", "/api/chat") => {
            Reply::Json(r#"{"message":{"role":"assistant","content":"Hello!"}}"#)
        }
        _ => Reply::Status(404),
    }))
    .await;

    let (mut session, notifier) = session_for(base, false);
    session.submit("Hi").await.unwrap();

    let messages = session.conversation().messages();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[0].role, Role::System);
    assert_eq!(messages[1].role, Role::User);
    assert_eq!(messages[1].content, "Hi");
    assert_eq!(messages[2].role, Role::Assistant);
    assert_eq!(messages[2].content, "Hello!");
    assert!(!messages[2].is_streaming);
    assert_eq!(session.phase(), Phase::Completed);
    assert!(session.is_connected());
    assert!(!session.is_loading());
    assert!(notifier.errors().is_empty());
}

#[tokio::test]
async fn streamed_reply_accumulates_fragments() {
    let base = spawn_gateway(Arc::new(|method: &str, path: &str| match (method, path) {
        ("GET", "/api/models") => Reply::Json(MODELS_OK),
        ("POST", "/api/chat/stream") => Reply::Sse(vec![
            "data: {\"message\":{\"content\":\"He\"}}\n\n",
            "data: {\"message\":{\"content\":\"llo\"}}\n\n",
            "data: {\"done\": true}\n\n",
        ]),
        _ => Reply::Status(404),
    }))
    .await;

    let (mut session, notifier) = session_for(base, true);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = seen.clone();
    session
        .submit_with("Hi", None, move |fragment| {
            seen_clone.lock().unwrap().push(fragment.to_string());
        })
        .await
        .unwrap();

    let last = session.conversation().last().unwrap();
    assert_eq!(last.content, "Hello");
    assert!(!last.is_streaming);
    assert_eq!(session.phase(), Phase::Completed);
    assert_eq!(seen.lock().unwrap().as_slice(), &["He", "llo"]);
    assert!(notifier.errors().is_empty());
}

#[tokio::test]
async fn done_marker_stops_reading_further_events() {
    let base = spawn_gateway(Arc::new(|method: &str, path: &str| match (method, path) {
        ("GET", "/api/models") => Reply::Json(MODELS_OK),
        ("POST", "/api/chat/stream") => Reply::Sse(vec![
            "data: {\"message\":{\"content\":\"He\"}}\n\n",
            "data: {\"done\": true}\n\n",
            "data: {\"message\":{\"content\":\"IGNORED\"}}\n\n",
        ]),
        _ => Reply::Status(404),
    }))
    .await;

    let (mut session, _notifier) = session_for(base, true);
    session.submit("Hi").await.unwrap();

    assert_eq!(session.conversation().last().unwrap().content, "He");
    assert_eq!(session.phase(), Phase::Completed);
}

#[tokio::test]
async fn probe_failure_skips_send_and_notifies() {
    // Grab a port that nothing listens on.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}/api", listener.local_addr().unwrap());
    drop(listener);

    let (mut session, notifier) = session_for(base, true);
    session.submit("Hi").await.unwrap();

    assert!(!session.is_connected());
    assert_eq!(session.phase(), Phase::Failed);
    let messages = session.conversation().messages();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[2].role, Role::Assistant);
    assert_eq!(messages[2].content, ERROR_REPLY);
    assert_eq!(notifier.errors().len(), 1);
}

#[tokio::test]
async fn midstream_failure_replaces_placeholder_with_one_error() {
    let base = spawn_gateway(Arc::new(|method: &str, path: &str| match (method, path) {
        ("GET", "/api/models") => Reply::Json(MODELS_OK),
        ("POST", "/api/chat/stream") => Reply::SseBroken(vec![
            "data: {\"message\":{\"content\":\"par\"}}\n\n",
        ]),
        _ => Reply::Status(404),
    }))
    .await;

    let (mut session, notifier) = session_for(base, true);
    session.submit("Hi").await.unwrap();

    // Net of the placeholder the conversation holds exactly one error reply.
    let messages = session.conversation().messages();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[2].content, ERROR_REPLY);
    assert!(messages.iter().all(|m| !m.is_streaming));
    assert_eq!(session.phase(), Phase::Failed);
    assert_eq!(notifier.errors().len(), 1);
}

#[tokio::test]
async fn malformed_event_is_skipped_and_stream_continues() {
    let base = spawn_gateway(Arc::new(|method: &str, path: &str| match (method, path) {
        ("GET", "/api/models") => Reply::Json(MODELS_OK),
        ("POST", "/api/chat/stream") => Reply::Sse(vec![
            "data: {oops}\n\n",
            "data: {\"message\":{\"content\":\"ok\"}}\n\n",
            "data: {\"done\": true}\n\n",
        ]),
        _ => Reply::Status(404),
    }))
    .await;

    let (mut session, notifier) = session_for(base, true);
    session.submit("Hi").await.unwrap();

    assert_eq!(session.conversation().last().unwrap().content, "ok");
    assert_eq!(session.phase(), Phase::Completed);
    assert_eq!(notifier.skipped().len(), 1);
    assert!(notifier.errors().is_empty());
}

#[tokio::test]
async fn gateway_error_status_fails_blocking_request() {
    let base = spawn_gateway(Arc::new(|method: &str, path: &str| match (method, path) {
        ("GET", "/api/models") => Reply::Json(MODELS_OK),
        ("POST", "/api/chat") => Reply::Status(500),
        _ => Reply::Status(404),
    }))
    .await;

    let (mut session, notifier) = session_for(base, false);
    session.submit("Hi").await.unwrap();

    assert_eq!(session.conversation().last().unwrap().content, ERROR_REPLY);
    assert_eq!(session.phase(), Phase::Failed);
    let errors = notifier.errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("500"), "unexpected notification: {}", errors[0]);
}

#[tokio::test]
async fn interrupt_keeps_partial_reply_without_error() {
    let base = spawn_gateway(Arc::new(|method: &str, path: &str| match (method, path) {
        ("GET", "/api/models") => Reply::Json(MODELS_OK),
        ("POST", "/api/chat/stream") => Reply::SseHang(vec![
            "data: {\"message\":{\"content\":\"partial\"}}\n\n",
        ]),
        _ => Reply::Status(404),
    }))
    .await;

    let (mut session, notifier) = session_for(base, true);
    // The flag is already set, so the stream is aborted at the first check.
    let interrupted = Arc::new(AtomicBool::new(true));
    session
        .submit_with_interrupt("Hi", Some(interrupted))
        .await
        .unwrap();

    // No failure: whatever arrived is kept as a finalized reply.
    let last = session.conversation().last().unwrap();
    assert_eq!(last.role, Role::Assistant);
    assert!(!last.is_streaming);
    assert_ne!(last.content, ERROR_REPLY);
    assert_eq!(session.phase(), Phase::Completed);
    assert!(notifier.errors().is_empty());
    assert!(!session.is_loading());
}

#[tokio::test]
async fn interrupt_during_idle_stream_releases_it_promptly() {
    let base = spawn_gateway(Arc::new(|method: &str, path: &str| match (method, path) {
        ("GET", "/api/models") => Reply::Json(MODELS_OK),
        ("POST", "/api/chat/stream") => Reply::SseHang(vec![
            "data: {\"message\":{\"content\":\"partial\"}}\n\n",
        ]),
        _ => Reply::Status(404),
    }))
    .await;

    let (mut session, notifier) = session_for(base, true);
    // The stream goes idle after one fragment; the interrupt arrives while
    // the session is parked waiting for the next event.
    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = interrupted.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        flag.store(true, Ordering::Relaxed);
    });

    let outcome = tokio::time::timeout(
        Duration::from_secs(2),
        session.submit_with_interrupt("Hi", Some(interrupted)),
    )
    .await;
    assert!(outcome.is_ok(), "interrupt did not release the stream");
    outcome.unwrap().unwrap();

    let last = session.conversation().last().unwrap();
    assert_eq!(last.content, "partial");
    assert!(!last.is_streaming);
    assert_eq!(session.phase(), Phase::Completed);
    assert!(notifier.errors().is_empty());
}

#[tokio::test]
async fn session_moves_across_tasks_mid_conversation() {
    let base = spawn_gateway(Arc::new(|method: &str, path: &str| match (method, path) {
        ("GET", "/api/models") => Reply::Json(MODELS_OK),
        ("POST", "/api/chat/stream") => Reply::Sse(vec![
            "data: {\"message\":{\"content\":\"reply\"}}\n\n",
            "data: {\"done\": true}\n\n",
        ]),
        _ => Reply::Status(404),
    }))
    .await;

    let (mut session, _notifier) = session_for(base, true);
    let session = tokio::spawn(async move {
        session.submit("Hi").await.unwrap();
        session
    })
    .await
    .unwrap();

    assert_eq!(session.conversation().last().unwrap().content, "reply");
    assert_eq!(session.phase(), Phase::Completed);
}

#[tokio::test]
async fn consecutive_submits_reuse_the_session() {
    let base = spawn_gateway(Arc::new(|method: &str, path: &str| match (method, path) {
        ("GET", "/api/models") => Reply::Json(MODELS_OK),
        ("POST", "/api/chat/stream") => Reply::Sse(vec![
            "data: {\"message\":{\"content\":\"reply\"}}\n\n",
            "data: {\"done\": true}\n\n",
        ]),
        _ => Reply::Status(404),
    }))
    .await;

    let (mut session, _notifier) = session_for(base, true);
    session.submit("one").await.unwrap();
    session.submit("two").await.unwrap();

    // system + 2 * (user + assistant)
    assert_eq!(session.conversation().len(), 5);
    assert_eq!(session.phase(), Phase::Completed);

    session.clear();
    assert_eq!(session.conversation().len(), 1);
    assert_eq!(session.phase(), Phase::Idle);
}

#[tokio::test]
async fn list_models_parses_tag_names() {
    let base = spawn_gateway(Arc::new(|method: &str, path: &str| match (method, path) {
        ("GET", "/api/models") => Reply::Json(MODELS_OK),
        _ => Reply::Status(404),
    }))
    .await;

    let client = Gateway::with_options(Some(base), None).unwrap();
    assert!(client.probe().await);
    assert_eq!(client.list_models().await.unwrap(), vec!["gemma3:1b"]);
}
