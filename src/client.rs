//! HTTP client for the chat gateway.
//!
//! The gateway is the small local service that fronts Ollama: it exposes a
//! model-list probe, a blocking chat endpoint, and a streaming chat endpoint
//! that answers with server-sent events.

use std::pin::Pin;
use std::time::Duration;

use futures::Stream;
use futures::stream::AbortHandle;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, Response, header};
use url::Url;

use crate::error::{Error, Result};
use crate::observability::{
    GATEWAY_REQUESTS, GATEWAY_REQUEST_ERRORS, PROBES, PROBE_FAILURES,
};
use crate::sse::process_sse;
use crate::types::{ChatRequest, ChatResponse, Message, ModelList, StreamEvent};

const DEFAULT_BASE_URL: &str = "http://localhost:5000/api";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Client for the chat gateway.
#[derive(Debug, Clone)]
pub struct Gateway {
    client: ReqwestClient,
    base_url: String,
    timeout: Duration,
}

impl Gateway {
    /// Create a new gateway client against the default local address.
    pub fn new() -> Result<Self> {
        Self::with_options(None, None)
    }

    /// Create a new client with a custom base URL and timeout.
    pub fn with_options(base_url: Option<String>, timeout: Option<Duration>) -> Result<Self> {
        let base_url = base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Url::parse(&base_url)?;
        let base_url = base_url.trim_end_matches('/').to_string();

        let timeout = timeout.unwrap_or(DEFAULT_TIMEOUT);
        let client = ReqwestClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                Error::http_client(
                    format!("Failed to build HTTP client: {e}"),
                    Some(Box::new(e)),
                )
            })?;

        Ok(Self {
            client,
            base_url,
            timeout,
        })
    }

    /// The base URL requests are issued against.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Create and return default headers for gateway requests.
    fn default_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        headers
    }

    /// Map a reqwest send failure onto our error taxonomy.
    fn request_error(&self, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::timeout(
                format!("Request timed out: {e}"),
                Some(self.timeout.as_secs_f64()),
            )
        } else if e.is_connect() {
            Error::connection(format!("Connection error: {e}"), Some(Box::new(e)))
        } else {
            Error::http_client(format!("Request failed: {e}"), Some(Box::new(e)))
        }
    }

    /// Process gateway response errors and convert to our Error type.
    async fn process_error_response(response: Response) -> Error {
        let status_code = response.status().as_u16();

        let error_body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                return Error::http_client(
                    format!("Failed to read error response: {e}"),
                    Some(Box::new(e)),
                );
            }
        };

        // The gateway wraps failures as {"error": "..."}; fall back to the
        // raw body when it doesn't.
        let message = serde_json::from_str::<ChatResponse>(&error_body)
            .ok()
            .and_then(|r| r.error)
            .unwrap_or(error_body);

        Error::api(status_code, message)
    }

    /// Check whether the gateway is reachable.
    ///
    /// A 200 from the model-list endpoint means connected; any other status
    /// or network failure means disconnected.  Never errors: reachability is
    /// a yes/no question.
    pub async fn probe(&self) -> bool {
        PROBES.click();
        let url = format!("{}/models", self.base_url);
        let connected = match self.client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        };
        if !connected {
            PROBE_FAILURES.click();
        }
        connected
    }

    /// List the model tags the backend advertises.
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        if !response.status().is_success() {
            return Err(Self::process_error_response(response).await);
        }

        let list = response.json::<ModelList>().await.map_err(|e| {
            Error::serialization(format!("Failed to parse model list: {e}"), Some(Box::new(e)))
        })?;
        Ok(list.names())
    }

    /// Send the conversation to the gateway and get the full reply at once.
    pub async fn send(&self, request: &ChatRequest) -> Result<Message> {
        GATEWAY_REQUESTS.click();
        let url = format!("{}/chat", self.base_url);

        let response = self
            .client
            .post(&url)
            .headers(self.default_headers())
            .json(request)
            .send()
            .await
            .map_err(|e| {
                GATEWAY_REQUEST_ERRORS.click();
                self.request_error(e)
            })?;

        if !response.status().is_success() {
            GATEWAY_REQUEST_ERRORS.click();
            return Err(Self::process_error_response(response).await);
        }

        let body = response.json::<ChatResponse>().await.map_err(|e| {
            Error::serialization(format!("Failed to parse response: {e}"), Some(Box::new(e)))
        })?;
        body.into_message()
    }

    /// Send the conversation to the gateway and get a streaming reply.
    ///
    /// Returns a stream of [`StreamEvent`]s that can be processed
    /// incrementally.  Dropping the stream releases the connection.
    pub async fn stream(
        &self,
        request: &ChatRequest,
    ) -> Result<impl Stream<Item = Result<StreamEvent>> + Send + 'static> {
        GATEWAY_REQUESTS.click();
        let url = format!("{}/chat/stream", self.base_url);

        let mut headers = self.default_headers();
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("text/event-stream"),
        );

        let response = self
            .client
            .post(&url)
            .headers(headers)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                GATEWAY_REQUEST_ERRORS.click();
                self.request_error(e)
            })?;

        if !response.status().is_success() {
            GATEWAY_REQUEST_ERRORS.click();
            return Err(Self::process_error_response(response).await);
        }

        Ok(process_sse(response.bytes_stream()))
    }

    /// Like [`Gateway::stream`], but cancellable.
    ///
    /// Calling `abort` on the returned handle ends the stream without
    /// yielding an error item, so a cancelled request never shows up as a
    /// failure.
    pub async fn stream_abortable(
        &self,
        request: &ChatRequest,
    ) -> Result<(
        Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>,
        AbortHandle,
    )> {
        let stream = self.stream(request).await?;
        let (stream, handle) = futures::stream::abortable(stream);
        Ok((Box::pin(stream), handle))
    }
}
