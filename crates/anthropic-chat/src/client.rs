//! HTTP client for the messages API: configuration, non-streaming calls,
//! and the streaming producer task.

use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use futures::channel::mpsc;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use tracing::{debug, warn};

use crate::assembler::{ChunkAssembler, StreamFrame, Transition};
use crate::errors::{AbortController, AbortSignal, ChatError, ConfigError};
use crate::request::build_request_body;
use crate::stream::{ChatCompletionChunk, ChatCompletionStream};
use crate::types::{ChatCompletion, ChatMessage, ChatOptions, ContentPart};
use crate::utils::media::is_remote_url;
use crate::utils::sse::{SseLine, SseLineScanner};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

/// Default messages endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://api.anthropic.com/v1/messages";

/// API version header value this client speaks.
pub const DEFAULT_API_VERSION: &str = "2023-06-01";

/// Connect, request, and stream-read timeouts in seconds.
///
/// The request timeout bounds non-streaming calls end to end; streaming
/// calls are bounded per read instead so long generations are not cut off.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RequestTimeout {
    pub connect: f64,
    pub request: f64,
    pub stream_read: f64,
}

impl Default for RequestTimeout {
    fn default() -> Self {
        Self {
            connect: 10.0,
            request: 120.0,
            stream_read: 30.0,
        }
    }
}

/// Configuration for [`ChatClient`].
#[derive(Clone, Debug)]
pub struct ChatClientConfig {
    pub api_key: String,
    /// Full endpoint URL; override for proxies and mock servers.
    pub endpoint: String,
    /// Value of the `anthropic-version` header.
    pub api_version: String,
    /// Extra headers merged over the defaults; on collision these win.
    pub headers: Vec<(String, String)>,
    pub timeout: RequestTimeout,
}

impl ChatClientConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            headers: Vec::new(),
            timeout: RequestTimeout::default(),
        }
    }

    /// Reads `ANTHROPIC_API_KEY` (required) and `ANTHROPIC_ENDPOINT`
    /// (optional).
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| ConfigError::new("ANTHROPIC_API_KEY is not set"))?;
        let mut config = Self::new(api_key);
        if let Ok(endpoint) = std::env::var("ANTHROPIC_ENDPOINT") {
            if !endpoint.trim().is_empty() {
                config.endpoint = endpoint;
            }
        }
        Ok(config)
    }
}

/// Client for the messages API.
#[derive(Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    headers: HeaderMap,
    endpoint: String,
    timeout: RequestTimeout,
}

impl ChatClient {
    pub fn new(config: ChatClientConfig) -> Result<Self, ConfigError> {
        let headers = build_headers(&config)?;
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs_f64(config.timeout.connect))
            .build()
            .map_err(|error| ConfigError::new(format!("failed to build http client: {error}")))?;

        Ok(Self {
            http,
            headers,
            endpoint: config.endpoint,
            timeout: config.timeout,
        })
    }

    /// Client configured from the environment (see
    /// [`ChatClientConfig::from_env`]).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::new(ChatClientConfig::from_env()?)
    }

    /// Sends a non-streaming completion request.
    pub async fn send(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: Option<&ChatOptions>,
    ) -> Result<ChatCompletion, ChatError> {
        let controller = AbortController::new();
        self.send_with_signal(model, messages, options, &controller.signal())
            .await
    }

    /// Same as [`send`](Self::send), observing `signal` at every await
    /// checkpoint; an observed abort returns [`ChatError::Cancelled`].
    pub async fn send_with_signal(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: Option<&ChatOptions>,
        signal: &AbortSignal,
    ) -> Result<ChatCompletion, ChatError> {
        if signal.is_aborted() {
            return Err(ChatError::Cancelled);
        }
        let messages = self.resolve_remote_sources(messages).await;
        let body = build_request_body(model, &messages, options, false);
        if signal.is_aborted() {
            return Err(ChatError::Cancelled);
        }

        debug!(%model, endpoint = %self.endpoint, "sending completion request");
        let response = self
            .http
            .post(&self.endpoint)
            .headers(self.headers.clone())
            .timeout(Duration::from_secs_f64(self.timeout.request))
            .json(&body)
            .send()
            .await?;
        if signal.is_aborted() {
            return Err(ChatError::Cancelled);
        }

        let status = response.status().as_u16();
        let raw = response.bytes().await?;
        if signal.is_aborted() {
            return Err(ChatError::Cancelled);
        }
        if let Some(error) = classify_response(status, &raw) {
            return Err(error);
        }
        Ok(serde_json::from_slice(&raw)?)
    }

    /// Starts a streaming completion call. The returned stream yields chunk
    /// snapshots in frame arrival order and owns the abort controller for
    /// the call.
    pub async fn stream(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: Option<&ChatOptions>,
    ) -> Result<ChatCompletionStream, ChatError> {
        let messages = self.resolve_remote_sources(messages).await;
        let body = build_request_body(model, &messages, options, true);

        debug!(%model, endpoint = %self.endpoint, "starting streaming completion request");
        let response = self
            .http
            .post(&self.endpoint)
            .headers(self.headers.clone())
            .json(&body)
            .send()
            .await?;

        let status = response.status().as_u16();
        if !(200..=299).contains(&status) {
            let raw = response.bytes().await?;
            let message =
                parse_error_envelope(&raw).unwrap_or_else(|| status_message(status, &raw));
            return Err(ChatError::Server { status, message });
        }

        let (sender, receiver) = mpsc::unbounded();
        let controller = AbortController::new();
        let signal = controller.signal();
        let read_timeout = Duration::from_secs_f64(self.timeout.stream_read);
        tokio::spawn(stream_producer(response, sender, signal, read_timeout));

        Ok(ChatCompletionStream::new(receiver, controller))
    }

    /// Fetches remote image and document URLs and replaces them with base64
    /// payloads; a failed fetch resolves to an empty source. The fetches
    /// carry none of the API headers.
    async fn resolve_remote_sources(&self, messages: &[ChatMessage]) -> Vec<ChatMessage> {
        let mut resolved = messages.to_vec();
        for message in &mut resolved {
            for part in &mut message.content {
                let source = match part {
                    ContentPart::Image(source) | ContentPart::Document(source) => source,
                    ContentPart::Text(_) => continue,
                };
                if !is_remote_url(source) {
                    continue;
                }
                *source = self.fetch_media(source).await.unwrap_or_default();
            }
        }
        resolved
    }

    async fn fetch_media(&self, url: &str) -> Option<String> {
        let response = match self.http.get(url).send().await {
            Ok(response) => response,
            Err(error) => {
                warn!(%url, %error, "media fetch failed");
                return None;
            }
        };
        if !response.status().is_success() {
            warn!(%url, status = %response.status(), "media fetch returned an error status");
            return None;
        }
        let bytes = response.bytes().await.ok()?;
        Some(BASE64.encode(&bytes))
    }
}

fn build_headers(config: &ChatClientConfig) -> Result<HeaderMap, ConfigError> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(
        "anthropic-version",
        HeaderValue::from_str(&config.api_version)
            .map_err(|_| ConfigError::new("invalid anthropic-version header value"))?,
    );
    let mut api_key = HeaderValue::from_str(&config.api_key)
        .map_err(|_| ConfigError::new("api key is not a valid header value"))?;
    api_key.set_sensitive(true);
    headers.insert("x-api-key", api_key);

    for (name, value) in &config.headers {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| ConfigError::new(format!("invalid header name: {name}")))?;
        let header_value = HeaderValue::from_str(value)
            .map_err(|_| ConfigError::new(format!("invalid value for header: {name}")))?;
        headers.insert(header_name, header_value);
    }
    Ok(headers)
}

/// Error envelope first, status class second.
fn classify_response(status: u16, body: &[u8]) -> Option<ChatError> {
    if let Some(message) = parse_error_envelope(body) {
        return Some(ChatError::Server { status, message });
    }
    if (200..=299).contains(&status) {
        return None;
    }
    Some(ChatError::Server {
        status,
        message: status_message(status, body),
    })
}

fn parse_error_envelope(body: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;
    let message = value.get("error")?.get("message")?.as_str()?;
    Some(message.to_string())
}

fn status_message(status: u16, body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body).trim().to_string();
    if text.is_empty() {
        format!("unexpected status {status}")
    } else {
        text
    }
}

/// Reads the SSE body, folds frames through the assembler, and forwards
/// emissions. Exits on terminal frames, transport failure, an observed
/// abort, or a closed channel.
async fn stream_producer(
    response: reqwest::Response,
    sender: mpsc::UnboundedSender<Result<ChatCompletionChunk, ChatError>>,
    signal: AbortSignal,
    read_timeout: Duration,
) {
    let mut byte_stream = response.bytes_stream();
    let mut scanner = SseLineScanner::new();
    let mut assembler = ChunkAssembler::new();

    loop {
        if signal.is_aborted() {
            let _ = sender.unbounded_send(Err(ChatError::Cancelled));
            return;
        }

        let read = tokio::time::timeout(read_timeout, byte_stream.next()).await;
        let item = match read {
            Ok(item) => item,
            Err(_) => {
                let stalled =
                    std::io::Error::new(std::io::ErrorKind::TimedOut, "stream read timed out");
                let _ = sender.unbounded_send(Err(ChatError::Network(Box::new(stalled))));
                return;
            }
        };
        // Clean end of input, with or without a prior message_stop.
        let Some(item) = item else {
            break;
        };
        let bytes: Bytes = match item {
            Ok(bytes) => bytes,
            Err(error) => {
                let _ = sender.unbounded_send(Err(ChatError::from(error)));
                return;
            }
        };
        if signal.is_aborted() {
            let _ = sender.unbounded_send(Err(ChatError::Cancelled));
            return;
        }

        let text = String::from_utf8_lossy(&bytes);
        for line in scanner.push(&text) {
            if !dispatch_line(line, &mut assembler, &sender) {
                return;
            }
        }
    }

    if let Some(line) = scanner.finish() {
        dispatch_line(line, &mut assembler, &sender);
    }
}

/// Returns false once the stream is finished, terminally or cleanly.
fn dispatch_line(
    line: SseLine,
    assembler: &mut ChunkAssembler,
    sender: &mpsc::UnboundedSender<Result<ChatCompletionChunk, ChatError>>,
) -> bool {
    match line {
        SseLine::ErrorEvent => {
            let _ = sender.unbounded_send(Err(ChatError::Stream(
                "stream reported an error event".to_string(),
            )));
            false
        }
        SseLine::Data(payload) => {
            let frame: StreamFrame = match serde_json::from_str(&payload) {
                Ok(frame) => frame,
                Err(error) => {
                    let _ = sender.unbounded_send(Err(ChatError::Decoding(error)));
                    return false;
                }
            };
            match assembler.apply(frame) {
                Transition::Emit(chunk) => sender.unbounded_send(Ok(chunk)).is_ok(),
                Transition::Skip => true,
                Transition::Stop => false,
                Transition::Fail(message) => {
                    let _ = sender.unbounded_send(Err(ChatError::Stream(message)));
                    false
                }
            }
        }
    }
}
