//! Streaming text-generation client.
//!
//! The wire format is the OpenAI-compatible chat completions endpoint with
//! `stream: true`: a server-sent-event body of `data: {json}` lines ending
//! with `data: [DONE]`.

use std::{collections::VecDeque, pin::Pin};

use async_trait::async_trait;
use futures::{stream, stream::BoxStream, Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::config::Settings;

pub const API_KEY_ENV: &str = "OPENAI_API_KEY";
const DONE_MARKER: &str = "[DONE]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub system_directive: String,
    pub conversation: Vec<ChatMessage>,
    pub stream: bool,
}

/// One streamed event. Role announcements and finish markers carry no text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionChunk {
    Content(String),
    Empty,
}

impl CompletionChunk {
    pub fn content(&self) -> Option<&str> {
        match self {
            CompletionChunk::Content(text) if !text.is_empty() => Some(text),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("missing API credential; set {0}")]
    MissingCredential(&'static str),
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("completion API returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("completion API error: {0}")]
    Api(String),
    #[error("malformed stream event: {0}")]
    Malformed(String),
    #[error("stream closed before the end marker")]
    Truncated,
}

pub type ChunkStream = BoxStream<'static, Result<CompletionChunk, CompletionError>>;

#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Issues one request. The returned stream ends after the end-of-stream marker.
    async fn stream(&self, request: CompletionRequest) -> Result<ChunkStream, CompletionError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionSettings {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
}

impl From<&Settings> for CompletionSettings {
    fn from(value: &Settings) -> Self {
        Self {
            api_key: value.openai_api_key.clone(),
            base_url: value.openai_base_url.clone(),
            model: value.completion_model.clone(),
        }
    }
}

#[derive(Serialize)]
struct ChatCompletionBody<'a> {
    model: &'a str,
    stream: bool,
    messages: Vec<ChatMessage>,
}

pub struct OpenAiClient {
    http: Client,
    api_key: String,
    endpoint: String,
    model: String,
}

impl OpenAiClient {
    pub fn from_settings(settings: &CompletionSettings) -> Result<Self, CompletionError> {
        let api_key = settings
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or(CompletionError::MissingCredential(API_KEY_ENV))?;
        Ok(Self {
            http: Client::builder().build()?,
            api_key: api_key.to_string(),
            endpoint: format!(
                "{}/chat/completions",
                settings.base_url.trim_end_matches('/')
            ),
            model: settings.model.clone(),
        })
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn stream(&self, request: CompletionRequest) -> Result<ChunkStream, CompletionError> {
        let mut messages = Vec::with_capacity(request.conversation.len() + 1);
        messages.push(ChatMessage {
            role: Role::System,
            content: request.system_directive,
        });
        messages.extend(request.conversation);

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&ChatCompletionBody {
                model: &self.model,
                stream: request.stream,
                messages,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::Status {
                status: status.as_u16(),
                body,
            });
        }
        debug!(endpoint = %self.endpoint, "completion: stream opened");
        Ok(decode_event_stream(response.bytes_stream()))
    }
}

/// Builds the HTTP client on first use and reuses it for every later request.
pub struct LazyCompletionClient {
    settings: CompletionSettings,
    client: OnceCell<OpenAiClient>,
}

impl LazyCompletionClient {
    pub fn new(settings: CompletionSettings) -> Self {
        Self {
            settings,
            client: OnceCell::new(),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.client.initialized()
    }

    async fn client(&self) -> Result<&OpenAiClient, CompletionError> {
        self.client
            .get_or_try_init(|| async {
                let client = OpenAiClient::from_settings(&self.settings)?;
                info!(model = %self.settings.model, "completion: client initialized");
                Ok::<_, CompletionError>(client)
            })
            .await
    }
}

#[async_trait]
impl CompletionClient for LazyCompletionClient {
    async fn stream(&self, request: CompletionRequest) -> Result<ChunkStream, CompletionError> {
        self.client().await?.stream(request).await
    }
}

/// Splits a server-sent-event byte stream into `data:` payloads.
///
/// Bytes are buffered until a full line arrives, so multi-byte characters
/// split across network reads are reassembled before decoding.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);
        let mut payloads = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|byte| *byte == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            if let Some(payload) = data_payload(&line) {
                payloads.push(payload);
            }
        }
        payloads
    }

    /// Flushes a final line that was not newline-terminated.
    pub fn finish(&mut self) -> Option<String> {
        let line = std::mem::take(&mut self.buffer);
        data_payload(&line)
    }
}

fn data_payload(line: &[u8]) -> Option<String> {
    let line = String::from_utf8_lossy(line);
    let line = line.trim_end_matches(['\r', '\n']);
    let payload = line.strip_prefix("data:")?;
    Some(payload.strip_prefix(' ').unwrap_or(payload).to_string())
}

#[derive(Deserialize)]
struct StreamEvent {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    error: Option<StreamErrorBody>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Deserialize, Default)]
struct StreamDelta {
    content: Option<String>,
}

#[derive(Deserialize)]
struct StreamErrorBody {
    message: String,
}

/// `Ok(None)` is the end-of-stream marker.
pub fn parse_event(payload: &str) -> Result<Option<CompletionChunk>, CompletionError> {
    let payload = payload.trim();
    if payload == DONE_MARKER {
        return Ok(None);
    }
    let event: StreamEvent = serde_json::from_str(payload)
        .map_err(|err| CompletionError::Malformed(format!("{err}: {payload}")))?;
    if let Some(error) = event.error {
        return Err(CompletionError::Api(error.message));
    }
    let content = event
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content);
    Ok(Some(match content {
        Some(text) => CompletionChunk::Content(text),
        None => CompletionChunk::Empty,
    }))
}

struct DecodeState<S> {
    body: Pin<Box<S>>,
    decoder: SseDecoder,
    pending: VecDeque<String>,
    body_done: bool,
    finished: bool,
}

pub fn decode_event_stream<S, B, E>(body: S) -> ChunkStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<CompletionError> + Send + 'static,
{
    let state = DecodeState {
        body: Box::pin(body),
        decoder: SseDecoder::default(),
        pending: VecDeque::new(),
        body_done: false,
        finished: false,
    };
    stream::unfold(state, |mut state| async move {
        loop {
            if state.finished {
                return None;
            }
            if let Some(payload) = state.pending.pop_front() {
                if payload.trim().is_empty() {
                    continue;
                }
                match parse_event(&payload) {
                    Ok(Some(chunk)) => return Some((Ok(chunk), state)),
                    Ok(None) => {
                        state.finished = true;
                        return None;
                    }
                    Err(err) => {
                        state.finished = true;
                        return Some((Err(err), state));
                    }
                }
            }
            if state.body_done {
                state.finished = true;
                return Some((Err(CompletionError::Truncated), state));
            }
            match state.body.next().await {
                Some(Ok(bytes)) => {
                    let payloads = state.decoder.push(bytes.as_ref());
                    state.pending.extend(payloads);
                }
                Some(Err(err)) => {
                    state.finished = true;
                    return Some((Err(err.into()), state));
                }
                None => {
                    state.body_done = true;
                    if let Some(payload) = state.decoder.finish() {
                        state.pending.push_back(payload);
                    }
                }
            }
        }
    })
    .boxed()
}

#[cfg(test)]
#[path = "tests/completion_tests.rs"]
mod tests;
