//! Conversational AI backend boundary.
//!
//! A backend offers two calls over the same conversation context: a
//! streaming reply (an async sequence of text chunks) and a single-shot
//! reply. [`HttpChatBackend`] talks to the app's HTTP service; tests and
//! hosts can plug in anything else implementing [`ChatBackend`].
//!
//! # API Reference
//!
//! - `POST {base}/api/ask-rishi` with [`AskRequest`] → `{"text": "..."}`
//! - `POST {base}/api/ask-rishi/stream` with [`AskRequest`] → chunked `text/plain`

use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::BackendError;
use crate::model::{Language, Persona};

/// A streamed reply: text chunks in arrival order.
pub type ChunkStream = BoxStream<'static, Result<String, BackendError>>;

/// Identity of a conversational session.
///
/// Any change recreates the session from scratch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SessionKey {
    pub language: Language,
    pub persona: Persona,
    /// Short description of the user's chart, empty when unknown.
    pub context_summary: String,
}

impl SessionKey {
    pub fn new(language: Language, persona: Persona, context_summary: impl Into<String>) -> Self {
        Self {
            language,
            persona,
            context_summary: context_summary.into(),
        }
    }
}

/// Who said something.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// One completed message in a session's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

/// Everything a backend needs to answer one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    pub session: SessionKey,
    pub history: Vec<Turn>,
    pub message: String,
}

/// A conversational AI service.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Start a streamed reply.
    async fn stream_reply(&self, request: &ChatRequest) -> Result<ChunkStream, BackendError>;

    /// A complete reply in one response.
    async fn reply(&self, request: &ChatRequest) -> Result<String, BackendError>;
}

/// Request body of the ask endpoints.
#[derive(Debug, Serialize)]
pub struct AskRequest<'a> {
    pub prompt: &'a str,
    pub language: &'static str,
    #[serde(skip_serializing_if = "str::is_empty")]
    pub context: &'a str,
    pub persona: &'static str,
    pub history: &'a [Turn],
}

impl<'a> From<&'a ChatRequest> for AskRequest<'a> {
    fn from(request: &'a ChatRequest) -> Self {
        Self {
            prompt: &request.message,
            language: request.session.language.code(),
            context: &request.session.context_summary,
            persona: request.session.persona.as_str(),
            history: &request.history,
        }
    }
}

/// Response body of the single-shot ask endpoint.
#[derive(Debug, Deserialize)]
pub struct AskResponse {
    #[serde(default)]
    pub text: String,
}

/// Client for the app's AI HTTP service.
#[derive(Clone)]
pub struct HttpChatBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpChatBackend {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Use a preconfigured client (timeouts, proxies).
    pub fn with_client(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn post(&self, path: &str, request: &ChatRequest) -> Result<reqwest::Response, BackendError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .json(&AskRequest::from(request))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }
        debug!(path, status = status.as_u16(), "AI backend responded");
        Ok(response)
    }
}

#[async_trait]
impl ChatBackend for HttpChatBackend {
    async fn stream_reply(&self, request: &ChatRequest) -> Result<ChunkStream, BackendError> {
        let response = self.post("/api/ask-rishi/stream", request).await?;

        let chunks = response
            .bytes_stream()
            .scan(Utf8Decoder::default(), |decoder, item| {
                let decoded = match item {
                    Ok(bytes) => decoder.decode(&bytes),
                    Err(e) => Err(BackendError::from(e)),
                };
                futures_util::future::ready(Some(decoded))
            })
            .boxed();
        Ok(chunks)
    }

    async fn reply(&self, request: &ChatRequest) -> Result<String, BackendError> {
        let response = self.post("/api/ask-rishi", request).await?;
        let body: AskResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))?;
        Ok(body.text)
    }
}

/// Incremental UTF-8 decoding of a byte stream whose chunk boundaries may
/// split a character.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    /// Decode as much of `pending + bytes` as forms complete characters.
    pub fn decode(&mut self, bytes: &[u8]) -> Result<String, BackendError> {
        self.pending.extend_from_slice(bytes);
        let valid = match std::str::from_utf8(&self.pending) {
            Ok(_) => self.pending.len(),
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(e) => return Err(BackendError::Decode(e.to_string())),
        };
        let rest = self.pending.split_off(valid);
        let text = String::from_utf8(std::mem::replace(&mut self.pending, rest))
            .map_err(|e| BackendError::Decode(e.to_string()))?;
        Ok(text)
    }
}
