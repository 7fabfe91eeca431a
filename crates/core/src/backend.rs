//! Backend trait: the abstraction over inference providers.
//!
//! A Backend takes one normalized [`InferenceRequest`] and produces either a
//! [`Completion`] or a [`BackendError`]. Backends own no conversation state:
//! everything they need arrives in the request, built fresh for every call.
//!
//! Implementations: JSON gateway, text-generation-inference server, in-process
//! GGUF model, hosted chat-completion API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::BackendError;
use crate::locale::Locale;
use crate::message::Turn;
use crate::prompt::{LabelPair, SystemPrompt};

/// Everything a backend needs for one call. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferenceRequest {
    /// The new user query, verbatim.
    pub query: String,

    /// Resolved system prompt (override, custom or locale default).
    pub system_prompt: SystemPrompt,

    /// Snapshot of the conversation window, oldest first.
    pub window: Vec<Turn>,

    /// Speaker labels for plain-text history.
    pub labels: LabelPair,

    /// Locale of the conversation.
    pub locale: Locale,
}

impl InferenceRequest {
    /// The prompt as a single string, for backends that take raw text.
    pub fn rendered_prompt(&self) -> String {
        self.system_prompt
            .compose(&self.window, &self.query, &self.labels)
    }
}

/// A finished answer from a backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Completion {
    /// The generated text.
    pub text: String,

    /// Token usage statistics, when the backend reports them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,

    /// Which backend produced it.
    pub backend: String,
}

impl Completion {
    pub fn new(text: impl Into<String>, backend: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            usage: None,
            backend: backend.into(),
        }
    }
}

/// Token usage information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A single chunk in a streaming response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamChunk {
    /// Partial content delta
    #[serde(default)]
    pub content: Option<String>,

    /// Whether this is the final chunk
    #[serde(default)]
    pub done: bool,

    /// Usage info (typically only in the final chunk)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// Receiving half of a streamed completion.
pub type ChunkReceiver =
    tokio::sync::mpsc::Receiver<std::result::Result<StreamChunk, BackendError>>;

/// The core Backend trait.
///
/// The router calls `complete()` or `stream()` without knowing which backend
/// is configured. Every transport, decode or missing-field failure must come
/// back as a [`BackendError`]; nothing may panic or escape raw.
#[async_trait]
pub trait Backend: Send + Sync {
    /// A human-readable name for this backend (e.g., "gateway", "tgi").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn complete(
        &self,
        request: InferenceRequest,
    ) -> std::result::Result<Completion, BackendError>;

    /// Send a request and get a stream of response chunks.
    ///
    /// Default implementation calls `complete()` and wraps the result as a single chunk.
    async fn stream(
        &self,
        request: InferenceRequest,
    ) -> std::result::Result<ChunkReceiver, BackendError> {
        let completion = self.complete(request).await?;
        let (tx, rx) = tokio::sync::mpsc::channel(1);
        let _ = tx
            .send(Ok(StreamChunk {
                content: Some(completion.text),
                done: true,
                usage: completion.usage,
            }))
            .await;
        Ok(rx)
    }

    /// Health check: can we reach the backend?
    async fn health_check(&self) -> std::result::Result<bool, BackendError> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl Backend for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        async fn complete(
            &self,
            request: InferenceRequest,
        ) -> std::result::Result<Completion, BackendError> {
            Ok(Completion::new(request.query, "echo"))
        }
    }

    fn request(query: &str) -> InferenceRequest {
        InferenceRequest {
            query: query.into(),
            system_prompt: SystemPrompt::new("{history}Q: {input}").unwrap(),
            window: vec![Turn::new("hi", "hello")],
            labels: LabelPair::human_ai(),
            locale: Locale::En,
        }
    }

    #[test]
    fn rendered_prompt_uses_window_and_labels() {
        assert_eq!(
            request("next").rendered_prompt(),
            "Human: hi\nAI: hello\nQ: next"
        );
    }

    #[tokio::test]
    async fn default_stream_yields_single_final_chunk() {
        let mut rx = Echo.stream(request("ping")).await.unwrap();
        let chunk = rx.recv().await.unwrap().unwrap();
        assert_eq!(chunk.content.as_deref(), Some("ping"));
        assert!(chunk.done);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn default_health_check_is_ok() {
        assert!(Echo.health_check().await.unwrap());
    }
}
