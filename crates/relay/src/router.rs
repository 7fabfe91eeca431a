//! The inference router: one uniform `infer` over whichever backend was
//! configured at startup.
//!
//! The router resolves the system prompt, snapshots the conversation window,
//! calls the backend and, only on success, records the new turn. A failed
//! call leaves the window exactly as it was.

use std::sync::Arc;

use parley_core::backend::{Backend, ChunkReceiver, InferenceRequest, StreamChunk};
use parley_core::error::{BackendError, Error};
use parley_core::locale::PromptBook;
use parley_core::message::{ConversationId, Turn};
use parley_core::prompt::{SystemPrompt, strip_leading_breaks};
use parley_core::store::ConversationStore;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Reply sent when the backend could not answer.
pub const DEFAULT_FALLBACK: &str = "I don't know what to say...";

/// A failed inference, carrying the reply to show the user instead.
#[derive(Debug, thiserror::Error)]
#[error("inference failed: {error}")]
pub struct InferenceFailure {
    /// What went wrong.
    pub error: Error,

    /// Safe user-facing text.
    pub fallback: String,
}

/// Routes queries to the configured backend and keeps the window current.
pub struct InferenceRouter {
    backend: Arc<dyn Backend>,
    store: Arc<dyn ConversationStore>,
    book: PromptBook,
    fallback: String,
}

impl InferenceRouter {
    pub fn new(
        backend: Arc<dyn Backend>,
        store: Arc<dyn ConversationStore>,
        book: PromptBook,
    ) -> Self {
        Self {
            backend,
            store,
            book,
            fallback: DEFAULT_FALLBACK.to_string(),
        }
    }

    /// Set the reply used when inference fails.
    pub fn with_fallback(mut self, fallback: impl Into<String>) -> Self {
        self.fallback = fallback.into();
        self
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        &self.store
    }

    pub fn prompt_book(&self) -> &PromptBook {
        &self.book
    }

    pub fn fallback_message(&self) -> &str {
        &self.fallback
    }

    /// Answer `query` in the context of conversation `id`.
    ///
    /// `override_prompt` wins over the conversation's custom prompt, which
    /// wins over the locale default. On success the turn is appended (the
    /// store evicts beyond its retention) and the reply is returned without
    /// leading line breaks.
    pub async fn infer(
        &self,
        id: &ConversationId,
        query: &str,
        override_prompt: Option<&SystemPrompt>,
    ) -> Result<String, InferenceFailure> {
        let request = self
            .build_request(id, query, override_prompt)
            .await
            .map_err(|e| self.failure(id, e))?;
        let window_len = request.window.len();

        debug!(
            conversation = %id,
            backend = self.backend.name(),
            window = window_len,
            "Dispatching inference"
        );

        let completion = self
            .backend
            .complete(request)
            .await
            .map_err(|e| self.failure(id, e.into()))?;

        let reply = usable_reply(&completion.text).map_err(|e| self.failure(id, e.into()))?;
        self.store
            .append(id, Turn::new(query, reply.clone()))
            .await
            .map_err(|e| self.failure(id, e.into()))?;

        info!(
            conversation = %id,
            backend = %completion.backend,
            reply_len = reply.len(),
            "Inference complete"
        );
        Ok(reply)
    }

    /// Like [`infer`](Self::infer), but forwards partial output as it arrives.
    ///
    /// The turn is stored once, when the final chunk is seen. A stream that
    /// errors or ends early stores nothing. Dropping the receiver does not
    /// cancel generation; the remaining output is still drained and stored.
    pub async fn infer_stream(
        &self,
        id: &ConversationId,
        query: &str,
        override_prompt: Option<&SystemPrompt>,
    ) -> Result<ChunkReceiver, InferenceFailure> {
        let request = self
            .build_request(id, query, override_prompt)
            .await
            .map_err(|e| self.failure(id, e))?;
        let mut upstream = self
            .backend
            .stream(request)
            .await
            .map_err(|e| self.failure(id, e.into()))?;

        let (tx, rx) = mpsc::channel(64);
        let store = Arc::clone(&self.store);
        let id = id.clone();
        let query = query.to_string();

        tokio::spawn(async move {
            let mut reply = String::new();
            let mut last = None;

            while let Some(item) = upstream.recv().await {
                match item {
                    Ok(mut chunk) => {
                        if let Some(delta) = chunk.content.take() {
                            let delta = if reply.is_empty() {
                                strip_leading_breaks(&delta).to_string()
                            } else {
                                delta
                            };
                            reply.push_str(&delta);
                            if !delta.is_empty() {
                                chunk.content = Some(delta);
                            }
                        }

                        if chunk.done {
                            last = Some(chunk);
                            break;
                        }
                        if chunk.content.is_some() {
                            let _ = tx.send(Ok(chunk)).await;
                        }
                    }
                    Err(e) => {
                        warn!(conversation = %id, error = %e, "Stream failed, window unchanged");
                        let _ = tx.send(Err(e)).await;
                        return;
                    }
                }
            }

            let Some(last) = last else {
                warn!(conversation = %id, "Stream ended without a final chunk, window unchanged");
                let _ = tx
                    .send(Err(BackendError::StreamInterrupted(
                        "stream closed before completion".into(),
                    )))
                    .await;
                return;
            };

            if let Err(e) = usable_reply(&reply) {
                warn!(conversation = %id, error = %e, "Stream produced no text, window unchanged");
                let _ = tx.send(Err(e)).await;
                return;
            }

            // The final chunk goes out only once the turn is stored
            let outcome = match store.append(&id, Turn::new(query, reply)).await {
                Ok(()) => Ok(last),
                Err(e) => {
                    warn!(conversation = %id, error = %e, "Failed to store streamed turn");
                    Err(BackendError::StreamInterrupted(e.to_string()))
                }
            };
            let _ = tx.send(outcome).await;
        });

        Ok(rx)
    }

    /// Stateless call: answer `query` given an explicit history.
    ///
    /// Uses the default locale's persona for labels, and its prompt unless
    /// `prompt` is supplied. Nothing is read from or written to the store.
    pub async fn complete(
        &self,
        query: &str,
        prompt: Option<&SystemPrompt>,
        history: &[Turn],
    ) -> Result<String, BackendError> {
        let locale = self.book.default_locale();
        let persona = self.book.persona(locale);
        let request = InferenceRequest {
            query: query.to_string(),
            system_prompt: prompt.unwrap_or(&persona.prompt).clone(),
            window: history.to_vec(),
            labels: persona.labels.clone(),
            locale,
        };
        let completion = self.backend.complete(request).await?;
        usable_reply(&completion.text)
    }

    async fn build_request(
        &self,
        id: &ConversationId,
        query: &str,
        override_prompt: Option<&SystemPrompt>,
    ) -> Result<InferenceRequest, Error> {
        let system_prompt = match override_prompt {
            Some(prompt) => prompt.clone(),
            None => self.store.prompt(id).await?,
        };
        let persona = self.store.persona(id).await?;

        Ok(InferenceRequest {
            query: query.to_string(),
            system_prompt,
            window: self.store.window(id).await?,
            labels: persona.labels,
            locale: self.store.locale(id).await?,
        })
    }

    fn failure(&self, id: &ConversationId, error: Error) -> InferenceFailure {
        warn!(
            conversation = %id,
            backend = self.backend.name(),
            error = %error,
            "Inference failed, window unchanged"
        );
        InferenceFailure {
            error,
            fallback: self.fallback.clone(),
        }
    }
}

/// Strip leading line breaks; a reply with nothing left to show is a failure.
fn usable_reply(text: &str) -> Result<String, BackendError> {
    let reply = strip_leading_breaks(text);
    if reply.trim().is_empty() {
        return Err(BackendError::MissingField("completion text".into()));
    }
    Ok(reply.to_string())
}

/// Collect a chunk stream into the full reply.
pub async fn collect_stream(mut rx: ChunkReceiver) -> Result<String, BackendError> {
    let mut text = String::new();
    while let Some(item) = rx.recv().await {
        let StreamChunk { content, done, .. } = item?;
        if let Some(delta) = content {
            text.push_str(&delta);
        }
        if done {
            break;
        }
    }
    Ok(text)
}
