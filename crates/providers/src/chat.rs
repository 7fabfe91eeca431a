//! Hosted chat-completion adapter (OpenAI-compatible).
//!
//! Works with OpenAI, OpenRouter, Ollama, vLLM and any endpoint exposing
//! `/v1/chat/completions`.
//!
//! The role-tagged message list is rebuilt from the request's window on every
//! call and dropped afterwards; the conversation store stays the only record
//! of the history.

use async_trait::async_trait;
use futures::StreamExt;
use parley_config::ChatConfig;
use parley_core::backend::{Backend, ChunkReceiver, Completion, InferenceRequest, StreamChunk, Usage};
use parley_core::error::BackendError;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::http;

pub struct ChatBackend {
    base_url: String,
    api_key: String,
    params: ChatConfig,
    client: reqwest::Client,
}

impl ChatBackend {
    pub fn from_config(config: &ChatConfig) -> Result<Self, BackendError> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            BackendError::NotConfigured("chat backend requires chat.api_key or PARLEY_API_KEY".into())
        })?;
        Ok(Self {
            base_url: config.api_url.trim_end_matches('/').to_string(),
            api_key,
            params: config.clone(),
            client: http::client(config.timeout_secs)?,
        })
    }

    /// System preamble, then the window as user/assistant pairs, then the query.
    fn to_api_messages(request: &InferenceRequest) -> Vec<ApiMessage> {
        let mut messages = Vec::with_capacity(request.window.len() * 2 + 2);

        let preamble = request.system_prompt.preamble();
        if !preamble.is_empty() {
            messages.push(ApiMessage::new("system", preamble));
        }
        for turn in &request.window {
            messages.push(ApiMessage::new("user", turn.query()));
            messages.push(ApiMessage::new("assistant", turn.response()));
        }
        messages.push(ApiMessage::new("user", &request.query));
        messages
    }

    fn body(&self, request: &InferenceRequest, stream: bool) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.params.model,
            "messages": Self::to_api_messages(request),
            "temperature": self.params.temperature,
            "top_p": self.params.top_p,
            "max_tokens": self.params.max_tokens,
            "presence_penalty": self.params.presence_penalty,
            "frequency_penalty": self.params.frequency_penalty,
            "stream": stream,
        });

        if !self.params.stop_sequences.is_empty() {
            body["stop"] = serde_json::json!(self.params.stop_sequences);
        }
        if stream {
            body["stream_options"] = serde_json::json!({ "include_usage": true });
        }
        body
    }

    async fn post(&self, body: &serde_json::Value, sse: bool) -> Result<reqwest::Response, BackendError> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut builder = self.client.post(&url).bearer_auth(&self.api_key).json(body);
        if sse {
            builder = builder.header("Accept", "text/event-stream");
        }
        let response = builder.send().await.map_err(http::transport_error)?;
        http::check_status(self.name(), response).await
    }
}

#[async_trait]
impl Backend for ChatBackend {
    fn name(&self) -> &str {
        "chat"
    }

    async fn complete(
        &self,
        request: InferenceRequest,
    ) -> std::result::Result<Completion, BackendError> {
        debug!(
            model = %self.params.model,
            history = request.window.len(),
            "Sending completion request"
        );

        let response = self.post(&self.body(&request, false), false).await?;
        let api_response: ApiResponse = http::read_json(response).await?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| BackendError::MissingField("choices".into()))?;
        let content = choice
            .message
            .content
            .ok_or_else(|| BackendError::MissingField("choices[0].message.content".into()))?;

        let mut completion = Completion::new(content, self.name());
        completion.usage = api_response.usage.map(Usage::from);
        Ok(completion)
    }

    async fn stream(
        &self,
        request: InferenceRequest,
    ) -> std::result::Result<ChunkReceiver, BackendError> {
        debug!(model = %self.params.model, "Sending streaming request");

        let response = self.post(&self.body(&request, true), true).await?;
        let (tx, rx) = tokio::sync::mpsc::channel(64);

        // Read the SSE byte stream and forward content deltas
        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut lines = SseLines::default();
            let mut finished = false;

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx
                            .send(Err(BackendError::StreamInterrupted(e.to_string())))
                            .await;
                        return;
                    }
                };
                lines.push(&bytes);

                while let Some(line) = lines.next_line() {
                    let line = match line {
                        Ok(line) => line,
                        Err(e) => {
                            trace!(error = %e, "Skipping SSE line that is not UTF-8");
                            continue;
                        }
                    };
                    let Some(event) = parse_sse_line(&line) else {
                        continue;
                    };
                    match event {
                        SseEvent::Done => {
                            let _ = tx.send(Ok(final_chunk(None))).await;
                            return;
                        }
                        SseEvent::Usage(usage) => {
                            let _ = tx.send(Ok(final_chunk(Some(usage)))).await;
                            return;
                        }
                        SseEvent::Delta { content, finish } => {
                            finished |= finish;
                            if let Some(content) = content {
                                let chunk = StreamChunk {
                                    content: Some(content),
                                    done: false,
                                    usage: None,
                                };
                                if tx.send(Ok(chunk)).await.is_err() {
                                    return;
                                }
                            }
                        }
                        SseEvent::Ignored(data) => {
                            trace!(data = %data, "Ignoring unparseable SSE chunk");
                        }
                    }
                }
            }

            // Stream ended without [DONE]; only a reported finish_reason makes it complete
            let last = if finished {
                Ok(final_chunk(None))
            } else {
                Err(BackendError::StreamInterrupted(
                    "event stream closed before the answer finished".into(),
                ))
            };
            let _ = tx.send(last).await;
        });

        Ok(rx)
    }

    async fn health_check(&self) -> std::result::Result<bool, BackendError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(http::transport_error)?;
        Ok(response.status().is_success())
    }
}

fn final_chunk(usage: Option<Usage>) -> StreamChunk {
    StreamChunk {
        content: None,
        done: true,
        usage,
    }
}

/// Splits an SSE byte stream into lines, decoding each only once complete.
#[derive(Debug, Default)]
struct SseLines {
    buffer: Vec<u8>,
}

impl SseLines {
    fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    fn next_line(&mut self) -> Option<Result<String, std::str::Utf8Error>> {
        let end = self.buffer.iter().position(|&b| b == b'\n')?;
        let raw: Vec<u8> = self.buffer.drain(..=end).collect();
        let line = std::str::from_utf8(&raw[..end])
            .map(|line| line.trim_end_matches('\r').to_string());
        Some(line)
    }
}

#[derive(Debug)]
enum SseEvent {
    Done,
    Usage(Usage),
    Delta {
        content: Option<String>,
        finish: bool,
    },
    Ignored(String),
}

/// Interpret one SSE line. Blank lines, comments and empty deltas yield `None`.
fn parse_sse_line(line: &str) -> Option<SseEvent> {
    if line.is_empty() || line.starts_with(':') {
        return None;
    }
    let data = line.strip_prefix("data:")?.trim();
    if data == "[DONE]" {
        return Some(SseEvent::Done);
    }

    let Ok(stream_resp) = serde_json::from_str::<StreamResponse>(data) else {
        return Some(SseEvent::Ignored(data.to_string()));
    };

    // Usage arrives in the last chunk when stream_options.include_usage is set
    if let Some(usage) = stream_resp.usage {
        return Some(SseEvent::Usage(usage.into()));
    }

    let choice = stream_resp.choices.into_iter().next()?;
    let finish = choice.finish_reason.is_some();
    let content = choice.delta.content.filter(|c| !c.is_empty());
    if content.is_none() && !finish {
        return None;
    }
    Some(SseEvent::Delta { content, finish })
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
}

impl ApiMessage {
    fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: Some(content.into()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

impl From<ApiUsage> for Usage {
    fn from(u: ApiUsage) -> Self {
        Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        }
    }
}

// --- Streaming SSE types ---

#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::{LabelPair, Locale, SystemPrompt, Turn};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> InferenceRequest {
        InferenceRequest {
            query: "And now?".into(),
            system_prompt: SystemPrompt::new("You are terse.\nHistory: {history}\nQ: {input}")
                .unwrap(),
            window: vec![Turn::new("hello", "hi there")],
            labels: LabelPair::human_ai(),
            locale: Locale::En,
        }
    }

    fn backend(server: &MockServer) -> ChatBackend {
        let config = ChatConfig {
            api_url: format!("{}/v1", server.uri()),
            api_key: Some("sk-test".into()),
            timeout_secs: 5,
            ..ChatConfig::default()
        };
        ChatBackend::from_config(&config).unwrap()
    }

    #[test]
    fn messages_are_rebuilt_from_window() {
        let messages = ChatBackend::to_api_messages(&request());
        let roles: Vec<_> = messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, ["system", "user", "assistant", "user"]);
        assert_eq!(messages[0].content.as_deref(), Some("You are terse."));
        assert_eq!(messages[2].content.as_deref(), Some("hi there"));
        assert_eq!(messages[3].content.as_deref(), Some("And now?"));
    }

    #[test]
    fn empty_preamble_skips_system_message() {
        let mut req = request();
        req.system_prompt = SystemPrompt::new("{history}{input}").unwrap();
        req.window.clear();
        let messages = ChatBackend::to_api_messages(&req);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, "user");
    }

    #[test]
    fn missing_api_key_is_not_configured() {
        let err = ChatBackend::from_config(&ChatConfig::default()).err().unwrap();
        assert!(matches!(err, BackendError::NotConfigured(_)));
    }

    #[tokio::test]
    async fn completes_with_first_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "model": "gpt-4o-mini",
                "choices": [{"message": {"role": "assistant", "content": "Still here."}}],
                "usage": {"prompt_tokens": 20, "completion_tokens": 3, "total_tokens": 23}
            })))
            .mount(&server)
            .await;

        let completion = backend(&server).complete(request()).await.unwrap();
        assert_eq!(completion.text, "Still here.");
        assert_eq!(completion.usage.unwrap().total_tokens, 23);
    }

    #[tokio::test]
    async fn empty_choices_is_missing_field() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})),
            )
            .mount(&server)
            .await;

        let err = backend(&server).complete(request()).await.unwrap_err();
        assert!(matches!(err, BackendError::MissingField(_)));
    }

    #[tokio::test]
    async fn bad_key_is_authentication_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = backend(&server).complete(request()).await.unwrap_err();
        assert!(matches!(err, BackendError::AuthenticationFailed(_)));
    }

    #[tokio::test]
    async fn streams_content_deltas() {
        let server = MockServer::start().await;
        let sse = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"},\"finish_reason\":null}]}\n\n",
            ": keep-alive\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"},\"finish_reason\":null}]}\n\n",
            "data: [DONE]\n\n",
        );
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(sse),
            )
            .mount(&server)
            .await;

        let mut rx = backend(&server).stream(request()).await.unwrap();
        let mut text = String::new();
        let mut finished = false;
        while let Some(chunk) = rx.recv().await {
            let chunk = chunk.unwrap();
            if let Some(c) = chunk.content {
                text.push_str(&c);
            }
            finished = chunk.done;
        }
        assert_eq!(text, "Hello");
        assert!(finished);
    }

    async fn stream_sse(server: &MockServer, sse: &'static str) -> Vec<Result<StreamChunk, BackendError>> {
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(sse),
            )
            .mount(server)
            .await;

        let mut rx = backend(server).stream(request()).await.unwrap();
        let mut items = Vec::new();
        while let Some(item) = rx.recv().await {
            items.push(item);
        }
        items
    }

    #[tokio::test]
    async fn stream_cut_off_before_finish_is_interrupted() {
        let server = MockServer::start().await;
        let sse = "data: {\"choices\":[{\"delta\":{\"content\":\"The answer is\"},\"finish_reason\":null}]}\n\n";

        let items = stream_sse(&server, sse).await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap().content.as_deref(), Some("The answer is"));
        assert!(matches!(items[1], Err(BackendError::StreamInterrupted(_))));
    }

    #[tokio::test]
    async fn finish_reason_without_done_marker_completes() {
        let server = MockServer::start().await;
        let sse = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"Bye\"},\"finish_reason\":null}]}\n\n",
            "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
        );

        let items = stream_sse(&server, sse).await;
        let last = items.last().unwrap().as_ref().unwrap();
        assert!(last.done);
        assert!(items.iter().all(Result::is_ok));
    }

    #[test]
    fn multibyte_char_split_across_reads_survives() {
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"caf\u{e9}\"}}]}\n".as_bytes();
        let split = line.iter().position(|&b| b == 0xC3).unwrap() + 1;

        let mut lines = SseLines::default();
        lines.push(&line[..split]);
        assert!(lines.next_line().is_none());
        lines.push(&line[split..]);

        let decoded = lines.next_line().unwrap().unwrap();
        let Some(SseEvent::Delta { content, .. }) = parse_sse_line(&decoded) else {
            panic!("expected delta");
        };
        assert_eq!(content.as_deref(), Some("caf\u{e9}"));
        assert!(lines.next_line().is_none());
    }

    #[test]
    fn lines_drop_carriage_returns() {
        let mut lines = SseLines::default();
        lines.push(b": ping\r\ndata: [DONE]\r\n");
        assert_eq!(lines.next_line().unwrap().unwrap(), ": ping");
        assert_eq!(lines.next_line().unwrap().unwrap(), "data: [DONE]");
        assert!(lines.next_line().is_none());
    }

    #[test]
    fn parse_usage_chunk_is_final() {
        let line = r#"data: {"choices":[],"usage":{"prompt_tokens":10,"completion_tokens":5,"total_tokens":15}}"#;
        let Some(SseEvent::Usage(usage)) = parse_sse_line(line) else {
            panic!("expected usage");
        };
        assert_eq!(usage.total_tokens, 15);
    }

    #[test]
    fn parse_ignores_comments_and_empty_deltas() {
        assert!(parse_sse_line(": ping").is_none());
        assert!(parse_sse_line("").is_none());
        assert!(parse_sse_line(r#"data: {"choices":[{"delta":{},"finish_reason":null}]}"#).is_none());
        assert!(matches!(parse_sse_line("data: {not json"), Some(SseEvent::Ignored(_))));
    }

    #[test]
    fn parse_finish_reason_marks_delta() {
        let line = r#"data: {"choices":[{"delta":{},"finish_reason":"stop"}]}"#;
        assert!(matches!(
            parse_sse_line(line),
            Some(SseEvent::Delta { content: None, finish: true })
        ));
    }
}
