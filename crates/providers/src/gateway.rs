//! JSON gateway adapter.
//!
//! Posts one structured request per query:
//!
//! ```json
//! {"request": {"lang": "en", "context": "...", "chat_history": [["q", "r"]], "query": "..."}}
//! ```
//!
//! and reads the answer from `results.answer`.

use async_trait::async_trait;
use parley_config::GatewayConfig;
use parley_core::backend::{Backend, Completion, InferenceRequest};
use parley_core::error::BackendError;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::http;

pub struct GatewayBackend {
    url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl GatewayBackend {
    pub fn new(url: impl Into<String>, timeout_secs: u64) -> Result<Self, BackendError> {
        Ok(Self {
            url: url.into(),
            api_key: None,
            client: http::client(timeout_secs)?,
        })
    }

    pub fn from_config(config: &GatewayConfig) -> Result<Self, BackendError> {
        let mut backend = Self::new(&config.url, config.timeout_secs)?;
        backend.api_key = config.api_key.clone();
        Ok(backend)
    }

    fn body(request: &InferenceRequest) -> GatewayRequest<'_> {
        GatewayRequest {
            request: GatewayQuery {
                lang: request.locale.code(),
                context: request.system_prompt.preamble(),
                chat_history: request
                    .window
                    .iter()
                    .map(|t| (t.query(), t.response()))
                    .collect(),
                query: &request.query,
            },
        }
    }
}

#[async_trait]
impl Backend for GatewayBackend {
    fn name(&self) -> &str {
        "gateway"
    }

    async fn complete(
        &self,
        request: InferenceRequest,
    ) -> std::result::Result<Completion, BackendError> {
        debug!(
            url = %self.url,
            lang = request.locale.code(),
            history = request.window.len(),
            "Sending gateway request"
        );

        let mut builder = self.client.post(&self.url).json(&Self::body(&request));
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(http::transport_error)?;
        let response = http::check_status(self.name(), response).await?;
        let parsed: GatewayResponse = http::read_json(response).await?;

        let answer = parsed
            .results
            .and_then(|r| r.answer)
            .ok_or_else(|| BackendError::MissingField("results.answer".into()))?;

        Ok(Completion::new(answer, self.name()))
    }
}

#[derive(Debug, Serialize)]
struct GatewayRequest<'a> {
    request: GatewayQuery<'a>,
}

#[derive(Debug, Serialize)]
struct GatewayQuery<'a> {
    lang: &'a str,
    context: String,
    chat_history: Vec<(&'a str, &'a str)>,
    query: &'a str,
}

#[derive(Debug, Deserialize)]
struct GatewayResponse {
    #[serde(default)]
    results: Option<GatewayResults>,
}

#[derive(Debug, Deserialize)]
struct GatewayResults {
    #[serde(default)]
    answer: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::{LabelPair, Locale, SystemPrompt, Turn};
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> InferenceRequest {
        InferenceRequest {
            query: "how are you".into(),
            system_prompt: SystemPrompt::new("Be brief.\nConversation: {history}\nQ: {input}")
                .unwrap(),
            window: vec![Turn::new("hello", "hi there")],
            labels: LabelPair::human_ai(),
            locale: Locale::En,
        }
    }

    async fn backend(server: &MockServer) -> GatewayBackend {
        GatewayBackend::new(format!("{}/api/v1/query", server.uri()), 5).unwrap()
    }

    #[test]
    fn request_body_shape() {
        let req = request();
        let json = serde_json::to_value(GatewayBackend::body(&req)).unwrap();
        assert_eq!(json["request"]["lang"], "en");
        assert_eq!(json["request"]["context"], "Be brief.");
        assert_eq!(json["request"]["chat_history"][0][0], "hello");
        assert_eq!(json["request"]["chat_history"][0][1], "hi there");
        assert_eq!(json["request"]["query"], "how are you");
    }

    #[tokio::test]
    async fn returns_nested_answer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/query"))
            .and(body_partial_json(serde_json::json!({
                "request": {"query": "how are you", "lang": "en"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": {"answer": "Splendid, as always."}
            })))
            .mount(&server)
            .await;

        let completion = backend(&server).await.complete(request()).await.unwrap();
        assert_eq!(completion.text, "Splendid, as always.");
        assert_eq!(completion.backend, "gateway");
    }

    #[tokio::test]
    async fn missing_answer_is_missing_field() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"results": {}})),
            )
            .mount(&server)
            .await;

        let err = backend(&server).await.complete(request()).await.unwrap_err();
        assert!(matches!(err, BackendError::MissingField(_)));
        assert!(err.is_malformed());
    }

    #[tokio::test]
    async fn non_json_body_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let err = backend(&server).await.complete(request()).await.unwrap_err();
        assert!(matches!(err, BackendError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn server_error_is_transport_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let err = backend(&server).await.complete(request()).await.unwrap_err();
        assert!(matches!(err, BackendError::ApiError { status_code: 502, .. }));
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn unreachable_host_is_network_error() {
        let backend = GatewayBackend::new("http://127.0.0.1:1/query", 2).unwrap();
        let err = backend.complete(request()).await.unwrap_err();
        assert!(err.is_transport());
    }
}
