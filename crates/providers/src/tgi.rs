//! Text-generation-inference server adapter.
//!
//! Renders the composed prompt as the sole input to `POST {url}/generate`
//! with explicit sampling parameters. The server may echo a stop sequence at
//! the end of its completion, so the text is cut at the first one found.

use async_trait::async_trait;
use parley_config::TgiConfig;
use parley_core::backend::{Backend, Completion, InferenceRequest, Usage};
use parley_core::error::BackendError;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::http;

pub struct TgiBackend {
    base_url: String,
    params: TgiConfig,
    client: reqwest::Client,
}

impl TgiBackend {
    pub fn from_config(config: &TgiConfig) -> Result<Self, BackendError> {
        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            params: config.clone(),
            client: http::client(config.timeout_secs)?,
        })
    }

    fn body<'a>(&'a self, inputs: &'a str) -> GenerateRequest<'a> {
        GenerateRequest {
            inputs,
            parameters: GenerateParameters {
                max_new_tokens: self.params.max_new_tokens,
                temperature: self.params.temperature,
                top_p: self.params.top_p,
                top_k: self.params.top_k,
                typical_p: self.params.typical_p,
                repetition_penalty: self.params.repetition_penalty,
                stop: &self.params.stop_sequences,
                details: true,
            },
        }
    }
}

#[async_trait]
impl Backend for TgiBackend {
    fn name(&self) -> &str {
        "tgi"
    }

    async fn complete(
        &self,
        request: InferenceRequest,
    ) -> std::result::Result<Completion, BackendError> {
        let prompt = request.rendered_prompt();
        let url = format!("{}/generate", self.base_url);

        debug!(
            url = %url,
            prompt_len = prompt.len(),
            max_new_tokens = self.params.max_new_tokens,
            "Sending generation request"
        );

        let response = self
            .client
            .post(&url)
            .json(&self.body(&prompt))
            .send()
            .await
            .map_err(http::transport_error)?;
        let response = http::check_status(self.name(), response).await?;
        let parsed: GenerateResponse = http::read_json(response).await?;

        let generated = parsed
            .generated_text
            .ok_or_else(|| BackendError::MissingField("generated_text".into()))?;
        let text = http::truncate_at_stop(&generated, &self.params.stop_sequences);

        let mut completion = Completion::new(text, self.name());
        completion.usage = parsed.details.map(|d| Usage {
            prompt_tokens: 0,
            completion_tokens: d.generated_tokens,
            total_tokens: d.generated_tokens,
        });
        Ok(completion)
    }

    async fn health_check(&self) -> std::result::Result<bool, BackendError> {
        let url = format!("{}/health", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(http::transport_error)?;
        Ok(response.status().is_success())
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    inputs: &'a str,
    parameters: GenerateParameters<'a>,
}

#[derive(Debug, Serialize)]
struct GenerateParameters<'a> {
    max_new_tokens: u32,
    temperature: f32,
    top_p: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
    typical_p: f32,
    repetition_penalty: f32,
    stop: &'a [String],
    details: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    generated_text: Option<String>,
    #[serde(default)]
    details: Option<GenerateDetails>,
}

#[derive(Debug, Deserialize)]
struct GenerateDetails {
    generated_tokens: u32,
}
