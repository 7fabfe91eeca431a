//! In-process local model adapter.
//!
//! Uses [Candle](https://github.com/huggingface/candle) (Rust-native ML) to run
//! a GGUF-quantized Llama-family model from a local file. No network, no API
//! key. The composed prompt is fed to the model verbatim, the same way the
//! generation-server adapter sends it.
//!
//! Generation blocks a worker thread for its full duration. [`Backend::stream`]
//! forwards decoded text as each token is sampled.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use candle_core::quantized::gguf_file;
use candle_core::{Device, Tensor};
use candle_transformers::generation::{LogitsProcessor, Sampling};
use candle_transformers::models::quantized_llama as qlm;
use candle_transformers::utils::apply_repeat_penalty;
use parley_config::LocalModelConfig;
use parley_core::backend::{Backend, ChunkReceiver, Completion, InferenceRequest, StreamChunk, Usage};
use parley_core::error::BackendError;
use tokenizers::Tokenizer;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Tokens considered by the repeat penalty.
const REPEAT_LAST_N: usize = 64;

/// A backend that runs a GGUF model locally via Candle.
///
/// The model sits behind a Mutex: one generation at a time.
pub struct LocalBackend {
    inner: Arc<Mutex<Option<LocalModelState>>>,
    params: LocalModelConfig,
}

/// The loaded model state (tokenizer + weights).
struct LocalModelState {
    model: qlm::ModelWeights,
    tokenizer: Tokenizer,
    device: Device,
    eos_token_id: u32,
}

/// Output of one generation run.
struct Generation {
    text: String,
    prompt_tokens: u32,
    completion_tokens: u32,
}

impl Generation {
    fn usage(&self) -> Usage {
        Usage {
            prompt_tokens: self.prompt_tokens,
            completion_tokens: self.completion_tokens,
            total_tokens: self.prompt_tokens + self.completion_tokens,
        }
    }
}

impl LocalBackend {
    /// Create a backend. The model is loaded lazily on first request.
    pub fn from_config(config: &LocalModelConfig) -> Result<Self, BackendError> {
        if config.model_path.is_none() {
            return Err(BackendError::NotConfigured(
                "local backend requires local.model_path".into(),
            ));
        }
        Ok(Self {
            inner: Arc::new(Mutex::new(None)),
            params: config.clone(),
        })
    }

    async fn ensure_loaded(&self) -> Result<(), BackendError> {
        let mut state = self.inner.lock().await;
        if state.is_some() {
            return Ok(());
        }

        let params = self.params.clone();
        info!(model = ?params.model_path, "Loading local model");
        let loaded = tokio::task::spawn_blocking(move || LocalModelState::load(&params))
            .await
            .map_err(|e| BackendError::NotConfigured(format!("Model loading task failed: {e}")))??;
        *state = Some(loaded);
        Ok(())
    }

    /// Run generation on a blocking thread, calling `on_delta` with new text.
    async fn run(
        &self,
        prompt: String,
        on_delta: impl FnMut(&str) -> bool + Send + 'static,
    ) -> Result<Generation, BackendError> {
        self.ensure_loaded().await?;

        let inner = self.inner.clone();
        let params = self.params.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = inner.blocking_lock();
            let state = guard
                .as_mut()
                .ok_or_else(|| BackendError::NotConfigured("local model is not loaded".into()))?;
            state.generate(&prompt, &params, on_delta)
        })
        .await
        .map_err(|e| BackendError::StreamInterrupted(format!("Inference task failed: {e}")))?
    }
}

impl LocalModelState {
    fn load(params: &LocalModelConfig) -> Result<Self, BackendError> {
        let model_path = params
            .model_path
            .as_deref()
            .ok_or_else(|| BackendError::NotConfigured("local.model_path is not set".into()))?;
        if !model_path.exists() {
            return Err(BackendError::ModelNotFound(model_path.display().to_string()));
        }

        let device = select_device(params.gpu_layers);
        info!(path = %model_path.display(), device = ?device, "Loading GGUF model");

        let mut file = std::fs::File::open(model_path)
            .map_err(|e| BackendError::NotConfigured(format!("Failed to open GGUF file: {e}")))?;
        let gguf = gguf_file::Content::read(&mut file)
            .map_err(|e| BackendError::NotConfigured(format!("Failed to parse GGUF file: {e}")))?;
        let model = qlm::ModelWeights::from_gguf(gguf, &mut file, &device)
            .map_err(|e| BackendError::NotConfigured(format!("Failed to load model weights: {e}")))?;

        let tokenizer_path = tokenizer_path(model_path, params.tokenizer_path.as_deref());
        let tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(|e| {
            BackendError::NotConfigured(format!(
                "Failed to load tokenizer {}: {e}",
                tokenizer_path.display()
            ))
        })?;

        let eos_token_id = tokenizer
            .token_to_id("</s>")
            .or_else(|| tokenizer.token_to_id("<|endoftext|>"))
            .or_else(|| tokenizer.token_to_id("<|im_end|>"))
            .or_else(|| tokenizer.token_to_id("<|eot_id|>"))
            .unwrap_or(2);

        info!(eos_token_id, "Local model loaded");

        Ok(Self {
            model,
            tokenizer,
            device,
            eos_token_id,
        })
    }

    /// Feed `tokens` starting at `index_pos`; logits for the last position.
    fn forward(&mut self, tokens: &[u32], index_pos: usize) -> Result<Tensor, BackendError> {
        let input = Tensor::new(tokens, &self.device)
            .and_then(|t| t.unsqueeze(0))
            .map_err(map_candle_err)?;
        self.model
            .forward(&input, index_pos)
            .and_then(|logits| logits.squeeze(0))
            .map_err(map_candle_err)
    }

    fn decode(&self, tokens: &[u32]) -> Result<String, BackendError> {
        self.tokenizer
            .decode(tokens, true)
            .map_err(|e| BackendError::MalformedResponse(format!("Detokenization failed: {e}")))
    }

    /// Tokenize, prefill, then sample until EOS, a stop sequence, the token
    /// budget or the context window ends generation.
    fn generate(
        &mut self,
        prompt: &str,
        params: &LocalModelConfig,
        mut on_delta: impl FnMut(&str) -> bool,
    ) -> Result<Generation, BackendError> {
        let encoding = self
            .tokenizer
            .encode(prompt, true)
            .map_err(|e| BackendError::MalformedResponse(format!("Tokenization failed: {e}")))?;
        let mut tokens = encoding.get_ids().to_vec();

        let prompt_budget = params
            .context_size
            .saturating_sub(params.max_tokens as usize)
            .max(1);
        if tokens.len() > prompt_budget {
            warn!(
                prompt_tokens = tokens.len(),
                kept = prompt_budget,
                "Prompt exceeds context window, dropping oldest tokens"
            );
            tokens.drain(..tokens.len() - prompt_budget);
        }
        if tokens.is_empty() {
            return Err(BackendError::MalformedResponse("empty prompt".into()));
        }
        let prompt_len = tokens.len();

        debug!(
            prompt_tokens = prompt_len,
            max_tokens = params.max_tokens,
            temperature = params.temperature,
            "Starting local generation"
        );

        // Prefill: the first batch in one pass, the remainder token by token
        let batch = params.batch_size.clamp(1, prompt_len);
        let mut logits = self.forward(&tokens[..batch], 0)?;
        for (offset, &token) in tokens[batch..].iter().enumerate() {
            logits = self.forward(&[token], batch + offset)?;
        }

        let mut logits_processor = LogitsProcessor::from_sampling(params.seed, sampling(params));
        let max_new = (params.max_tokens as usize).min(params.context_size.saturating_sub(prompt_len));
        let holdback = holdback_len(&params.stop_sequences);

        let mut generated: Vec<u32> = Vec::new();
        let mut text = String::new();
        let mut emitted = 0;
        let mut open = true;

        for step in 0..max_new {
            let logits_now = if (params.repeat_penalty - 1.0).abs() < f32::EPSILON {
                logits.clone()
            } else {
                let start = tokens.len().saturating_sub(REPEAT_LAST_N);
                apply_repeat_penalty(&logits, params.repeat_penalty, &tokens[start..])
                    .map_err(map_candle_err)?
            };

            let next = logits_processor.sample(&logits_now).map_err(map_candle_err)?;
            if next == self.eos_token_id {
                break;
            }
            tokens.push(next);
            generated.push(next);

            text = self.decode(&generated)?;
            if let Some(cut) = stop_position(&text, &params.stop_sequences) {
                text.truncate(cut);
                break;
            }

            let safe = emit_boundary(&text, holdback);
            if open && safe > emitted {
                if let Some(delta) = text.get(emitted..safe) {
                    open = on_delta(delta);
                }
                emitted = safe;
            }
            if !open {
                debug!("Receiver dropped, stopping generation");
                break;
            }

            logits = self.forward(&[next], prompt_len + step)?;
        }

        if let Some(rest) = text.get(emitted..).filter(|rest| open && !rest.is_empty()) {
            on_delta(rest);
        }

        debug!(
            completion_tokens = generated.len(),
            output_len = text.len(),
            "Generation complete"
        );

        Ok(Generation {
            text,
            prompt_tokens: prompt_len as u32,
            completion_tokens: generated.len() as u32,
        })
    }
}

/// GPU offload is all-or-nothing in Candle: any layer count asks for CUDA.
fn select_device(gpu_layers: u32) -> Device {
    if gpu_layers == 0 {
        return Device::Cpu;
    }
    match Device::cuda_if_available(0) {
        Ok(device) => device,
        Err(e) => {
            warn!(error = %e, "GPU requested but unavailable, using CPU");
            Device::Cpu
        }
    }
}

fn tokenizer_path(model_path: &Path, configured: Option<&Path>) -> PathBuf {
    configured
        .map(Path::to_path_buf)
        .unwrap_or_else(|| model_path.with_file_name("tokenizer.json"))
}

fn sampling(params: &LocalModelConfig) -> Sampling {
    if params.temperature <= 0.0 {
        Sampling::ArgMax
    } else {
        Sampling::TopKThenTopP {
            k: params.top_k.max(1),
            p: f64::from(params.top_p),
            temperature: f64::from(params.temperature),
        }
    }
}

fn stop_position(text: &str, stops: &[String]) -> Option<usize> {
    stops
        .iter()
        .filter(|s| !s.is_empty())
        .filter_map(|s| text.find(s.as_str()))
        .min()
}

/// Bytes held back so a partially generated stop sequence is never emitted.
fn holdback_len(stops: &[String]) -> usize {
    stops
        .iter()
        .map(|s| s.len())
        .max()
        .unwrap_or(0)
        .saturating_sub(1)
}

/// End of the text that is safe to emit: short of the holdback, on a char
/// boundary, and not inside an incomplete multi-byte token.
fn emit_boundary(text: &str, holdback: usize) -> usize {
    if text.ends_with('\u{FFFD}') {
        return 0;
    }
    let mut end = text.len().saturating_sub(holdback);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    end
}

fn map_candle_err(e: candle_core::Error) -> BackendError {
    BackendError::MalformedResponse(format!("Candle inference error: {e}"))
}

#[async_trait]
impl Backend for LocalBackend {
    fn name(&self) -> &str {
        "local"
    }

    async fn complete(
        &self,
        request: InferenceRequest,
    ) -> std::result::Result<Completion, BackendError> {
        let generation = self.run(request.rendered_prompt(), |_| true).await?;
        let mut completion = Completion::new(generation.text.trim_end(), self.name());
        completion.usage = Some(generation.usage());
        Ok(completion)
    }

    async fn stream(
        &self,
        request: InferenceRequest,
    ) -> std::result::Result<ChunkReceiver, BackendError> {
        // Load before spawning so a missing model fails the call itself
        self.ensure_loaded().await?;

        let (tx, rx) = tokio::sync::mpsc::channel(64);
        let delta_tx = tx.clone();
        let on_delta = move |delta: &str| {
            delta_tx
                .blocking_send(Ok(StreamChunk {
                    content: Some(delta.to_string()),
                    done: false,
                    usage: None,
                }))
                .is_ok()
        };

        let backend = Self {
            inner: self.inner.clone(),
            params: self.params.clone(),
        };
        let prompt = request.rendered_prompt();
        tokio::spawn(async move {
            let last = match backend.run(prompt, on_delta).await {
                Ok(generation) => Ok(StreamChunk {
                    content: None,
                    done: true,
                    usage: Some(generation.usage()),
                }),
                Err(e) => Err(e),
            };
            let _ = tx.send(last).await;
        });

        Ok(rx)
    }

    async fn health_check(&self) -> std::result::Result<bool, BackendError> {
        Ok(self
            .params
            .model_path
            .as_deref()
            .is_some_and(Path::exists))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stops() -> Vec<String> {
        vec!["Interviewer:".into(), "AI:".into()]
    }

    #[test]
    fn zero_temperature_is_greedy() {
        let params = LocalModelConfig {
            temperature: 0.0,
            ..LocalModelConfig::default()
        };
        assert!(matches!(sampling(&params), Sampling::ArgMax));
        assert!(matches!(
            sampling(&LocalModelConfig::default()),
            Sampling::TopKThenTopP { k: 40, .. }
        ));
    }

    #[test]
    fn finds_earliest_stop() {
        assert_eq!(stop_position("Yes.\nAI: no", &stops()), Some(5));
        assert_eq!(stop_position("Yes.", &stops()), None);
    }

    #[test]
    fn holds_back_possible_stop_prefix() {
        let holdback = holdback_len(&stops());
        assert_eq!(holdback, "Interviewer:".len() - 1);
        assert_eq!(emit_boundary("short", holdback), 0);
        let text = "A long enough answer\nInterv";
        assert_eq!(emit_boundary(text, holdback), text.len() - holdback);
    }

    #[test]
    fn emit_boundary_respects_chars() {
        assert_eq!(emit_boundary("héllo", 4), 1);
        assert_eq!(emit_boundary("abc\u{FFFD}", 0), 0);
        assert_eq!(emit_boundary("abc", 0), 3);
    }

    #[test]
    fn tokenizer_defaults_next_to_model() {
        let path = tokenizer_path(Path::new("/models/tiny.gguf"), None);
        assert_eq!(path, PathBuf::from("/models/tokenizer.json"));
        let explicit = tokenizer_path(Path::new("/models/tiny.gguf"), Some(Path::new("/t.json")));
        assert_eq!(explicit, PathBuf::from("/t.json"));
    }

    #[test]
    fn requires_model_path() {
        assert!(LocalBackend::from_config(&LocalModelConfig::default()).is_err());
    }

    #[tokio::test]
    async fn missing_model_file_is_model_not_found() {
        let config = LocalModelConfig {
            model_path: Some(PathBuf::from("/nonexistent/model.gguf")),
            ..LocalModelConfig::default()
        };
        let backend = LocalBackend::from_config(&config).unwrap();
        assert!(!backend.health_check().await.unwrap());
        let request = InferenceRequest {
            query: "hello".into(),
            system_prompt: parley_core::SystemPrompt::new("{history}\nQ: {input}\nA:").unwrap(),
            window: Vec::new(),
            labels: parley_core::LabelPair::interviewer_ai(),
            locale: parley_core::Locale::En,
        };
        let err = backend.stream(request).await.err().unwrap();
        assert!(matches!(err, BackendError::ModelNotFound(_)));
    }
}
