//! Configuration loading, validation, and management for Parley.
//!
//! Loads configuration from `~/.parley/config.toml` with environment
//! variable overrides. Everything is validated once at startup; a bad
//! backend mode, locale or prompt template aborts the process there.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use parley_core::locale::{self, Locale, Persona, PromptBook};
use parley_core::prompt::{LabelPair, SystemPrompt};

/// The root configuration structure.
///
/// Maps directly to `~/.parley/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Which inference backend serves every conversation
    #[serde(default)]
    pub backend: BackendMode,

    /// Locale of conversations that never picked one
    #[serde(default = "default_locale")]
    pub default_locale: String,

    /// Turns kept per conversation
    #[serde(default = "default_retention")]
    pub retention: usize,

    /// Reply sent to the user when the backend fails
    #[serde(default = "default_fallback_message")]
    pub fallback_message: String,

    /// Default persona per locale code
    #[serde(default = "default_locales")]
    pub locales: HashMap<String, PersonaConfig>,

    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub tgi: TgiConfig,

    #[serde(default)]
    pub local: LocalModelConfig,

    #[serde(default)]
    pub chat: ChatConfig,

    #[serde(default)]
    pub telegram: TelegramConfig,

    #[serde(default)]
    pub documents: DocumentConfig,
}

fn default_locale() -> String {
    "en".into()
}
fn default_retention() -> usize {
    5
}
fn default_fallback_message() -> String {
    "I don't know what to say...".into()
}
fn default_locales() -> HashMap<String, PersonaConfig> {
    Locale::ALL
        .into_iter()
        .map(|l| {
            let labels = locale::builtin_labels(l);
            (
                l.code().to_string(),
                PersonaConfig {
                    prompt: locale::builtin_template(l).to_string(),
                    human_label: labels.human,
                    assistant_label: labels.assistant,
                },
            )
        })
        .collect()
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

/// The closed set of backends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendMode {
    /// JSON request/response gateway
    #[default]
    Gateway,
    /// Self-hosted text-generation-inference server
    #[serde(alias = "remote-generation-server")]
    Tgi,
    /// In-process GGUF model
    #[serde(alias = "local-model")]
    Local,
    /// Hosted chat-completion API
    #[serde(alias = "hosted-chat")]
    Chat,
}

impl BackendMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gateway => "gateway",
            Self::Tgi => "tgi",
            Self::Local => "local",
            Self::Chat => "chat",
        }
    }
}

impl FromStr for BackendMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gateway" => Ok(Self::Gateway),
            "tgi" | "remote-generation-server" => Ok(Self::Tgi),
            "local" | "local-model" => Ok(Self::Local),
            "chat" | "hosted-chat" => Ok(Self::Chat),
            other => Err(ConfigError::ValidationError(format!(
                "unknown backend mode '{other}' (expected gateway, tgi, local or chat)"
            ))),
        }
    }
}

impl std::fmt::Display for BackendMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Default prompt and history labels for one locale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaConfig {
    pub prompt: String,

    #[serde(default = "default_human_label")]
    pub human_label: String,

    #[serde(default = "default_assistant_label")]
    pub assistant_label: String,
}

fn default_human_label() -> String {
    "Human".into()
}
fn default_assistant_label() -> String {
    "AI".into()
}

#[derive(Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_url")]
    pub url: String,

    /// Sent as a bearer token when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_gateway_timeout")]
    pub timeout_secs: u64,
}

fn default_gateway_url() -> String {
    "http://localhost:8000/api/v1/query".into()
}
fn default_gateway_timeout() -> u64 {
    60
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: default_gateway_url(),
            api_key: None,
            timeout_secs: default_gateway_timeout(),
        }
    }
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("url", &self.url)
            .field("api_key", &redact(&self.api_key))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Sampling surface of a text-generation-inference server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TgiConfig {
    #[serde(default = "default_tgi_url")]
    pub url: String,

    #[serde(default = "default_max_new_tokens")]
    pub max_new_tokens: u32,

    #[serde(default = "default_tgi_temperature")]
    pub temperature: f32,

    #[serde(default = "default_tgi_top_p")]
    pub top_p: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,

    #[serde(default = "default_tgi_typical_p")]
    pub typical_p: f32,

    #[serde(default = "default_repetition_penalty")]
    pub repetition_penalty: f32,

    #[serde(default = "default_stop_sequences")]
    pub stop_sequences: Vec<String>,

    #[serde(default = "default_tgi_timeout")]
    pub timeout_secs: u64,
}

fn default_tgi_url() -> String {
    "http://localhost:8080".into()
}
fn default_max_new_tokens() -> u32 {
    512
}
fn default_tgi_temperature() -> f32 {
    0.75
}
fn default_tgi_top_p() -> f32 {
    0.7
}
fn default_tgi_typical_p() -> f32 {
    0.75
}
fn default_repetition_penalty() -> f32 {
    1.1
}
fn default_stop_sequences() -> Vec<String> {
    vec![
        "Interviewer:".into(),
        "AI:".into(),
        "Interviewer translation:".into(),
    ]
}
fn default_tgi_timeout() -> u64 {
    6000
}

impl Default for TgiConfig {
    fn default() -> Self {
        Self {
            url: default_tgi_url(),
            max_new_tokens: default_max_new_tokens(),
            temperature: default_tgi_temperature(),
            top_p: default_tgi_top_p(),
            top_k: None,
            typical_p: default_tgi_typical_p(),
            repetition_penalty: default_repetition_penalty(),
            stop_sequences: default_stop_sequences(),
            timeout_secs: default_tgi_timeout(),
        }
    }
}

/// In-process GGUF model and its generation parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalModelConfig {
    /// Path to a `.gguf` model file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_path: Option<PathBuf>,

    /// `tokenizer.json`; defaults to one next to the model file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokenizer_path: Option<PathBuf>,

    #[serde(default = "default_max_new_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_tgi_temperature")]
    pub temperature: f32,

    #[serde(default = "default_local_top_p")]
    pub top_p: f32,

    #[serde(default = "default_local_top_k")]
    pub top_k: usize,

    #[serde(default = "default_repetition_penalty")]
    pub repeat_penalty: f32,

    /// Prompt tokens fed to the model per forward pass
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Context window in tokens (prompt + generation)
    #[serde(default = "default_context_size")]
    pub context_size: usize,

    /// Layers to offload to the GPU; 0 keeps everything on the CPU
    #[serde(default)]
    pub gpu_layers: u32,

    #[serde(default = "default_seed")]
    pub seed: u64,

    #[serde(default = "default_stop_sequences")]
    pub stop_sequences: Vec<String>,
}

fn default_local_top_p() -> f32 {
    0.95
}
fn default_local_top_k() -> usize {
    40
}
fn default_batch_size() -> usize {
    512
}
fn default_context_size() -> usize {
    2048
}
fn default_seed() -> u64 {
    299_792_458
}

impl Default for LocalModelConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            tokenizer_path: None,
            max_tokens: default_max_new_tokens(),
            temperature: default_tgi_temperature(),
            top_p: default_local_top_p(),
            top_k: default_local_top_k(),
            repeat_penalty: default_repetition_penalty(),
            batch_size: default_batch_size(),
            context_size: default_context_size(),
            gpu_layers: 0,
            seed: default_seed(),
            stop_sequences: default_stop_sequences(),
        }
    }
}

/// Hosted chat-completion API (OpenAI-compatible).
#[derive(Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    #[serde(default = "default_chat_url")]
    pub api_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_chat_model")]
    pub model: String,

    #[serde(default = "default_chat_temperature")]
    pub temperature: f32,

    #[serde(default = "default_chat_top_p")]
    pub top_p: f32,

    #[serde(default = "default_chat_max_tokens")]
    pub max_tokens: u32,

    #[serde(default)]
    pub presence_penalty: f32,

    #[serde(default)]
    pub frequency_penalty: f32,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop_sequences: Vec<String>,

    #[serde(default = "default_gateway_timeout")]
    pub timeout_secs: u64,
}

fn default_chat_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_chat_model() -> String {
    "gpt-4o-mini".into()
}
fn default_chat_temperature() -> f32 {
    0.7
}
fn default_chat_top_p() -> f32 {
    1.0
}
fn default_chat_max_tokens() -> u32 {
    1024
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            api_url: default_chat_url(),
            api_key: None,
            model: default_chat_model(),
            temperature: default_chat_temperature(),
            top_p: default_chat_top_p(),
            max_tokens: default_chat_max_tokens(),
            presence_penalty: 0.0,
            frequency_penalty: 0.0,
            stop_sequences: Vec::new(),
            timeout_secs: default_gateway_timeout(),
        }
    }
}

impl std::fmt::Debug for ChatConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("top_p", &self.top_p)
            .field("max_tokens", &self.max_tokens)
            .field("presence_penalty", &self.presence_penalty)
            .field("frequency_penalty", &self.frequency_penalty)
            .field("stop_sequences", &self.stop_sequences)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Bot token from @BotFather
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_token: Option<String>,

    /// Allowlist of sender IDs. Empty = deny all. ["*"] = allow all.
    #[serde(default = "default_allowed_users")]
    pub allowed_users: Vec<String>,

    /// Long-polling timeout for getUpdates
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_secs: u64,
}

fn default_allowed_users() -> Vec<String> {
    vec!["*".into()]
}
fn default_poll_timeout() -> u64 {
    30
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            allowed_users: default_allowed_users(),
            poll_timeout_secs: default_poll_timeout(),
        }
    }
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_token", &redact(&self.bot_token))
            .field("allowed_users", &self.allowed_users)
            .field("poll_timeout_secs", &self.poll_timeout_secs)
            .finish()
    }
}

/// Uploaded document handling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentConfig {
    /// Where downloaded files are written; defaults to `~/.parley/files`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files_dir: Option<PathBuf>,

    /// Characters per synthetic history entry
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Response paired with every document chunk
    #[serde(default = "default_acknowledgement")]
    pub acknowledgement: String,
}

fn default_chunk_size() -> usize {
    3800
}
fn default_acknowledgement() -> String {
    "Thank you for the provided context. You can now ask me questions about it.".into()
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            files_dir: None,
            chunk_size: default_chunk_size(),
            acknowledgement: default_acknowledgement(),
        }
    }
}

impl DocumentConfig {
    /// Resolved download directory.
    pub fn files_dir(&self) -> PathBuf {
        self.files_dir
            .clone()
            .unwrap_or_else(|| AppConfig::config_dir().join("files"))
    }
}

impl AppConfig {
    /// Load configuration from `PARLEY_CONFIG` or the default path
    /// (~/.parley/config.toml), then apply environment overrides.
    ///
    /// Environment overrides:
    /// - `PARLEY_BACKEND` or `INFER_MODE`
    /// - `PARLEY_LOCALE`
    /// - `PARLEY_BOT_TOKEN` or `BOT_TOKEN`
    /// - `PARLEY_API_KEY` (chat and gateway credential)
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = std::env::var("PARLEY_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| Self::config_dir().join("config.toml"));
        Self::load_with_env(&config_path)
    }

    /// Load a specific file, then apply environment overrides.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::read_file(path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path, without the environment.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::read_file(path)?;
        config.validate()?;
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Apply overrides from an environment lookup.
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        let first = |keys: &[&str]| keys.iter().find_map(|k| lookup(k));

        if let Some(mode) = first(&["PARLEY_BACKEND", "INFER_MODE"]) {
            self.backend = mode.parse()?;
        }
        if let Some(locale) = lookup("PARLEY_LOCALE") {
            self.default_locale = locale;
        }
        if let Some(token) = first(&["PARLEY_BOT_TOKEN", "BOT_TOKEN"]) {
            self.telegram.bot_token = Some(token);
        }
        if let Some(key) = lookup("PARLEY_API_KEY") {
            if self.chat.api_key.is_none() {
                self.chat.api_key = Some(key.clone());
            }
            if self.gateway.api_key.is_none() {
                self.gateway.api_key = Some(key);
            }
        }
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".parley")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retention == 0 {
            return Err(ConfigError::ValidationError(
                "retention must be at least 1".into(),
            ));
        }

        for (name, temperature) in [
            ("tgi.temperature", self.tgi.temperature),
            ("local.temperature", self.local.temperature),
            ("chat.temperature", self.chat.temperature),
        ] {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(ConfigError::ValidationError(format!(
                    "{name} must be between 0.0 and 2.0"
                )));
            }
        }

        if self.documents.chunk_size == 0 {
            return Err(ConfigError::ValidationError(
                "documents.chunk_size must be at least 1".into(),
            ));
        }

        if self.backend == BackendMode::Local && self.local.model_path.is_none() {
            return Err(ConfigError::ValidationError(
                "backend 'local' requires local.model_path".into(),
            ));
        }

        self.prompt_book().map(|_| ())
    }

    /// The default locale, parsed.
    pub fn locale(&self) -> Result<Locale, ConfigError> {
        self.default_locale
            .parse()
            .map_err(|e: parley_core::Error| ConfigError::ValidationError(e.to_string()))
    }

    /// Build the per-locale default personas.
    pub fn prompt_book(&self) -> Result<PromptBook, ConfigError> {
        let mut personas = HashMap::new();
        for (code, persona) in &self.locales {
            let locale: Locale = code
                .parse()
                .map_err(|e: parley_core::Error| ConfigError::ValidationError(e.to_string()))?;
            let prompt = SystemPrompt::new(persona.prompt.clone()).map_err(|e| {
                ConfigError::ValidationError(format!("locales.{code}.prompt: {e}"))
            })?;
            personas.insert(
                locale,
                Persona {
                    prompt,
                    labels: LabelPair::new(&persona.human_label, &persona.assistant_label),
                },
            );
        }
        PromptBook::new(self.locale()?, personas)
            .map_err(|e| ConfigError::ValidationError(e.to_string()))
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend: BackendMode::default(),
            default_locale: default_locale(),
            retention: default_retention(),
            fallback_message: default_fallback_message(),
            locales: default_locales(),
            gateway: GatewayConfig::default(),
            tgi: TgiConfig::default(),
            local: LocalModelConfig::default(),
            chat: ChatConfig::default(),
            telegram: TelegramConfig::default(),
            documents: DocumentConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors. All of them are fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
