//! Telegram channel adapter.
//!
//! Talks to the Telegram Bot API directly over HTTPS: `getUpdates` long
//! polling for inbound messages, `sendMessage` for replies and reply
//! keyboards, `getFile` plus the file endpoint for document downloads.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use parley_config::TelegramConfig;
use parley_core::channel::{Attachment, Channel, ChannelId, ChannelMessage, MessageReceiver};
use parley_core::error::ChannelError;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Telegram rejects messages longer than this many characters.
const MAX_MESSAGE_CHARS: usize = 4096;

/// Pause after a failed poll before trying again.
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Telegram channel adapter.
pub struct TelegramChannel {
    api: BotApi,
    allowed_users: Vec<String>,
    poll_timeout_secs: u64,
    channel_id: ChannelId,
    poller: Mutex<Option<JoinHandle<()>>>,
}

/// Thin client for the Bot API methods this channel uses.
#[derive(Clone)]
struct BotApi {
    base: String,
    token: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for BotApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotApi")
            .field("base", &self.base)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

impl TelegramChannel {
    pub fn new(config: &TelegramConfig) -> Result<Self, ChannelError> {
        Self::with_api_base(config, DEFAULT_API_BASE)
    }

    /// Point the channel at another Bot API server (local server, tests).
    pub fn with_api_base(config: &TelegramConfig, base: &str) -> Result<Self, ChannelError> {
        let token = config
            .bot_token
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                ChannelError::NotConfigured(
                    "telegram.bot_token (or PARLEY_BOT_TOKEN) is not set".into(),
                )
            })?;

        // Long polls hold the connection open for poll_timeout_secs
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.poll_timeout_secs + 30))
            .build()
            .map_err(|e| ChannelError::NotConfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            api: BotApi {
                base: base.trim_end_matches('/').to_string(),
                token,
                client,
            },
            allowed_users: config.allowed_users.clone(),
            poll_timeout_secs: config.poll_timeout_secs,
            channel_id: ChannelId("telegram".into()),
            poller: Mutex::new(None),
        })
    }
}

impl BotApi {
    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.base, self.token)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: &serde_json::Value,
    ) -> Result<T, ChannelError> {
        let response = self
            .client
            .post(self.method_url(method))
            .json(body)
            .send()
            .await
            .map_err(|e| ChannelError::ConnectionLost(format!("{method}: {}", e.without_url())))?;

        let reply: ApiReply<T> = response
            .json()
            .await
            .map_err(|e| ChannelError::InvalidPayload(format!("{method}: {}", e.without_url())))?;

        match reply {
            ApiReply {
                ok: true,
                result: Some(result),
                ..
            } => Ok(result),
            ApiReply { description, .. } => Err(ChannelError::DeliveryFailed {
                channel: "telegram".into(),
                reason: format!(
                    "{method}: {}",
                    description.unwrap_or_else(|| "no result".into())
                ),
            }),
        }
    }

    async fn get_updates(&self, offset: i64, timeout: u64) -> Result<Vec<Update>, ChannelError> {
        self.call(
            "getUpdates",
            &serde_json::json!({
                "offset": offset,
                "timeout": timeout,
                "allowed_updates": ["message"],
            }),
        )
        .await
    }

    async fn send_message(
        &self,
        chat_id: &str,
        text: &str,
        reply_markup: Option<serde_json::Value>,
    ) -> Result<(), ChannelError> {
        let mut body = serde_json::json!({ "chat_id": chat_id, "text": text });
        if let Some(markup) = reply_markup {
            body["reply_markup"] = markup;
        }
        self.call::<serde_json::Value>("sendMessage", &body).await?;
        Ok(())
    }

    async fn download(&self, file_id: &str, dest: &Path) -> Result<(), ChannelError> {
        let file: TgFile = self
            .call("getFile", &serde_json::json!({ "file_id": file_id }))
            .await?;
        let file_path = file
            .file_path
            .ok_or_else(|| ChannelError::DownloadFailed(format!("no file_path for {file_id}")))?;

        let url = format!("{}/file/bot{}/{file_path}", self.base, self.token);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ChannelError::DownloadFailed(e.without_url().to_string()))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ChannelError::DownloadFailed(e.without_url().to_string()))?;

        tokio::fs::write(dest, &bytes)
            .await
            .map_err(|e| ChannelError::DownloadFailed(format!("{}: {e}", dest.display())))
    }
}

/// Convert one update into a channel message. Non-message updates and
/// messages with neither text nor a document are skipped.
fn to_channel_message(channel_id: &ChannelId, update: Update) -> Option<ChannelMessage> {
    let message = update.message?;
    let sender = message.from;

    let attachments: Vec<Attachment> = message
        .document
        .map(|doc| Attachment {
            url: doc.file_id,
            filename: doc.file_name,
            mime_type: doc.mime_type,
            size_bytes: doc.file_size,
        })
        .into_iter()
        .collect();

    let content = message.text.or(message.caption).unwrap_or_default();
    if content.is_empty() && attachments.is_empty() {
        return None;
    }

    Some(ChannelMessage {
        channel_id: channel_id.clone(),
        sender_id: sender
            .as_ref()
            .map_or_else(|| message.chat.id.to_string(), |u| u.id.to_string()),
        sender_name: sender.map(|u| u.username.unwrap_or(u.first_name)),
        content,
        chat_id: message.chat.id.to_string(),
        attachments,
    })
}

/// Split a reply at Telegram's length limit, on character boundaries.
fn split_message(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut rest = text;
    while rest.chars().count() > MAX_MESSAGE_CHARS {
        let end = rest
            .char_indices()
            .nth(MAX_MESSAGE_CHARS)
            .map_or(rest.len(), |(idx, _)| idx);
        let (head, tail) = rest.split_at(end);
        parts.push(head);
        rest = tail;
    }
    parts.push(rest);
    parts
}

/// Keep only the final path component of an uploaded file's name.
fn safe_file_name(attachment: &Attachment) -> String {
    attachment
        .filename
        .as_deref()
        .and_then(|name| Path::new(name).file_name())
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| attachment.url.clone())
}

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    fn id(&self) -> &ChannelId {
        &self.channel_id
    }

    async fn start(&self) -> Result<MessageReceiver, ChannelError> {
        let (tx, rx) = mpsc::channel(64);
        let api = self.api.clone();
        let channel_id = self.channel_id.clone();
        let timeout = self.poll_timeout_secs;

        info!(timeout, "Telegram long polling started");

        let handle = tokio::spawn(async move {
            let mut offset = 0_i64;
            loop {
                let updates = match api.get_updates(offset, timeout).await {
                    Ok(updates) => updates,
                    Err(e) => {
                        warn!(error = %e, "getUpdates failed, retrying");
                        tokio::time::sleep(POLL_RETRY_DELAY).await;
                        continue;
                    }
                };

                for update in updates {
                    offset = offset.max(update.update_id + 1);
                    let Some(msg) = to_channel_message(&channel_id, update) else {
                        continue;
                    };
                    debug!(chat_id = %msg.chat_id, sender = %msg.sender_id, "Telegram message received");
                    if tx.send(Ok(msg)).await.is_err() {
                        return;
                    }
                }
            }
        });

        if let Some(previous) = self.poller.lock().await.replace(handle) {
            previous.abort();
        }
        Ok(rx)
    }

    async fn send(&self, chat_id: &str, content: &str) -> Result<(), ChannelError> {
        for part in split_message(content) {
            self.api.send_message(chat_id, part, None).await?;
        }
        debug!(chat_id = %chat_id, content_len = content.len(), "Telegram message sent");
        Ok(())
    }

    async fn send_choices(
        &self,
        chat_id: &str,
        content: &str,
        choices: &[&str],
    ) -> Result<(), ChannelError> {
        let keyboard: Vec<Vec<serde_json::Value>> = choices
            .iter()
            .map(|c| vec![serde_json::json!({ "text": c })])
            .collect();
        let markup = serde_json::json!({
            "keyboard": keyboard,
            "one_time_keyboard": true,
            "resize_keyboard": true,
        });
        self.api.send_message(chat_id, content, Some(markup)).await
    }

    async fn download(&self, attachment: &Attachment, dest_dir: &Path) -> Result<PathBuf, ChannelError> {
        tokio::fs::create_dir_all(dest_dir)
            .await
            .map_err(|e| ChannelError::DownloadFailed(format!("{}: {e}", dest_dir.display())))?;

        let dest = dest_dir.join(safe_file_name(attachment));
        self.api.download(&attachment.url, &dest).await?;
        info!(path = %dest.display(), "Document downloaded");
        Ok(dest)
    }

    async fn send_typing(&self, chat_id: &str) -> Result<(), ChannelError> {
        self.api
            .call::<bool>(
                "sendChatAction",
                &serde_json::json!({ "chat_id": chat_id, "action": "typing" }),
            )
            .await
            .map(|_| ())
    }

    fn is_allowed(&self, sender_id: &str) -> bool {
        if self.allowed_users.is_empty() {
            return false;
        }
        if self.allowed_users.iter().any(|u| u == "*") {
            return true;
        }
        self.allowed_users.iter().any(|u| u == sender_id)
    }

    async fn stop(&self) -> Result<(), ChannelError> {
        info!("Telegram channel stopping");
        if let Some(handle) = self.poller.lock().await.take() {
            handle.abort();
        }
        Ok(())
    }

    async fn health_check(&self) -> Result<bool, ChannelError> {
        let me: TgUser = self.api.call("getMe", &serde_json::json!({})).await?;
        debug!(bot = %me.first_name, "Telegram getMe ok");
        Ok(true)
    }
}

// --- Bot API types (internal) ---

#[derive(Debug, Deserialize)]
struct ApiReply<T> {
    ok: bool,
    #[serde(default = "Option::default")]
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    #[serde(default)]
    message: Option<TgMessage>,
}

#[derive(Debug, Deserialize)]
struct TgMessage {
    chat: TgChat,
    #[serde(default)]
    from: Option<TgUser>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    caption: Option<String>,
    #[serde(default)]
    document: Option<TgDocument>,
}

#[derive(Debug, Deserialize)]
struct TgChat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct TgUser {
    id: i64,
    first_name: String,
    #[serde(default)]
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TgDocument {
    file_id: String,
    #[serde(default)]
    file_name: Option<String>,
    #[serde(default)]
    mime_type: Option<String>,
    #[serde(default)]
    file_size: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct TgFile {
    #[serde(default)]
    file_path: Option<String>,
}
