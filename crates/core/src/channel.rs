//! Channel trait: the abstraction over messaging transports.
//!
//! A Channel connects Parley to a messaging platform (Telegram, the local
//! terminal). It delivers inbound messages and documents, and sends replies
//! back. The relay never sees platform-specific types.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ChannelError;
use crate::message::ConversationId;

/// Unique identifier for a channel instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelId(pub String);

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A message received from a channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelMessage {
    /// The channel this message belongs to
    pub channel_id: ChannelId,

    /// Sender identifier (platform-specific user ID)
    pub sender_id: String,

    /// Human-readable sender name (if available)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,

    /// The text content (caption for documents)
    pub content: String,

    /// The chat/group/DM identifier within the channel
    pub chat_id: String,

    /// Attachments (documents, images, ...)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

impl ChannelMessage {
    /// A plain text message, mostly for tests and the terminal channel.
    pub fn text(channel: &str, chat_id: &str, content: impl Into<String>) -> Self {
        Self {
            channel_id: ChannelId(channel.into()),
            sender_id: chat_id.into(),
            sender_name: None,
            content: content.into(),
            chat_id: chat_id.into(),
            attachments: Vec::new(),
        }
    }

    /// Conversation key for this message: one conversation per chat.
    pub fn conversation_id(&self) -> ConversationId {
        ConversationId::new(self.chat_id.clone())
    }

    /// The first attached document, if any.
    pub fn document(&self) -> Option<&Attachment> {
        self.attachments.first()
    }
}

/// A document attached to a channel message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    /// Platform file reference: a URL, a local path or an opaque file id
    pub url: String,

    /// Optional filename
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,

    /// MIME type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,

    /// File size in bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
}

/// Receiving half of a channel's inbound stream.
pub type MessageReceiver =
    tokio::sync::mpsc::Receiver<std::result::Result<ChannelMessage, ChannelError>>;

/// The core Channel trait.
///
/// Implementations handle platform-specific connection logic, message
/// formatting and authentication.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Human-readable channel name (e.g., "telegram", "cli").
    fn name(&self) -> &str;

    /// Unique ID for this channel instance.
    fn id(&self) -> &ChannelId;

    /// Start listening for incoming messages.
    async fn start(&self) -> std::result::Result<MessageReceiver, ChannelError>;

    /// Send a text message to a specific chat.
    async fn send(&self, chat_id: &str, content: &str) -> std::result::Result<(), ChannelError>;

    /// Send a message offering a fixed set of replies.
    ///
    /// Default implementation lists the choices under the text.
    async fn send_choices(
        &self,
        chat_id: &str,
        content: &str,
        choices: &[&str],
    ) -> std::result::Result<(), ChannelError> {
        let mut text = content.to_string();
        for choice in choices {
            text.push_str("\n- ");
            text.push_str(choice);
        }
        self.send(chat_id, &text).await
    }

    /// Fetch an attachment into `dest_dir`, returning the local path.
    async fn download(
        &self,
        attachment: &Attachment,
        _dest_dir: &Path,
    ) -> std::result::Result<PathBuf, ChannelError> {
        Err(ChannelError::NotConfigured(format!(
            "channel '{}' cannot download '{}'",
            self.name(),
            attachment.url
        )))
    }

    /// Send a typing indicator (if the platform supports it).
    async fn send_typing(&self, _chat_id: &str) -> std::result::Result<(), ChannelError> {
        Ok(())
    }

    /// Check if a sender is allowed (allowlist check).
    fn is_allowed(&self, sender_id: &str) -> bool;

    /// Stop the channel gracefully.
    async fn stop(&self) -> std::result::Result<(), ChannelError> {
        Ok(())
    }

    /// Health check: is the channel connected and operational?
    async fn health_check(&self) -> std::result::Result<bool, ChannelError> {
        Ok(true)
    }
}
