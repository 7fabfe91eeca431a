//! Per-message dispatch: commands, language buttons, documents and queries.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parley_config::DocumentConfig;
use parley_core::channel::{Attachment, Channel, ChannelMessage};
use parley_core::error::{ChannelError, DocumentError, Error};
use parley_core::locale::Locale;
use parley_core::message::ConversationId;
use parley_core::prompt::SystemPrompt;
use parley_core::store::ConversationStore;
use parley_documents::DocumentKind;
use tracing::{debug, info, warn};

use crate::commands::{Command, HELP_MESSAGE};
use crate::ingest::ingest_file;
use crate::router::InferenceRouter;

const LANGUAGE_QUESTION: &str = "Select your preferred language, please.";
const PROMPT_UPDATED: &str = "Your system prompt has been updated";
const PROMPT_RESET: &str = "Your system prompt has been reset to the default.";
const NEW_PROMPT_USAGE: &str =
    "Usage: /new_prompt <template>. The template must contain {history} and {input}.";
const UNKNOWN_COMMAND: &str = "Unknown command. Use /help for available commands.";
const NO_TEXT_EXTRACTED: &str = "No text could be extracted from the document.";
const FILE_NOT_PROCESSED: &str = "File could not be processed.";

/// Where and how uploaded documents are ingested.
#[derive(Debug, Clone)]
pub struct DocumentSettings {
    pub files_dir: PathBuf,
    pub chunk_size: usize,
    pub acknowledgement: String,
}

impl From<&DocumentConfig> for DocumentSettings {
    fn from(config: &DocumentConfig) -> Self {
        Self {
            files_dir: config.files_dir(),
            chunk_size: config.chunk_size,
            acknowledgement: config.acknowledgement.clone(),
        }
    }
}

/// Turns one inbound message into store updates and replies.
pub struct MessageHandler {
    router: Arc<InferenceRouter>,
    documents: DocumentSettings,
}

impl MessageHandler {
    pub fn new(router: Arc<InferenceRouter>, documents: DocumentSettings) -> Self {
        Self { router, documents }
    }

    fn store(&self) -> &dyn ConversationStore {
        self.router.store().as_ref()
    }

    /// Handle `msg`, replying on `channel`.
    ///
    /// Backend and document failures are answered with a safe message and
    /// never returned; only a failure to deliver a reply is an error.
    pub async fn handle(
        &self,
        channel: &dyn Channel,
        msg: &ChannelMessage,
    ) -> Result<(), ChannelError> {
        let id = msg.conversation_id();

        if let Some(document) = msg.document() {
            return self.handle_document(channel, &msg.chat_id, &id, document).await;
        }

        let text = msg.content.trim();
        if text.is_empty() {
            return Ok(());
        }

        if let Some(locale) = Locale::from_button(text) {
            return match self.switch_locale(&id, locale).await {
                Ok(()) => channel.send(&msg.chat_id, locale.confirmation()).await,
                Err(e) => self.command_error(channel, &msg.chat_id, e).await,
            };
        }

        match Command::parse(text) {
            Some(command) => {
                debug!(conversation = %id, ?command, "Command received");
                match self.handle_command(channel, &msg.chat_id, &id, command).await {
                    Ok(()) => Ok(()),
                    Err(Error::Channel(e)) => Err(e),
                    Err(e) => self.command_error(channel, &msg.chat_id, e).await,
                }
            }
            None => self.handle_query(channel, &msg.chat_id, &id, text).await,
        }
    }

    async fn handle_query(
        &self,
        channel: &dyn Channel,
        chat_id: &str,
        id: &ConversationId,
        query: &str,
    ) -> Result<(), ChannelError> {
        if let Err(e) = channel.send_typing(chat_id).await {
            debug!(error = %e, "Typing indicator not sent");
        }

        let reply = match self.router.infer(id, query, None).await {
            Ok(reply) => reply,
            Err(failure) => failure.fallback,
        };
        channel.send(chat_id, &reply).await
    }

    async fn handle_command(
        &self,
        channel: &dyn Channel,
        chat_id: &str,
        id: &ConversationId,
        command: Command,
    ) -> Result<(), Error> {
        let store = self.store();
        match command {
            Command::Start | Command::Lang(None) => {
                let book = self.router.prompt_book();
                let choices: Vec<&str> = Locale::ALL
                    .into_iter()
                    .filter(|&locale| book.supports(locale))
                    .map(Locale::button_label)
                    .collect();
                channel.send_choices(chat_id, LANGUAGE_QUESTION, &choices).await?;
            }
            Command::Lang(Some(code)) => {
                let locale: Locale = code.parse()?;
                self.switch_locale(id, locale).await?;
                channel.send(chat_id, locale.confirmation()).await?;
            }
            Command::Help => channel.send(chat_id, HELP_MESSAGE).await?,
            Command::NewPrompt(template) if template.is_empty() => {
                channel.send(chat_id, NEW_PROMPT_USAGE).await?;
            }
            Command::NewPrompt(template) => match SystemPrompt::new(template) {
                Ok(prompt) => {
                    store.set_prompt(id, prompt).await?;
                    info!(conversation = %id, "Custom system prompt set");
                    channel.send(chat_id, PROMPT_UPDATED).await?;
                }
                Err(e) => {
                    channel
                        .send(chat_id, &format!("{e}. The system prompt was not changed."))
                        .await?;
                }
            },
            Command::CurrentPrompt => {
                let reply = match store.custom_prompt(id).await? {
                    Some(prompt) => format!("Here is the current user system prompt: {prompt}"),
                    None => format!(
                        "No user system prompt. Default system prompt is used: {}",
                        store.prompt(id).await?
                    ),
                };
                channel.send(chat_id, &reply).await?;
            }
            Command::ResetPrompt => {
                store.reset_prompt(id).await?;
                channel.send(chat_id, PROMPT_RESET).await?;
            }
            Command::CleanHistory => {
                store.clear(id).await?;
                info!(conversation = %id, "History cleared");
                channel.send(chat_id, "Conversation history cleared.").await?;
            }
            Command::ChatHistory => {
                let window = store.window(id).await?;
                if window.is_empty() {
                    channel.send(chat_id, "Current conversation history is empty.").await?;
                } else {
                    channel.send(chat_id, "Current conversation history:").await?;
                    for turn in &window {
                        channel.send(chat_id, &format!("Round: {turn}")).await?;
                    }
                }
            }
            Command::FullChatHistory => {
                let mut reply = String::from("All conversation histories:");
                for (conversation, window) in store.all_windows().await? {
                    let rounds: Vec<String> = window.iter().map(ToString::to_string).collect();
                    reply.push_str(&format!("\n{conversation}: [{}]", rounds.join(", ")));
                }
                channel.send(chat_id, &reply).await?;
            }
            Command::Unknown(name) => {
                debug!(conversation = %id, command = %name, "Unknown command");
                channel.send(chat_id, UNKNOWN_COMMAND).await?;
            }
        }
        Ok(())
    }

    /// Only locales with a configured persona can be chosen.
    async fn switch_locale(&self, id: &ConversationId, locale: Locale) -> Result<(), Error> {
        if !self.router.prompt_book().supports(locale) {
            return Err(Error::Config {
                message: format!("no persona configured for locale {locale}"),
            });
        }
        let cleared = self.store().set_locale(id, locale).await?;
        info!(conversation = %id, %locale, cleared, "Locale switched");
        Ok(())
    }

    async fn command_error(
        &self,
        channel: &dyn Channel,
        chat_id: &str,
        error: Error,
    ) -> Result<(), ChannelError> {
        warn!(error = %error, "Command failed");
        channel
            .send(chat_id, &format!("Error processing command: {error}"))
            .await
    }

    async fn handle_document(
        &self,
        channel: &dyn Channel,
        chat_id: &str,
        id: &ConversationId,
        document: &Attachment,
    ) -> Result<(), ChannelError> {
        let name = document.filename.as_deref().unwrap_or(&document.url);
        if DocumentKind::from_path(Path::new(name)).is_none() {
            debug!(conversation = %id, file = %name, "Unsupported document type");
            return channel
                .send(chat_id, &DocumentError::UnsupportedType.to_string())
                .await;
        }

        let path = match channel.download(document, &self.documents.files_dir).await {
            Ok(path) => path,
            Err(e) => {
                warn!(conversation = %id, error = %e, "Document download failed");
                return channel.send(chat_id, FILE_NOT_PROCESSED).await;
            }
        };

        let outcome = ingest_file(
            self.store(),
            id,
            &path,
            self.documents.chunk_size,
            &self.documents.acknowledgement,
        )
        .await;

        let reply = match outcome {
            Ok(0) => NO_TEXT_EXTRACTED.to_string(),
            Ok(_) => self.documents.acknowledgement.clone(),
            Err(Error::Document(DocumentError::UnsupportedType)) => {
                DocumentError::UnsupportedType.to_string()
            }
            Err(e) => {
                warn!(conversation = %id, path = %path.display(), error = %e, "Document ingestion failed");
                FILE_NOT_PROCESSED.to_string()
            }
        };
        channel.send(chat_id, &reply).await
    }
}
