//! ConversationStore trait: bounded per-conversation memory.
//!
//! The store is the single source of truth for conversation history. It keeps
//! the most recent `retention()` turns per conversation, evicting the oldest
//! first, plus an optional custom prompt and a locale per conversation.
//!
//! A conversation the store has never seen is not an error: it reads as an
//! empty window in the default locale.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::locale::{Locale, Persona};
use crate::message::{ConversationId, Turn};
use crate::prompt::SystemPrompt;

/// The core ConversationStore trait.
///
/// Implementations: in-memory (process lifetime).
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Maximum number of turns kept per conversation.
    fn retention(&self) -> usize;

    /// Current window, oldest first. Empty for unknown conversations.
    async fn window(&self, id: &ConversationId) -> std::result::Result<Vec<Turn>, StoreError>;

    /// Append a turn, then evict from the front until the window fits.
    async fn append(&self, id: &ConversationId, turn: Turn) -> std::result::Result<(), StoreError>;

    /// Empty the window. The custom prompt and locale are kept.
    async fn clear(&self, id: &ConversationId) -> std::result::Result<(), StoreError>;

    /// Set a custom prompt for this conversation.
    async fn set_prompt(
        &self,
        id: &ConversationId,
        prompt: SystemPrompt,
    ) -> std::result::Result<(), StoreError>;

    /// Remove the custom prompt, going back to the locale default.
    async fn reset_prompt(&self, id: &ConversationId) -> std::result::Result<(), StoreError>;

    /// The custom prompt, if one was set.
    async fn custom_prompt(
        &self,
        id: &ConversationId,
    ) -> std::result::Result<Option<SystemPrompt>, StoreError>;

    /// The effective prompt: the custom prompt, else the locale default.
    async fn prompt(&self, id: &ConversationId) -> std::result::Result<SystemPrompt, StoreError>;

    /// The persona (default prompt and labels) of this conversation's locale.
    async fn persona(&self, id: &ConversationId) -> std::result::Result<Persona, StoreError>;

    /// Switch the locale. A real change clears a non-empty window.
    ///
    /// Returns `true` when the window was cleared.
    async fn set_locale(
        &self,
        id: &ConversationId,
        locale: Locale,
    ) -> std::result::Result<bool, StoreError>;

    /// Current locale of the conversation.
    async fn locale(&self, id: &ConversationId) -> std::result::Result<Locale, StoreError>;

    /// Every known conversation's window.
    async fn all_windows(
        &self,
    ) -> std::result::Result<BTreeMap<ConversationId, Vec<Turn>>, StoreError>;
}
