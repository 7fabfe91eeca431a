//! In-memory conversation store. State lives for the process lifetime.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parley_core::error::StoreError;
use parley_core::locale::{Locale, Persona, PromptBook};
use parley_core::message::{ConversationId, Turn};
use parley_core::prompt::SystemPrompt;
use parley_core::store::ConversationStore;
use tokio::sync::RwLock;
use tracing::debug;

/// Everything kept for one conversation.
#[derive(Debug, Default)]
struct ConversationState {
    window: VecDeque<Turn>,
    custom_prompt: Option<SystemPrompt>,
    locale: Option<Locale>,
}

/// A store keeping every conversation in a map behind one lock.
pub struct InMemoryStore {
    conversations: Arc<RwLock<HashMap<ConversationId, ConversationState>>>,
    book: Arc<PromptBook>,
    retention: usize,
}

impl InMemoryStore {
    /// `retention` below 1 is raised to 1.
    pub fn new(book: PromptBook, retention: usize) -> Self {
        Self {
            conversations: Arc::new(RwLock::new(HashMap::new())),
            book: Arc::new(book),
            retention: retention.max(1),
        }
    }

    fn locale_of(&self, state: Option<&ConversationState>) -> Locale {
        state
            .and_then(|s| s.locale)
            .unwrap_or_else(|| self.book.default_locale())
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new(PromptBook::default(), 5)
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    fn retention(&self) -> usize {
        self.retention
    }

    async fn window(&self, id: &ConversationId) -> Result<Vec<Turn>, StoreError> {
        let conversations = self.conversations.read().await;
        Ok(conversations
            .get(id)
            .map(|s| s.window.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn append(&self, id: &ConversationId, turn: Turn) -> Result<(), StoreError> {
        let mut conversations = self.conversations.write().await;
        let state = conversations.entry(id.clone()).or_default();
        state.window.push_back(turn);
        while state.window.len() > self.retention {
            state.window.pop_front();
        }
        debug!(conversation = %id, turns = state.window.len(), "Turn appended");
        Ok(())
    }

    async fn clear(&self, id: &ConversationId) -> Result<(), StoreError> {
        if let Some(state) = self.conversations.write().await.get_mut(id) {
            state.window.clear();
        }
        debug!(conversation = %id, "Window cleared");
        Ok(())
    }

    async fn set_prompt(&self, id: &ConversationId, prompt: SystemPrompt) -> Result<(), StoreError> {
        let mut conversations = self.conversations.write().await;
        conversations.entry(id.clone()).or_default().custom_prompt = Some(prompt);
        Ok(())
    }

    async fn reset_prompt(&self, id: &ConversationId) -> Result<(), StoreError> {
        if let Some(state) = self.conversations.write().await.get_mut(id) {
            state.custom_prompt = None;
        }
        Ok(())
    }

    async fn custom_prompt(&self, id: &ConversationId) -> Result<Option<SystemPrompt>, StoreError> {
        let conversations = self.conversations.read().await;
        Ok(conversations.get(id).and_then(|s| s.custom_prompt.clone()))
    }

    async fn prompt(&self, id: &ConversationId) -> Result<SystemPrompt, StoreError> {
        let conversations = self.conversations.read().await;
        let state = conversations.get(id);
        Ok(match state.and_then(|s| s.custom_prompt.clone()) {
            Some(prompt) => prompt,
            None => self.book.persona(self.locale_of(state)).prompt.clone(),
        })
    }

    async fn persona(&self, id: &ConversationId) -> Result<Persona, StoreError> {
        let conversations = self.conversations.read().await;
        Ok(self.book.persona(self.locale_of(conversations.get(id))).clone())
    }

    async fn set_locale(&self, id: &ConversationId, locale: Locale) -> Result<bool, StoreError> {
        let mut conversations = self.conversations.write().await;
        let previous = self.locale_of(conversations.get(id));
        let state = conversations.entry(id.clone()).or_default();
        state.locale = Some(locale);

        let cleared = previous != locale && !state.window.is_empty();
        if cleared {
            state.window.clear();
        }
        debug!(conversation = %id, %previous, %locale, cleared, "Locale set");
        Ok(cleared)
    }

    async fn locale(&self, id: &ConversationId) -> Result<Locale, StoreError> {
        let conversations = self.conversations.read().await;
        Ok(self.locale_of(conversations.get(id)))
    }

    async fn all_windows(&self) -> Result<BTreeMap<ConversationId, Vec<Turn>>, StoreError> {
        let conversations = self.conversations.read().await;
        Ok(conversations
            .iter()
            .map(|(id, s)| (id.clone(), s.window.iter().cloned().collect()))
            .collect())
    }
}
