//! Subcommand implementations.

use std::path::Path;
use std::sync::Arc;

use parley_config::{AppConfig, ConfigError};
use parley_memory::InMemoryStore;
use parley_relay::{DocumentSettings, InferenceRouter, MessageHandler};

pub mod ask;
pub mod chat;
pub mod doctor;
pub mod extract;
pub mod onboard;
pub mod run;
pub mod status;

pub type CommandResult = Result<(), Box<dyn std::error::Error>>;

/// Load and validate configuration, from `path` if given.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    match path {
        Some(path) => AppConfig::load_with_env(path),
        None => AppConfig::load(),
    }
}

/// Wire the configured backend, an in-memory store and the router together.
pub fn build_router(config: &AppConfig) -> Result<Arc<InferenceRouter>, Box<dyn std::error::Error>> {
    let book = config.prompt_book()?;
    let backend = parley_providers::build_from_config(config)?;
    let store = Arc::new(InMemoryStore::new(book.clone(), config.retention));
    let router = InferenceRouter::new(backend, store, book).with_fallback(&config.fallback_message);
    Ok(Arc::new(router))
}

/// A message handler over [`build_router`].
pub fn build_handler(config: &AppConfig) -> Result<Arc<MessageHandler>, Box<dyn std::error::Error>> {
    let router = build_router(config)?;
    Ok(Arc::new(MessageHandler::new(
        router,
        DocumentSettings::from(&config.documents),
    )))
}
