//! # Parley Core
//!
//! Domain types, traits, and error definitions for the Parley conversational
//! relay. This crate has **no I/O**; it defines the model that the backend,
//! store, transport and relay crates implement against.
//!
//! ## Layout
//!
//! - [`message`]: conversation identity and the immutable [`Turn`]
//! - [`prompt`]: system prompt templates and the prompt composer
//! - [`locale`]: supported locales and their default personas
//! - [`backend`]: the [`Backend`] trait every inference adapter implements
//! - [`store`]: the [`ConversationStore`] trait (bounded per-chat memory)
//! - [`channel`]: the [`Channel`] trait for messaging transports

pub mod backend;
pub mod channel;
pub mod error;
pub mod locale;
pub mod message;
pub mod prompt;
pub mod store;

// Re-export key types at crate root for ergonomics
pub use backend::{Backend, ChunkReceiver, Completion, InferenceRequest, StreamChunk, Usage};
pub use channel::{Attachment, Channel, ChannelId, ChannelMessage, MessageReceiver};
pub use error::{
    BackendError, ChannelError, DocumentError, Error, PromptError, Result, StoreError,
};
pub use locale::{Locale, Persona, PromptBook};
pub use message::{ConversationId, Turn};
pub use prompt::{LabelPair, SystemPrompt, compose, render_history, strip_leading_breaks};
pub use store::ConversationStore;
