//! Conversation store implementations for Parley.
//!
//! All stores implement the `parley_core::ConversationStore` trait.

pub mod in_memory;

pub use in_memory::InMemoryStore;
