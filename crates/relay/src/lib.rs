//! # Parley Relay
//!
//! The conversation layer between a messaging transport and an inference
//! backend.
//!
//! - [`router`]: [`InferenceRouter`], the uniform `infer` over the configured backend
//! - [`commands`]: slash-command parsing
//! - [`ingest`]: documents into the conversation window
//! - [`handler`]: [`MessageHandler`], one inbound message in, replies out
//! - [`serve`](mod@serve): the sequential receive loop

pub mod commands;
pub mod handler;
pub mod ingest;
pub mod router;
pub mod serve;

pub use commands::{Command, HELP_MESSAGE};
pub use handler::{DocumentSettings, MessageHandler};
pub use ingest::{ingest_file, ingest_text};
pub use router::{DEFAULT_FALLBACK, InferenceFailure, InferenceRouter, collect_stream};
pub use serve::serve;
