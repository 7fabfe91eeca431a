//! Inference backend adapters for Parley.
//!
//! All adapters implement the `parley_core::Backend` trait.
//! [`build_from_config`] selects one of them at startup.

pub mod chat;
pub mod gateway;
mod http;
#[cfg(feature = "local")]
pub mod local;
pub mod router;
pub mod tgi;

pub use chat::ChatBackend;
pub use gateway::GatewayBackend;
#[cfg(feature = "local")]
pub use local::LocalBackend;
pub use router::build_from_config;
pub use tgi::TgiBackend;
