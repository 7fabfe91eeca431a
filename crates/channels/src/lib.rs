//! Messaging transports for Parley.
//!
//! Each channel connects to a messaging platform and relays messages to and
//! from the relay. Channels are trait-based and platform-agnostic.
//!
//! Available channels:
//! - **CLI**: interactive terminal chat (stdin/stdout)
//! - **Telegram**: Telegram Bot API over long polling

pub mod cli;
pub mod telegram;

pub use cli::CliChannel;
pub use telegram::TelegramChannel;
