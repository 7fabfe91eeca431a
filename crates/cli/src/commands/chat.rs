//! `parley chat`: converse in the terminal.

use std::path::Path;
use std::sync::Arc;

use parley_channels::CliChannel;
use parley_core::channel::Channel;

use super::{CommandResult, build_handler, load_config};

pub async fn run(config_path: Option<&Path>) -> CommandResult {
    let config = load_config(config_path).map_err(|e| format!("Failed to load config: {e}"))?;
    let handler = build_handler(&config)?;

    println!();
    println!("  Parley, interactive mode");
    println!("  Backend:   {}", config.backend);
    println!("  Locale:    {}", config.default_locale);
    println!("  Memory:    last {} turns", config.retention);
    println!();
    println!("  Type a message and press Enter. /help lists commands,");
    println!("  /file <path> shares a document, 'exit' quits.");
    println!();

    let channel: Arc<dyn Channel> = Arc::new(CliChannel::new());
    parley_relay::serve(channel, handler).await?;

    println!();
    println!("  Goodbye!");
    println!();
    Ok(())
}
