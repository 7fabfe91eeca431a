//! `parley run`: serve the Telegram bot until interrupted.

use std::path::Path;
use std::sync::Arc;

use parley_channels::TelegramChannel;
use parley_core::channel::Channel;
use tracing::info;

use super::{CommandResult, build_handler, load_config};

pub async fn run(config_path: Option<&Path>) -> CommandResult {
    let config = load_config(config_path)?;
    let handler = build_handler(&config)?;
    let channel: Arc<dyn Channel> = Arc::new(TelegramChannel::new(&config.telegram)?);

    info!(
        backend = %config.backend,
        locale = %config.default_locale,
        retention = config.retention,
        "Starting Telegram relay"
    );

    tokio::select! {
        result = parley_relay::serve(Arc::clone(&channel), handler) => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down");
            channel.stop().await?;
        }
    }

    Ok(())
}
