//! `parley status`: show the effective configuration.

use std::path::Path;

use parley_config::{AppConfig, BackendMode};

use super::{CommandResult, load_config};

pub async fn run(config_path: Option<&Path>) -> CommandResult {
    let config = load_config(config_path).map_err(|e| format!("Failed to load config: {e}"))?;

    println!("Parley status");
    println!("=============");
    println!("  Config dir:   {}", AppConfig::config_dir().display());
    println!("  Backend:      {}", config.backend);
    match config.backend {
        BackendMode::Gateway => println!("  Endpoint:     {}", config.gateway.url),
        BackendMode::Tgi => println!("  Endpoint:     {}", config.tgi.url),
        BackendMode::Chat => println!("  Model:        {} @ {}", config.chat.model, config.chat.api_url),
        BackendMode::Local => println!(
            "  Model file:   {}",
            config
                .local
                .model_path
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_default()
        ),
    }
    println!("  Locale:       {}", config.default_locale);
    let mut locales: Vec<&str> = config.locales.keys().map(String::as_str).collect();
    locales.sort_unstable();
    println!("  Personas:     {}", locales.join(", "));
    println!("  Retention:    {} turns", config.retention);
    println!("  Documents:    {} (chunks of {} chars)", config.documents.files_dir().display(), config.documents.chunk_size);
    println!(
        "  Telegram:     {}",
        if config.telegram.bot_token.is_some() { "token set" } else { "no token" }
    );

    Ok(())
}
