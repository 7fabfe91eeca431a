//! `parley doctor`: diagnose configuration, backend and transport.

use std::path::Path;

use parley_channels::TelegramChannel;
use parley_core::channel::Channel;

use super::{CommandResult, build_router, load_config};

pub async fn run(config_path: Option<&Path>) -> CommandResult {
    println!("Parley doctor");
    println!("=============\n");

    let mut issues = 0;

    let config = match load_config(config_path) {
        Ok(config) => {
            println!("  [ok]   Config valid");
            config
        }
        Err(e) => {
            println!("  [fail] Config invalid: {e}");
            println!("\n  1 issue found. Fix the config first.");
            return Ok(());
        }
    };

    match build_router(&config) {
        Ok(router) => match router.backend().health_check().await {
            Ok(true) => println!("  [ok]   Backend '{}' reachable", config.backend),
            Ok(false) => {
                println!("  [warn] Backend '{}' answered but reports unhealthy", config.backend);
                issues += 1;
            }
            Err(e) => {
                println!("  [fail] Backend '{}' unreachable: {e}", config.backend);
                issues += 1;
            }
        },
        Err(e) => {
            println!("  [fail] Backend '{}' not usable: {e}", config.backend);
            issues += 1;
        }
    }

    if config.telegram.bot_token.is_some() {
        match TelegramChannel::new(&config.telegram) {
            Ok(channel) => match channel.health_check().await {
                Ok(true) => println!("  [ok]   Telegram bot token accepted"),
                Ok(false) | Err(_) => {
                    println!("  [fail] Telegram rejected the bot token");
                    issues += 1;
                }
            },
            Err(e) => {
                println!("  [fail] Telegram channel: {e}");
                issues += 1;
            }
        }
    } else {
        println!("  [warn] No Telegram bot token; `parley run` will not start");
        issues += 1;
    }

    let files_dir = config.documents.files_dir();
    if files_dir.is_dir() {
        println!("  [ok]   Documents directory exists");
    } else {
        println!("  [warn] No documents directory at {}; run `parley onboard`", files_dir.display());
        issues += 1;
    }

    println!();
    if issues == 0 {
        println!("  All checks passed.");
    } else {
        println!("  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
