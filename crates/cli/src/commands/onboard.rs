//! `parley onboard`: first-time setup.

use std::path::Path;

use parley_config::AppConfig;

use super::CommandResult;

pub async fn run(config_path: Option<&Path>) -> CommandResult {
    let config_path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"));
    let files_dir = AppConfig::default().documents.files_dir();

    println!("Parley: first-time setup");
    println!("========================\n");

    if let Some(dir) = config_path.parent() {
        if !dir.as_os_str().is_empty() && !dir.exists() {
            std::fs::create_dir_all(dir)?;
            println!("  Created config directory: {}", dir.display());
        }
    }

    if !files_dir.exists() {
        std::fs::create_dir_all(&files_dir)?;
        println!("  Created documents directory: {}", files_dir.display());
    }

    if config_path.exists() {
        println!("\n  Config already exists at: {}", config_path.display());
        println!("  Edit it manually or delete it and re-run onboard.\n");
        return Ok(());
    }

    std::fs::write(&config_path, AppConfig::default_toml())?;
    println!("  Created config at: {}", config_path.display());
    println!("\n  Next steps:");
    println!("    1. Pick a backend in {} (gateway, tgi, local, chat)", config_path.display());
    println!("    2. Set PARLEY_BOT_TOKEN and run: parley run");
    println!("    3. Or try it locally first: parley chat\n");

    Ok(())
}
