//! `parley extract`: print a document's normalized text.

use std::path::Path;

use super::{CommandResult, load_config};

pub async fn run(config_path: Option<&Path>, path: &Path, chunks: bool) -> CommandResult {
    let text = parley_documents::normalize_file(path).await?;
    println!("{text}");

    if chunks {
        let config = load_config(config_path)?;
        let size = config.documents.chunk_size;
        let count = parley_documents::chunk(&text, size).len();
        eprintln!(
            "{} chars, {count} history entries of up to {size} chars (retention keeps {})",
            text.chars().count(),
            config.retention
        );
    }
    Ok(())
}
