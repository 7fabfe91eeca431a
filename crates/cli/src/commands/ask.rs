//! `parley ask`: answer one query without keeping any history.

use std::io::Write;
use std::path::Path;

use parley_core::message::ConversationId;
use parley_core::prompt::SystemPrompt;

use super::{CommandResult, build_router, load_config};

pub async fn run(
    config_path: Option<&Path>,
    query: &str,
    prompt: Option<String>,
    stream: bool,
) -> CommandResult {
    let config = load_config(config_path)?;
    let router = build_router(&config)?;
    let prompt = prompt.map(SystemPrompt::new).transpose()?;

    if !stream {
        match router.complete(query, prompt.as_ref(), &[]).await {
            Ok(reply) => println!("{reply}"),
            Err(e) => {
                tracing::warn!(error = %e, "Inference failed");
                println!("{}", router.fallback_message());
            }
        }
        return Ok(());
    }

    let id = ConversationId::new("ask");
    let mut rx = match router.infer_stream(&id, query, prompt.as_ref()).await {
        Ok(rx) => rx,
        Err(failure) => {
            println!("{}", failure.fallback);
            return Ok(());
        }
    };

    let mut stdout = std::io::stdout();
    while let Some(item) = rx.recv().await {
        match item {
            Ok(chunk) => {
                if let Some(delta) = chunk.content {
                    write!(stdout, "{delta}")?;
                    stdout.flush()?;
                }
                if chunk.done {
                    break;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Stream failed");
                write!(stdout, "\n{}", router.fallback_message())?;
                break;
            }
        }
    }
    writeln!(stdout)?;
    Ok(())
}
