//! CLI channel: interactive terminal chat.
//!
//! Reads from stdin, writes to stdout. Used for `parley chat`.
//! `/file <path>` sends a local document as if it had been uploaded.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parley_core::channel::{Attachment, Channel, ChannelId, ChannelMessage, MessageReceiver};
use parley_core::error::ChannelError;
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

/// Chat id of the single terminal conversation.
pub const CLI_CHAT_ID: &str = "cli_session";

/// Interactive CLI channel for terminal-based chat.
pub struct CliChannel {
    id: ChannelId,
}

impl CliChannel {
    pub fn new() -> Self {
        Self {
            id: ChannelId("cli".into()),
        }
    }
}

impl Default for CliChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// Turn one input line into a message. `None` for blank lines.
fn parse_line(channel_id: &ChannelId, line: &str) -> Option<ChannelMessage> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let mut msg = ChannelMessage::text(&channel_id.0, CLI_CHAT_ID, line);
    msg.sender_id = "local_user".into();
    msg.sender_name = Some("User".into());

    if let Some(path) = line.strip_prefix("/file ").map(str::trim) {
        msg.content = String::new();
        msg.attachments.push(Attachment {
            url: path.to_string(),
            filename: Path::new(path)
                .file_name()
                .and_then(|n| n.to_str())
                .map(str::to_string),
            mime_type: None,
            size_bytes: None,
        });
    }
    Some(msg)
}

fn is_exit(line: &str) -> bool {
    matches!(line.trim(), "exit" | "quit" | "/exit" | "/quit" | ":q")
}

#[async_trait]
impl Channel for CliChannel {
    fn name(&self) -> &str {
        "cli"
    }

    fn id(&self) -> &ChannelId {
        &self.id
    }

    async fn start(&self) -> Result<MessageReceiver, ChannelError> {
        let (tx, rx) = mpsc::channel(32);
        let channel_id = self.id.clone();

        tokio::spawn(async move {
            let stdin = io::stdin();
            let reader = BufReader::new(stdin);
            let mut lines = reader.lines();

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if is_exit(&line) {
                            break;
                        }
                        let Some(msg) = parse_line(&channel_id, &line) else {
                            continue;
                        };
                        if tx.send(Ok(msg)).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break, // EOF (Ctrl+D)
                    Err(e) => {
                        let _ = tx.send(Err(ChannelError::ConnectionLost(e.to_string()))).await;
                        break;
                    }
                }
            }
        });

        Ok(rx)
    }

    async fn send(&self, _chat_id: &str, content: &str) -> Result<(), ChannelError> {
        println!("{content}");
        Ok(())
    }

    /// Copy the local file into `dest_dir`.
    async fn download(&self, attachment: &Attachment, dest_dir: &Path) -> Result<PathBuf, ChannelError> {
        let source = Path::new(&attachment.url);
        let name = source
            .file_name()
            .ok_or_else(|| ChannelError::DownloadFailed(format!("not a file: {}", attachment.url)))?;

        tokio::fs::create_dir_all(dest_dir)
            .await
            .map_err(|e| ChannelError::DownloadFailed(format!("{}: {e}", dest_dir.display())))?;
        let dest = dest_dir.join(name);
        tokio::fs::copy(source, &dest)
            .await
            .map_err(|e| ChannelError::DownloadFailed(format!("{}: {e}", attachment.url)))?;
        Ok(dest)
    }

    fn is_allowed(&self, _sender_id: &str) -> bool {
        true // local user
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_channel_properties() {
        let ch = CliChannel::new();
        assert_eq!(ch.name(), "cli");
        assert_eq!(ch.id().0, "cli");
        assert!(ch.is_allowed("anyone"));
    }

    #[test]
    fn parses_text_and_file_lines() {
        let id = ChannelId("cli".into());
        assert!(parse_line(&id, "   ").is_none());

        let msg = parse_line(&id, " hello ").unwrap();
        assert_eq!(msg.content, "hello");
        assert_eq!(msg.chat_id, CLI_CHAT_ID);

        let msg = parse_line(&id, "/file /tmp/notes.txt").unwrap();
        assert!(msg.content.is_empty());
        let doc = msg.document().unwrap();
        assert_eq!(doc.url, "/tmp/notes.txt");
        assert_eq!(doc.filename.as_deref(), Some("notes.txt"));
    }

    #[test]
    fn exit_words() {
        assert!(is_exit("quit"));
        assert!(is_exit(" /exit "));
        assert!(!is_exit("/help"));
    }

    #[tokio::test]
    async fn download_copies_into_dest_dir() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("in.txt");
        std::fs::write(&source, "text").unwrap();

        let attachment = Attachment {
            url: source.display().to_string(),
            filename: Some("in.txt".into()),
            mime_type: None,
            size_bytes: None,
        };
        let dest = CliChannel::new()
            .download(&attachment, &dir.path().join("files"))
            .await
            .unwrap();
        assert_eq!(std::fs::read_to_string(dest).unwrap(), "text");
    }
}
