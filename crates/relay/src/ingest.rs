//! Document ingestion: extracted text enters the window as synthetic turns.

use std::path::Path;

use parley_core::error::{Error, StoreError};
use parley_core::message::{ConversationId, Turn};
use parley_core::store::ConversationStore;
use parley_documents::{chunk, normalize_file};
use tracing::info;

/// Append `text` to the conversation, one turn per chunk of `chunk_size`
/// characters, each answered with `acknowledgement`.
///
/// Returns the number of turns appended; blank text appends nothing. The
/// store's retention applies, so only the trailing chunks of a long document
/// survive.
pub async fn ingest_text(
    store: &dyn ConversationStore,
    id: &ConversationId,
    text: &str,
    chunk_size: usize,
    acknowledgement: &str,
) -> Result<usize, StoreError> {
    if text.trim().is_empty() {
        return Ok(0);
    }

    let chunks = chunk(text, chunk_size);
    for piece in &chunks {
        store.append(id, Turn::new(*piece, acknowledgement)).await?;
    }
    Ok(chunks.len())
}

/// Normalize the file at `path` and ingest its text.
pub async fn ingest_file(
    store: &dyn ConversationStore,
    id: &ConversationId,
    path: &Path,
    chunk_size: usize,
    acknowledgement: &str,
) -> Result<usize, Error> {
    let text = normalize_file(path).await?;
    let turns = ingest_text(store, id, &text, chunk_size, acknowledgement).await?;
    info!(
        conversation = %id,
        path = %path.display(),
        chars = text.chars().count(),
        turns,
        "Document ingested"
    );
    Ok(turns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::error::DocumentError;
    use parley_core::locale::PromptBook;
    use parley_memory::InMemoryStore;

    const ACK: &str = "Thank you for the provided context. You can now ask me questions about it.";

    #[tokio::test]
    async fn chunks_become_acknowledged_turns() {
        let store = InMemoryStore::new(PromptBook::default(), 5);
        let c = ConversationId::new("1");

        let n = ingest_text(&store, &c, "abcdefgh", 3, ACK).await.unwrap();
        assert_eq!(n, 3);
        let window = store.window(&c).await.unwrap();
        let queries: Vec<&str> = window.iter().map(Turn::query).collect();
        assert_eq!(queries, ["abc", "def", "gh"]);
        assert!(window.iter().all(|t| t.response() == ACK));
    }

    #[tokio::test]
    async fn long_document_is_trimmed_by_retention() {
        let store = InMemoryStore::new(PromptBook::default(), 2);
        let c = ConversationId::new("1");
        let n = ingest_text(&store, &c, "aabbccdd", 2, ACK).await.unwrap();
        assert_eq!(n, 4);
        let window = store.window(&c).await.unwrap();
        assert_eq!(window.len(), 2);
        assert_eq!(window[0].query(), "cc");
    }

    #[tokio::test]
    async fn blank_text_appends_nothing() {
        let store = InMemoryStore::default();
        let c = ConversationId::new("1");
        assert_eq!(ingest_text(&store, &c, " \t ", 10, ACK).await.unwrap(), 0);
        assert!(store.window(&c).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn ingests_text_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "Intro-\nduction.\n\nBody.").unwrap();

        let store = InMemoryStore::default();
        let c = ConversationId::new("1");
        assert_eq!(ingest_file(&store, &c, &path, 3800, ACK).await.unwrap(), 1);
        assert_eq!(store.window(&c).await.unwrap()[0].query(), "Introduction.\tBody.");
    }

    #[tokio::test]
    async fn unsupported_file_leaves_window_untouched() {
        let store = InMemoryStore::default();
        let c = ConversationId::new("1");
        let err = ingest_file(&store, &c, Path::new("deck.pptx"), 3800, ACK)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Document(DocumentError::UnsupportedType)));
        assert!(store.window(&c).await.unwrap().is_empty());
    }
}
