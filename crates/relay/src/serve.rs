//! The inbound message loop.

use std::sync::Arc;

use parley_core::channel::Channel;
use parley_core::error::ChannelError;
use tracing::{info, warn};

use crate::handler::MessageHandler;

/// Receive messages from `channel` and handle them one at a time until the
/// channel closes.
///
/// Handling is sequential, so no two inferences for the same conversation
/// ever overlap. Senders outside the channel's allowlist are dropped.
pub async fn serve(
    channel: Arc<dyn Channel>,
    handler: Arc<MessageHandler>,
) -> Result<(), ChannelError> {
    let mut rx = channel.start().await?;
    info!(channel = channel.name(), "Relay listening");

    let mut handled = 0u64;
    while let Some(result) = rx.recv().await {
        match result {
            Ok(msg) => {
                if !channel.is_allowed(&msg.sender_id) {
                    warn!(
                        channel = channel.name(),
                        sender = %msg.sender_id,
                        "Message from unauthorized sender dropped"
                    );
                    continue;
                }
                if let Err(e) = handler.handle(channel.as_ref(), &msg).await {
                    warn!(channel = channel.name(), chat = %msg.chat_id, error = %e, "Reply not delivered");
                }
                handled += 1;
            }
            Err(ChannelError::ConnectionLost(reason)) => {
                warn!(channel = channel.name(), %reason, "Channel connection lost");
                break;
            }
            Err(e) => warn!(channel = channel.name(), error = %e, "Inbound message rejected"),
        }
    }

    info!(channel = channel.name(), handled, "Relay stopped");
    channel.stop().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::DocumentSettings;
    use crate::router::InferenceRouter;
    use async_trait::async_trait;
    use parley_core::backend::{Backend, Completion, InferenceRequest};
    use parley_core::channel::{ChannelId, ChannelMessage, MessageReceiver};
    use parley_core::error::BackendError;
    use parley_core::locale::PromptBook;
    use parley_core::message::ConversationId;
    use parley_core::store::ConversationStore;
    use parley_memory::InMemoryStore;
    use std::sync::Mutex;

    struct CountingBackend;

    #[async_trait]
    impl Backend for CountingBackend {
        fn name(&self) -> &str {
            "counting"
        }

        async fn complete(&self, request: InferenceRequest) -> Result<Completion, BackendError> {
            Ok(Completion::new(
                format!("{} after {}", request.query, request.window.len()),
                "counting",
            ))
        }
    }

    /// Replays a fixed inbox, then closes.
    struct InboxChannel {
        id: ChannelId,
        inbox: Mutex<Vec<ChannelMessage>>,
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Channel for InboxChannel {
        fn name(&self) -> &str {
            "inbox"
        }

        fn id(&self) -> &ChannelId {
            &self.id
        }

        async fn start(&self) -> Result<MessageReceiver, ChannelError> {
            let messages: Vec<_> = self.inbox.lock().unwrap().drain(..).collect();
            let (tx, rx) = tokio::sync::mpsc::channel(messages.len().max(1));
            for msg in messages {
                tx.send(Ok(msg)).await.unwrap();
            }
            Ok(rx)
        }

        async fn send(&self, chat_id: &str, content: &str) -> Result<(), ChannelError> {
            self.sent.lock().unwrap().push(format!("{chat_id}> {content}"));
            Ok(())
        }

        fn is_allowed(&self, sender_id: &str) -> bool {
            sender_id != "intruder"
        }
    }

    #[tokio::test]
    async fn handles_messages_in_order_and_skips_unauthorized() {
        let mut intruder = ChannelMessage::text("inbox", "7", "let me in");
        intruder.sender_id = "intruder".into();
        let channel = Arc::new(InboxChannel {
            id: ChannelId("inbox".into()),
            inbox: Mutex::new(vec![
                ChannelMessage::text("inbox", "7", "first"),
                intruder,
                ChannelMessage::text("inbox", "7", "second"),
            ]),
            sent: Mutex::new(Vec::new()),
        });

        let store = Arc::new(InMemoryStore::default());
        let router = InferenceRouter::new(Arc::new(CountingBackend), store.clone(), PromptBook::default());
        let files = tempfile::tempdir().unwrap();
        let handler = Arc::new(MessageHandler::new(
            Arc::new(router),
            DocumentSettings {
                files_dir: files.path().to_path_buf(),
                chunk_size: 3800,
                acknowledgement: "ok".into(),
            },
        ));

        serve(channel.clone(), handler).await.unwrap();

        assert_eq!(
            *channel.sent.lock().unwrap(),
            ["7> first after 0", "7> second after 1"]
        );
        assert_eq!(store.window(&ConversationId::new("7")).await.unwrap().len(), 2);
    }
}
