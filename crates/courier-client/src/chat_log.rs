//! One open conversation: the thread view, the draft being typed, and the
//! last status line to show.

use std::sync::Arc;

use courier_shared::UserId;
use courier_store::{Message, UserProfile};
use tokio_stream::wrappers::ReceiverStream;
use tracing::warn;

use crate::error::ClientError;
use crate::events::ThreadUpdate;
use crate::send::{SendError, SendPipeline, SendReceipt};
use crate::thread::ThreadSynchronizer;

pub struct ChatLog {
    self_id: UserId,
    peer: UserProfile,
    draft: String,
    last_error: Option<String>,
    thread: ThreadSynchronizer,
    pipeline: Arc<SendPipeline>,
}

impl ChatLog {
    /// Subscribe `thread` to the conversation between `self_id` and `peer`.
    pub async fn open(
        self_id: UserId,
        peer: UserProfile,
        mut thread: ThreadSynchronizer,
        pipeline: Arc<SendPipeline>,
    ) -> Result<(Self, ReceiverStream<ThreadUpdate>), ClientError> {
        let updates = thread.subscribe(&self_id, &peer.uid).await?;
        Ok((
            Self {
                self_id,
                peer,
                draft: String::new(),
                last_error: None,
                thread,
                pipeline,
            },
            updates,
        ))
    }

    pub fn peer(&self) -> &UserProfile {
        &self.peer
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn set_draft(&mut self, text: impl Into<String>) {
        self.draft = text.into();
    }

    pub fn messages(&self) -> Arc<Vec<Message>> {
        self.thread.messages()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Send the draft. It is cleared only once the sender's copy is stored.
    pub async fn send_draft(&mut self) -> Result<SendReceipt, SendError> {
        match self
            .pipeline
            .send(&self.self_id, &self.peer.uid, &self.draft)
            .await
        {
            Ok(receipt) => {
                self.draft.clear();
                self.last_error = None;
                Ok(receipt)
            }
            Err(e) => {
                warn!(peer = %self.peer.uid, error = %e, "Send failed, keeping draft");
                self.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Record a status line coming from the update stream.
    pub fn note_update(&mut self, update: &ThreadUpdate) {
        if let ThreadUpdate::Error(status) = update {
            self.last_error = Some(status.clone());
        }
    }

    /// Tear the conversation down and release its subscription.
    pub fn close(mut self) {
        self.thread.unsubscribe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticAuth;
    use crate::clock::SystemClock;
    use crate::config::ClientConfig;
    use crate::directory::UserDirectory;
    use courier_shared::CollectionPath;
    use courier_store::{DocumentStore, MemoryStore};
    use futures::StreamExt;

    async fn open_chat(store: &MemoryStore) -> (ChatLog, ReceiverStream<ThreadUpdate>) {
        let shared: Arc<dyn DocumentStore> = Arc::new(store.clone());
        let directory = Arc::new(UserDirectory::new(
            shared.clone(),
            Arc::new(StaticAuth::signed_in("u1")),
        ));
        let config = ClientConfig::default();
        let pipeline = Arc::new(SendPipeline::new(
            shared.clone(),
            directory,
            Arc::new(SystemClock),
            &config,
        ));
        ChatLog::open(
            "u1".into(),
            UserProfile::bare("u2".into()),
            ThreadSynchronizer::new(shared, &config),
            pipeline,
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_subscription_error_becomes_status() {
        let store = MemoryStore::new();
        let (mut chat, mut updates) = open_chat(&store).await;
        assert!(chat.last_error().is_none());

        let thread = CollectionPath::thread(&"u1".into(), &"u2".into()).unwrap();
        store.break_subscriptions(&thread, "permission revoked").unwrap();

        let update = updates.next().await.unwrap();
        chat.note_update(&update);
        let status = chat.last_error().unwrap();
        assert!(status.starts_with("Failed to listen for messages"));
        assert!(status.contains("permission revoked"));
    }

    #[tokio::test]
    async fn test_successful_send_clears_status() {
        let store = MemoryStore::new();
        let (mut chat, mut updates) = open_chat(&store).await;

        chat.note_update(&ThreadUpdate::Error("offline".into()));
        chat.set_draft("back online");
        chat.send_draft().await.unwrap();
        assert!(chat.last_error().is_none());
        assert_eq!(chat.draft(), "");

        let update = updates.next().await.unwrap();
        chat.note_update(&update);
        match update {
            ThreadUpdate::Added { message, .. } => assert_eq!(message.text, "back online"),
            other => panic!("unexpected update: {other:?}"),
        }
        assert!(chat.last_error().is_none());
    }
}
