//! Send Pipeline.
//!
//! A message is written twice, once under each participant, and the
//! recent-conversation summaries are upserted (the sender's always, the
//! recipient's unless configured off). When the
//! store can commit a batch atomically all of it goes out as one batch, so
//! the two thread mirrors cannot diverge. Otherwise the sender's copy is
//! written first and the remaining writes run as tracked background tasks.

use std::sync::Arc;

use courier_shared::{CollectionPath, DocumentId, DocumentPath, PathError, UserId};
use courier_store::{ConversationSummary, DocumentStore, Fields, Message, StoreError, WriteBatch};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::clock::Clock;
use crate::config::ClientConfig;
use crate::directory::UserDirectory;

#[derive(Error, Debug, Clone)]
pub enum SendError {
    #[error("Sender and recipient must both be set")]
    EmptyParticipant,

    #[error("Invalid participant id: {0}")]
    InvalidParticipant(#[from] PathError),

    #[error("Failed to save message into store: {0}")]
    SenderMirror(StoreError),

    #[error("Failed to save message for recipient: {0}")]
    RecipientMirror(StoreError),

    #[error("Failed to save recent message: {0}")]
    RecentSummary(StoreError),

    #[error("Failed to commit message batch: {0}")]
    Batch(StoreError),

    #[error("Background write did not finish: {0}")]
    Background(String),
}

type PendingWrite = JoinHandle<Result<(), SendError>>;

/// Outcome of a send whose first write (or whole batch) succeeded.
#[derive(Debug)]
pub struct SendReceipt {
    /// The message as stored in the sender's mirror, id included.
    pub message: Message,
    /// Id of the copy in the recipient's mirror.
    pub recipient_copy_id: DocumentId,
    pending: Vec<PendingWrite>,
}

impl SendReceipt {
    /// Number of writes still tracked in the background.
    pub fn pending_writes(&self) -> usize {
        self.pending.len()
    }

    /// Wait for every background write and collect their failures.
    ///
    /// Failures are logged when they happen whether or not this is called.
    pub async fn settle(self) -> Result<(), Vec<SendError>> {
        let mut failures = Vec::new();
        for handle in self.pending {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => failures.push(e),
                Err(e) => failures.push(SendError::Background(e.to_string())),
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(failures)
        }
    }
}

pub struct SendPipeline {
    store: Arc<dyn DocumentStore>,
    directory: Arc<UserDirectory>,
    clock: Arc<dyn Clock>,
    atomic_send: bool,
    mirror_recipient_summary: bool,
}

impl SendPipeline {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        directory: Arc<UserDirectory>,
        clock: Arc<dyn Clock>,
        config: &ClientConfig,
    ) -> Self {
        Self {
            store,
            directory,
            clock,
            atomic_send: config.atomic_send,
            mirror_recipient_summary: config.mirror_recipient_summary,
        }
    }

    /// Send `text` from `self_id` to `peer_id`.
    ///
    /// Empty text is not rejected here. Returns once the message is safely in
    /// the sender's mirror.
    pub async fn send(
        &self,
        self_id: &UserId,
        peer_id: &UserId,
        text: &str,
    ) -> Result<SendReceipt, SendError> {
        if self_id.is_empty() || peer_id.is_empty() {
            return Err(SendError::EmptyParticipant);
        }

        let sender_thread = CollectionPath::thread(self_id, peer_id)?;
        let recipient_thread = CollectionPath::thread(peer_id, self_id)?;
        let sender_path = sender_thread.doc(&self.store.new_document_id(&sender_thread))?;
        let recipient_path =
            recipient_thread.doc(&self.store.new_document_id(&recipient_thread))?;

        let mut message = Message::new(
            self_id.clone(),
            peer_id.clone(),
            text.to_string(),
            self.clock.now(),
        );
        let fields = message.to_fields().map_err(SendError::SenderMirror)?;
        let summaries = self.summary_writes(&message).await?;

        let recipient_copy_id = recipient_path.id().clone();
        message.id = Some(sender_path.id().clone());

        if self.atomic_send && self.store.supports_atomic_batches() {
            let mut batch = WriteBatch::new();
            batch.set(sender_path.clone(), fields.clone());
            batch.set(recipient_path, fields);
            for (path, summary) in summaries {
                batch.set(path, summary);
            }

            self.store.commit(batch).await.map_err(|e| {
                error!(from = %self_id, to = %peer_id, error = %e, "Message batch failed");
                SendError::Batch(e)
            })?;

            info!(from = %self_id, to = %peer_id, id = %sender_path.id(), "Message sent");
            return Ok(SendReceipt {
                message,
                recipient_copy_id,
                pending: Vec::new(),
            });
        }

        self.store
            .set_document(&sender_path, fields.clone())
            .await
            .map_err(|e| {
                error!(from = %self_id, to = %peer_id, error = %e, "Failed to save sender copy");
                SendError::SenderMirror(e)
            })?;
        info!(from = %self_id, to = %peer_id, id = %sender_path.id(), "Message saved for sender");

        let mut pending = vec![spawn_write(
            self.store.clone(),
            recipient_path,
            fields,
            SendError::RecipientMirror,
        )];
        for (path, summary) in summaries {
            pending.push(spawn_write(
                self.store.clone(),
                path,
                summary,
                SendError::RecentSummary,
            ));
        }

        Ok(SendReceipt {
            message,
            recipient_copy_id,
            pending,
        })
    }

    async fn summary_writes(
        &self,
        message: &Message,
    ) -> Result<Vec<(DocumentPath, Fields)>, SendError> {
        let sender = &message.from_id;
        let recipient = &message.to_id;

        let peer_profile = self.directory.display_profile(recipient).await;
        let mut writes = vec![(
            DocumentPath::recent(sender, recipient)?,
            ConversationSummary::for_peer(message, &peer_profile)
                .to_fields()
                .map_err(SendError::RecentSummary)?,
        )];

        if self.mirror_recipient_summary {
            let sender_profile = self.directory.display_profile(sender).await;
            writes.push((
                DocumentPath::recent(recipient, sender)?,
                ConversationSummary::for_peer(message, &sender_profile)
                    .to_fields()
                    .map_err(SendError::RecentSummary)?,
            ));
        }

        Ok(writes)
    }
}

fn spawn_write(
    store: Arc<dyn DocumentStore>,
    path: DocumentPath,
    fields: Fields,
    wrap: fn(StoreError) -> SendError,
) -> PendingWrite {
    tokio::spawn(async move {
        match store.set_document(&path, fields).await {
            Ok(()) => {
                debug!(path = %path, "Background write saved");
                Ok(())
            }
            Err(e) => {
                error!(path = %path, error = %e, "Background write failed");
                Err(wrap(e))
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticAuth;
    use crate::clock::ManualClock;
    use chrono::{Duration, TimeZone, Utc};
    use courier_store::{MemoryStore, UserProfile};

    struct Fixture {
        store: MemoryStore,
        clock: Arc<ManualClock>,
        pipeline: SendPipeline,
    }

    async fn fixture(store: MemoryStore, config: ClientConfig) -> Fixture {
        for (uid, email) in [("u1", "a@example.com"), ("u2", "b@example.com")] {
            let profile = UserProfile {
                uid: uid.into(),
                email: email.into(),
                profile_image_url: String::new(),
            };
            store
                .set_document(&DocumentPath::user(&uid.into()).unwrap(), profile.to_fields().unwrap())
                .await
                .unwrap();
        }

        let shared: Arc<dyn DocumentStore> = Arc::new(store.clone());
        let directory = Arc::new(UserDirectory::new(
            shared.clone(),
            Arc::new(StaticAuth::signed_in("u1")),
        ));
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2021, 12, 16, 10, 0, 0).unwrap(),
        ));
        let pipeline = SendPipeline::new(shared, directory, clock.clone(), &config);
        Fixture {
            store,
            clock,
            pipeline,
        }
    }

    fn thread(owner: &str, peer: &str) -> CollectionPath {
        CollectionPath::thread(&owner.into(), &peer.into()).unwrap()
    }

    fn texts(store: &MemoryStore, owner: &str, peer: &str) -> Vec<String> {
        store
            .documents(&thread(owner, peer))
            .iter()
            .map(|d| Message::from_document(d).unwrap().text)
            .collect()
    }

    async fn summary(store: &MemoryStore, owner: &str, peer: &str) -> Option<ConversationSummary> {
        let path = DocumentPath::recent(&owner.into(), &peer.into()).unwrap();
        store.get_document(&path).await.unwrap().map(|fields| {
            ConversationSummary::from_document(&courier_store::Document::new(path, fields)).unwrap()
        })
    }

    #[tokio::test]
    async fn test_atomic_send_writes_both_mirrors_and_summary() {
        let fx = fixture(MemoryStore::new(), ClientConfig::default()).await;
        let receipt = fx.pipeline.send(&"u1".into(), &"u2".into(), "hi").await.unwrap();
        assert_eq!(receipt.pending_writes(), 0);
        assert!(receipt.message.id.is_some());

        assert_eq!(texts(&fx.store, "u1", "u2"), vec!["hi"]);
        assert_eq!(texts(&fx.store, "u2", "u1"), vec!["hi"]);

        let mine = summary(&fx.store, "u1", "u2").await.unwrap();
        assert_eq!(mine.text, "hi");
        assert_eq!(mine.email, "b@example.com");

        let theirs = summary(&fx.store, "u2", "u1").await.unwrap();
        assert_eq!(theirs.text, "hi");
        assert_eq!(theirs.peer_id, UserId::from("u1"));
        assert_eq!(theirs.email, "a@example.com");
    }

    #[tokio::test]
    async fn test_mirrors_share_payload() {
        let fx = fixture(MemoryStore::new(), ClientConfig::default()).await;
        fx.pipeline.send(&"u1".into(), &"u2".into(), "same").await.unwrap();

        let mine = fx.store.documents(&thread("u1", "u2"));
        let theirs = fx.store.documents(&thread("u2", "u1"));
        assert_eq!(mine[0].fields, theirs[0].fields);
    }

    #[tokio::test]
    async fn test_second_send_overwrites_summary() {
        let fx = fixture(MemoryStore::new(), ClientConfig::default()).await;
        fx.pipeline.send(&"u1".into(), &"u2".into(), "one").await.unwrap();
        fx.clock.advance(Duration::seconds(1));
        fx.pipeline.send(&"u1".into(), &"u2".into(), "two").await.unwrap();

        let recent = fx.store.documents(&CollectionPath::recent(&"u1".into()).unwrap());
        assert_eq!(recent.len(), 1);
        assert_eq!(summary(&fx.store, "u1", "u2").await.unwrap().text, "two");
        assert_eq!(texts(&fx.store, "u1", "u2").len(), 2);
    }

    #[tokio::test]
    async fn test_sender_only_summary() {
        let config = ClientConfig {
            mirror_recipient_summary: false,
            ..ClientConfig::default()
        };
        let fx = fixture(MemoryStore::new(), config).await;
        fx.pipeline.send(&"u1".into(), &"u2".into(), "hello").await.unwrap();

        assert_eq!(summary(&fx.store, "u1", "u2").await.unwrap().text, "hello");
        assert!(summary(&fx.store, "u2", "u1").await.is_none());
    }

    #[tokio::test]
    async fn test_atomic_failure_writes_nothing() {
        let store = MemoryStore::new();
        let fx = fixture(store, ClientConfig::default()).await;
        fx.store.deny_writes("messages/u2/").unwrap();

        let err = fx.pipeline.send(&"u1".into(), &"u2".into(), "hi").await.unwrap_err();
        assert!(matches!(err, SendError::Batch(StoreError::PermissionDenied(_))));
        assert!(texts(&fx.store, "u1", "u2").is_empty());
        assert!(summary(&fx.store, "u1", "u2").await.is_none());
    }

    #[tokio::test]
    async fn test_fallback_reports_background_failures() {
        let fx = fixture(MemoryStore::without_atomic_batches(), ClientConfig::default()).await;
        fx.store.deny_writes("messages/u2/").unwrap();

        let receipt = fx.pipeline.send(&"u1".into(), &"u2".into(), "hi").await.unwrap();
        // recipient mirror, sender summary, recipient summary
        assert_eq!(receipt.pending_writes(), 3);

        let failures = receipt.settle().await.unwrap_err();
        assert_eq!(failures.len(), 1);
        assert!(matches!(failures[0], SendError::RecipientMirror(_)));

        assert_eq!(texts(&fx.store, "u1", "u2"), vec!["hi"]);
        assert!(texts(&fx.store, "u2", "u1").is_empty());
        assert_eq!(summary(&fx.store, "u1", "u2").await.unwrap().text, "hi");
        assert_eq!(summary(&fx.store, "u2", "u1").await.unwrap().text, "hi");
    }

    #[tokio::test]
    async fn test_fallback_sender_failure_stops_everything() {
        let fx = fixture(MemoryStore::without_atomic_batches(), ClientConfig::default()).await;
        fx.store.deny_writes("messages/u1/").unwrap();

        let err = fx.pipeline.send(&"u1".into(), &"u2".into(), "hi").await.unwrap_err();
        assert!(matches!(err, SendError::SenderMirror(_)));
        assert!(texts(&fx.store, "u2", "u1").is_empty());
        assert!(summary(&fx.store, "u1", "u2").await.is_none());
    }

    #[tokio::test]
    async fn test_empty_participant_rejected() {
        let fx = fixture(MemoryStore::new(), ClientConfig::default()).await;
        let err = fx.pipeline.send(&"".into(), &"u2".into(), "hi").await.unwrap_err();
        assert!(matches!(err, SendError::EmptyParticipant));

        let ok = fx.pipeline.send(&"u1".into(), &"u2".into(), "").await;
        assert!(ok.is_ok());
    }
}
