//! Message Thread Synchronizer.
//!
//! Keeps the ordered message history between the signed-in user and one peer
//! by consuming a subscription on `messages/{self}/{peer}`. A spawned task
//! owns the local view; the owner only sees immutable snapshots.

use std::collections::HashSet;
use std::sync::Arc;

use courier_shared::constants::FIELD_TIMESTAMP;
use courier_shared::{CollectionPath, DocumentId, UserId};
use courier_store::{
    ChangeBatch, ChangeKind, ChangeStream, DocumentStore, ListenerRegistration, Message,
};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::events::ThreadUpdate;
use crate::snapshot::SnapshotCell;

// ---------------------------------------------------------------------------
// Local view
// ---------------------------------------------------------------------------

/// Ordered, deduplicated messages of one thread mirror.
#[derive(Debug, Default)]
pub struct ThreadView {
    messages: Vec<Message>,
    ids: HashSet<DocumentId>,
}

/// What one delivery did to a [`ThreadView`].
#[derive(Debug, Default)]
pub struct ThreadDelta {
    pub added: Vec<Message>,
    pub replaced: Vec<Message>,
}

impl ThreadDelta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.replaced.is_empty()
    }
}

impl ThreadView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one delivery.
    ///
    /// Additions whose id is already present are redeliveries and are
    /// dropped. Documents that fail to decode are logged and skipped.
    pub fn apply(&mut self, batch: &ChangeBatch) -> ThreadDelta {
        let mut delta = ThreadDelta::default();

        for change in &batch.changes {
            if change.kind == ChangeKind::Removed {
                debug!(path = %change.document.path, "Ignoring removed message");
                continue;
            }

            let message = match Message::from_document(&change.document) {
                Ok(message) => message,
                Err(e) => {
                    warn!(error = %e, "Skipping undecodable message");
                    continue;
                }
            };
            let id = change.document.id().clone();

            if self.ids.contains(&id) {
                if change.kind == ChangeKind::Modified {
                    self.replace(id, message.clone());
                    delta.replaced.push(message);
                } else {
                    debug!(id = %id, "Ignoring redelivered message");
                }
                continue;
            }

            self.insert_sorted(id, message.clone());
            delta.added.push(message);
        }

        delta
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.ids.clear();
    }

    // Equal timestamps keep arrival order.
    fn insert_sorted(&mut self, id: DocumentId, message: Message) {
        let at = self
            .messages
            .partition_point(|m| m.timestamp <= message.timestamp);
        self.messages.insert(at, message);
        self.ids.insert(id);
    }

    // Same timestamp keeps the slot; a new one repositions the message.
    fn replace(&mut self, id: DocumentId, message: Message) {
        let Some(at) = self.messages.iter().position(|m| m.id.as_ref() == Some(&id)) else {
            self.insert_sorted(id, message);
            return;
        };
        if self.messages[at].timestamp == message.timestamp {
            self.messages[at] = message;
            return;
        }
        self.messages.remove(at);
        self.insert_sorted(id, message);
    }
}

// ---------------------------------------------------------------------------
// Synchronizer
// ---------------------------------------------------------------------------

struct ActiveThread {
    peer: UserId,
    registration: ListenerRegistration,
    task: JoinHandle<()>,
}

/// Owns at most one live thread subscription.
pub struct ThreadSynchronizer {
    store: Arc<dyn DocumentStore>,
    buffer: usize,
    snapshot: Arc<SnapshotCell<Message>>,
    active: Option<ActiveThread>,
}

impl ThreadSynchronizer {
    pub fn new(store: Arc<dyn DocumentStore>, config: &ClientConfig) -> Self {
        Self {
            store,
            buffer: config.update_buffer,
            snapshot: SnapshotCell::new(),
            active: None,
        }
    }

    /// Start following the thread between `self_id` and `peer_id`.
    ///
    /// Any previous subscription is cancelled and the local view cleared
    /// first. The returned stream yields one [`ThreadUpdate::Added`] per new
    /// message in ascending timestamp order.
    pub async fn subscribe(
        &mut self,
        self_id: &UserId,
        peer_id: &UserId,
    ) -> Result<ReceiverStream<ThreadUpdate>, ClientError> {
        self.unsubscribe();
        let generation = self.snapshot.reset();

        let collection = CollectionPath::thread(self_id, peer_id)?;
        let subscription = self
            .store
            .subscribe_collection(&collection, FIELD_TIMESTAMP)
            .await
            .map_err(|e| ClientError::Subscription {
                what: "messages",
                reason: e.to_string(),
            })?;
        let (changes, registration) = subscription.into_parts();

        let (tx, rx) = mpsc::channel(self.buffer);
        let task = tokio::spawn(run_thread(
            collection.clone(),
            changes,
            tx,
            self.snapshot.clone(),
            generation,
        ));

        info!(collection = %collection, "Thread subscription started");
        self.active = Some(ActiveThread {
            peer: peer_id.clone(),
            registration,
            task,
        });

        Ok(ReceiverStream::new(rx))
    }

    /// Cancel the live subscription, if any, and clear the view.
    pub fn unsubscribe(&mut self) {
        if let Some(active) = self.active.take() {
            active.registration.remove();
            active.task.abort();
            debug!(peer = %active.peer, "Thread subscription cancelled");
        }
        self.snapshot.reset();
    }

    /// Peer of the live subscription.
    pub fn peer(&self) -> Option<&UserId> {
        self.active.as_ref().map(|active| &active.peer)
    }

    pub fn messages(&self) -> Arc<Vec<Message>> {
        self.snapshot.current()
    }

    pub fn watch(&self) -> watch::Receiver<Arc<Vec<Message>>> {
        self.snapshot.watch()
    }
}

impl Drop for ThreadSynchronizer {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            active.registration.remove();
            active.task.abort();
        }
    }
}

async fn run_thread(
    collection: CollectionPath,
    mut changes: ChangeStream,
    tx: mpsc::Sender<ThreadUpdate>,
    snapshot: Arc<SnapshotCell<Message>>,
    generation: u64,
) {
    let mut view = ThreadView::new();

    while let Some(delivery) = changes.next_batch().await {
        let batch = match delivery {
            Ok(batch) => batch,
            Err(e) => {
                warn!(collection = %collection, error = %e, "Thread subscription error");
                let status = format!("Failed to listen for messages: {e}");
                if tx.send(ThreadUpdate::Error(status)).await.is_err() {
                    break;
                }
                continue;
            }
        };

        let delta = view.apply(&batch);
        if delta.is_empty() {
            continue;
        }

        let messages = Arc::new(view.messages().to_vec());
        if !snapshot.publish(generation, messages.clone()) {
            debug!(collection = %collection, "Thread subscription superseded");
            break;
        }

        debug!(
            collection = %collection,
            added = delta.added.len(),
            total = messages.len(),
            "Thread updated"
        );

        let updates = delta
            .added
            .into_iter()
            .map(|message| ThreadUpdate::Added {
                message,
                messages: messages.clone(),
            })
            .chain(delta.replaced.into_iter().map(|message| ThreadUpdate::Replaced {
                message,
                messages: messages.clone(),
            }));
        for update in updates {
            if tx.send(update).await.is_err() {
                debug!(collection = %collection, "Thread consumer gone");
                return;
            }
        }
    }

    debug!(collection = %collection, "Thread subscription ended");
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use courier_store::{Document, DocumentChange, MemoryStore};
    use futures::StreamExt;

    fn t(secs: i64) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2021, 12, 16, 10, 0, 0).unwrap() + Duration::seconds(secs)
    }

    fn thread_path() -> CollectionPath {
        CollectionPath::thread(&UserId::from("u1"), &UserId::from("u2")).unwrap()
    }

    fn change(kind: ChangeKind, id: &str, text: &str, secs: i64) -> DocumentChange {
        let msg = Message::new("u1".into(), "u2".into(), text.into(), t(secs));
        let path = thread_path().doc(&DocumentId::from(id)).unwrap();
        DocumentChange {
            kind,
            document: Document::new(path, msg.to_fields().unwrap()),
        }
    }

    fn batch(changes: Vec<DocumentChange>) -> ChangeBatch {
        ChangeBatch {
            collection: thread_path(),
            changes,
        }
    }

    fn texts(view: &ThreadView) -> Vec<&str> {
        view.messages().iter().map(|m| m.text.as_str()).collect()
    }

    #[test]
    fn test_view_sorts_and_dedups() {
        let mut view = ThreadView::new();
        view.apply(&batch(vec![
            change(ChangeKind::Added, "c", "third", 3),
            change(ChangeKind::Added, "a", "first", 1),
        ]));
        let delta = view.apply(&batch(vec![
            change(ChangeKind::Added, "b", "second", 2),
            change(ChangeKind::Added, "a", "first", 1),
        ]));

        assert_eq!(delta.added.len(), 1);
        assert_eq!(texts(&view), vec!["first", "second", "third"]);
        assert_eq!(view.len(), 3);
    }

    #[test]
    fn test_view_skips_malformed_document() {
        let mut view = ThreadView::new();
        let mut bad = change(ChangeKind::Added, "bad", "x", 0);
        bad.document.fields.remove("fromId");

        let delta = view.apply(&batch(vec![bad, change(ChangeKind::Added, "ok", "fine", 1)]));
        assert_eq!(delta.added.len(), 1);
        assert_eq!(texts(&view), vec!["fine"]);
    }

    #[test]
    fn test_view_modified_replaces_in_place() {
        let mut view = ThreadView::new();
        view.apply(&batch(vec![
            change(ChangeKind::Added, "a", "one", 1),
            change(ChangeKind::Added, "b", "two", 2),
        ]));
        let delta = view.apply(&batch(vec![change(ChangeKind::Modified, "a", "uno", 1)]));

        assert_eq!(delta.replaced.len(), 1);
        assert!(delta.added.is_empty());
        assert_eq!(texts(&view), vec!["uno", "two"]);
    }

    #[test]
    fn test_view_modified_keeps_slot_among_equal_timestamps() {
        let mut view = ThreadView::new();
        view.apply(&batch(vec![
            change(ChangeKind::Added, "a", "first", 5),
            change(ChangeKind::Added, "b", "second", 5),
        ]));
        view.apply(&batch(vec![change(ChangeKind::Modified, "a", "first (edited)", 5)]));
        assert_eq!(texts(&view), vec!["first (edited)", "second"]);

        view.apply(&batch(vec![change(ChangeKind::Modified, "a", "moved", 9)]));
        assert_eq!(texts(&view), vec!["second", "moved"]);
    }

    #[test]
    fn test_view_equal_timestamps_keep_arrival_order() {
        let mut view = ThreadView::new();
        view.apply(&batch(vec![
            change(ChangeKind::Added, "z", "first", 5),
            change(ChangeKind::Added, "a", "second", 5),
        ]));
        assert_eq!(texts(&view), vec!["first", "second"]);
    }

    async fn write(store: &MemoryStore, owner: &str, peer: &str, id: &str, text: &str, secs: i64) {
        let msg = Message::new(owner.into(), peer.into(), text.into(), t(secs));
        let path = CollectionPath::thread(&owner.into(), &peer.into())
            .unwrap()
            .doc(&DocumentId::from(id))
            .unwrap();
        store.set_document(&path, msg.to_fields().unwrap()).await.unwrap();
    }

    #[tokio::test]
    async fn test_subscription_streams_history_then_live() {
        let store = MemoryStore::new();
        write(&store, "u1", "u2", "m2", "later", 2).await;
        write(&store, "u1", "u2", "m1", "earlier", 1).await;

        let mut sync = ThreadSynchronizer::new(Arc::new(store.clone()), &ClientConfig::default());
        let mut updates = sync.subscribe(&"u1".into(), &"u2".into()).await.unwrap();

        let mut seen = Vec::new();
        for _ in 0..2 {
            match updates.next().await.unwrap() {
                ThreadUpdate::Added { message, .. } => seen.push(message.text),
                other => panic!("unexpected update: {other:?}"),
            }
        }
        assert_eq!(seen, vec!["earlier", "later"]);

        write(&store, "u1", "u2", "m3", "live", 3).await;
        match updates.next().await.unwrap() {
            ThreadUpdate::Added { message, messages } => {
                assert_eq!(message.text, "live");
                assert_eq!(messages.len(), 3);
            }
            other => panic!("unexpected update: {other:?}"),
        }
        assert_eq!(sync.messages().len(), 3);
    }

    #[tokio::test]
    async fn test_resubscribe_drops_previous_peer() {
        let store = MemoryStore::new();
        write(&store, "u1", "u2", "a", "to u2", 1).await;
        write(&store, "u1", "u3", "b", "to u3", 2).await;

        let mut sync = ThreadSynchronizer::new(Arc::new(store.clone()), &ClientConfig::default());
        let mut first = sync.subscribe(&"u1".into(), &"u2".into()).await.unwrap();
        assert!(first.next().await.is_some());
        assert_eq!(sync.messages().len(), 1);

        let mut second = sync.subscribe(&"u1".into(), &"u3".into()).await.unwrap();
        let old_path = CollectionPath::thread(&"u1".into(), &"u2".into()).unwrap();
        assert_eq!(store.listener_count(&old_path), 0);
        assert!(first.next().await.is_none());

        match second.next().await.unwrap() {
            ThreadUpdate::Added { messages, .. } => {
                assert_eq!(messages.len(), 1);
                assert_eq!(messages[0].text, "to u3");
            }
            other => panic!("unexpected update: {other:?}"),
        }
        assert_eq!(sync.peer(), Some(&UserId::from("u3")));

        write(&store, "u1", "u2", "c", "late u2", 3).await;
        write(&store, "u1", "u3", "d", "late u3", 4).await;
        assert!(second.next().await.is_some());
        let texts: Vec<_> = sync.messages().iter().map(|m| m.text.clone()).collect();
        assert_eq!(texts, vec!["to u3", "late u3"]);
    }

    #[tokio::test]
    async fn test_unsubscribe_releases_listener() {
        let store = MemoryStore::new();
        let path = thread_path();
        let mut sync = ThreadSynchronizer::new(Arc::new(store.clone()), &ClientConfig::default());
        let _updates = sync.subscribe(&"u1".into(), &"u2".into()).await.unwrap();
        assert_eq!(store.listener_count(&path), 1);

        sync.unsubscribe();
        assert_eq!(store.listener_count(&path), 0);
        assert!(sync.messages().is_empty());
        assert!(sync.peer().is_none());
    }

    #[tokio::test]
    async fn test_store_error_is_reported() {
        let store = MemoryStore::new();
        let mut sync = ThreadSynchronizer::new(Arc::new(store.clone()), &ClientConfig::default());
        let mut updates = sync.subscribe(&"u1".into(), &"u2".into()).await.unwrap();

        store.break_subscriptions(&thread_path(), "permission denied").unwrap();
        match updates.next().await.unwrap() {
            ThreadUpdate::Error(status) => assert!(status.contains("permission denied")),
            other => panic!("unexpected update: {other:?}"),
        }
        assert!(updates.next().await.is_none());
    }
}
