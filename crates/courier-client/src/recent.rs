//! Recent Conversations Synchronizer.
//!
//! Follows `recent_messages/{self}/messages` and keeps one summary per peer,
//! most recent first.

use std::sync::Arc;

use courier_shared::constants::FIELD_TIMESTAMP;
use courier_shared::{CollectionPath, UserId};
use courier_store::{
    ChangeBatch, ChangeKind, ChangeStream, ConversationSummary, DocumentStore,
    ListenerRegistration,
};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use crate::config::{ClientConfig, SummaryOrdering};
use crate::error::ClientError;
use crate::events::SummaryListUpdate;
use crate::snapshot::SnapshotCell;

/// One summary per peer, most recent first.
#[derive(Debug, Default)]
pub struct RecentList {
    summaries: Vec<ConversationSummary>,
}

impl RecentList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one delivery. Returns whether the list changed.
    ///
    /// Each changed summary replaces any entry for the same peer and moves
    /// to the front. With [`SummaryOrdering::Timestamp`] the list is then
    /// re-sorted by timestamp, newest first.
    pub fn apply(&mut self, batch: &ChangeBatch, ordering: SummaryOrdering) -> bool {
        let mut changed = false;

        for change in &batch.changes {
            let peer = UserId(change.document.id().0.clone());

            if change.kind == ChangeKind::Removed {
                changed |= self.remove(&peer);
                continue;
            }

            // An undecodable update leaves the previous entry in place.
            let summary = match ConversationSummary::from_document(&change.document) {
                Ok(summary) => summary,
                Err(e) => {
                    warn!(error = %e, "Skipping undecodable summary");
                    continue;
                }
            };

            self.remove(&peer);
            self.summaries.insert(0, summary);
            changed = true;
        }

        if changed && ordering == SummaryOrdering::Timestamp {
            self.summaries
                .sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        }
        changed
    }

    pub fn summaries(&self) -> &[ConversationSummary] {
        &self.summaries
    }

    pub fn get(&self, peer: &UserId) -> Option<&ConversationSummary> {
        self.summaries.iter().find(|s| &s.peer_id == peer)
    }

    pub fn len(&self) -> usize {
        self.summaries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.summaries.is_empty()
    }

    pub fn clear(&mut self) {
        self.summaries.clear();
    }

    fn remove(&mut self, peer: &UserId) -> bool {
        match self.summaries.iter().position(|s| &s.peer_id == peer) {
            Some(index) => {
                self.summaries.remove(index);
                true
            }
            None => false,
        }
    }
}

struct ActiveRecent {
    owner: UserId,
    registration: ListenerRegistration,
    task: JoinHandle<()>,
}

/// Owns at most one live recent-conversations subscription.
pub struct RecentSynchronizer {
    store: Arc<dyn DocumentStore>,
    buffer: usize,
    ordering: SummaryOrdering,
    snapshot: Arc<SnapshotCell<ConversationSummary>>,
    active: Option<ActiveRecent>,
}

impl RecentSynchronizer {
    pub fn new(store: Arc<dyn DocumentStore>, config: &ClientConfig) -> Self {
        Self {
            store,
            buffer: config.update_buffer,
            ordering: config.summary_ordering,
            snapshot: SnapshotCell::new(),
            active: None,
        }
    }

    /// Start following the recent conversations of `self_id`.
    ///
    /// Cancels any previous subscription and clears the list first. Every
    /// item of the returned stream is the full list after one delivery.
    pub async fn subscribe(
        &mut self,
        self_id: &UserId,
    ) -> Result<ReceiverStream<SummaryListUpdate>, ClientError> {
        self.unsubscribe();
        let generation = self.snapshot.reset();

        let collection = CollectionPath::recent(self_id)?;
        let subscription = self
            .store
            .subscribe_collection(&collection, FIELD_TIMESTAMP)
            .await
            .map_err(|e| ClientError::Subscription {
                what: "recent messages",
                reason: e.to_string(),
            })?;
        let (changes, registration) = subscription.into_parts();

        let (tx, rx) = mpsc::channel(self.buffer);
        let task = tokio::spawn(run_recent(
            collection.clone(),
            changes,
            self.ordering,
            tx,
            self.snapshot.clone(),
            generation,
        ));

        info!(collection = %collection, ordering = ?self.ordering, "Recent subscription started");
        self.active = Some(ActiveRecent {
            owner: self_id.clone(),
            registration,
            task,
        });

        Ok(ReceiverStream::new(rx))
    }

    /// Cancel the live subscription, if any, and clear the list.
    pub fn unsubscribe(&mut self) {
        if let Some(active) = self.active.take() {
            active.registration.remove();
            active.task.abort();
            debug!(owner = %active.owner, "Recent subscription cancelled");
        }
        self.snapshot.reset();
    }

    pub fn owner(&self) -> Option<&UserId> {
        self.active.as_ref().map(|active| &active.owner)
    }

    pub fn summaries(&self) -> Arc<Vec<ConversationSummary>> {
        self.snapshot.current()
    }

    pub fn watch(&self) -> watch::Receiver<Arc<Vec<ConversationSummary>>> {
        self.snapshot.watch()
    }
}

impl Drop for RecentSynchronizer {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            active.registration.remove();
            active.task.abort();
        }
    }
}

async fn run_recent(
    collection: CollectionPath,
    mut changes: ChangeStream,
    ordering: SummaryOrdering,
    tx: mpsc::Sender<SummaryListUpdate>,
    snapshot: Arc<SnapshotCell<ConversationSummary>>,
    generation: u64,
) {
    let mut list = RecentList::new();
    let mut first = true;

    while let Some(delivery) = changes.next_batch().await {
        let update = match delivery {
            Ok(batch) => {
                // The initial delivery is always published, even when empty.
                if !list.apply(&batch, ordering) && !first {
                    continue;
                }
                first = false;

                let summaries = Arc::new(list.summaries().to_vec());
                if !snapshot.publish(generation, summaries.clone()) {
                    debug!(collection = %collection, "Recent subscription superseded");
                    break;
                }
                debug!(collection = %collection, total = summaries.len(), "Recent list updated");
                SummaryListUpdate::Snapshot(summaries)
            }
            Err(e) => {
                warn!(collection = %collection, error = %e, "Recent subscription error");
                SummaryListUpdate::Error(format!("Failed to listen for recent messages: {e}"))
            }
        };

        if tx.send(update).await.is_err() {
            debug!(collection = %collection, "Recent consumer gone");
            return;
        }
    }

    debug!(collection = %collection, "Recent subscription ended");
}
