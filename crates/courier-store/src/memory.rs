//! In-process implementation of [`DocumentStore`].
//!
//! Holds collections in memory and fans every change out to the listeners of
//! the affected collection. It has no durability; it exists so the client can
//! run against a store with the same observable behaviour as the hosted one
//! (ordered initial snapshot, incremental batches, atomic batch commits), and
//! it can inject the failures the client has to survive.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use async_trait::async_trait;
use chrono::DateTime;
use courier_shared::{CollectionPath, DocumentId, DocumentPath};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::document::{ChangeBatch, ChangeKind, Document, Fields, WriteBatch};
use crate::error::{Result, StoreError};
use crate::store::DocumentStore;
use crate::subscription::{ListenerRegistration, Subscription};

struct Listener {
    id: u64,
    tx: mpsc::UnboundedSender<Result<ChangeBatch>>,
}

#[derive(Default)]
struct Inner {
    collections: HashMap<CollectionPath, BTreeMap<DocumentId, Fields>>,
    listeners: HashMap<CollectionPath, Vec<Listener>>,
    /// Path prefixes for which writes are refused.
    denied: Vec<String>,
    next_listener_id: u64,
}

/// Shared in-memory document store. Clones share the same data.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
    atomic_batches: bool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            atomic_batches: true,
        }
    }

    /// A store whose `commit` falls back to one-by-one writes.
    pub fn without_atomic_batches() -> Self {
        Self {
            atomic_batches: false,
            ..Self::new()
        }
    }

    /// Refuse every write whose path starts with `prefix`.
    pub fn deny_writes(&self, prefix: &str) -> Result<()> {
        self.lock()?.denied.push(prefix.to_string());
        Ok(())
    }

    /// Terminate every listener on `collection` with a subscription error.
    pub fn break_subscriptions(&self, collection: &CollectionPath, reason: &str) -> Result<()> {
        let mut inner = self.lock()?;
        if let Some(listeners) = inner.listeners.remove(collection) {
            warn!(
                collection = %collection,
                listeners = listeners.len(),
                reason,
                "Breaking subscriptions"
            );
            for listener in listeners {
                let _ = listener
                    .tx
                    .send(Err(StoreError::Subscription(reason.to_string())));
            }
        }
        Ok(())
    }

    /// Number of live listeners on `collection`.
    pub fn listener_count(&self, collection: &CollectionPath) -> usize {
        self.lock()
            .map(|inner| inner.listeners.get(collection).map_or(0, Vec::len))
            .unwrap_or(0)
    }

    /// Documents of `collection` in id order.
    pub fn documents(&self, collection: &CollectionPath) -> Vec<Document> {
        let Ok(inner) = self.lock() else {
            return Vec::new();
        };
        inner
            .collections
            .get(collection)
            .map(|docs| collect_documents(collection, docs))
            .unwrap_or_default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("Lock poisoned: {e}")))
    }
}

impl Inner {
    fn check_writable(&self, path: &DocumentPath) -> Result<()> {
        let rendered = path.to_string();
        if self.denied.iter().any(|prefix| rendered.starts_with(prefix)) {
            return Err(StoreError::PermissionDenied(rendered));
        }
        Ok(())
    }

    fn apply(&mut self, path: &DocumentPath, fields: Fields) -> (ChangeKind, Document) {
        let docs = self
            .collections
            .entry(path.collection().clone())
            .or_default();
        let kind = match docs.insert(path.id().clone(), fields.clone()) {
            Some(_) => ChangeKind::Modified,
            None => ChangeKind::Added,
        };
        (kind, Document::new(path.clone(), fields))
    }

    fn notify(&mut self, batch: ChangeBatch) {
        let Some(listeners) = self.listeners.get_mut(&batch.collection) else {
            return;
        };
        // Listeners whose receiver is gone are pruned here.
        listeners.retain(|listener| listener.tx.send(Ok(batch.clone())).is_ok());
    }
}

fn collect_documents(collection: &CollectionPath, docs: &BTreeMap<DocumentId, Fields>) -> Vec<Document> {
    docs.iter()
        .filter_map(|(id, fields)| {
            collection
                .doc(id)
                .ok()
                .map(|path| Document::new(path, fields.clone()))
        })
        .collect()
}

/// Order two values of an order-by field.
///
/// RFC 3339 strings compare as instants, numbers numerically, and documents
/// missing the field sort first.
fn compare_field(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => {
            match (DateTime::parse_from_rfc3339(x), DateTime::parse_from_rfc3339(y)) {
                (Ok(x), Ok(y)) => x.cmp(&y),
                _ => x.cmp(y),
            }
        }
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn set_document(&self, path: &DocumentPath, fields: Fields) -> Result<()> {
        let mut inner = self.lock()?;
        inner.check_writable(path)?;

        let (kind, document) = inner.apply(path, fields);
        debug!(path = %path, ?kind, "Document written");

        let mut batch = ChangeBatch::new(path.collection().clone());
        batch.push(kind, document);
        inner.notify(batch);
        Ok(())
    }

    async fn get_document(&self, path: &DocumentPath) -> Result<Option<Fields>> {
        let inner = self.lock()?;
        Ok(inner
            .collections
            .get(path.collection())
            .and_then(|docs| docs.get(path.id()))
            .cloned())
    }

    async fn get_all_documents(&self, collection: &CollectionPath) -> Result<Vec<Document>> {
        Ok(self.documents(collection))
    }

    async fn subscribe_collection(
        &self,
        collection: &CollectionPath,
        order_by: &str,
    ) -> Result<Subscription> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.lock()?;

        let mut initial = ChangeBatch::new(collection.clone());
        if let Some(docs) = inner.collections.get(collection) {
            let mut existing = collect_documents(collection, docs);
            existing.sort_by(|a, b| compare_field(a.fields.get(order_by), b.fields.get(order_by)));
            for document in existing {
                initial.push(ChangeKind::Added, document);
            }
        }
        // The receiver is alive, so the initial send cannot fail.
        let _ = tx.send(Ok(initial));

        let id = inner.next_listener_id;
        inner.next_listener_id += 1;
        inner
            .listeners
            .entry(collection.clone())
            .or_default()
            .push(Listener { id, tx });

        debug!(collection = %collection, listener = id, order_by, "Listener attached");

        let weak: Weak<Mutex<Inner>> = Arc::downgrade(&self.inner);
        let key = collection.clone();
        let registration = ListenerRegistration::new(move || {
            let Some(shared) = weak.upgrade() else {
                return;
            };
            let Ok(mut inner) = shared.lock() else {
                return;
            };
            if let Some(listeners) = inner.listeners.get_mut(&key) {
                listeners.retain(|listener| listener.id != id);
            }
            debug!(collection = %key, listener = id, "Listener removed");
        });

        Ok(Subscription::new(rx, registration))
    }

    fn supports_atomic_batches(&self) -> bool {
        self.atomic_batches
    }

    async fn commit(&self, batch: WriteBatch) -> Result<()> {
        if !self.atomic_batches {
            for (path, fields) in batch.into_writes() {
                self.set_document(&path, fields).await?;
            }
            return Ok(());
        }

        let mut inner = self.lock()?;
        for (path, _) in batch.writes() {
            inner.check_writable(path)?;
        }

        // One delivery per affected collection, in first-touched order.
        let mut batches: Vec<ChangeBatch> = Vec::new();
        for (path, fields) in batch.into_writes() {
            let (kind, document) = inner.apply(&path, fields);
            match batches
                .iter_mut()
                .find(|b| &b.collection == path.collection())
            {
                Some(existing) => existing.push(kind, document),
                None => {
                    let mut fresh = ChangeBatch::new(path.collection().clone());
                    fresh.push(kind, document);
                    batches.push(fresh);
                }
            }
        }

        debug!(collections = batches.len(), "Batch committed");
        for change_batch in batches {
            inner.notify(change_batch);
        }
        Ok(())
    }
}
