//! Raw documents, change events and batched writes.

use courier_shared::{CollectionPath, DocumentId, DocumentPath};
use serde_json::Value;

/// JSON-like field map of a single document.
pub type Fields = serde_json::Map<String, Value>;

/// A document as read from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub path: DocumentPath,
    pub fields: Fields,
}

impl Document {
    pub fn new(path: DocumentPath, fields: Fields) -> Self {
        Self { path, fields }
    }

    pub fn id(&self) -> &DocumentId {
        self.path.id()
    }
}

/// What happened to a document in a subscribed collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentChange {
    pub kind: ChangeKind,
    pub document: Document,
}

/// One delivery from a collection subscription.
///
/// Changes are listed in the order the store applied them; the first batch
/// of a subscription lists the current contents as `Added`, ordered by the
/// subscription's order-by field.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeBatch {
    pub collection: CollectionPath,
    pub changes: Vec<DocumentChange>,
}

impl ChangeBatch {
    pub fn new(collection: CollectionPath) -> Self {
        Self {
            collection,
            changes: Vec::new(),
        }
    }

    pub fn push(&mut self, kind: ChangeKind, document: Document) {
        self.changes.push(DocumentChange { kind, document });
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }
}

/// A set of document writes meant to be committed together.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    writes: Vec<(DocumentPath, Fields)>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a full overwrite of `path`.
    pub fn set(&mut self, path: DocumentPath, fields: Fields) -> &mut Self {
        self.writes.push((path, fields));
        self
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn writes(&self) -> &[(DocumentPath, Fields)] {
        &self.writes
    }

    pub fn into_writes(self) -> Vec<(DocumentPath, Fields)> {
        self.writes
    }
}
