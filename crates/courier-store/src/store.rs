use async_trait::async_trait;
use courier_shared::{CollectionPath, DocumentId, DocumentPath};

use crate::document::{Document, Fields, WriteBatch};
use crate::error::Result;
use crate::subscription::Subscription;

/// Capability set consumed from the hosted document store.
///
/// Implementations are shared behind an `Arc` by the synchronizers and the
/// send pipeline, so every method takes `&self`.
#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    /// Overwrite (or create) the document at `path`.
    async fn set_document(&self, path: &DocumentPath, fields: Fields) -> Result<()>;

    async fn get_document(&self, path: &DocumentPath) -> Result<Option<Fields>>;

    async fn get_all_documents(&self, collection: &CollectionPath) -> Result<Vec<Document>>;

    /// Listen to every change in `collection`.
    ///
    /// The first batch holds the current contents ordered by `order_by`;
    /// later batches hold incremental changes in the order they were applied.
    async fn subscribe_collection(
        &self,
        collection: &CollectionPath,
        order_by: &str,
    ) -> Result<Subscription>;

    /// Allocate an id for a new document in `collection`.
    fn new_document_id(&self, _collection: &CollectionPath) -> DocumentId {
        DocumentId::generate()
    }

    /// Whether [`commit`](Self::commit) applies a batch atomically.
    fn supports_atomic_batches(&self) -> bool {
        false
    }

    /// Apply every write in `batch`.
    ///
    /// The default applies the writes one by one and stops at the first
    /// failure, leaving earlier writes in place.
    async fn commit(&self, batch: WriteBatch) -> Result<()> {
        for (path, fields) in batch.into_writes() {
            self.set_document(&path, fields).await?;
        }
        Ok(())
    }
}
