//! # courier-store
//!
//! Client-side view of the hosted document store the Courier chat client is
//! built on.
//!
//! The store itself is an external collaborator: this crate only describes the
//! capability set the client consumes ([`DocumentStore`]), the change events a
//! collection subscription yields, and the typed models persisted in it.
//! [`MemoryStore`] implements the same capability set in process so the
//! synchronizers can be exercised without a network.

pub mod document;
pub mod memory;
pub mod models;
pub mod store;
pub mod subscription;

mod error;

pub use document::{ChangeBatch, ChangeKind, Document, DocumentChange, Fields, WriteBatch};
pub use error::{DecodeError, Result, StoreError};
pub use memory::MemoryStore;
pub use models::*;
pub use store::DocumentStore;
pub use subscription::{ChangeStream, ListenerRegistration, Subscription};
