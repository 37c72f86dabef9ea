//! Identifiers, store path layout and field names shared by every Courier crate.

pub mod constants;
pub mod error;
pub mod paths;
pub mod types;

pub use error::PathError;
pub use paths::{CollectionPath, DocumentPath};
pub use types::{DocumentId, UserId};
