use courier_shared::PathError;
use thiserror::Error;

/// Errors produced by the document store layer.
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    /// The store refused the read or write (security rules).
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The caller built an invalid path.
    #[error("Invalid path: {0}")]
    InvalidPath(#[from] PathError),

    /// A document did not have the expected shape.
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// A model could not be turned into document fields.
    #[error("Encode error: {0}")]
    Encode(String),

    /// A live subscription broke.
    #[error("Subscription error: {0}")]
    Subscription(String),

    /// The store could not be reached.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// A single document failed to decode into a model.
#[derive(Error, Debug, Clone)]
#[error("Malformed document {path}: {reason}")]
pub struct DecodeError {
    pub path: String,
    pub reason: String,
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
