use courier_shared::PathError;
use courier_store::{DecodeError, StoreError};
use thiserror::Error;

use crate::auth::AuthError;
use crate::send::SendError;

/// Errors surfaced to the UI layer.
///
/// None of them are retried and none are fatal; the UI shows
/// [`status`](ClientError::status) and carries on.
#[derive(Error, Debug, Clone)]
pub enum ClientError {
    #[error("Failed to save {what}: {source}")]
    StoreWrite {
        what: &'static str,
        source: StoreError,
    },

    #[error("Failed to fetch {what}: {source}")]
    StoreRead {
        what: &'static str,
        source: StoreError,
    },

    #[error("Failed to decode document: {0}")]
    Decode(#[from] DecodeError),

    #[error("Failed to listen for {what}: {reason}")]
    Subscription { what: &'static str, reason: String },

    #[error("No user is signed in")]
    AuthState,

    #[error("Sender and recipient must both be set")]
    EmptyParticipant,

    #[error("No data found for {0}")]
    MissingDocument(String),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Invalid path: {0}")]
    InvalidPath(#[from] PathError),
}

impl ClientError {
    /// Human-readable status line for the UI.
    pub fn status(&self) -> String {
        self.to_string()
    }
}

impl From<SendError> for ClientError {
    fn from(e: SendError) -> Self {
        match e {
            SendError::SenderMirror(source)
            | SendError::RecipientMirror(source)
            | SendError::Batch(source) => Self::StoreWrite {
                what: "message",
                source,
            },
            SendError::RecentSummary(source) => Self::StoreWrite {
                what: "recent message",
                source,
            },
            SendError::InvalidParticipant(e) => Self::InvalidPath(e),
            SendError::EmptyParticipant => Self::EmptyParticipant,
            SendError::Background(reason) => Self::StoreWrite {
                what: "message",
                source: StoreError::Unavailable(reason),
            },
        }
    }
}
