//! Domain models stored as documents in the external store.
//!
//! Every struct derives `Serialize` and `Deserialize` with camelCase keys so
//! the documents keep the field names the existing store schema uses
//! (`fromId`, `toId`, `profileImageUrl`, ...).

use chrono::{DateTime, Utc};
use courier_shared::{DocumentId, UserId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::{Document, Fields};
use crate::error::{DecodeError, Result, StoreError};

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A single chat message, stored once under each participant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Store-assigned document id; `None` until the message is persisted.
    /// Not part of the document body.
    #[serde(skip)]
    pub id: Option<DocumentId>,
    pub from_id: UserId,
    pub to_id: UserId,
    /// UTF-8 body. Only empty before a send.
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(from_id: UserId, to_id: UserId, text: String, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: None,
            from_id,
            to_id,
            text,
            timestamp,
        }
    }

    pub fn to_fields(&self) -> Result<Fields> {
        encode(self)
    }

    pub fn from_document(doc: &Document) -> std::result::Result<Self, DecodeError> {
        let mut message: Self = decode(doc)?;
        message.id = Some(doc.id().clone());
        Ok(message)
    }
}

// ---------------------------------------------------------------------------
// Recent conversation summary
// ---------------------------------------------------------------------------

/// Latest-message snapshot for one peer, shown in the conversation list.
///
/// Stored at `recent_messages/{owner}/messages/{peer}`, so the document id is
/// the peer's uid.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    #[serde(skip)]
    pub peer_id: UserId,
    pub text: String,
    pub from_id: UserId,
    pub to_id: UserId,
    pub timestamp: DateTime<Utc>,
    /// Display metadata of the peer.
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub profile_image_url: String,
}

impl ConversationSummary {
    /// Summary of `message` as seen by the participant talking to `peer`.
    pub fn for_peer(message: &Message, peer: &UserProfile) -> Self {
        Self {
            peer_id: peer.uid.clone(),
            text: message.text.clone(),
            from_id: message.from_id.clone(),
            to_id: message.to_id.clone(),
            timestamp: message.timestamp,
            email: peer.email.clone(),
            profile_image_url: peer.profile_image_url.clone(),
        }
    }

    pub fn to_fields(&self) -> Result<Fields> {
        encode(self)
    }

    pub fn from_document(doc: &Document) -> std::result::Result<Self, DecodeError> {
        let mut summary: Self = decode(doc)?;
        summary.peer_id = UserId(doc.id().0.clone());
        Ok(summary)
    }
}

// ---------------------------------------------------------------------------
// User profile
// ---------------------------------------------------------------------------

/// Public profile of a user, owned by the auth/profile side of the store.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default)]
    pub uid: UserId,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub profile_image_url: String,
}

impl UserProfile {
    /// Profile with no display metadata, used when the real one is unreadable.
    pub fn bare(uid: UserId) -> Self {
        Self {
            uid,
            ..Self::default()
        }
    }

    pub fn to_fields(&self) -> Result<Fields> {
        encode(self)
    }

    pub fn from_document(doc: &Document) -> std::result::Result<Self, DecodeError> {
        let mut profile: Self = decode(doc)?;
        if profile.uid.is_empty() {
            profile.uid = UserId(doc.id().0.clone());
        }
        Ok(profile)
    }
}

// ---------------------------------------------------------------------------
// Codec helpers
// ---------------------------------------------------------------------------

fn encode<T: Serialize>(value: &T) -> Result<Fields> {
    match serde_json::to_value(value) {
        Ok(Value::Object(fields)) => Ok(fields),
        Ok(other) => Err(StoreError::Encode(format!(
            "expected an object, got {other}"
        ))),
        Err(e) => Err(StoreError::Encode(e.to_string())),
    }
}

fn decode<T: DeserializeOwned>(doc: &Document) -> std::result::Result<T, DecodeError> {
    serde_json::from_value(Value::Object(doc.fields.clone())).map_err(|e| DecodeError {
        path: doc.path.to_string(),
        reason: e.to_string(),
    })
}
