//! Logical path layout of the external document store.
//!
//! ```text
//! users/{uid}                                 user profile
//! messages/{uid}/{peerUid}/{messageId}        one mirror of a thread
//! recent_messages/{uid}/messages/{peerUid}    recent-conversation summary
//! ```
//!
//! A collection path has an odd number of segments and a document path an
//! even number; both are built here so callers never format raw strings.

use serde::{Deserialize, Serialize};

use crate::constants::{MESSAGES, RECENT_MESSAGES, USERS};
use crate::error::PathError;
use crate::types::{DocumentId, UserId};

/// Path of a collection, e.g. `messages/u1/u2`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CollectionPath {
    segments: Vec<String>,
}

/// Path of a single document: its parent collection plus the document id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentPath {
    collection: CollectionPath,
    id: DocumentId,
}

fn check_segment(segment: &str) -> Result<(), PathError> {
    if segment.is_empty() {
        return Err(PathError::EmptySegment);
    }
    if segment.contains('/') {
        return Err(PathError::SlashInSegment(segment.to_string()));
    }
    Ok(())
}

impl CollectionPath {
    /// Address a document inside this collection.
    pub fn doc(&self, id: &DocumentId) -> Result<DocumentPath, PathError> {
        check_segment(id.as_str())?;
        Ok(DocumentPath {
            collection: self.clone(),
            id: id.clone(),
        })
    }

    /// `users`
    pub fn users() -> Self {
        Self {
            segments: vec![USERS.to_string()],
        }
    }

    /// `messages/{owner}/{peer}`: the owner's mirror of the thread with `peer`.
    pub fn thread(owner: &UserId, peer: &UserId) -> Result<Self, PathError> {
        check_segment(owner.as_str())?;
        check_segment(peer.as_str())?;
        Ok(Self {
            segments: vec![MESSAGES.to_string(), owner.0.clone(), peer.0.clone()],
        })
    }

    /// `recent_messages/{owner}/messages`
    pub fn recent(owner: &UserId) -> Result<Self, PathError> {
        check_segment(owner.as_str())?;
        Ok(Self {
            segments: vec![
                RECENT_MESSAGES.to_string(),
                owner.0.clone(),
                MESSAGES.to_string(),
            ],
        })
    }
}

impl DocumentPath {
    /// `users/{uid}`
    pub fn user(uid: &UserId) -> Result<Self, PathError> {
        CollectionPath::users().doc(&DocumentId::from(uid))
    }

    /// `recent_messages/{owner}/messages/{peer}`
    pub fn recent(owner: &UserId, peer: &UserId) -> Result<Self, PathError> {
        CollectionPath::recent(owner)?.doc(&DocumentId::from(peer))
    }

    pub fn collection(&self) -> &CollectionPath {
        &self.collection
    }

    pub fn id(&self) -> &DocumentId {
        &self.id
    }
}

impl std::fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.segments.join("/"))
    }
}

impl std::fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}
