//! User profiles: the signed-in user, the people one can write to, and a
//! read-through cache used to fill summary display metadata.

use std::collections::HashMap;
use std::sync::Arc;

use courier_shared::{CollectionPath, DocumentPath, UserId};
use courier_store::{Document, DocumentStore, UserProfile};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::auth::AuthProvider;
use crate::error::ClientError;

pub struct UserDirectory {
    store: Arc<dyn DocumentStore>,
    auth: Arc<dyn AuthProvider>,
    cache: RwLock<HashMap<UserId, UserProfile>>,
}

impl UserDirectory {
    pub fn new(store: Arc<dyn DocumentStore>, auth: Arc<dyn AuthProvider>) -> Self {
        Self {
            store,
            auth,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Profile of the signed-in user.
    pub async fn current_user(&self) -> Result<UserProfile, ClientError> {
        let uid = self.auth.current_user_id().ok_or(ClientError::AuthState)?;
        self.profile(&uid)
            .await?
            .ok_or_else(|| ClientError::MissingDocument(format!("user {uid}")))
    }

    /// Profile of `uid`, served from the cache when possible.
    ///
    /// Cached entries live until [`list_users`](Self::list_users) reloads them
    /// or [`clear_cache`](Self::clear_cache) runs on sign-out.
    pub async fn profile(&self, uid: &UserId) -> Result<Option<UserProfile>, ClientError> {
        if let Some(profile) = self.cache.read().await.get(uid) {
            return Ok(Some(profile.clone()));
        }

        let path = DocumentPath::user(uid)?;
        let Some(fields) = self
            .store
            .get_document(&path)
            .await
            .map_err(|source| ClientError::StoreRead {
                what: "user profile",
                source,
            })?
        else {
            return Ok(None);
        };

        let profile = UserProfile::from_document(&Document::new(path, fields))?;
        self.cache.write().await.insert(uid.clone(), profile.clone());
        Ok(Some(profile))
    }

    /// Profile of `uid` for display, or a bare one when it cannot be read.
    pub async fn display_profile(&self, uid: &UserId) -> UserProfile {
        match self.profile(uid).await {
            Ok(Some(profile)) => profile,
            Ok(None) => {
                warn!(uid = %uid, "No profile found, using bare metadata");
                UserProfile::bare(uid.clone())
            }
            Err(e) => {
                warn!(uid = %uid, error = %e, "Failed to load profile, using bare metadata");
                UserProfile::bare(uid.clone())
            }
        }
    }

    /// Everyone except the signed-in user. Refreshes the cached profiles.
    pub async fn list_users(&self) -> Result<Vec<UserProfile>, ClientError> {
        let me = self.auth.current_user_id();
        let documents = self
            .store
            .get_all_documents(&CollectionPath::users())
            .await
            .map_err(|source| ClientError::StoreRead {
                what: "users",
                source,
            })?;

        let mut users = Vec::with_capacity(documents.len());
        let mut cache = self.cache.write().await;
        for doc in &documents {
            match UserProfile::from_document(doc) {
                Ok(profile) => {
                    cache.insert(profile.uid.clone(), profile.clone());
                    if Some(&profile.uid) != me.as_ref() {
                        users.push(profile);
                    }
                }
                Err(e) => warn!(error = %e, "Skipping undecodable user"),
            }
        }

        debug!(count = users.len(), "Listed users");
        Ok(users)
    }

    pub async fn clear_cache(&self) {
        self.cache.write().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticAuth;
    use courier_store::MemoryStore;

    async fn seed(store: &MemoryStore, uid: &str, email: &str) {
        let profile = UserProfile {
            uid: uid.into(),
            email: email.to_string(),
            profile_image_url: format!("https://img.example/{uid}.png"),
        };
        store
            .set_document(&DocumentPath::user(&uid.into()).unwrap(), profile.to_fields().unwrap())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_current_user_requires_sign_in() {
        let store = MemoryStore::new();
        let dir = UserDirectory::new(Arc::new(store), Arc::new(StaticAuth::new()));
        assert!(matches!(dir.current_user().await, Err(ClientError::AuthState)));
    }

    #[tokio::test]
    async fn test_current_user_missing_document() {
        let store = MemoryStore::new();
        let dir = UserDirectory::new(Arc::new(store), Arc::new(StaticAuth::signed_in("u1")));
        let err = dir.current_user().await.unwrap_err();
        assert!(matches!(err, ClientError::MissingDocument(_)));
        assert!(err.status().contains("u1"));
    }

    #[tokio::test]
    async fn test_list_users_excludes_self() {
        let store = MemoryStore::new();
        seed(&store, "u1", "a@example.com").await;
        seed(&store, "u2", "b@example.com").await;
        seed(&store, "u3", "c@example.com").await;

        let dir = UserDirectory::new(Arc::new(store), Arc::new(StaticAuth::signed_in("u1")));
        let users = dir.list_users().await.unwrap();
        let uids: Vec<_> = users.iter().map(|u| u.uid.as_str()).collect();
        assert_eq!(uids, vec!["u2", "u3"]);

        assert_eq!(dir.current_user().await.unwrap().email, "a@example.com");
    }

    #[tokio::test]
    async fn test_list_users_refreshes_cached_profile() {
        let store = MemoryStore::new();
        seed(&store, "u2", "old@example.com").await;
        let dir = UserDirectory::new(
            Arc::new(store.clone()),
            Arc::new(StaticAuth::signed_in("u1")),
        );
        assert_eq!(dir.display_profile(&"u2".into()).await.email, "old@example.com");

        seed(&store, "u2", "new@example.com").await;
        assert_eq!(dir.display_profile(&"u2".into()).await.email, "old@example.com");

        dir.list_users().await.unwrap();
        assert_eq!(dir.display_profile(&"u2".into()).await.email, "new@example.com");

        seed(&store, "u2", "newest@example.com").await;
        dir.clear_cache().await;
        assert_eq!(dir.display_profile(&"u2".into()).await.email, "newest@example.com");
    }

    #[tokio::test]
    async fn test_display_profile_falls_back_to_bare() {
        let store = MemoryStore::new();
        seed(&store, "u2", "b@example.com").await;
        let dir = UserDirectory::new(Arc::new(store), Arc::new(StaticAuth::signed_in("u1")));

        assert_eq!(dir.display_profile(&"u2".into()).await.email, "b@example.com");
        let ghost = dir.display_profile(&"ghost".into()).await;
        assert_eq!(ghost.uid, UserId::from("ghost"));
        assert!(ghost.email.is_empty());
    }
}
