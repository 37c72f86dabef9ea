//! Auth collaborator: who is signed in, and signing out.

use std::sync::RwLock;

use courier_shared::UserId;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug, Clone)]
pub enum AuthError {
    #[error("Failed to sign out: {0}")]
    SignOut(String),
}

/// Capability set consumed from the hosted auth service.
pub trait AuthProvider: Send + Sync + 'static {
    fn current_user_id(&self) -> Option<UserId>;

    fn sign_out(&self) -> Result<(), AuthError>;
}

/// In-process auth state, for the simulator and tests.
#[derive(Debug, Default)]
pub struct StaticAuth {
    current: RwLock<Option<UserId>>,
}

impl StaticAuth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signed_in(uid: impl Into<UserId>) -> Self {
        Self {
            current: RwLock::new(Some(uid.into())),
        }
    }

    pub fn sign_in(&self, uid: impl Into<UserId>) {
        let uid = uid.into();
        info!(uid = %uid, "Signed in");
        if let Ok(mut current) = self.current.write() {
            *current = Some(uid);
        }
    }
}

impl AuthProvider for StaticAuth {
    fn current_user_id(&self) -> Option<UserId> {
        self.current.read().ok().and_then(|current| current.clone())
    }

    fn sign_out(&self) -> Result<(), AuthError> {
        let mut current = self
            .current
            .write()
            .map_err(|e| AuthError::SignOut(format!("Lock poisoned: {e}")))?;
        if let Some(uid) = current.take() {
            info!(uid = %uid, "Signed out");
        }
        Ok(())
    }
}
