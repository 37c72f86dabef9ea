//! The signed-in user's landing state: own profile and the recent
//! conversation list.

use std::sync::Arc;

use courier_store::{ConversationSummary, UserProfile};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};

use crate::auth::AuthProvider;
use crate::directory::UserDirectory;
use crate::error::ClientError;
use crate::events::SummaryListUpdate;
use crate::recent::RecentSynchronizer;

pub struct Inbox {
    auth: Arc<dyn AuthProvider>,
    directory: Arc<UserDirectory>,
    recent: RecentSynchronizer,
    profile: Option<UserProfile>,
    last_error: Option<String>,
}

impl Inbox {
    pub fn new(
        auth: Arc<dyn AuthProvider>,
        directory: Arc<UserDirectory>,
        recent: RecentSynchronizer,
    ) -> Self {
        Self {
            auth,
            directory,
            recent,
            profile: None,
            last_error: None,
        }
    }

    /// Load the current profile and start following recent conversations.
    ///
    /// A profile that cannot be loaded is recorded in
    /// [`last_error`](Self::last_error) but does not stop the subscription.
    pub async fn open(&mut self) -> Result<ReceiverStream<SummaryListUpdate>, ClientError> {
        let uid = self.auth.current_user_id().ok_or(ClientError::AuthState)?;

        match self.directory.current_user().await {
            Ok(profile) => self.profile = Some(profile),
            Err(e) => {
                warn!(uid = %uid, error = %e, "Failed to fetch current user");
                self.last_error = Some(e.status());
            }
        }

        let updates = self.recent.subscribe(&uid).await?;
        info!(uid = %uid, "Inbox opened");
        Ok(updates)
    }

    pub fn is_signed_out(&self) -> bool {
        self.auth.current_user_id().is_none()
    }

    pub fn current_user(&self) -> Option<&UserProfile> {
        self.profile.as_ref()
    }

    pub fn summaries(&self) -> Arc<Vec<ConversationSummary>> {
        self.recent.summaries()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Drop all per-user state, then sign out.
    pub async fn sign_out(&mut self) -> Result<(), ClientError> {
        self.recent.unsubscribe();
        self.profile = None;
        self.last_error = None;
        self.directory.clear_cache().await;
        self.auth.sign_out()?;
        Ok(())
    }
}
