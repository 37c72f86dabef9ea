//! Client state shared by every screen.
//!
//! [`Courier`] is built once from the injected store, auth and clock, and
//! hands out per-screen objects ([`Inbox`], [`ChatLog`]) that each own
//! their own subscription.

use std::sync::Arc;

use courier_shared::UserId;
use courier_store::{DocumentStore, UserProfile};
use tokio_stream::wrappers::ReceiverStream;

use crate::auth::AuthProvider;
use crate::chat_log::ChatLog;
use crate::clock::Clock;
use crate::config::ClientConfig;
use crate::directory::UserDirectory;
use crate::error::ClientError;
use crate::events::ThreadUpdate;
use crate::inbox::Inbox;
use crate::recent::RecentSynchronizer;
use crate::send::{SendPipeline, SendReceipt};
use crate::thread::ThreadSynchronizer;

pub struct Courier {
    store: Arc<dyn DocumentStore>,
    auth: Arc<dyn AuthProvider>,
    directory: Arc<UserDirectory>,
    pipeline: Arc<SendPipeline>,
    config: ClientConfig,
}

impl Courier {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        auth: Arc<dyn AuthProvider>,
        clock: Arc<dyn Clock>,
        config: ClientConfig,
    ) -> Self {
        let directory = Arc::new(UserDirectory::new(store.clone(), auth.clone()));
        let pipeline = Arc::new(SendPipeline::new(
            store.clone(),
            directory.clone(),
            clock,
            &config,
        ));
        Self {
            store,
            auth,
            directory,
            pipeline,
            config,
        }
    }

    pub fn inbox(&self) -> Inbox {
        Inbox::new(
            self.auth.clone(),
            self.directory.clone(),
            RecentSynchronizer::new(self.store.clone(), &self.config),
        )
    }

    /// Open the conversation with `peer` as the signed-in user.
    pub async fn open_chat(
        &self,
        peer: UserProfile,
    ) -> Result<(ChatLog, ReceiverStream<ThreadUpdate>), ClientError> {
        let self_id = self.auth.current_user_id().ok_or(ClientError::AuthState)?;
        ChatLog::open(
            self_id,
            peer,
            ThreadSynchronizer::new(self.store.clone(), &self.config),
            self.pipeline.clone(),
        )
        .await
    }

    /// Send `text` to `peer` as the signed-in user, outside any chat screen.
    pub async fn send(&self, peer: &UserId, text: &str) -> Result<SendReceipt, ClientError> {
        let self_id = self.auth.current_user_id().ok_or(ClientError::AuthState)?;
        Ok(self.pipeline.send(&self_id, peer, text).await?)
    }

    pub fn directory(&self) -> &Arc<UserDirectory> {
        &self.directory
    }

    pub fn pipeline(&self) -> &Arc<SendPipeline> {
        &self.pipeline
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}
