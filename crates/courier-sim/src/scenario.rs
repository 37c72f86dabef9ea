use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use courier_client::{
    ChatLog, ClientConfig, Courier, StaticAuth, SummaryListUpdate, SystemClock, ThreadUpdate,
};
use courier_shared::{DocumentPath, UserId};
use courier_store::{ConversationSummary, DocumentStore, MemoryStore, Message, UserProfile};
use futures::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

const WAIT: Duration = Duration::from_secs(5);

const USERS: [(&str, &str); 2] = [("u1", "alice@example.com"), ("u2", "bob@example.com")];

/// What each device ended up showing.
pub struct Outcome {
    pub recent: Vec<(UserId, Arc<Vec<ConversationSummary>>)>,
    /// `u1`'s view of the thread with `u2`.
    pub thread: Arc<Vec<Message>>,
}

pub async fn run(config: ClientConfig) -> anyhow::Result<Outcome> {
    let store = MemoryStore::new();
    seed_users(&store).await?;

    let alice = device(&store, "u1", &config);
    let bob = device(&store, "u2", &config);

    let mut alice_inbox = alice.inbox();
    let mut alice_recent = alice_inbox.open().await?;
    wait_for_list(&mut alice_recent).await?;

    let bob_profile = alice
        .directory()
        .profile(&"u2".into())
        .await?
        .context("u2 has no profile")?;
    let (mut alice_chat, mut alice_thread) = alice.open_chat(bob_profile).await?;

    alice_chat.set_draft("hello");
    let receipt = alice_chat.send_draft().await?;
    settle(receipt).await;
    wait_for_added(&mut alice_chat, &mut alice_thread, "hello").await?;
    wait_for_list(&mut alice_recent).await?;

    let alice_profile = bob
        .directory()
        .profile(&"u1".into())
        .await?
        .context("u1 has no profile")?;
    let (mut bob_chat, _bob_thread) = bob.open_chat(alice_profile).await?;

    bob_chat.set_draft("hi back");
    let receipt = bob_chat.send_draft().await?;
    settle(receipt).await;
    wait_for_added(&mut alice_chat, &mut alice_thread, "hi back").await?;

    if config.mirror_recipient_summary {
        wait_for_list(&mut alice_recent).await?;
    }

    let mut bob_inbox = bob.inbox();
    let mut bob_recent = bob_inbox.open().await?;
    wait_for_list(&mut bob_recent).await?;

    let outcome = Outcome {
        recent: vec![
            ("u1".into(), alice_inbox.summaries()),
            ("u2".into(), bob_inbox.summaries()),
        ],
        thread: alice_chat.messages(),
    };

    alice_chat.close();
    bob_chat.close();
    alice_inbox.sign_out().await?;
    bob_inbox.sign_out().await?;

    Ok(outcome)
}

fn device(store: &MemoryStore, uid: &str, config: &ClientConfig) -> Courier {
    Courier::new(
        Arc::new(store.clone()),
        Arc::new(StaticAuth::signed_in(uid)),
        Arc::new(SystemClock),
        config.clone(),
    )
}

async fn seed_users(store: &MemoryStore) -> anyhow::Result<()> {
    for (uid, email) in USERS {
        let profile = UserProfile {
            uid: uid.into(),
            email: email.to_string(),
            profile_image_url: String::new(),
        };
        store
            .set_document(&DocumentPath::user(&profile.uid)?, profile.to_fields()?)
            .await?;
        debug!(uid, "Seeded user");
    }
    Ok(())
}

async fn settle(receipt: courier_client::SendReceipt) {
    if let Err(failures) = receipt.settle().await {
        for e in failures {
            warn!(error = %e, "Background write failed");
        }
    }
}

async fn wait_for_list(updates: &mut ReceiverStream<SummaryListUpdate>) -> anyhow::Result<()> {
    match tokio::time::timeout(WAIT, updates.next()).await {
        Ok(Some(SummaryListUpdate::Snapshot(list))) => {
            info!(entries = list.len(), "Recent list updated");
            Ok(())
        }
        Ok(Some(SummaryListUpdate::Error(status))) => bail!("recent list failed: {status}"),
        Ok(None) => bail!("recent list stream closed"),
        Err(_) => bail!("timed out waiting for the recent list"),
    }
}

async fn wait_for_added(
    chat: &mut ChatLog,
    updates: &mut ReceiverStream<ThreadUpdate>,
    text: &str,
) -> anyhow::Result<()> {
    loop {
        let update = match tokio::time::timeout(WAIT, updates.next()).await {
            Ok(Some(update)) => update,
            Ok(None) => bail!("thread stream closed"),
            Err(_) => bail!("timed out waiting for {text:?}"),
        };
        chat.note_update(&update);

        match update {
            ThreadUpdate::Added { message, messages } => {
                info!(text = %message.text, total = messages.len(), "Thread message arrived");
                if message.text == text {
                    return Ok(());
                }
            }
            ThreadUpdate::Replaced { message, .. } => {
                debug!(text = %message.text, "Thread message replaced");
            }
            ThreadUpdate::Error(_) => {
                bail!("thread failed: {}", chat.last_error().unwrap_or_default());
            }
        }
    }
}
