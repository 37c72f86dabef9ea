//! # courier-client
//!
//! Realtime conversation synchronization for the Courier chat client.
//!
//! The hosted document store is injected as an `Arc<dyn DocumentStore>`; this
//! crate keeps ordered, deduplicated views of one message thread and of the
//! recent-conversation list, and writes new messages to both thread mirrors.
//! Views are published as immutable snapshots over tokio channels.

pub mod auth;
pub mod chat_log;
pub mod clock;
pub mod config;
pub mod directory;
pub mod error;
pub mod events;
pub mod inbox;
pub mod recent;
pub mod send;
pub mod state;
pub mod thread;

mod snapshot;

use tracing_subscriber::{fmt, EnvFilter};

pub use auth::{AuthError, AuthProvider, StaticAuth};
pub use chat_log::ChatLog;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ClientConfig, SummaryOrdering};
pub use directory::UserDirectory;
pub use error::ClientError;
pub use events::{SummaryListUpdate, ThreadUpdate};
pub use inbox::Inbox;
pub use recent::{RecentList, RecentSynchronizer};
pub use send::{SendError, SendPipeline, SendReceipt};
pub use state::Courier;
pub use thread::{ThreadSynchronizer, ThreadView};

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` wins over `default_directives`. Calling this twice is harmless.
pub fn init_tracing(default_directives: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}
