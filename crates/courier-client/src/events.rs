//! Updates emitted by the synchronizers.

use std::sync::Arc;

use courier_store::{ConversationSummary, Message};

/// One item of a thread subscription.
#[derive(Debug, Clone)]
pub enum ThreadUpdate {
    /// A message not seen before, with the ordered thread after the delivery
    /// that carried it.
    Added {
        message: Message,
        messages: Arc<Vec<Message>>,
    },
    /// A known message was rewritten by the store.
    Replaced {
        message: Message,
        messages: Arc<Vec<Message>>,
    },
    /// Non-fatal failure; the text is meant for display.
    Error(String),
}

/// One item of a recent-conversations subscription.
#[derive(Debug, Clone)]
pub enum SummaryListUpdate {
    /// Full list, most recent first.
    Snapshot(Arc<Vec<ConversationSummary>>),
    /// Non-fatal failure; the text is meant for display.
    Error(String),
}

impl SummaryListUpdate {
    pub fn summaries(&self) -> Option<&Arc<Vec<ConversationSummary>>> {
        match self {
            Self::Snapshot(summaries) => Some(summaries),
            Self::Error(_) => None,
        }
    }
}
