//! Client configuration.
//!
//! Every setting has a default; [`ClientConfig::from_env`] lets the host
//! binary override them. The library itself never reads the environment.

use std::str::FromStr;

use courier_shared::constants::DEFAULT_UPDATE_BUFFER;

/// How the recent-conversation list is kept most-recent-first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryOrdering {
    /// Move each changed summary to the front, trusting store delivery order.
    Arrival,
    /// Sort by timestamp descending after every delivery.
    Timestamp,
}

impl FromStr for SummaryOrdering {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "arrival" => Ok(Self::Arrival),
            "timestamp" => Ok(Self::Timestamp),
            other => Err(format!("unknown summary ordering: {other}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Commit both thread mirrors and the summaries in one atomic batch when
    /// the store supports it.
    /// Env: `COURIER_ATOMIC_SEND`
    /// Default: `true`
    pub atomic_send: bool,

    /// Also upsert the recipient's summary for the sender on every send.
    /// Env: `COURIER_MIRROR_RECIPIENT_SUMMARY`
    /// Default: `true` (`false` writes only the sender's summary)
    pub mirror_recipient_summary: bool,

    /// Env: `COURIER_SUMMARY_ORDER` (`timestamp` / `arrival`)
    /// Default: `timestamp`
    pub summary_ordering: SummaryOrdering,

    /// Capacity of the update channels handed to the UI layer.
    /// Env: `COURIER_UPDATE_BUFFER`
    /// Default: `256`
    pub update_buffer: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            atomic_send: true,
            mirror_recipient_summary: true,
            summary_ordering: SummaryOrdering::Timestamp,
            update_buffer: DEFAULT_UPDATE_BUFFER,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(val) = lookup("COURIER_ATOMIC_SEND") {
            config.atomic_send = parse_flag(&val);
        }

        if let Some(val) = lookup("COURIER_MIRROR_RECIPIENT_SUMMARY") {
            config.mirror_recipient_summary = parse_flag(&val);
        }

        if let Some(val) = lookup("COURIER_SUMMARY_ORDER") {
            match val.parse::<SummaryOrdering>() {
                Ok(ordering) => config.summary_ordering = ordering,
                Err(e) => {
                    tracing::warn!(value = %val, error = %e, "Invalid COURIER_SUMMARY_ORDER, using default");
                }
            }
        }

        if let Some(val) = lookup("COURIER_UPDATE_BUFFER") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.update_buffer = n,
                _ => {
                    tracing::warn!(value = %val, "Invalid COURIER_UPDATE_BUFFER, using default");
                }
            }
        }

        config
    }
}

fn parse_flag(val: &str) -> bool {
    val != "false" && val != "0"
}
