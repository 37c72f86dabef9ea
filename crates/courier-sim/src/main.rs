//! # courier-sim
//!
//! Runs a two-device conversation against the in-memory document store:
//! `u1` writes "hello" to `u2`, `u2` answers "hi back", and both devices log
//! their thread and recent-conversation views as the changes arrive.
//!
//! Client behaviour is configured through the `COURIER_*` environment
//! variables read by `ClientConfig::from_env`; log output honours `RUST_LOG`.

mod scenario;

use courier_client::ClientConfig;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    courier_client::init_tracing("info,courier_client=debug,courier_store=debug,courier_sim=debug");

    info!("Starting Courier simulator v{}", env!("CARGO_PKG_VERSION"));

    let config = ClientConfig::from_env();
    info!(?config, "Loaded configuration");

    let outcome = scenario::run(config).await?;

    for (owner, summaries) in &outcome.recent {
        for summary in summaries.iter() {
            info!(
                owner = %owner,
                peer = %summary.peer_id,
                text = %summary.text,
                timestamp = %summary.timestamp,
                "Recent conversation"
            );
        }
    }
    for message in outcome.thread.iter() {
        info!(from = %message.from_id, text = %message.text, "Thread message");
    }

    info!("Simulation finished");
    Ok(())
}
