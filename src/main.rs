//! rca-linux-agent: one-shot host health collection with root-cause hints.
//!
//! Configuration comes from `RCA_*` environment variables. The JSON report is
//! written to stdout and logs go to stderr.

use anyhow::{Context, Result};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use rca_linux_agent::{AgentConfig, RcaAgent};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = AgentConfig::from_env().context("Failed to read agent configuration")?;
    match &config.remote {
        Some(remote) => info!(target_host = %remote.label(), "Collecting from remote host"),
        None => info!("Collecting from local host"),
    }

    let agent = RcaAgent::new(config);
    let event = match agent.run(Uuid::new_v4()).await {
        Ok(event) => event,
        Err(e) => {
            error!(error = %format!("{:#}", e), "Collection failed");
            return Err(e);
        }
    };

    println!("{}", event.text);
    Ok(())
}
