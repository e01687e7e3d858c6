use std::time::Duration;

use chrono::Utc;
use clap::Parser;
use sea_orm::Database;
use tracing::{error, info, warn};

use campus_core::config::Config;
use campus_core::tracing::init_tracing;
use campus_delivery::config::DeliveryConfig;
use campus_delivery::state::{AppState, http_client};

/// Drain the outbox outside the HTTP service.
#[derive(Parser, Debug)]
#[command(name = "campus-worker", version, about)]
struct Cli {
    /// Topic to drain. Repeat for several; defaults to every registered topic.
    #[arg(long = "topic")]
    topics: Vec<String>,

    /// Run a single pass over the topics and exit.
    #[arg(long)]
    once: bool,

    /// Events claimed per pass. Overrides `OUTBOX_BATCH_SIZE`.
    #[arg(long)]
    batch_size: Option<u32>,

    /// Sleep between passes that found nothing to do.
    #[arg(long, default_value_t = 5)]
    poll_interval_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut config = DeliveryConfig::try_from_env()?;
    if let Some(batch_size) = cli.batch_size {
        config.outbox_batch_size = batch_size;
    }

    let db = Database::connect(&config.database_url).await?;
    let http = http_client(&config)?;
    let state = AppState::new(db, http, config);

    let topics = if cli.topics.is_empty() {
        state.registry.topics().map(str::to_owned).collect()
    } else {
        cli.topics
    };
    for topic in &topics {
        if !state.registry.contains(topic) {
            warn!(topic = %topic, "no handler registered; claimed events will be dead-lettered");
        }
    }

    let worker = state.worker();
    if cli.once {
        for topic in &topics {
            match worker.run_once(topic, Utc::now()).await {
                Ok(outcomes) => info!(topic = %topic, claimed = outcomes.len(), "outbox pass finished"),
                Err(e) => {
                    error!(error = ?e, topic = %topic, "outbox pass failed");
                    return Err(e.into());
                }
            }
        }
        return Ok(());
    }

    info!(topics = ?topics, "campus worker started");
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = ?e, "failed to listen for shutdown signal");
        }
    };
    worker
        .run_forever(&topics, Duration::from_secs(cli.poll_interval_secs), shutdown)
        .await;
    Ok(())
}
