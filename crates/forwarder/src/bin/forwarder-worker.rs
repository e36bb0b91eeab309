//! forwarder-worker: drains the change-log queue into the analytics stream.
//!
//! Long-polls SQS for change-log batches, classifies and enriches each
//! record, ships the result to Firehose and acks the message once the batch
//! is forwarded.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};

use vigil_core::config::{self, Config};
use vigil_core::SystemClock;
use vigil_forwarder::{
    process_once, BatchSender, FirehoseSink, Forwarder, HttpIntegrationDirectory, LabelCache,
    SqsChangeSource,
};

// ── CLI ─────────────────────────────────────────────────────────────

/// Change-capture forwarder worker.
#[derive(Parser, Debug)]
#[command(name = "forwarder-worker", version, about)]
struct Cli {
    /// Config profile (prefix for profiled environment variables).
    #[arg(long, env = "VIGIL_PROFILE")]
    profile: Option<String>,

    /// Messages requested per poll (SQS caps this at 10).
    #[arg(long, env = "FORWARDER_MAX_MESSAGES", default_value_t = 10)]
    max_messages: u32,

    /// Pause after a failed poll, in seconds.
    #[arg(long, env = "FORWARDER_ERROR_BACKOFF", default_value_t = 5)]
    error_backoff: u64,
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    config::load_dotenv();
    let cli = Cli::parse();

    let config = match &cli.profile {
        Some(profile) => Config::for_profile(profile),
        None => Config::from_env(),
    };
    config.log_summary();

    let stream_name = config
        .forwarder
        .stream_name
        .clone()
        .ok_or_else(|| anyhow::anyhow!("FIREHOSE_STREAM is not set"))?;

    let source = SqsChangeSource::new(&config.aws, &config.queue).await?;
    let sink = Arc::new(FirehoseSink::new(&config.aws, stream_name).await);
    let labels = Arc::new(LabelCache::from_config(
        Arc::new(HttpIntegrationDirectory::new(&config.directory)),
        Arc::new(SystemClock),
        &config.cache,
    ));
    let forwarder = Forwarder::new(labels, BatchSender::from_config(sink, &config.forwarder));

    info!("forwarder-worker starting");
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                break;
            }
            round = process_once(&source, &forwarder, cli.max_messages) => match round {
                Ok(summary) if summary.messages > 0 => info!(
                    messages = summary.messages,
                    acked = summary.acked,
                    nacked = summary.nacked,
                    delivered = summary.delivered,
                    undeliverable = summary.undeliverable,
                    "poll round complete"
                ),
                Ok(_) => {}
                Err(e) => {
                    error!(error = %e, "poll failed");
                    tokio::time::sleep(Duration::from_secs(cli.error_backoff)).await;
                }
            }
        }
    }

    info!("forwarder-worker exited cleanly");
    Ok(())
}
