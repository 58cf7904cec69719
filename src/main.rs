use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use backflow::cli;
use backflow::simulation;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse args and env vars
    let settings = cli::Cli::parse().into_settings();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "backflow=info".into());
    if settings.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    let report = simulation::run(&settings).await?;

    for peer in &report.peers {
        info!(
            peer = %peer.peer,
            capacity = peer.capacity,
            queued = peer.queued,
            dropped = peer.dropped,
            acknowledged = peer.acknowledged,
            final_rate = ?peer.final_rate,
            overloaded_windows = peer.overloaded_windows,
            "peer summary"
        );
    }
    if settings.report_json {
        println!("{}", report.to_json()?);
    }

    Ok(())
}
