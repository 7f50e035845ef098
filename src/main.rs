use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::broadcast;
use tracing::{info, warn};

use buildwatch::{ConnectorRegistry, Scheduler, SchedulerEvent};
use buildwatch_connectors::cruise::{self, CruiseFeedCache};
use buildwatch_connectors::{ping, Connector, ConnectorConfig};

#[derive(Parser, Debug)]
#[command(name = "buildwatch")]
#[command(about = "Watch CI build and health sources and print status changes")]
struct Args {
    /// Path to a JSON file with connector definitions
    #[arg(short, long, default_value = "connectors.json")]
    config: PathBuf,

    /// Stop after this many seconds (default: run until Ctrl-C)
    #[arg(long)]
    run_for: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let raw = std::fs::read_to_string(&args.config)
        .with_context(|| format!("failed to read {}", args.config.display()))?;
    let configs: Vec<ConnectorConfig> = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse {}", args.config.display()))?;

    let mut registry = ConnectorRegistry::new();
    registry.register(
        cruise::KIND,
        cruise::factory(Arc::new(CruiseFeedCache::new())),
    );
    registry.register(ping::KIND, ping::factory);

    let scheduler = Scheduler::new();
    for config in configs {
        let name = config.name.clone();
        let connector = registry
            .create(config)
            .with_context(|| format!("failed to create connector '{name}'"))?;
        scheduler.observe(connector);
    }

    let mut events = scheduler.subscribe();
    scheduler.start()?;
    info!(sources = scheduler.connectors().len(), "watching");

    let watch = async {
        loop {
            match events.recv().await {
                Ok(SchedulerEvent::StatusQueried(connector)) => print_status(&*connector),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event stream lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    };

    match args.run_for {
        Some(secs) => {
            tokio::select! {
                _ = watch => {}
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {}
                _ = tokio::signal::ctrl_c() => {}
            }
        }
        None => {
            tokio::select! {
                _ = watch => {}
                _ = tokio::signal::ctrl_c() => {}
            }
        }
    }

    scheduler.stop();
    Ok(())
}

fn print_status(connector: &dyn Connector) {
    let status = connector.current_status();
    println!(
        "{:4} {} {} {}",
        status.state.symbol(),
        status.time.format("%H:%M:%S"),
        connector.name(),
        status.detail.as_deref().unwrap_or("")
    );
}
