use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use ridecal_common::Config;
use ridecal_ingest::{sources, Pipeline};
use ridecal_store::{EventStore, PgEventStore};

/// Ingest endurance-ride calendars into the event store.
#[derive(Parser)]
#[command(name = "ridecal-ingest")]
struct Cli {
    /// Source identifiers to ingest (e.g. "aerc"). Empty means every
    /// registered source.
    sources: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()))
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    info!("ridecal ingest starting...");
    let config = Config::from_env();
    config.log_redacted();

    let store = PgEventStore::connect(&config.database_url)
        .await
        .context("Failed to connect to event store")?;
    store.migrate().await.context("Failed to run migrations")?;
    let store: Arc<dyn EventStore> = Arc::new(store);

    let drivers = sources::resolve(&config, &cli.sources)
        .context("Failed to resolve source drivers")?;

    let mut failures = 0usize;
    for driver in drivers {
        let source = driver.source();
        let pipeline = Pipeline::new(config.clone(), driver, store.clone());
        match pipeline.run().await {
            Ok(metrics) => {
                info!(
                    %source,
                    added = metrics.added,
                    updated = metrics.updated,
                    "Source ingest complete"
                );
            }
            Err(e) => {
                error!(%source, error = %e, "Source ingest failed");
                failures += 1;
            }
        }
    }

    if failures > 0 {
        std::process::exit(1);
    }
    Ok(())
}
