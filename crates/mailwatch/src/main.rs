//! `mailwatch` - Background mailbox monitor.
//!
//! Opens the account store, starts one monitoring unit per owner and runs
//! until interrupted.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

use std::path::PathBuf;

use anyhow::Context as _;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mailwatch_core::{
    AccountStore, LoggingNotifier, MASTER_SECRET_ENV, PollingEngine, SystemClock,
    TlsSessionFactory,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mailwatch=debug,mailwatch_core=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting mailwatch");

    if std::env::var(MASTER_SECRET_ENV).is_err() {
        warn!("{MASTER_SECRET_ENV} is not set, credentials use a machine-local key");
    }

    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mailwatch");
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("create data directory {}", data_dir.display()))?;
    let store_path = data_dir.join("accounts.json");

    let (store, report) = AccountStore::open(&store_path)
        .with_context(|| format!("open account store at {}", store_path.display()))?;
    if report.failed > 0 {
        warn!(
            recovered = report.recovered,
            failed = report.failed,
            "some stored accounts could not be loaded"
        );
    } else {
        info!(recovered = report.recovered, "account store loaded");
    }

    let engine = PollingEngine::new(
        store.clone(),
        TlsSessionFactory,
        LoggingNotifier,
        SystemClock,
    );

    let owners = store.owners().await;
    if owners.is_empty() {
        info!(
            "no accounts configured, add some to {} and restart",
            store_path.display()
        );
    }
    for owner in owners {
        engine.start(owner).await;
    }

    tokio::signal::ctrl_c()
        .await
        .context("listen for shutdown signal")?;
    info!("shutdown requested");
    engine.stop_all().await;
    info!("all monitoring stopped");

    Ok(())
}
