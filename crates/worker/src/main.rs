//! Periodic caller for the contract scheduler.
//!
//! Fires due contracts every `SCHEDULER_INTERVAL_SECS` until interrupted.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use tradeflow_infra::{
    ContractScheduler, ContractSchedulerRunner, EngineConfig, InMemoryStore, PostgresStore, Store,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tradeflow_observability::init();
    let config = EngineConfig::from_env();
    info!(
        interval_secs = config.scheduler_interval.as_secs(),
        log_format = %config.log_format,
        "worker starting"
    );

    if config.use_persistent_stores {
        let store = PostgresStore::connect(&config.database_url, config.max_connections)
            .await
            .context("connecting to Postgres")?;
        store.migrate().await.context("running migrations")?;
        info!(max_connections = config.max_connections, "using Postgres store");
        run(store, &config).await
    } else {
        info!("USE_PERSISTENT_STORES not set; using in-memory store");
        run(InMemoryStore::new(), &config).await
    }
}

async fn run<S: Store + 'static>(store: S, config: &EngineConfig) -> anyhow::Result<()> {
    let scheduler = Arc::new(ContractScheduler::new(store));
    let handle = ContractSchedulerRunner::new(config.scheduler_interval).spawn(scheduler);

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("shutdown requested");

    let stats = handle.stats();
    handle.shutdown().await;
    info!(
        passes = stats.passes,
        processed = stats.processed,
        failed = stats.failed,
        "worker stopped"
    );
    Ok(())
}
