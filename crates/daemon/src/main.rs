use std::sync::Arc;

use anyhow::Context;
use brapool_infra::{
    EngineConfig, InMemoryInventoryStore, InventoryEngine, InventoryStore, MaintenanceWorker, PostgresInventoryStore,
};
use brapool_observability::LogFormat;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let format = std::env::var("BRAPOOL_LOG_FORMAT")
        .ok()
        .and_then(|v| v.parse::<LogFormat>().ok())
        .unwrap_or_default();
    brapool_observability::init(format);

    let config = EngineConfig::from_env().context("invalid engine configuration")?;

    match std::env::var("DATABASE_URL") {
        Ok(url) => {
            let store = PostgresInventoryStore::connect(&url)
                .await
                .context("failed to connect to Postgres")?;
            store.ensure_schema().await.context("failed to prepare schema")?;
            tracing::info!("using Postgres inventory store");
            run(store, config).await
        }
        Err(_) => {
            tracing::warn!("DATABASE_URL not set; using in-memory inventory store");
            run(InMemoryInventoryStore::new(), config).await
        }
    }
}

async fn run<S>(store: S, config: EngineConfig) -> anyhow::Result<()>
where
    S: InventoryStore + 'static,
{
    let engine = Arc::new(InventoryEngine::new(store, config));

    // Catch up once at startup even when no schedule is configured.
    let report = engine
        .run_maintenance()
        .await
        .context("initial maintenance failed")?;
    tracing::info!(
        purged = report.purged,
        warned = report.sweep.warned.len(),
        "initial maintenance finished"
    );

    let worker = engine
        .config()
        .sweep_interval
        .map(|every| MaintenanceWorker::spawn(engine.clone(), every));
    if worker.is_none() {
        tracing::info!("no sweep interval configured; maintenance runs on log retrieval only");
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("shutting down");

    if let Some(worker) = worker {
        worker.shutdown().await;
    }
    Ok(())
}
