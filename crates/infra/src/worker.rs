//! Periodic maintenance task.
//!
//! Runs the retention purge and staleness sweep on a fixed interval, in
//! addition to the lazy trigger on log retrieval.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use crate::engine::InventoryEngine;
use crate::store::InventoryStore;

/// Handle to stop and join a running [`MaintenanceWorker`].
#[derive(Debug)]
pub struct MaintenanceHandle {
    shutdown: oneshot::Sender<()>,
    join: JoinHandle<()>,
}

impl MaintenanceHandle {
    /// Request shutdown and wait for the current run to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        if let Err(err) = self.join.await {
            warn!(error = %err, "maintenance worker ended abnormally");
        }
    }
}

#[derive(Debug)]
pub struct MaintenanceWorker;

impl MaintenanceWorker {
    /// Spawn the worker on the current tokio runtime. The first run starts
    /// immediately.
    pub fn spawn<S>(engine: Arc<InventoryEngine<S>>, every: Duration) -> MaintenanceHandle
    where
        S: InventoryStore + 'static,
    {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let join = tokio::spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(interval_secs = every.as_secs(), "maintenance worker started");
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {
                        match engine.run_maintenance().await {
                            Ok(report) => debug!(
                                purged = report.purged,
                                warned = report.sweep.warned.len(),
                                "scheduled maintenance"
                            ),
                            Err(err) => warn!(error = %err, "scheduled maintenance failed"),
                        }
                    }
                }
            }
            info!("maintenance worker stopped");
        });

        MaintenanceHandle {
            shutdown: shutdown_tx,
            join,
        }
    }
}
