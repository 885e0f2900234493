//! Staleness sweep and log retention.
//!
//! Both run as a side effect of log retrieval and from the optional
//! [`MaintenanceWorker`](crate::worker::MaintenanceWorker). Neither touches
//! inventory rows.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, info};

use brapool_core::SystemId;
use brapool_inventory::{AuditLogEntry, InventoryItem};

use crate::notify::{Notifier, RecipientDirectory, dispatch_to_all};
use crate::store::{InventoryStore, StoreError};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Items that received their first staleness warning in this sweep.
    pub warned: Vec<SystemId>,
    /// Background deliveries started; their outcome is only logged.
    pub notifications_dispatched: usize,
}

/// Finds circulating items past the staleness threshold and warns once per
/// item.
#[derive(Debug, Clone)]
pub struct StalenessSweeper {
    stale_after: TimeDelta,
    notify_timeout: Duration,
}

impl StalenessSweeper {
    pub fn new(stale_after: TimeDelta, notify_timeout: Duration) -> Self {
        Self {
            stale_after,
            notify_timeout,
        }
    }

    /// Write one warning per fresh stale item, then start notifying every
    /// recipient about each of them.
    ///
    /// An item counts as already warned while any staleness entry references
    /// it. Concurrent sweeps queue on the store's sweep lock, so two of them
    /// never warn about the same item. Warnings are committed before any
    /// notification is started, and deliveries run as detached tasks: the
    /// sweep returns without waiting for a single send.
    pub async fn sweep(
        &self,
        store: &dyn InventoryStore,
        notifier: &Arc<dyn Notifier>,
        recipients: &dyn RecipientDirectory,
        now: DateTime<Utc>,
    ) -> Result<SweepReport, StoreError> {
        let cutoff = now - self.stale_after;

        let mut tx = store.begin().await?;
        tx.lock_sweep().await?;
        let candidates = tx.circulating_before(cutoff).await?;
        if candidates.is_empty() {
            return Ok(SweepReport::default());
        }
        let ids: Vec<SystemId> = candidates.iter().map(|i| i.system_id).collect();
        let already_warned = tx.warned_items(&ids).await?;

        let fresh: Vec<(InventoryItem, AuditLogEntry)> = candidates
            .into_iter()
            .filter(|item| !already_warned.contains(&item.system_id))
            .map(|item| {
                let entry = AuditLogEntry::stale(&item, now);
                (item, entry)
            })
            .collect();
        if fresh.is_empty() {
            return Ok(SweepReport::default());
        }
        for (_, entry) in &fresh {
            tx.append_log(entry).await?;
        }
        tx.commit().await?;

        let mut report = SweepReport {
            warned: fresh.iter().map(|(item, _)| item.system_id).collect(),
            ..SweepReport::default()
        };

        let to = recipients.recipients();
        for (item, entry) in &fresh {
            debug!(system_id = %item.system_id, "stale item");
            let subject = format!("Item {} overdue in circulation", item.barcode);
            let started = dispatch_to_all(notifier, &to, &subject, &entry.message, self.notify_timeout);
            report.notifications_dispatched += started.len();
        }

        info!(
            warned = report.warned.len(),
            dispatched = report.notifications_dispatched,
            "staleness sweep finished"
        );
        Ok(report)
    }
}
/// Delete audit entries older than `retention`.
pub async fn purge_expired_logs(
    store: &dyn InventoryStore,
    retention: TimeDelta,
    now: DateTime<Utc>,
) -> Result<u64, StoreError> {
    let mut tx = store.begin().await?;
    let purged = tx.purge_logs_before(now - retention).await?;
    tx.commit().await?;
    if purged > 0 {
        info!(purged, "expired audit entries purged");
    }
    Ok(purged)
}
