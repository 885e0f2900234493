//! The inventory lifecycle engine.
//!
//! Every operation runs in one unit of work: validation happens before the
//! store is touched, and any error drops the transaction so nothing partial
//! is committed. Batch transitions write exactly one aggregated audit entry.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use brapool_core::{Clock, DomainError, LogEntryId, SystemClock, SystemId};
use brapool_inventory::{
    AuditLogEntry, InventoryItem, ItemEdit, NewItem, SystemIdAllocator, item::validate_issue, match_incoming,
};

use crate::config::EngineConfig;
use crate::notify::{LoggingNotifier, Notifier, RecipientDirectory, StaticRecipients};
use crate::store::{InventoryStore, StoreError};
use crate::sweeper::{StalenessSweeper, SweepReport, purge_expired_logs};

/// Caller-facing error taxonomy.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Unique constraint on barcode or system id; the batch was rolled back.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("system id space exhausted: {0}")]
    Overflow(String),

    #[error(transparent)]
    Store(StoreError),
}

impl From<DomainError> for EngineError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(m) | DomainError::InvalidId(m) => Self::Validation(m),
            DomainError::NotFound(m) => Self::NotFound(m),
            DomainError::Conflict(m) => Self::Conflict(m),
            DomainError::Overflow(m) => Self::Overflow(m),
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(m) => Self::Conflict(m),
            StoreError::Missing(m) => Self::NotFound(m),
            other => Self::Store(other),
        }
    }
}

/// Result of a store-in or issue-out batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    pub updated_count: usize,
    /// Trimmed incoming barcodes that matched nothing, in input order.
    pub missing: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedItem {
    pub system_id: SystemId,
    pub barcode: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkCreateOutcome {
    pub created: Vec<CreatedItem>,
    pub skipped_existing: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogListing {
    pub logs: Vec<AuditLogEntry>,
    pub page: u32,
    pub pages: u32,
    pub total: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub purged: u64,
    pub sweep: SweepReport,
}

pub struct InventoryEngine<S> {
    store: S,
    notifier: Arc<dyn Notifier>,
    recipients: Arc<dyn RecipientDirectory>,
    clock: Arc<dyn Clock>,
    sweeper: StalenessSweeper,
    config: EngineConfig,
}

impl<S> InventoryEngine<S>
where
    S: InventoryStore,
{
    /// Engine with the system clock, a logging notifier and the configured
    /// recipient list.
    pub fn new(store: S, config: EngineConfig) -> Self {
        Self {
            store,
            notifier: Arc::new(LoggingNotifier),
            recipients: Arc::new(StaticRecipients::new(config.recipients.clone())),
            clock: Arc::new(SystemClock),
            sweeper: StalenessSweeper::new(config.stale_after, config.notify_timeout),
            config,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_recipients(mut self, recipients: Arc<dyn RecipientDirectory>) -> Self {
        self.recipients = recipients;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Move every matched item into `Stored`.
    pub async fn store_in(&self, barcodes: &[String]) -> Result<BatchOutcome, EngineError> {
        require_barcodes(barcodes)?;
        let now = self.clock.now();

        let mut tx = self.store.begin().await?;
        let stored = tx.list_items_for_update().await?;
        let found = match_incoming(barcodes, stored.as_slice());

        let mut updated: Vec<InventoryItem> = found.matched.into_iter().cloned().collect();
        for item in &mut updated {
            item.store_in(now);
        }
        let missing = found.missing;

        if !updated.is_empty() {
            tx.update_items(&updated).await?;
            tx.append_log(&AuditLogEntry::stored_in(&updated, now)).await?;
        }
        tx.commit().await?;

        info!(updated = updated.len(), missing = missing.len(), "store-in");
        Ok(BatchOutcome {
            updated_count: updated.len(),
            missing,
        })
    }

    /// Move every matched item into `Circulating`.
    ///
    /// Fails before touching the store when `issued_by` or `issued_to` is
    /// blank.
    pub async fn issue_out(
        &self,
        barcodes: &[String],
        issued_by: &str,
        issued_to: &str,
    ) -> Result<BatchOutcome, EngineError> {
        let (issued_by, issued_to) = validate_issue(issued_by, issued_to)?;
        require_barcodes(barcodes)?;
        let now = self.clock.now();

        let mut tx = self.store.begin().await?;
        let stored = tx.list_items_for_update().await?;
        let found = match_incoming(barcodes, stored.as_slice());

        let mut updated: Vec<InventoryItem> = found.matched.into_iter().cloned().collect();
        for item in &mut updated {
            item.issue_out(issued_by, issued_to, now)?;
        }
        let missing = found.missing;

        if !updated.is_empty() {
            tx.update_items(&updated).await?;
            tx.append_log(&AuditLogEntry::issued_out(&updated, issued_by, issued_to, now))
                .await?;
        }
        tx.commit().await?;

        info!(updated = updated.len(), missing = missing.len(), issued_to, "issue-out");
        Ok(BatchOutcome {
            updated_count: updated.len(),
            missing,
        })
    }

    /// Create new items in `Stored`.
    ///
    /// Barcodes that already exist verbatim are skipped. Ids for the whole
    /// batch are allocated before the first insert, so exhausting the id
    /// space aborts the batch with nothing written.
    pub async fn bulk_create(&self, items: Vec<NewItem>) -> Result<BulkCreateOutcome, EngineError> {
        if items.is_empty() {
            return Err(EngineError::Validation("no items given".to_string()));
        }
        let cleaned = items
            .iter()
            .map(NewItem::cleaned)
            .collect::<Result<Vec<_>, _>>()?;
        let requested = dedupe_by_barcode(cleaned);
        let now = self.clock.now();

        let mut tx = self.store.begin().await?;
        let barcodes: Vec<String> = requested.iter().map(|i| i.barcode.clone()).collect();
        let existing: Vec<String> = tx
            .find_by_barcodes(&barcodes)
            .await?
            .into_iter()
            .map(|i| i.barcode)
            .collect();

        let (skipped, fresh): (Vec<NewItem>, Vec<NewItem>) = requested
            .into_iter()
            .partition(|i| existing.contains(&i.barcode));

        let mut allocator = SystemIdAllocator::starting_after(tx.id_high_water().await?);
        let ids = fresh
            .iter()
            .map(|_| allocator.allocate())
            .collect::<Result<Vec<_>, _>>()?;

        let created: Vec<InventoryItem> = ids
            .into_iter()
            .zip(fresh)
            .map(|(id, new)| InventoryItem::create(id, new, now))
            .collect();
        for item in &created {
            tx.insert_item(item).await?;
        }
        if !created.is_empty() {
            tx.append_log(&AuditLogEntry::created(&created, now)).await?;
        }
        tx.commit().await?;

        info!(created = created.len(), skipped = skipped.len(), "bulk create");
        Ok(BulkCreateOutcome {
            created: created
                .into_iter()
                .map(|i| CreatedItem {
                    system_id: i.system_id,
                    barcode: i.barcode,
                })
                .collect(),
            skipped_existing: skipped.len(),
        })
    }

    /// Overwrite the given fields of one item.
    pub async fn edit_item(&self, system_id: SystemId, edit: ItemEdit) -> Result<InventoryItem, EngineError> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let mut item = tx
            .get_item_for_update(system_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("system id {system_id}")))?;

        item.apply_edit(&edit, now)?;
        tx.update_item(&item).await?;
        tx.append_log(&AuditLogEntry::edited(&item, now)).await?;
        tx.commit().await?;

        info!(%system_id, "item edited");
        Ok(item)
    }

    /// Remove one item. The audit entry is written afterwards and a failure
    /// there does not bring the item back.
    pub async fn delete_item(&self, system_id: SystemId) -> Result<(), EngineError> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let item = tx
            .get_item_for_update(system_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("system id {system_id}")))?;
        tx.delete_item(system_id).await?;
        tx.commit().await?;
        info!(%system_id, "item deleted");

        if let Err(err) = self.append_detached(AuditLogEntry::deleted(&item, now)).await {
            warn!(%system_id, error = %err, "audit entry for deletion not written");
        }
        Ok(())
    }

    /// All items, most recently updated first.
    pub async fn list_items(&self) -> Result<Vec<InventoryItem>, EngineError> {
        let mut tx = self.store.begin().await?;
        Ok(tx.list_items().await?)
    }

    /// One page (1-based) of the audit log, newest first.
    ///
    /// Retention purge and staleness sweep run first; their failures are
    /// logged and do not fail the read.
    pub async fn list_logs(&self, page: u32) -> Result<LogListing, EngineError> {
        if let Err(err) = self.run_maintenance().await {
            warn!(error = %err, "log maintenance failed");
        }

        let page = page.max(1);
        let size = self.config.log_page_size.max(1);
        let offset = u64::from(page - 1) * u64::from(size);

        let mut tx = self.store.begin().await?;
        let found = tx.logs_page(offset, u64::from(size)).await?;
        let pages = found.total.div_ceil(u64::from(size)).max(1);

        Ok(LogListing {
            logs: found.entries,
            page,
            pages: u32::try_from(pages).unwrap_or(u32::MAX),
            total: found.total,
        })
    }

    /// Delete audit entries by id ("mark as read").
    pub async fn delete_logs(&self, ids: &[String]) -> Result<u64, EngineError> {
        if ids.is_empty() {
            return Err(EngineError::Validation("no log ids given".to_string()));
        }
        let ids = ids
            .iter()
            .map(|raw| raw.parse::<LogEntryId>())
            .collect::<Result<Vec<_>, _>>()?;

        let mut tx = self.store.begin().await?;
        let deleted = tx.delete_logs(&ids).await?;
        tx.commit().await?;

        info!(deleted, "audit entries deleted");
        Ok(deleted)
    }

    /// Retention purge followed by the staleness sweep.
    pub async fn run_maintenance(&self) -> Result<MaintenanceReport, EngineError> {
        let now = self.clock.now();
        let purged = purge_expired_logs(&self.store, self.config.log_retention, now).await?;
        let sweep = self
            .sweeper
            .sweep(&self.store, &self.notifier, self.recipients.as_ref(), now)
            .await?;
        debug!(purged, warned = sweep.warned.len(), "maintenance finished");
        Ok(MaintenanceReport { purged, sweep })
    }

    async fn append_detached(&self, entry: AuditLogEntry) -> Result<(), StoreError> {
        let mut tx = self.store.begin().await?;
        tx.append_log(&entry).await?;
        tx.commit().await
    }
}

fn require_barcodes(barcodes: &[String]) -> Result<(), EngineError> {
    if barcodes.iter().all(|b| b.trim().is_empty()) {
        return Err(EngineError::Validation("no barcodes given".to_string()));
    }
    Ok(())
}

/// Collapse repeated barcodes: first position wins, last fields win.
fn dedupe_by_barcode(items: Vec<NewItem>) -> Vec<NewItem> {
    let mut position: HashMap<String, usize> = HashMap::new();
    let mut out: Vec<NewItem> = Vec::with_capacity(items.len());
    for item in items {
        match position.get(&item.barcode) {
            Some(&i) => out[i] = item,
            None => {
                position.insert(item.barcode.clone(), out.len());
                out.push(item);
            }
        }
    }
    out
}
