use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use brapool_core::{LogEntryId, SystemId};
use brapool_inventory::{AuditLogEntry, InventoryItem};

/// Storage operation error.
///
/// These are **infrastructure errors** as opposed to domain errors
/// (validation, id exhaustion).
#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique constraint rejected the write (barcode or system id taken).
    #[error("unique constraint violated: {0}")]
    Conflict(String),

    /// The row to update does not exist.
    #[error("row missing: {0}")]
    Missing(String),

    /// Connection, query or decoding failure.
    #[error("storage backend failure: {0}")]
    Backend(String),
}

/// One page of audit entries, newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogPage {
    pub entries: Vec<AuditLogEntry>,
    /// Entries across all pages.
    pub total: u64,
}

/// Opens units of work.
///
/// Implementations must isolate transactions well enough that two concurrent
/// creation batches cannot both read the same id high-water mark and commit.
#[async_trait::async_trait]
pub trait InventoryStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn InventoryTx>, StoreError>;
}

#[async_trait::async_trait]
impl<S> InventoryStore for Arc<S>
where
    S: InventoryStore + ?Sized,
{
    async fn begin(&self) -> Result<Box<dyn InventoryTx>, StoreError> {
        (**self).begin().await
    }
}

/// An open unit of work. Dropping it without `commit` rolls back.
#[async_trait::async_trait]
pub trait InventoryTx: Send {
    /// Highest system id ever issued, deleted items included.
    ///
    /// Backends that allow concurrent writers must serialize callers of this
    /// method until the transaction ends.
    async fn id_high_water(&mut self) -> Result<Option<SystemId>, StoreError>;

    /// All items, most recently updated first.
    async fn list_items(&mut self) -> Result<Vec<InventoryItem>, StoreError>;

    async fn get_item(&mut self, system_id: SystemId) -> Result<Option<InventoryItem>, StoreError>;

    /// Like [`list_items`](Self::list_items), but the returned rows stay
    /// locked against other writers until the transaction ends. Use it when
    /// the rows are written back.
    ///
    /// The default suits backends whose transactions are already exclusive.
    async fn list_items_for_update(&mut self) -> Result<Vec<InventoryItem>, StoreError> {
        self.list_items().await
    }

    /// Like [`get_item`](Self::get_item), locking the row until the
    /// transaction ends.
    async fn get_item_for_update(&mut self, system_id: SystemId) -> Result<Option<InventoryItem>, StoreError> {
        self.get_item(system_id).await
    }

    /// Items whose stored barcode equals one of `barcodes` exactly.
    async fn find_by_barcodes(&mut self, barcodes: &[String]) -> Result<Vec<InventoryItem>, StoreError>;

    /// Insert a new item and raise the id high-water mark.
    async fn insert_item(&mut self, item: &InventoryItem) -> Result<(), StoreError>;

    async fn update_item(&mut self, item: &InventoryItem) -> Result<(), StoreError>;

    async fn update_items(&mut self, items: &[InventoryItem]) -> Result<u64, StoreError> {
        for item in items {
            self.update_item(item).await?;
        }
        Ok(items.len() as u64)
    }

    /// Returns `false` if no such item existed.
    async fn delete_item(&mut self, system_id: SystemId) -> Result<bool, StoreError>;

    /// `Circulating` items whose circulation reference (`issued_at`, else
    /// `updated_at`) is older than `cutoff`.
    async fn circulating_before(&mut self, cutoff: DateTime<Utc>) -> Result<Vec<InventoryItem>, StoreError>;

    /// Serialize staleness sweeps: held until the transaction ends, so the
    /// "already warned?" check and the warning write of two sweeps never
    /// interleave.
    ///
    /// The default suits backends whose transactions are already exclusive.
    async fn lock_sweep(&mut self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn append_log(&mut self, entry: &AuditLogEntry) -> Result<(), StoreError>;

    async fn logs_page(&mut self, offset: u64, limit: u64) -> Result<LogPage, StoreError>;

    /// Subset of `items` already referenced by a staleness warning.
    async fn warned_items(&mut self, items: &[SystemId]) -> Result<HashSet<SystemId>, StoreError>;

    /// Delete entries created before `cutoff`.
    async fn purge_logs_before(&mut self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;

    async fn delete_logs(&mut self, ids: &[LogEntryId]) -> Result<u64, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}
