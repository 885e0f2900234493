use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use brapool_core::{LogEntryId, SystemId};
use brapool_inventory::{AuditLogEntry, InventoryItem, ItemStatus};

use super::r#trait::{InventoryStore, InventoryTx, LogPage, StoreError};

#[derive(Debug, Clone, Default)]
struct InventoryState {
    items: BTreeMap<SystemId, InventoryItem>,
    high_water: Option<SystemId>,
    logs: Vec<AuditLogEntry>,
}

impl InventoryState {
    fn barcode_owner(&self, barcode: &str) -> Option<SystemId> {
        self.items
            .values()
            .find(|i| i.barcode == barcode)
            .map(|i| i.system_id)
    }
}

/// In-memory store.
///
/// Intended for tests/dev. A transaction holds the store lock from `begin`
/// until it is committed or dropped, so writers are fully serialized. Writes
/// go to a private copy that replaces the shared state on commit.
#[derive(Debug, Clone, Default)]
pub struct InMemoryInventoryStore {
    state: Arc<Mutex<InventoryState>>,
}

impl InMemoryInventoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed items, by system id.
    pub async fn items(&self) -> Vec<InventoryItem> {
        self.state.lock().await.items.values().cloned().collect()
    }

    /// Committed audit entries, in append order.
    pub async fn logs(&self) -> Vec<AuditLogEntry> {
        self.state.lock().await.logs.clone()
    }
}

#[async_trait::async_trait]
impl InventoryStore for InMemoryInventoryStore {
    async fn begin(&self) -> Result<Box<dyn InventoryTx>, StoreError> {
        let guard = self.state.clone().lock_owned().await;
        let working = (*guard).clone();
        Ok(Box::new(InMemoryTx { guard, working }))
    }
}

struct InMemoryTx {
    guard: OwnedMutexGuard<InventoryState>,
    working: InventoryState,
}

#[async_trait::async_trait]
impl InventoryTx for InMemoryTx {
    async fn id_high_water(&mut self) -> Result<Option<SystemId>, StoreError> {
        let max_live = self.working.items.keys().next_back().copied();
        Ok(max_live.max(self.working.high_water))
    }

    async fn list_items(&mut self) -> Result<Vec<InventoryItem>, StoreError> {
        let mut items: Vec<InventoryItem> = self.working.items.values().cloned().collect();
        items.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(items)
    }

    async fn get_item(&mut self, system_id: SystemId) -> Result<Option<InventoryItem>, StoreError> {
        Ok(self.working.items.get(&system_id).cloned())
    }

    async fn find_by_barcodes(&mut self, barcodes: &[String]) -> Result<Vec<InventoryItem>, StoreError> {
        let wanted: HashSet<&str> = barcodes.iter().map(String::as_str).collect();
        Ok(self
            .working
            .items
            .values()
            .filter(|i| wanted.contains(i.barcode.as_str()))
            .cloned()
            .collect())
    }

    async fn insert_item(&mut self, item: &InventoryItem) -> Result<(), StoreError> {
        if self.working.items.contains_key(&item.system_id) {
            return Err(StoreError::Conflict(format!(
                "system id {} already exists",
                item.system_id
            )));
        }
        if self.working.barcode_owner(&item.barcode).is_some() {
            return Err(StoreError::Conflict(format!(
                "barcode {} already exists",
                item.barcode
            )));
        }
        self.working.items.insert(item.system_id, item.clone());
        self.working.high_water = self.working.high_water.max(Some(item.system_id));
        Ok(())
    }

    async fn update_item(&mut self, item: &InventoryItem) -> Result<(), StoreError> {
        if !self.working.items.contains_key(&item.system_id) {
            return Err(StoreError::Missing(format!("system id {}", item.system_id)));
        }
        if let Some(owner) = self.working.barcode_owner(&item.barcode) {
            if owner != item.system_id {
                return Err(StoreError::Conflict(format!(
                    "barcode {} belongs to system id {owner}",
                    item.barcode
                )));
            }
        }
        self.working.items.insert(item.system_id, item.clone());
        Ok(())
    }

    async fn delete_item(&mut self, system_id: SystemId) -> Result<bool, StoreError> {
        Ok(self.working.items.remove(&system_id).is_some())
    }

    async fn circulating_before(&mut self, cutoff: DateTime<Utc>) -> Result<Vec<InventoryItem>, StoreError> {
        Ok(self
            .working
            .items
            .values()
            .filter(|i| i.status == ItemStatus::Circulating && i.circulation_reference() < cutoff)
            .cloned()
            .collect())
    }

    async fn append_log(&mut self, entry: &AuditLogEntry) -> Result<(), StoreError> {
        if self.working.logs.iter().any(|e| e.id == entry.id) {
            return Err(StoreError::Conflict(format!("log entry {} already exists", entry.id)));
        }
        self.working.logs.push(entry.clone());
        Ok(())
    }

    async fn logs_page(&mut self, offset: u64, limit: u64) -> Result<LogPage, StoreError> {
        let mut entries = self.working.logs.clone();
        // Newest first; append order breaks timestamp ties (latest append first).
        entries.reverse();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = entries.len() as u64;
        let entries = entries
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();
        Ok(LogPage { entries, total })
    }

    async fn warned_items(&mut self, items: &[SystemId]) -> Result<HashSet<SystemId>, StoreError> {
        let wanted: HashSet<SystemId> = items.iter().copied().collect();
        Ok(self
            .working
            .logs
            .iter()
            .filter(|e| e.is_staleness_warning())
            .filter_map(|e| e.related_item_id)
            .filter(|id| wanted.contains(id))
            .collect())
    }

    async fn purge_logs_before(&mut self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let before = self.working.logs.len();
        self.working.logs.retain(|e| e.created_at >= cutoff);
        Ok((before - self.working.logs.len()) as u64)
    }

    async fn delete_logs(&mut self, ids: &[LogEntryId]) -> Result<u64, StoreError> {
        let doomed: HashSet<LogEntryId> = ids.iter().copied().collect();
        let before = self.working.logs.len();
        self.working.logs.retain(|e| !doomed.contains(&e.id));
        Ok((before - self.working.logs.len()) as u64)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let InMemoryTx { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}
