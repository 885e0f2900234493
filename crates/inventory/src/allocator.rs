//! System id allocation for creation batches.

use brapool_core::{DomainError, DomainResult, SystemId};

/// Hands out consecutive system ids for one creation batch.
///
/// Seed it with the highest id ever issued, read inside the same transaction
/// that will insert the new rows. The store is queried once per batch; every
/// further id comes from the in-memory cursor.
#[derive(Debug, Clone)]
pub struct SystemIdAllocator {
    last: i32,
}

impl SystemIdAllocator {
    /// Start after `high_water`, or before `SystemId::MIN` when nothing was
    /// ever issued.
    pub fn starting_after(high_water: Option<SystemId>) -> Self {
        Self {
            last: high_water.map(SystemId::get).unwrap_or(SystemId::SEED),
        }
    }

    /// Next id, or `Overflow` once the four-digit space is used up.
    pub fn allocate(&mut self) -> DomainResult<SystemId> {
        let next = self.last + 1;
        if next > SystemId::MAX {
            return Err(DomainError::overflow(format!(
                "system id {next} exceeds {}",
                SystemId::MAX
            )));
        }
        let id = SystemId::new(next)?;
        self.last = next;
        Ok(id)
    }
}
