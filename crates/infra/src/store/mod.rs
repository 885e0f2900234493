//! Transactional storage boundary for items and audit entries.
//!
//! Callers open a unit of work with [`InventoryStore::begin`], perform reads
//! and writes through the returned [`InventoryTx`] and finish with
//! `commit()`. Dropping a transaction without committing discards all of its
//! writes.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryInventoryStore;
pub use postgres::PostgresInventoryStore;
pub use r#trait::{InventoryStore, InventoryTx, LogPage, StoreError};
