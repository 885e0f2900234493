//! Garment inventory domain.
//!
//! Business rules for barcode reconciliation, system id allocation, item
//! status transitions and audit entry rendering, implemented purely as
//! deterministic domain logic (no IO, no storage).

pub mod allocator;
pub mod audit;
pub mod barcode;
pub mod import;
pub mod item;

pub use allocator::SystemIdAllocator;
pub use audit::{AuditLogEntry, Severity, kinds};
pub use barcode::{BarcodeMatch, HasBarcode, match_incoming, normalize};
pub use import::{ImportResult, map_rows};
pub use item::{Category, InventoryItem, ItemEdit, ItemStatus, NewItem};
