//! Infrastructure layer: storage, notification, the lifecycle engine and its
//! periodic maintenance.

pub mod config;
pub mod engine;
pub mod notify;
pub mod store;
pub mod sweeper;
pub mod worker;

mod integration_tests;

pub use config::{ConfigError, EngineConfig};
pub use engine::{
    BatchOutcome, BulkCreateOutcome, CreatedItem, EngineError, InventoryEngine, LogListing, MaintenanceReport,
};
pub use notify::{LoggingNotifier, Notifier, RecipientDirectory, StaticRecipients, TransportError};
pub use store::{InMemoryInventoryStore, InventoryStore, InventoryTx, PostgresInventoryStore, StoreError};
pub use sweeper::{StalenessSweeper, SweepReport};
pub use worker::{MaintenanceHandle, MaintenanceWorker};
