//! Postgres-backed inventory store.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (other) | Any other | `Backend` |
//! | PoolClosed / Other | N/A | `Backend` |
//!
//! ## Id allocation
//!
//! `id_high_water` takes a transaction-scoped advisory lock before reading, so
//! concurrent creation batches queue behind each other instead of racing for
//! the same ids. The high-water mark is the larger of the live maximum and the
//! `inventory_id_watermark` row, which keeps ids of deleted items retired.
//! Staleness sweeps take a second advisory lock for the same reason: the
//! "already warned?" read and the warning insert must not interleave.
//!
//! Paths that read rows and write them back use `SELECT ... FOR UPDATE`, so a
//! concurrent edit is either visible to the read or waits for the write.

use std::collections::HashSet;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;

use brapool_core::{LogEntryId, SystemId};
use brapool_inventory::{AuditLogEntry, Category, InventoryItem, ItemStatus, Severity};

use super::r#trait::{InventoryStore, InventoryTx, LogPage, StoreError};

const ID_ALLOCATION_LOCK: i64 = 0x6272_6170_6f6f_6c31;
const STALENESS_SWEEP_LOCK: i64 = 0x6272_6170_6f6f_6c32;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS inventory_items (
        system_id         INTEGER PRIMARY KEY CHECK (system_id BETWEEN 1000 AND 9999),
        barcode           TEXT NOT NULL UNIQUE,
        category          TEXT NOT NULL,
        size              TEXT NOT NULL,
        known_to_partner  BOOLEAN NOT NULL DEFAULT FALSE,
        status            TEXT NOT NULL,
        remark            TEXT,
        stored_at         TIMESTAMPTZ,
        issued_by         TEXT,
        issued_to         TEXT,
        issued_at         TIMESTAMPTZ,
        created_at        TIMESTAMPTZ NOT NULL,
        updated_at        TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS audit_log (
        id               UUID PRIMARY KEY,
        kind             TEXT NOT NULL,
        severity         TEXT NOT NULL,
        message          TEXT NOT NULL,
        related_item_id  INTEGER,
        created_at       TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS inventory_id_watermark (
        singleton   BOOLEAN PRIMARY KEY DEFAULT TRUE CHECK (singleton),
        high_water  INTEGER NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS inventory_items_status_idx ON inventory_items (status)",
    "CREATE INDEX IF NOT EXISTS inventory_items_updated_at_idx ON inventory_items (updated_at DESC)",
    "CREATE INDEX IF NOT EXISTS audit_log_created_at_idx ON audit_log (created_at DESC)",
    "CREATE INDEX IF NOT EXISTS audit_log_related_idx ON audit_log (kind, related_item_id)",
];

const ITEM_COLUMNS: &str = "system_id, barcode, category, size, known_to_partner, status, remark, \
     stored_at, issued_by, issued_to, issued_at, created_at, updated_at";

fn items_query(tail: &str, for_update: bool) -> String {
    let lock = if for_update { " FOR UPDATE" } else { "" };
    format!("SELECT {ITEM_COLUMNS} FROM inventory_items {tail}{lock}")
}

/// Postgres-backed inventory store.
///
/// Every unit of work is a database transaction; dropping it rolls back.
#[derive(Debug, Clone)]
pub struct PostgresInventoryStore {
    pool: PgPool,
}

impl PostgresInventoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create tables and indexes if they do not exist yet.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl InventoryStore for PostgresInventoryStore {
    async fn begin(&self) -> Result<Box<dyn InventoryTx>, StoreError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;
        Ok(Box::new(PostgresTx { tx }))
    }
}

struct PostgresTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait::async_trait]
impl InventoryTx for PostgresTx {
    #[instrument(skip_all, err)]
    async fn id_high_water(&mut self) -> Result<Option<SystemId>, StoreError> {
        self.advisory_lock(ID_ALLOCATION_LOCK, "id_high_water").await?;

        let row = sqlx::query(
            r#"
            SELECT GREATEST(
                (SELECT MAX(system_id) FROM inventory_items),
                (SELECT high_water FROM inventory_id_watermark WHERE singleton)
            ) AS high_water
            "#,
        )
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("id_high_water", e))?;

        let raw: Option<i32> = row
            .try_get("high_water")
            .map_err(|e| map_sqlx_error("id_high_water", e))?;
        raw.map(|v| SystemId::new(v).map_err(|e| StoreError::Backend(e.to_string())))
            .transpose()
    }

    #[instrument(skip_all, err)]
    async fn list_items(&mut self) -> Result<Vec<InventoryItem>, StoreError> {
        self.fetch_items(&items_query("ORDER BY updated_at DESC", false), "list_items")
            .await
    }

    #[instrument(skip(self), err)]
    async fn get_item(&mut self, system_id: SystemId) -> Result<Option<InventoryItem>, StoreError> {
        self.fetch_item(&items_query("WHERE system_id = $1", false), system_id, "get_item")
            .await
    }

    #[instrument(skip_all, err)]
    async fn list_items_for_update(&mut self) -> Result<Vec<InventoryItem>, StoreError> {
        self.fetch_items(
            &items_query("ORDER BY updated_at DESC", true),
            "list_items_for_update",
        )
        .await
    }

    #[instrument(skip(self), err)]
    async fn get_item_for_update(&mut self, system_id: SystemId) -> Result<Option<InventoryItem>, StoreError> {
        self.fetch_item(
            &items_query("WHERE system_id = $1", true),
            system_id,
            "get_item_for_update",
        )
        .await
    }

    #[instrument(skip_all, fields(count = barcodes.len()), err)]
    async fn find_by_barcodes(&mut self, barcodes: &[String]) -> Result<Vec<InventoryItem>, StoreError> {
        if barcodes.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(&items_query("WHERE barcode = ANY($1)", false))
        .bind(barcodes.to_vec())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("find_by_barcodes", e))?;
        rows.iter().map(item_from_row).collect()
    }

    #[instrument(skip_all, fields(system_id = %item.system_id), err)]
    async fn insert_item(&mut self, item: &InventoryItem) -> Result<(), StoreError> {
        sqlx::query(&format!(
            "INSERT INTO inventory_items ({ITEM_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)"
        ))
        .bind(item.system_id.get())
        .bind(&item.barcode)
        .bind(item.category.as_str())
        .bind(&item.size)
        .bind(item.known_to_partner)
        .bind(item.status.as_str())
        .bind(&item.remark)
        .bind(item.stored_at)
        .bind(&item.issued_by)
        .bind(&item.issued_to)
        .bind(item.issued_at)
        .bind(item.created_at)
        .bind(item.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_item", e))?;

        sqlx::query(
            r#"
            INSERT INTO inventory_id_watermark (singleton, high_water)
            VALUES (TRUE, $1)
            ON CONFLICT (singleton)
            DO UPDATE SET high_water = GREATEST(inventory_id_watermark.high_water, EXCLUDED.high_water)
            "#,
        )
        .bind(item.system_id.get())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_item", e))?;
        Ok(())
    }

    #[instrument(skip_all, fields(system_id = %item.system_id), err)]
    async fn update_item(&mut self, item: &InventoryItem) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE inventory_items SET
                barcode = $2,
                category = $3,
                size = $4,
                known_to_partner = $5,
                status = $6,
                remark = $7,
                stored_at = $8,
                issued_by = $9,
                issued_to = $10,
                issued_at = $11,
                updated_at = $12
            WHERE system_id = $1
            "#,
        )
        .bind(item.system_id.get())
        .bind(&item.barcode)
        .bind(item.category.as_str())
        .bind(&item.size)
        .bind(item.known_to_partner)
        .bind(item.status.as_str())
        .bind(&item.remark)
        .bind(item.stored_at)
        .bind(&item.issued_by)
        .bind(&item.issued_to)
        .bind(item.issued_at)
        .bind(item.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_item", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Missing(format!("system id {}", item.system_id)));
        }
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn delete_item(&mut self, system_id: SystemId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM inventory_items WHERE system_id = $1")
            .bind(system_id.get())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_item", e))?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), err)]
    async fn circulating_before(&mut self, cutoff: DateTime<Utc>) -> Result<Vec<InventoryItem>, StoreError> {
        let rows = sqlx::query(&items_query(
            "WHERE status = $1 AND COALESCE(issued_at, updated_at) < $2 ORDER BY system_id",
            false,
        ))
        .bind(ItemStatus::Circulating.as_str())
        .bind(cutoff)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("circulating_before", e))?;
        rows.iter().map(item_from_row).collect()
    }

    #[instrument(skip_all, err)]
    async fn lock_sweep(&mut self) -> Result<(), StoreError> {
        self.advisory_lock(STALENESS_SWEEP_LOCK, "lock_sweep").await
    }

    #[instrument(skip_all, fields(kind = %entry.kind), err)]
    async fn append_log(&mut self, entry: &AuditLogEntry) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO audit_log (id, kind, severity, message, related_item_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(entry.id.as_uuid())
        .bind(&entry.kind)
        .bind(entry.severity.as_str())
        .bind(&entry.message)
        .bind(entry.related_item_id.map(SystemId::get))
        .bind(entry.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("append_log", e))?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn logs_page(&mut self, offset: u64, limit: u64) -> Result<LogPage, StoreError> {
        let total: i64 = sqlx::query("SELECT COUNT(*) AS total FROM audit_log")
            .fetch_one(&mut *self.tx)
            .await
            .and_then(|row| row.try_get("total"))
            .map_err(|e| map_sqlx_error("logs_page", e))?;

        // uuid v7 ids sort by creation, which breaks timestamp ties.
        let rows = sqlx::query(
            r#"
            SELECT id, kind, severity, message, related_item_id, created_at
            FROM audit_log
            ORDER BY created_at DESC, id DESC
            OFFSET $1 LIMIT $2
            "#,
        )
        .bind(to_i64(offset))
        .bind(to_i64(limit))
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("logs_page", e))?;

        let entries = rows.iter().map(entry_from_row).collect::<Result<Vec<_>, _>>()?;
        Ok(LogPage {
            entries,
            total: u64::try_from(total).unwrap_or_default(),
        })
    }

    #[instrument(skip_all, fields(count = items.len()), err)]
    async fn warned_items(&mut self, items: &[SystemId]) -> Result<HashSet<SystemId>, StoreError> {
        if items.is_empty() {
            return Ok(HashSet::new());
        }
        let ids: Vec<i32> = items.iter().map(|id| id.get()).collect();
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT related_item_id
            FROM audit_log
            WHERE kind = $1 AND related_item_id = ANY($2)
            "#,
        )
        .bind(brapool_inventory::kinds::STALENESS_WARNING)
        .bind(ids)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("warned_items", e))?;

        rows.iter()
            .map(|row| {
                let raw: i32 = row
                    .try_get("related_item_id")
                    .map_err(|e| map_sqlx_error("warned_items", e))?;
                SystemId::new(raw).map_err(|e| StoreError::Backend(e.to_string()))
            })
            .collect()
    }

    #[instrument(skip(self), err)]
    async fn purge_logs_before(&mut self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM audit_log WHERE created_at < $1")
            .bind(cutoff)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("purge_logs_before", e))?;
        Ok(result.rows_affected())
    }

    #[instrument(skip_all, fields(count = ids.len()), err)]
    async fn delete_logs(&mut self, ids: &[LogEntryId]) -> Result<u64, StoreError> {
        let ids: Vec<uuid::Uuid> = ids.iter().map(|id| *id.as_uuid()).collect();
        let result = sqlx::query("DELETE FROM audit_log WHERE id = ANY($1)")
            .bind(ids)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_logs", e))?;
        Ok(result.rows_affected())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit", e))
    }
}

impl PostgresTx {
    /// Transaction-scoped; released on commit or rollback.
    async fn advisory_lock(&mut self, key: i64, operation: &str) -> Result<(), StoreError> {
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(key)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        Ok(())
    }

    async fn fetch_items(&mut self, sql: &str, operation: &str) -> Result<Vec<InventoryItem>, StoreError> {
        let rows = sqlx::query(sql)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        rows.iter().map(item_from_row).collect()
    }

    async fn fetch_item(
        &mut self,
        sql: &str,
        system_id: SystemId,
        operation: &str,
    ) -> Result<Option<InventoryItem>, StoreError> {
        let row = sqlx::query(sql)
            .bind(system_id.get())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        row.as_ref().map(item_from_row).transpose()
    }
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn item_from_row(row: &sqlx::postgres::PgRow) -> Result<InventoryItem, StoreError> {
    let get = |e: sqlx::Error| map_sqlx_error("decode item", e);

    let system_id: i32 = row.try_get("system_id").map_err(get)?;
    let category: String = row.try_get("category").map_err(get)?;
    let status: String = row.try_get("status").map_err(get)?;

    Ok(InventoryItem {
        system_id: SystemId::new(system_id).map_err(|e| StoreError::Backend(e.to_string()))?,
        barcode: row.try_get("barcode").map_err(get)?,
        category: Category::from_str(&category).map_err(|e| StoreError::Backend(e.to_string()))?,
        size: row.try_get("size").map_err(get)?,
        known_to_partner: row.try_get("known_to_partner").map_err(get)?,
        status: ItemStatus::from_str(&status).map_err(|e| StoreError::Backend(e.to_string()))?,
        remark: row.try_get("remark").map_err(get)?,
        stored_at: row.try_get("stored_at").map_err(get)?,
        issued_by: row.try_get("issued_by").map_err(get)?,
        issued_to: row.try_get("issued_to").map_err(get)?,
        issued_at: row.try_get("issued_at").map_err(get)?,
        created_at: row.try_get("created_at").map_err(get)?,
        updated_at: row.try_get("updated_at").map_err(get)?,
    })
}

fn entry_from_row(row: &sqlx::postgres::PgRow) -> Result<AuditLogEntry, StoreError> {
    let get = |e: sqlx::Error| map_sqlx_error("decode log entry", e);

    let id: uuid::Uuid = row.try_get("id").map_err(get)?;
    let severity: String = row.try_get("severity").map_err(get)?;
    let related: Option<i32> = row.try_get("related_item_id").map_err(get)?;

    Ok(AuditLogEntry {
        id: LogEntryId::from_uuid(id),
        kind: row.try_get("kind").map_err(get)?,
        severity: Severity::parse(&severity)
            .ok_or_else(|| StoreError::Backend(format!("unknown severity {severity}")))?,
        message: row.try_get("message").map_err(get)?,
        related_item_id: related
            .map(SystemId::new)
            .transpose()
            .map_err(|e| StoreError::Backend(e.to_string()))?,
        created_at: row.try_get("created_at").map_err(get)?,
    })
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Conflict(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => StoreError::Backend(format!("connection pool closed in {operation}")),
        _ => StoreError::Backend(format!("sqlx error in {operation}: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_back_reads_lock_their_rows() {
        let locked = items_query("WHERE system_id = $1", true);
        assert!(locked.starts_with("SELECT system_id, barcode"));
        assert!(locked.ends_with("WHERE system_id = $1 FOR UPDATE"));
        assert!(!items_query("ORDER BY updated_at DESC", false).contains("FOR UPDATE"));
    }

    #[test]
    fn advisory_lock_keys_are_distinct() {
        assert_ne!(ID_ALLOCATION_LOCK, STALENESS_SWEEP_LOCK);
    }
}
