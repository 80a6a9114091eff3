//! Local SQLite store for orders, clients and the change queue.
//!
//! Uses rusqlite with WAL mode. Every write runs inside its own transaction
//! scoped to one table, and the store (not the caller) owns the `synced`
//! flag: any `put` resets it to false.

use chrono::Utc;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, Transaction};
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, Weak};
use tracing::{debug, error, info};

use crate::error::{StoreError, StoreResult};
use crate::models::{Client, Order, OrderStatus, QueueEntry, ShopSettings, SyncAction};

/// Current schema version. Bump when adding new migrations.
const CURRENT_SCHEMA_VERSION: i32 = 2;

/// File name of the database inside the data directory.
pub const DB_FILE_NAME: &str = "shop.db";

const SETTINGS_CATEGORY_SHOP: &str = "shop";
const SETTINGS_KEY_PROFILE: &str = "profile";

/// Handles currently open in this process, keyed by database path.
static OPEN_STORES: OnceLock<Mutex<HashMap<PathBuf, Weak<LocalStore>>>> = OnceLock::new();

/// Logical tables of the local store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Orders,
    Clients,
    SyncQueue,
}

impl Table {
    pub fn name(&self) -> &'static str {
        match self {
            Table::Orders => "orders",
            Table::Clients => "clients",
            Table::SyncQueue => "sync_queue",
        }
    }

    /// Queue actions whose payload `id` refers to a row of this table.
    fn actions(&self) -> &'static [SyncAction] {
        match self {
            Table::Orders => &[
                SyncAction::CreateOrder,
                SyncAction::UpdateOrder,
                SyncAction::UpdateOrderStatus,
                SyncAction::DeleteOrder,
            ],
            Table::Clients => &[SyncAction::SaveClient],
            Table::SyncQueue => &[],
        }
    }
}

/// A record type persisted in one of the keyed tables.
pub trait Record: Sized {
    const TABLE: Table;
    /// Column list used by every SELECT, in `from_row` order.
    const COLUMNS: &'static str;

    fn id(&self) -> &str;

    /// Insert or update by primary key. Must write `synced = 0`.
    fn upsert(tx: &Transaction<'_>, record: &Self) -> StoreResult<()>;

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;
}

fn json_column_error(idx: usize, err: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(err))
}

impl Record for Order {
    const TABLE: Table = Table::Orders;
    const COLUMNS: &'static str =
        "id, client_name, client_phone, client_address, items, status, notes, total, date, synced";

    fn id(&self) -> &str {
        &self.id
    }

    fn upsert(tx: &Transaction<'_>, order: &Self) -> StoreResult<()> {
        let items = serde_json::to_string(&order.items)?;
        // `date` is left out of the update clause: it is fixed at creation.
        tx.execute(
            "INSERT INTO orders (id, client_name, client_phone, client_address, items,
                                 status, notes, total, date, synced, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0, datetime('now'))
             ON CONFLICT(id) DO UPDATE SET
                client_name = excluded.client_name,
                client_phone = excluded.client_phone,
                client_address = excluded.client_address,
                items = excluded.items,
                status = excluded.status,
                notes = excluded.notes,
                total = excluded.total,
                synced = 0,
                updated_at = excluded.updated_at",
            params![
                order.id,
                order.client_name,
                order.client_phone,
                order.client_address,
                items,
                order.status.as_str(),
                order.notes,
                order.total,
                order.date,
            ],
        )?;
        Ok(())
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let items_str: String = row.get(4)?;
        let items = serde_json::from_str(&items_str).map_err(|e| json_column_error(4, e))?;
        let status_str: String = row.get(5)?;
        let status = status_str.parse::<OrderStatus>().map_err(|e| {
            json_column_error(5, std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })?;
        Ok(Order {
            id: row.get(0)?,
            client_name: row.get(1)?,
            client_phone: row.get(2)?,
            client_address: row.get(3)?,
            items,
            status,
            notes: row.get(6)?,
            total: row.get(7)?,
            date: row.get(8)?,
            synced: row.get(9)?,
        })
    }
}

impl Record for Client {
    const TABLE: Table = Table::Clients;
    const COLUMNS: &'static str =
        "id, name, phone, address, total_orders, total_spent, first_order, last_order, synced";

    fn id(&self) -> &str {
        &self.id
    }

    fn upsert(tx: &Transaction<'_>, client: &Self) -> StoreResult<()> {
        tx.execute(
            "INSERT INTO clients (id, name, phone, address, total_orders, total_spent,
                                  first_order, last_order, synced, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, datetime('now'))
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                phone = excluded.phone,
                address = excluded.address,
                total_orders = excluded.total_orders,
                total_spent = excluded.total_spent,
                first_order = excluded.first_order,
                last_order = excluded.last_order,
                synced = 0,
                updated_at = excluded.updated_at",
            params![
                client.id,
                client.name,
                client.phone,
                client.address,
                client.total_orders,
                client.total_spent,
                client.first_order,
                client.last_order,
            ],
        )?;
        Ok(())
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Client {
            id: row.get(0)?,
            name: row.get(1)?,
            phone: row.get(2)?,
            address: row.get(3)?,
            total_orders: row.get(4)?,
            total_spent: row.get(5)?,
            first_order: row.get(6)?,
            last_order: row.get(7)?,
            synced: row.get(8)?,
        })
    }
}

/// The on-device durable store. Shared by `Arc` between the write path and
/// the sync manager.
pub struct LocalStore {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStore")
            .field("db_path", &self.db_path)
            .finish()
    }
}

impl LocalStore {
    /// Open the store at `{data_dir}/shop.db`.
    ///
    /// Idempotent within a process: if the same file is already open, the
    /// existing handle is returned. Otherwise the directory is created, the
    /// connection opened and configured, and pending migrations applied.
    pub fn open(data_dir: &Path) -> StoreResult<Arc<LocalStore>> {
        fs::create_dir_all(data_dir).map_err(|e| {
            StoreError::StorageUnavailable(format!(
                "create data dir {}: {e}",
                data_dir.display()
            ))
        })?;
        let db_path = data_dir
            .canonicalize()
            .map_err(|e| StoreError::StorageUnavailable(format!("resolve data dir: {e}")))?
            .join(DB_FILE_NAME);

        let registry = OPEN_STORES.get_or_init(|| Mutex::new(HashMap::new()));
        let mut open = registry.lock().map_err(|_| StoreError::LockPoisoned)?;
        open.retain(|_, handle| handle.strong_count() > 0);

        if let Some(existing) = open.get(&db_path).and_then(Weak::upgrade) {
            debug!(path = %db_path.display(), "Reusing open local store");
            return Ok(existing);
        }

        info!("Opening local store at {}", db_path.display());
        let conn = open_and_configure(&db_path)?;
        let store = Arc::new(Self::from_connection(conn, db_path.clone())?);
        open.insert(db_path, Arc::downgrade(&store));
        Ok(store)
    }

    /// Open a private in-memory store. Nothing survives the handle.
    pub fn open_in_memory() -> StoreResult<Arc<LocalStore>> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StoreError::StorageUnavailable(format!("sqlite open: {e}")))?;
        conn.execute_batch("PRAGMA busy_timeout = 5000;")
            .map_err(|e| StoreError::StorageUnavailable(format!("pragma setup: {e}")))?;
        Ok(Arc::new(Self::from_connection(
            conn,
            PathBuf::from(":memory:"),
        )?))
    }

    fn from_connection(conn: Connection, db_path: PathBuf) -> StoreResult<LocalStore> {
        run_migrations(&conn).map_err(StoreError::StorageUnavailable)?;
        Ok(LocalStore {
            conn: Mutex::new(conn),
            db_path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    // -----------------------------------------------------------------------
    // Keyed tables
    // -----------------------------------------------------------------------

    /// Upsert a record by primary key. The stored copy is always unsynced.
    pub fn put<R: Record>(&self, record: &R) -> StoreResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        R::upsert(&tx, record)?;
        tx.commit()?;
        debug!(table = R::TABLE.name(), id = record.id(), "Record written");
        Ok(())
    }

    pub fn get<R: Record>(&self, id: &str) -> StoreResult<Option<R>> {
        let conn = self.lock()?;
        let query = format!(
            "SELECT {} FROM {} WHERE id = ?1",
            R::COLUMNS,
            R::TABLE.name()
        );
        let record = conn
            .query_row(&query, params![id], R::from_row)
            .optional()?;
        Ok(record)
    }

    /// All records of a table. No ordering is guaranteed.
    pub fn get_all<R: Record>(&self) -> StoreResult<Vec<R>> {
        self.select_where("1 = 1")
    }

    /// Records whose local state has not been confirmed by the remote.
    pub fn get_unsynced<R: Record>(&self) -> StoreResult<Vec<R>> {
        self.select_where("synced = 0")
    }

    fn select_where<R: Record>(&self, clause: &str) -> StoreResult<Vec<R>> {
        let conn = self.lock()?;
        let query = format!(
            "SELECT {} FROM {} WHERE {clause}",
            R::COLUMNS,
            R::TABLE.name()
        );
        let mut stmt = conn.prepare(&query)?;
        let records = stmt
            .query_map([], R::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Remove a record by primary key. Absent ids are not an error.
    pub fn delete<R: Record>(&self, id: &str) -> StoreResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let query = format!("DELETE FROM {} WHERE id = ?1", R::TABLE.name());
        let removed = tx.execute(&query, params![id])?;
        tx.commit()?;
        debug!(table = R::TABLE.name(), id, removed, "Record deleted");
        Ok(())
    }

    /// Flag a record as confirmed by the remote.
    ///
    /// Only applies when no queue entry still targets the record, so a write
    /// made after the replayed one keeps the row unsynced. Returns whether
    /// the flag was set.
    pub fn mark_synced(&self, table: Table, id: &str) -> StoreResult<bool> {
        let actions = table.actions();
        if actions.is_empty() {
            return Ok(false);
        }
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let query = format!(
            "UPDATE {table} SET synced = 1
             WHERE id = ?1
               AND NOT EXISTS (
                   SELECT 1 FROM sync_queue
                   WHERE CASE WHEN json_valid(data) THEN json_extract(data, '$.id') END = ?1
                     AND action IN ({placeholders})
               )",
            table = table.name(),
            placeholders = placeholders(actions.len(), 2),
        );
        let mut values = vec![id.to_string()];
        values.extend(actions.iter().map(|a| a.tag().to_string()));
        let changed = tx.execute(&query, params_from_iter(values.iter()))?;
        tx.commit()?;
        Ok(changed > 0)
    }

    /// Replace a locally generated placeholder id with the id the remote
    /// assigned, in the table and in every pending queue payload that
    /// targets it.
    pub fn adopt_remote_id(&self, table: Table, local_id: &str, remote_id: &str) -> StoreResult<()> {
        if local_id == remote_id || table.actions().is_empty() {
            return Ok(());
        }
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            &format!("UPDATE {} SET id = ?1 WHERE id = ?2", table.name()),
            params![remote_id, local_id],
        )?;

        let actions = table.actions();
        let query = format!(
            "UPDATE sync_queue SET data = json_set(data, '$.id', ?1)
             WHERE CASE WHEN json_valid(data) THEN json_extract(data, '$.id') END = ?2
               AND action IN ({})",
            placeholders(actions.len(), 3),
        );
        let mut values = vec![remote_id.to_string(), local_id.to_string()];
        values.extend(actions.iter().map(|a| a.tag().to_string()));
        let rewritten = tx.execute(&query, params_from_iter(values.iter()))?;
        tx.commit()?;

        info!(
            table = table.name(),
            local_id,
            remote_id,
            rewritten,
            "Adopted remote id"
        );
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Change queue
    // -----------------------------------------------------------------------

    /// Append a mutation intent. Returns the store-assigned id.
    pub fn enqueue(&self, action: &str, data: &Value) -> StoreResult<i64> {
        let payload = serde_json::to_string(data)?;
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let id = insert_queue_entry(&tx, action, &payload)?;
        tx.commit()?;
        Ok(id)
    }

    /// Write `record` and enqueue `action` in one transaction: either both
    /// land or neither does.
    pub fn put_and_enqueue<R: Record>(
        &self,
        record: &R,
        action: SyncAction,
        data: &Value,
    ) -> StoreResult<i64> {
        let payload = serde_json::to_string(data)?;
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        R::upsert(&tx, record)?;
        let queue_id = insert_queue_entry(&tx, action.tag(), &payload)?;
        tx.commit()?;
        debug!(table = R::TABLE.name(), id = record.id(), "Record written");
        Ok(queue_id)
    }

    /// Delete a record and enqueue `action` in one transaction.
    pub fn delete_and_enqueue<R: Record>(
        &self,
        id: &str,
        action: SyncAction,
        data: &Value,
    ) -> StoreResult<i64> {
        let payload = serde_json::to_string(data)?;
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let query = format!("DELETE FROM {} WHERE id = ?1", R::TABLE.name());
        let removed = tx.execute(&query, params![id])?;
        let queue_id = insert_queue_entry(&tx, action.tag(), &payload)?;
        tx.commit()?;
        debug!(table = R::TABLE.name(), id, removed, "Record deleted");
        Ok(queue_id)
    }

    /// The whole queue in replay (ascending id) order, without removing it.
    pub fn queue_snapshot(&self) -> StoreResult<Vec<QueueEntry>> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT id, action, data, timestamp FROM sync_queue ORDER BY id ASC")?;
        let entries = stmt
            .query_map([], |row| {
                let raw: String = row.get(2)?;
                // Unparseable payloads are kept verbatim so the sync manager
                // can report and discard them.
                let data = serde_json::from_str(&raw).unwrap_or(Value::String(raw));
                Ok(QueueEntry {
                    id: row.get(0)?,
                    action: row.get(1)?,
                    data,
                    timestamp: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Remove exactly one queue entry.
    pub fn remove_queue_entry(&self, id: i64) -> StoreResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM sync_queue WHERE id = ?1", params![id])?;
        tx.commit()?;
        Ok(())
    }

    /// Remove every queue entry. Returns how many were dropped.
    pub fn clear_queue(&self) -> StoreResult<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let removed = tx.execute("DELETE FROM sync_queue", [])?;
        tx.commit()?;
        Ok(removed)
    }

    /// Highest applied migration.
    pub fn schema_version(&self) -> StoreResult<i32> {
        let conn = self.lock()?;
        Ok(conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )?)
    }

    pub fn queue_len(&self) -> StoreResult<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM sync_queue", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    // -----------------------------------------------------------------------
    // Settings
    // -----------------------------------------------------------------------

    /// The shop settings singleton, or defaults when never saved.
    pub fn shop_settings(&self) -> StoreResult<ShopSettings> {
        let conn = self.lock()?;
        match get_setting(&conn, SETTINGS_CATEGORY_SHOP, SETTINGS_KEY_PROFILE)? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(ShopSettings::default()),
        }
    }

    pub fn put_shop_settings(&self, settings: &ShopSettings) -> StoreResult<()> {
        let raw = serde_json::to_string(settings)?;
        let conn = self.lock()?;
        set_setting(&conn, SETTINGS_CATEGORY_SHOP, SETTINGS_KEY_PROFILE, &raw)
    }

    /// Save the settings singleton and enqueue its `saveSettings` entry in
    /// one transaction.
    pub fn put_shop_settings_and_enqueue(&self, settings: &ShopSettings) -> StoreResult<i64> {
        let raw = serde_json::to_string(settings)?;
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        set_setting(&tx, SETTINGS_CATEGORY_SHOP, SETTINGS_KEY_PROFILE, &raw)?;
        let queue_id = insert_queue_entry(&tx, SyncAction::SaveSettings.tag(), &raw)?;
        tx.commit()?;
        Ok(queue_id)
    }

    /// Make every queue insert fail, to exercise rollback of paired writes.
    #[cfg(test)]
    pub(crate) fn reject_queue_inserts(&self) {
        let conn = self.lock().unwrap();
        conn.execute_batch(
            "CREATE TRIGGER reject_queue_inserts BEFORE INSERT ON sync_queue
             BEGIN SELECT RAISE(ABORT, 'queue rejected'); END;",
        )
        .unwrap();
    }
}

/// Insert a queue row inside `tx`. Returns the store-assigned id.
fn insert_queue_entry(tx: &Transaction<'_>, action: &str, payload: &str) -> StoreResult<i64> {
    let timestamp = Utc::now().timestamp_millis();
    tx.execute(
        "INSERT INTO sync_queue (action, data, timestamp) VALUES (?1, ?2, ?3)",
        params![action, payload, timestamp],
    )?;
    let id = tx.last_insert_rowid();
    debug!(queue_id = id, action, "Change enqueued");
    Ok(id)
}

/// `?{start}, ?{start+1}, …` for `count` parameters.
fn placeholders(count: usize, start: usize) -> String {
    (start..start + count)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Open the database file and apply pragmas.
fn open_and_configure(path: &Path) -> StoreResult<Connection> {
    let conn = Connection::open(path)
        .map_err(|e| StoreError::StorageUnavailable(format!("sqlite open: {e}")))?;

    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;",
    )
    .map_err(|e| StoreError::StorageUnavailable(format!("pragma setup: {e}")))?;

    Ok(conn)
}

/// Run all pending migrations up to `CURRENT_SCHEMA_VERSION`.
fn run_migrations(conn: &Connection) -> Result<(), String> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT DEFAULT (datetime('now'))
        );",
    )
    .map_err(|e| format!("create schema_version: {e}"))?;

    let current: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .map_err(|e| format!("read schema_version: {e}"))?;

    if current >= CURRENT_SCHEMA_VERSION {
        debug!("Local store schema up to date (v{current})");
        return Ok(());
    }

    info!("Migrating local store from v{current} to v{CURRENT_SCHEMA_VERSION}");

    if current < 1 {
        migrate_v1(conn)?;
    }
    if current < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

/// Migration v1: orders, clients and the change queue.
fn migrate_v1(conn: &Connection) -> Result<(), String> {
    conn.execute_batch(
        "
        BEGIN;

        CREATE TABLE IF NOT EXISTS orders (
            id TEXT PRIMARY KEY,
            client_name TEXT NOT NULL DEFAULT '',
            client_phone TEXT NOT NULL DEFAULT '',
            client_address TEXT NOT NULL DEFAULT '',
            items TEXT NOT NULL DEFAULT '[]',
            status TEXT NOT NULL DEFAULT 'pending',
            notes TEXT,
            total REAL NOT NULL DEFAULT 0,
            date TEXT NOT NULL,
            synced INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_orders_synced ON orders(synced);
        CREATE INDEX IF NOT EXISTS idx_orders_date ON orders(date);

        CREATE TABLE IF NOT EXISTS clients (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL DEFAULT '',
            phone TEXT NOT NULL,
            address TEXT NOT NULL DEFAULT '',
            total_orders INTEGER NOT NULL DEFAULT 0,
            total_spent REAL NOT NULL DEFAULT 0,
            first_order TEXT NOT NULL DEFAULT '',
            last_order TEXT NOT NULL DEFAULT '',
            synced INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_clients_synced ON clients(synced);
        CREATE UNIQUE INDEX IF NOT EXISTS idx_clients_phone ON clients(phone);

        -- AUTOINCREMENT: ids are never reused, even after a full clear
        CREATE TABLE IF NOT EXISTS sync_queue (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            action TEXT NOT NULL,
            data TEXT NOT NULL,
            timestamp INTEGER NOT NULL
        );

        INSERT INTO schema_version (version) VALUES (1);

        COMMIT;
        ",
    )
    .map_err(|e| {
        error!("Migration v1 failed: {e}");
        let _ = conn.execute_batch("ROLLBACK;");
        format!("migration v1: {e}")
    })?;

    info!("Applied migration v1 (orders, clients, sync_queue)");
    Ok(())
}

/// Migration v2: local settings (shop profile singleton).
fn migrate_v2(conn: &Connection) -> Result<(), String> {
    conn.execute_batch(
        "
        BEGIN;

        CREATE TABLE IF NOT EXISTS local_settings (
            setting_category TEXT NOT NULL,
            setting_key TEXT NOT NULL,
            setting_value TEXT NOT NULL,
            updated_at TEXT DEFAULT (datetime('now')),
            PRIMARY KEY (setting_category, setting_key)
        );

        INSERT INTO schema_version (version) VALUES (2);

        COMMIT;
        ",
    )
    .map_err(|e| {
        error!("Migration v2 failed: {e}");
        let _ = conn.execute_batch("ROLLBACK;");
        format!("migration v2: {e}")
    })?;

    info!("Applied migration v2 (local_settings)");
    Ok(())
}

// ---------------------------------------------------------------------------
// Settings helpers
// ---------------------------------------------------------------------------

/// Get a single setting value.
fn get_setting(conn: &Connection, category: &str, key: &str) -> StoreResult<Option<String>> {
    let value = conn
        .query_row(
            "SELECT setting_value FROM local_settings WHERE setting_category = ?1 AND setting_key = ?2",
            params![category, key],
            |row| row.get(0),
        )
        .optional()?;
    Ok(value)
}

/// Insert or update a setting.
fn set_setting(conn: &Connection, category: &str, key: &str, value: &str) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO local_settings (setting_category, setting_key, setting_value, updated_at)
         VALUES (?1, ?2, ?3, datetime('now'))
         ON CONFLICT(setting_category, setting_key) DO UPDATE SET
            setting_value = excluded.setting_value,
            updated_at = excluded.updated_at",
        params![category, key, value],
    )?;
    Ok(())
}

// ===========================================================================
// Tests
// ===========================================================================
