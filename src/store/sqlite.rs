//! SQLite-backed storage adapter.
//!
//! Stores each key in a two-column table (`key` primary key, `value` JSON
//! text). Blocking SQLite calls run on tokio's blocking pool.

use super::adapter::{Adapter, BackupCapable, BackupInfo, write_backup};
use crate::error::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const NAME: &str = "sqlite";

/// Default table name for key-value pairs.
pub const DEFAULT_TABLE: &str = "key_value_store";

#[derive(Clone, Debug)]
enum Location {
    File(PathBuf),
    Memory,
}

impl Location {
    fn describe(&self) -> String {
        match self {
            Self::File(path) => path.display().to_string(),
            Self::Memory => ":memory:".to_string(),
        }
    }
}

/// SQLite-backed storage adapter.
///
/// Until [`Adapter::init`] succeeds every operation fails with
/// [`Error::NotInitialized`]. A failed `init` leaves the adapter
/// uninitialized, so it can be retried.
///
/// # Thread Safety
///
/// `SqliteAdapter` is `Clone`; clones share one connection guarded by a
/// mutex.
#[derive(Clone)]
pub struct SqliteAdapter {
    location: Location,
    table: String,
    conn: Arc<Mutex<Option<Connection>>>,
}

impl SqliteAdapter {
    /// Creates an adapter for the database file at `path`.
    ///
    /// The file is created on `init` if missing; its parent directory must exist.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self::with_location(Location::File(path.as_ref().to_path_buf()))
    }

    /// Creates an adapter over a private in-memory database.
    ///
    /// In-memory databases have no backup capability.
    pub fn memory() -> Self {
        Self::with_location(Location::Memory)
    }

    fn with_location(location: Location) -> Self {
        Self {
            location,
            table: DEFAULT_TABLE.to_string(),
            conn: Arc::new(Mutex::new(None)),
        }
    }

    /// Uses `table` instead of [`DEFAULT_TABLE`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `table` is not a plain SQL identifier
    /// (ASCII letters, digits and `_`, not starting with a digit). The name
    /// is always quoted, so keywords such as `order` are usable.
    pub fn with_table(mut self, table: impl Into<String>) -> Result<Self> {
        let table = table.into();
        let valid = table
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid {
            return Err(Error::Config(format!("invalid table name '{table}'")));
        }
        self.table = table;
        Ok(self)
    }

    /// Name of the backing table.
    pub fn table(&self) -> &str {
        &self.table
    }

    fn init_sync(&self) -> Result<()> {
        let conn = match &self.location {
            Location::File(path) => Connection::open(path),
            Location::Memory => Connection::open_in_memory(),
        }
        .map_err(|e| {
            Error::adapter_io(
                format!("failed to open database at {}", self.location.describe()),
                e,
            )
        })?;

        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS \"{}\" (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
            self.table
        ))
        .map_err(|e| {
            Error::adapter_io(
                format!(
                    "failed to create table '{}' in database at {}",
                    self.table,
                    self.location.describe()
                ),
                e,
            )
        })?;

        *self.conn.lock() = Some(conn);
        info!(database = %self.location.describe(), table = %self.table, "SQLite adapter initialized");
        Ok(())
    }

    /// Runs `f` against the open connection.
    fn with_conn<T>(
        &self,
        context: impl FnOnce() -> String,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> Result<T> {
        let guard = self.conn.lock();
        let conn = guard.as_ref().ok_or_else(|| Error::not_initialized(NAME))?;
        f(conn).map_err(|e| Error::adapter_io(context(), e))
    }

    fn get_sync(&self, key: &str) -> Result<Option<Value>> {
        let sql = format!("SELECT value FROM \"{}\" WHERE key = ?1", self.table);
        let raw: Option<String> = self.with_conn(
            || format!("failed to read key '{key}'"),
            |conn| {
                conn.query_row(&sql, params![key], |row| row.get(0))
                    .optional()
            },
        )?;
        Ok(raw.map(decode_value))
    }

    fn set_sync(&self, key: &str, value: &Value) -> Result<()> {
        let text = serde_json::to_string(value)
            .map_err(|e| Error::adapter_io(format!("failed to serialize key '{key}'"), e))?;
        let sql = format!(
            "INSERT INTO \"{}\" (key, value) VALUES (?1, ?2) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            self.table
        );
        self.with_conn(
            || format!("failed to write key '{key}'"),
            |conn| conn.execute(&sql, params![key, text]),
        )?;
        debug!(key = %key, "SQLite adapter wrote key");
        Ok(())
    }

    fn delete_sync(&self, key: &str) -> Result<bool> {
        let sql = format!("DELETE FROM \"{}\" WHERE key = ?1", self.table);
        let removed = self.with_conn(
            || format!("failed to remove key '{key}'"),
            |conn| conn.execute(&sql, params![key]),
        )?;
        Ok(removed > 0)
    }

    fn all_sync(&self) -> Result<HashMap<String, Value>> {
        let sql = format!("SELECT key, value FROM \"{}\"", self.table);
        let rows = self.with_conn(
            || format!("failed to enumerate table '{}'", self.table),
            |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            },
        )?;
        Ok(rows
            .into_iter()
            .map(|(key, raw)| (key, decode_value(raw)))
            .collect())
    }

    fn backup_sync(&self, path: &Path) -> Result<BackupInfo> {
        // Holding the connection lock keeps writers out while the file is copied.
        let guard = self.conn.lock();
        if guard.is_none() {
            return Err(Error::not_initialized(NAME));
        }

        let info = write_backup(path)?;
        drop(guard);

        info!(backup = %info.path.display(), "SQLite adapter backup created");
        Ok(info)
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(Self) -> Result<T> + Send + 'static,
    {
        let adapter = self.clone();
        tokio::task::spawn_blocking(move || f(adapter))
            .await
            .map_err(|e| Error::adapter_io("sqlite adapter task failed", e))?
    }
}

/// Parses stored text as JSON, keeping non-JSON legacy text as a string.
fn decode_value(raw: String) -> Value {
    match serde_json::from_str(&raw) {
        Ok(value) => value,
        Err(_) => Value::String(raw),
    }
}

#[async_trait]
impl Adapter for SqliteAdapter {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn init(&self) -> Result<()> {
        self.blocking(|adapter| adapter.init_sync()).await
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let key = key.to_string();
        self.blocking(move |adapter| adapter.get_sync(&key)).await
    }

    async fn set(&self, key: &str, value: &Value) -> Result<()> {
        let key = key.to_string();
        let value = value.clone();
        self.blocking(move |adapter| adapter.set_sync(&key, &value))
            .await
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let key = key.to_string();
        self.blocking(move |adapter| adapter.delete_sync(&key)).await
    }

    async fn all(&self) -> Result<Option<HashMap<String, Value>>> {
        self.blocking(|adapter| adapter.all_sync().map(Some)).await
    }

    fn as_backup(&self) -> Option<&dyn BackupCapable> {
        match self.location {
            Location::File(_) => Some(self),
            Location::Memory => None,
        }
    }
}

#[async_trait]
impl BackupCapable for SqliteAdapter {
    async fn backup(&self) -> Result<BackupInfo> {
        let Location::File(path) = self.location.clone() else {
            return Err(Error::Config(
                "in-memory databases cannot be backed up".to_string(),
            ));
        };
        self.blocking(move |adapter| adapter.backup_sync(&path))
            .await
    }
}
