use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;

use super::KeyValueStore;
use crate::error::{IdentityError, Result};

/// Key-value store backed by a single SQLite table.
pub struct SqliteStore(Mutex<Connection>);

impl SqliteStore {
    /// Open (or create) the database file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| {
                IdentityError::storage(format!("Failed to create {}: {}", dir.display(), e))
            })?;
        }

        let conn = Connection::open(path).map_err(|e| {
            IdentityError::storage(format!("Failed to open {}: {}", path.display(), e))
        })?;
        debug!(path = %path.display(), "Opened identity database");
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(IdentityError::storage)?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS kv_store (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );
            ",
        )
        .map_err(|e| IdentityError::storage(format!("Failed to create kv_store table: {}", e)))?;

        Ok(Self(Mutex::new(conn)))
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.0.lock().map_err(IdentityError::storage)?;
        conn.query_row("SELECT value FROM kv_store WHERE key = ?1", [key], |row| {
            row.get(0)
        })
        .optional()
        .map_err(|e| IdentityError::storage(format!("Failed to read {}: {}", key, e)))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let now = chrono::Utc::now().timestamp_millis();
        let conn = self.0.lock().map_err(IdentityError::storage)?;

        conn.execute(
            "INSERT INTO kv_store (key, value, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET
             value = ?2, updated_at = ?3",
            (key, value, now),
        )
        .map_err(|e| IdentityError::storage(format!("Failed to write {}: {}", key, e)))?;

        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let conn = self.0.lock().map_err(IdentityError::storage)?;
        conn.execute("DELETE FROM kv_store WHERE key = ?1", [key])
            .map_err(|e| IdentityError::storage(format!("Failed to delete {}: {}", key, e)))?;
        Ok(())
    }
}
