//! SQLite-backed key/value storage.
//!
//! A single `kv_store` table stands in for browser local storage so custom
//! routes, notes and saved POIs survive across processes.

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{Result, TravelRouteError};
use crate::store::KeyValueStorage;

impl From<rusqlite::Error> for TravelRouteError {
    fn from(e: rusqlite::Error) -> Self {
        TravelRouteError::storage(e.to_string())
    }
}

pub struct SqliteStorage {
    db: Connection,
    db_path: String,
}

impl SqliteStorage {
    /// Open (or create) the database at `db_path`.
    pub fn new(db_path: &str) -> Result<Self> {
        let db = Connection::open(db_path)?;
        Self::init_schema(&db)?;
        log::info!("[SqliteStorage] Opened {}", db_path);
        Ok(Self {
            db,
            db_path: db_path.to_string(),
        })
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        Self::new(":memory:")
    }

    pub fn db_path(&self) -> &str {
        &self.db_path
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv_store (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER DEFAULT (strftime('%s', 'now'))
            );
            "#,
        )?;
        Ok(())
    }
}

impl KeyValueStorage for SqliteStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .db
            .query_row(
                "SELECT value FROM kv_store WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.db.execute(
            "INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, strftime('%s', 'now'))
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value],
        )?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.db
            .execute("DELETE FROM kv_store WHERE key = ?1", params![key])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_remove() {
        let mut storage = SqliteStorage::in_memory().unwrap();
        assert_eq!(storage.get("travel-routes.notes").unwrap(), None);

        storage.set("travel-routes.notes", "erste").unwrap();
        storage.set("travel-routes.notes", "zweite").unwrap();
        assert_eq!(
            storage.get("travel-routes.notes").unwrap().as_deref(),
            Some("zweite")
        );

        storage.remove("travel-routes.notes").unwrap();
        assert_eq!(storage.get("travel-routes.notes").unwrap(), None);
    }
}
