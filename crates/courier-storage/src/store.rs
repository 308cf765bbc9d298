//! Durable key-value stores.
//!
//! The offline queue round-trips its whole state through a single key on
//! every mutation, so the store interface stays as small as browser local
//! storage: get, set, remove.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use rusqlite::OptionalExtension;

use courier_core::error::CourierError;

use crate::db::Database;

/// Key-value persistence that survives process restarts.
pub trait DurableStore: Send + Sync {
    /// Read the value stored under `key`, if any.
    fn get(&self, key: &str) -> Result<Option<String>, CourierError>;

    /// Insert or replace the value stored under `key`.
    fn set(&self, key: &str, value: &str) -> Result<(), CourierError>;

    /// Delete `key`. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), CourierError>;
}

/// SQLite-backed store.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    db: Arc<Database>,
}

impl SqliteStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

impl DurableStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>, CourierError> {
        self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT value FROM kv_store WHERE key = ?1",
                rusqlite::params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map_err(|e| CourierError::Storage(format!("Failed to read {}: {}", key, e)))
        })
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CourierError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO kv_store (key, value, updated_at)
                 VALUES (?1, ?2, strftime('%s', 'now'))
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value,
                                                updated_at = excluded.updated_at",
                rusqlite::params![key, value],
            )
            .map_err(|e| CourierError::Storage(format!("Failed to write {}: {}", key, e)))?;
            Ok(())
        })
    }

    fn remove(&self, key: &str) -> Result<(), CourierError> {
        self.db.with_conn(|conn| {
            conn.execute("DELETE FROM kv_store WHERE key = ?1", rusqlite::params![key])
                .map_err(|e| CourierError::Storage(format!("Failed to remove {}: {}", key, e)))?;
            Ok(())
        })
    }
}

/// Process-local store. Contents vanish with the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, CourierError> {
        self.entries
            .lock()
            .map_err(|e| CourierError::Storage(format!("Memory store lock poisoned: {}", e)))
    }
}

impl DurableStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, CourierError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CourierError> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), CourierError> {
        self.lock()?.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sqlite_store() -> SqliteStore {
        SqliteStore::new(Arc::new(Database::in_memory().unwrap()))
    }

    fn exercise(store: &dyn DurableStore) {
        assert_eq!(store.get("queue").unwrap(), None);

        store.set("queue", "[]").unwrap();
        assert_eq!(store.get("queue").unwrap().as_deref(), Some("[]"));

        store.set("queue", r#"[{"id":"1"}]"#).unwrap();
        assert_eq!(store.get("queue").unwrap().as_deref(), Some(r#"[{"id":"1"}]"#));

        store.remove("queue").unwrap();
        assert_eq!(store.get("queue").unwrap(), None);

        // Removing again is a no-op.
        store.remove("queue").unwrap();
    }

    #[test]
    fn test_sqlite_store_get_set_remove() {
        exercise(&sqlite_store());
    }

    #[test]
    fn test_memory_store_get_set_remove() {
        exercise(&MemoryStore::new());
    }

    #[test]
    fn test_sqlite_store_keys_are_independent() {
        let store = sqlite_store();
        store.set("a", "1").unwrap();
        store.set("b", "2").unwrap();
        store.remove("a").unwrap();
        assert_eq!(store.get("b").unwrap().as_deref(), Some("2"));
    }

    #[test]
    fn test_sqlite_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("courier.db");
        {
            let store = SqliteStore::new(Arc::new(Database::new(&path).unwrap()));
            store.set("courier.offline_queue", "[1,2,3]").unwrap();
        }
        let store = SqliteStore::new(Arc::new(Database::new(&path).unwrap()));
        assert_eq!(
            store.get("courier.offline_queue").unwrap().as_deref(),
            Some("[1,2,3]")
        );
    }

    #[test]
    fn test_unicode_values_round_trip() {
        let store = sqlite_store();
        store.set("k", "bonjour \u{00e9}l\u{00e8}ve \u{1f4ec}").unwrap();
        assert_eq!(
            store.get("k").unwrap().as_deref(),
            Some("bonjour \u{00e9}l\u{00e8}ve \u{1f4ec}")
        );
    }
}
