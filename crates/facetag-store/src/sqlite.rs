//! Embedded single-file backend.

use crate::records::{FeatureRecord, FeatureSet};
use crate::{FeatureStore, StoreError};
use rusqlite::types::ValueRef;
use rusqlite::{params, Connection, OpenFlags};
use std::path::Path;

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS features (
    id      INTEGER PRIMARY KEY AUTOINCREMENT,
    name    VARCHAR(32),
    feature BLOB
);";

/// Feature store backed by a SQLite database file.
pub struct SqliteStore {
    conn: Connection,
    set: FeatureSet,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and load every valid row.
    pub fn open(path: impl AsRef<Path>, feature_len: usize) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        tracing::info!(path = %path.display(), "opened sqlite feature store");
        Self::bootstrap(conn, feature_len)
    }

    /// A private, non-persistent store. Useful for tests and dry runs.
    pub fn open_in_memory(feature_len: usize) -> Result<Self, StoreError> {
        Self::bootstrap(Connection::open_in_memory()?, feature_len)
    }

    /// Open an existing database for inspection, creating nothing.
    ///
    /// A missing file is an error; a database without the `features` table
    /// reads as empty. Every `add` on the result fails.
    pub fn open_read_only(path: impl AsRef<Path>, feature_len: usize) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        tracing::info!(path = %path.display(), "opened sqlite feature store read-only");

        let has_table: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'features')",
            [],
            |row| row.get(0),
        )?;
        let mut set = FeatureSet::new(feature_len);
        if has_table {
            load_rows(&conn, &mut set)?;
        }
        set.log_loaded("sqlite");

        Ok(Self { conn, set })
    }

    fn bootstrap(conn: Connection, feature_len: usize) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA_SQL)?;

        let mut set = FeatureSet::new(feature_len);
        load_rows(&conn, &mut set)?;
        set.log_loaded("sqlite");

        Ok(Self { conn, set })
    }
}

fn load_rows(conn: &Connection, set: &mut FeatureSet) -> Result<(), StoreError> {
    let mut stmt = conn.prepare("SELECT id, name, feature FROM features ORDER BY id")?;
    let mut rows = stmt.query([])?;

    while let Some(row) = rows.next()? {
        let id: i64 = row.get(0)?;
        let name = match row.get_ref(1)? {
            ValueRef::Text(text) => std::str::from_utf8(text).ok().map(str::to_owned),
            _ => None,
        };
        let feature = match row.get_ref(2)? {
            ValueRef::Blob(blob) => Some(blob.to_vec()),
            _ => None,
        };
        set.load_row(id, name, feature);
    }

    Ok(())
}

impl FeatureStore for SqliteStore {
    fn add(&mut self, name: &str, feature: Vec<u8>) -> Result<(), StoreError> {
        self.set.check(name, &feature)?;

        if let Err(e) = self.conn.execute(
            "INSERT INTO features (name, feature) VALUES (?1, ?2)",
            params![name, feature],
        ) {
            tracing::warn!(name, error = %e, "failed to insert feature");
            return Err(e.into());
        }

        self.set.push(name, feature);
        Ok(())
    }

    fn features(&self) -> &[FeatureRecord] {
        self.set.records()
    }

    fn feature_len(&self) -> usize {
        self.set.feature_len()
    }

    fn backend(&self) -> &'static str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const LEN: usize = 8;

    fn feature(tag: u8) -> Vec<u8> {
        vec![tag; LEN]
    }

    fn names(store: &dyn FeatureStore) -> Vec<&str> {
        store.features().iter().map(|r| r.name.as_str()).collect()
    }

    #[test]
    fn test_add_appends_in_order() {
        let mut store = SqliteStore::open_in_memory(LEN).unwrap();
        assert!(store.features().is_empty());

        store.add("alice", feature(1)).unwrap();
        store.add("bob", feature(2)).unwrap();
        store.add("alice", feature(3)).unwrap();

        assert_eq!(names(&store), ["alice", "bob", "alice"]);
        assert_eq!(store.features()[2].feature, feature(3));
        assert_eq!(store.backend(), "sqlite");
    }

    #[test]
    fn test_add_empty_feature_never_reaches_table() {
        let mut store = SqliteStore::open_in_memory(LEN).unwrap();
        let err = store.add("alice", Vec::new()).unwrap_err();
        assert!(matches!(err, StoreError::EmptyFeature));
        assert!(store.features().is_empty());

        let rows: i64 = store
            .conn
            .query_row("SELECT COUNT(*) FROM features", [], |r| r.get(0))
            .unwrap();
        assert_eq!(rows, 0);
    }

    #[test]
    fn test_add_wrong_length_rejected() {
        let mut store = SqliteStore::open_in_memory(LEN).unwrap();
        assert!(store.add("alice", vec![1; LEN + 1]).is_err());
        assert!(store.features().is_empty());
    }

    #[test]
    fn test_failed_insert_leaves_memory_untouched() {
        let mut store = SqliteStore::open_in_memory(LEN).unwrap();
        store.add("alice", feature(1)).unwrap();

        store.conn.execute_batch("DROP TABLE features").unwrap();
        let err = store.add("bob", feature(2)).unwrap_err();
        assert!(matches!(err, StoreError::Sqlite(_)));
        assert!(!err.is_rejected());
        assert_eq!(names(&store), ["alice"]);

        // Retry once the table is back.
        store.conn.execute_batch(SCHEMA_SQL).unwrap();
        store.add("bob", feature(2)).unwrap();
        assert_eq!(names(&store), ["alice", "bob"]);
    }

    #[test]
    fn test_reopen_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("faces.db");

        {
            let mut store = SqliteStore::open(&path, LEN).unwrap();
            store.add("alice", feature(1)).unwrap();
            store.add("bob", feature(2)).unwrap();
        }

        let store = SqliteStore::open(&path, LEN).unwrap();
        assert_eq!(names(&store), ["alice", "bob"]);
        assert_eq!(store.features()[1].feature, feature(2));
    }

    #[test]
    fn test_schema_bootstrap_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("faces.db");
        for _ in 0..3 {
            SqliteStore::open(&path, LEN).unwrap();
        }
    }

    #[test]
    fn test_malformed_rows_skipped_on_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("faces.db");

        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(SCHEMA_SQL).unwrap();
            let insert = "INSERT INTO features (name, feature) VALUES (?1, ?2)";
            conn.execute(insert, params!["alice", feature(1)]).unwrap();
            conn.execute(insert, params!["short", vec![9u8; LEN - 1]]).unwrap();
            conn.execute(insert, params!["", feature(3)]).unwrap();
            conn.execute(insert, params![Option::<String>::None, feature(4)])
                .unwrap();
            conn.execute(insert, params!["text", "not a blob"]).unwrap();
            conn.execute(insert, params!["bob", feature(5)]).unwrap();
        }

        let store = SqliteStore::open(&path, LEN).unwrap();
        assert_eq!(names(&store), ["alice", "bob"]);
    }

    #[test]
    fn test_feature_len_is_per_store() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("faces.db");
        {
            let mut store = SqliteStore::open(&path, LEN).unwrap();
            store.add("alice", feature(1)).unwrap();
        }

        // Same table, different engine: rows of the old length are filtered out.
        let store = SqliteStore::open(&path, LEN * 2).unwrap();
        assert!(store.features().is_empty());
        assert_eq!(store.feature_len(), LEN * 2);
    }

    #[test]
    fn test_open_fails_on_unusable_path() {
        let dir = TempDir::new().unwrap();
        // A directory cannot be opened as a database file.
        assert!(SqliteStore::open(dir.path(), LEN).is_err());
    }

    #[test]
    fn test_read_only_open_creates_nothing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("faces.db");

        assert!(matches!(
            SqliteStore::open_read_only(&path, LEN),
            Err(StoreError::Sqlite(_))
        ));
        assert!(!path.exists());
        assert!(!dir.path().join("nested").exists());
    }

    #[test]
    fn test_read_only_open_loads_rows_and_refuses_writes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("faces.db");
        {
            let mut store = SqliteStore::open(&path, LEN).unwrap();
            store.add("alice", feature(1)).unwrap();
        }

        let mut store = SqliteStore::open_read_only(&path, LEN).unwrap();
        assert_eq!(names(&store), ["alice"]);

        let err = store.add("bob", feature(2)).unwrap_err();
        assert!(matches!(err, StoreError::Sqlite(_)));
        assert_eq!(names(&store), ["alice"]);
        drop(store);

        assert_eq!(names(&SqliteStore::open(&path, LEN).unwrap()), ["alice"]);
    }

    #[test]
    fn test_read_only_open_without_table_is_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("other.db");
        Connection::open(&path)
            .unwrap()
            .execute_batch("CREATE TABLE unrelated (x INTEGER);")
            .unwrap();

        let store = SqliteStore::open_read_only(&path, LEN).unwrap();
        assert!(store.features().is_empty());

        let tables: i64 = Connection::open(&path)
            .unwrap()
            .query_row("SELECT COUNT(*) FROM sqlite_master WHERE name = 'features'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(tables, 0);
    }
}
