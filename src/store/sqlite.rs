//! Sqlite-backed sample store
//!
//! Lookups open the database read-only; only the write paths open it
//! read-write. One connection per operation keeps the store shareable
//! across worker threads without holding a lock across I/O.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OpenFlags, OptionalExtension};
use tracing::{debug, info};

use crate::error::TriageResult;
use crate::pipeline::record::HistoryEntry;

use super::traits::{SampleStore, StoredRecord};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS sample (
    hash       TEXT PRIMARY KEY,
    data       TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);
CREATE TABLE IF NOT EXISTS sample_history (
    hash      TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    file_name TEXT,
    source    TEXT NOT NULL,
    UNIQUE(hash, file_name, source)
);
CREATE INDEX IF NOT EXISTS idx_sample_history_hash ON sample_history(hash);
";

/// Sample store backed by a local sqlite database
pub struct SqliteStore {
    db_path: PathBuf,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `db_path` and ensure the
    /// schema exists.
    pub fn open(db_path: impl Into<PathBuf>) -> TriageResult<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(&db_path)?;
        conn.execute_batch(SCHEMA)?;
        info!(path = %db_path.display(), "sample database ready");
        Ok(Self { db_path })
    }

    fn read_conn(&self) -> TriageResult<Connection> {
        Ok(Connection::open_with_flags(
            &self.db_path,
            OpenFlags::SQLITE_OPEN_READ_ONLY,
        )?)
    }

    fn write_conn(&self) -> TriageResult<Connection> {
        Ok(Connection::open_with_flags(
            &self.db_path,
            OpenFlags::SQLITE_OPEN_READ_WRITE,
        )?)
    }
}

impl SampleStore for SqliteStore {
    fn get(&self, hash: &str) -> TriageResult<Option<StoredRecord>> {
        let conn = self.read_conn()?;
        let data: Option<String> = conn
            .query_row("SELECT data FROM sample WHERE hash = ?1", [hash], |row| {
                row.get(0)
            })
            .optional()?;
        match data {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn put(&self, hash: &str, record: &StoredRecord) -> TriageResult<()> {
        let json = serde_json::to_string(record)?;
        let conn = self.write_conn()?;
        conn.execute(
            "INSERT INTO sample(hash, data) VALUES(?1, ?2)
             ON CONFLICT(hash) DO UPDATE SET data = excluded.data, updated_at = CURRENT_TIMESTAMP",
            (hash, &json),
        )?;
        debug!(hash, "sample record persisted");
        Ok(())
    }

    fn append_history(&self, hash: &str, entry: &HistoryEntry) -> TriageResult<()> {
        let conn = self.write_conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO sample_history(hash, timestamp, file_name, source)
             VALUES(?1, ?2, ?3, ?4)",
            (hash, &entry.timestamp, &entry.file_name, &entry.source),
        )?;
        Ok(())
    }

    fn history(&self, hash: &str) -> TriageResult<Vec<HistoryEntry>> {
        let conn = self.read_conn()?;
        let mut stmt = conn.prepare(
            "SELECT timestamp, file_name, source FROM sample_history
             WHERE hash = ?1 ORDER BY timestamp, rowid",
        )?;
        let rows = stmt.query_map([hash], |row| {
            Ok(HistoryEntry {
                timestamp: row.get::<_, DateTime<Utc>>(0)?,
                file_name: row.get(1)?,
                source: row.get(2)?,
            })
        })?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn open_store(dir: &TempDir) -> SqliteStore {
        SqliteStore::open(dir.path().join("test.sqlite")).unwrap()
    }

    fn entry(file_name: Option<&str>, source: &str) -> HistoryEntry {
        HistoryEntry {
            timestamp: Utc::now(),
            file_name: file_name.map(str::to_string),
            source: source.to_string(),
        }
    }

    #[test]
    fn test_get_missing_hash() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        assert!(store.get("84de9c61").unwrap().is_none());
    }

    #[test]
    fn test_put_get_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let mut record = StoredRecord::new();
        record.insert("hash".to_string(), json!("84de9c61"));
        record.insert("sha256".to_string(), json!("abcdef"));
        store.put("84de9c61", &record).unwrap();

        let loaded = store.get("84de9c61").unwrap().unwrap();
        assert_eq!(loaded.get("sha256"), Some(&json!("abcdef")));
    }

    #[test]
    fn test_put_upserts() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let mut record = StoredRecord::new();
        record.insert("v".to_string(), json!(1));
        store.put("84de9c61", &record).unwrap();
        record.insert("v".to_string(), json!(2));
        store.put("84de9c61", &record).unwrap();

        let loaded = store.get("84de9c61").unwrap().unwrap();
        assert_eq!(loaded.get("v"), Some(&json!(2)));
    }

    #[test]
    fn test_history_appends_in_order() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        store
            .append_history("84de9c61", &entry(Some("a.bin"), "./a.bin"))
            .unwrap();
        store
            .append_history("84de9c61", &entry(None, "https://example.com/a"))
            .unwrap();

        let history = store.history("84de9c61").unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].source, "./a.bin");
        assert_eq!(history[1].source, "https://example.com/a");
    }

    #[test]
    fn test_history_ignores_duplicate_observation() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        store
            .append_history("84de9c61", &entry(Some("a.bin"), "./a.bin"))
            .unwrap();
        store
            .append_history("84de9c61", &entry(Some("a.bin"), "./a.bin"))
            .unwrap();

        assert_eq!(store.history("84de9c61").unwrap().len(), 1);
    }

    #[test]
    fn test_history_is_per_hash() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        store
            .append_history("84de9c61", &entry(Some("a.bin"), "./a.bin"))
            .unwrap();
        assert!(store.history("0badf00d").unwrap().is_empty());
    }

    #[test]
    fn test_reopen_keeps_data() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.sqlite");
        {
            let store = SqliteStore::open(&path).unwrap();
            let mut record = StoredRecord::new();
            record.insert("v".to_string(), json!(1));
            store.put("84de9c61", &record).unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        assert!(store.get("84de9c61").unwrap().is_some());
    }
}
