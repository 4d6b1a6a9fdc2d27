//! Durable row store for readings.
//!
//! Replaces the teacher's in-memory cache (`CacheItem`/`Storage`) with a
//! thin `rusqlite` wrapper over the table the original's `sensor_db.c`
//! maintained: open-or-create, clear-on-start, and a single insert per
//! reading. The atomic row counter mirrors the teacher's own
//! `AtomicU64` bookkeeping style in its cache `Storage`.

use crate::error::StorageError;
use crate::model::Reading;
use rusqlite::Connection;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

const CREATE_TABLE_SQL: &str = "CREATE TABLE sensor_data (\
    id INTEGER PRIMARY KEY AUTOINCREMENT, \
    sensor_id INTEGER NOT NULL, \
    sensor_value REAL NOT NULL, \
    timestamp INTEGER NOT NULL\
)";

/// A single row as read back by [`StorageSink::all_rows`].
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRow {
    pub id: i64,
    pub sensor_id: u16,
    pub sensor_value: f64,
    pub timestamp: i64,
}

/// Sink for durably storing readings. Holds one open connection; SQLite
/// serializes writers internally, so no additional lock is needed around
/// `insert` beyond what `rusqlite::Connection` already requires (`&mut`
/// access, which the storage manager owns exclusively on its own thread).
pub struct StorageSink {
    conn: Connection,
    rows_inserted: AtomicU64,
}

impl StorageSink {
    /// Open (or create) the database at `path` and recreate the table,
    /// matching the original's `init_connection(clear_up_flag = 1)`
    /// clear-on-start semantics.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let conn = Connection::open(path).map_err(|source| StorageError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        conn.execute("DROP TABLE IF EXISTS sensor_data", [])
            .map_err(StorageError::Schema)?;
        conn.execute(CREATE_TABLE_SQL, []).map_err(StorageError::Schema)?;

        Ok(Self {
            conn,
            rows_inserted: AtomicU64::new(0),
        })
    }

    /// In-memory database, for tests.
    #[cfg(test)]
    pub(crate) fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory().map_err(|source| StorageError::Open {
            path: Path::new(":memory:").to_path_buf(),
            source,
        })?;
        conn.execute(CREATE_TABLE_SQL, []).map_err(StorageError::Schema)?;
        Ok(Self {
            conn,
            rows_inserted: AtomicU64::new(0),
        })
    }

    pub fn insert(&self, reading: &Reading) -> Result<(), StorageError> {
        self.conn
            .execute(
                "INSERT INTO sensor_data (sensor_id, sensor_value, timestamp) VALUES (?1, ?2, ?3)",
                rusqlite::params![reading.sensor_id, reading.value, reading.timestamp],
            )
            .map_err(StorageError::Insert)?;
        self.rows_inserted.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn rows_inserted(&self) -> u64 {
        self.rows_inserted.load(Ordering::Relaxed)
    }

    #[cfg(test)]
    fn all_rows(&self) -> Vec<StoredRow> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, sensor_id, sensor_value, timestamp FROM sensor_data ORDER BY id")
            .unwrap();
        stmt.query_map([], |row| {
            Ok(StoredRow {
                id: row.get(0)?,
                sensor_id: row.get(1)?,
                sensor_value: row.get(2)?,
                timestamp: row.get(3)?,
            })
        })
        .unwrap()
        .map(|r| r.unwrap())
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(id: u16, v: f64, ts: i64) -> Reading {
        Reading {
            sensor_id: id,
            value: v,
            timestamp: ts,
        }
    }

    #[test]
    fn insert_then_read_back_in_order() {
        let sink = StorageSink::open_in_memory().unwrap();
        sink.insert(&reading(21, 20.5, 100)).unwrap();
        sink.insert(&reading(21, 21.5, 101)).unwrap();

        let rows = sink.all_rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].sensor_id, 21);
        assert_eq!(rows[0].sensor_value, 20.5);
        assert_eq!(rows[1].timestamp, 101);
        assert_eq!(sink.rows_inserted(), 2);
    }

    #[test]
    fn open_recreates_an_empty_table() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("gateway-storage-test-{}.db", std::process::id()));

        {
            let sink = StorageSink::open(&path).unwrap();
            sink.insert(&reading(1, 1.0, 1)).unwrap();
        }
        {
            // Reopening clears the table, matching clear-on-start semantics.
            let sink = StorageSink::open(&path).unwrap();
            assert_eq!(sink.all_rows().len(), 0);
        }

        std::fs::remove_file(&path).ok();
    }
}
