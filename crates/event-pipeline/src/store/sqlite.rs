//! SQLite-backed event store.
//!
//! Rows survive process restarts; the AUTOINCREMENT id doubles as the
//! insertion-order cursor, so ids are never reused after a delete.

use rusqlite::{params, Connection, Row};
use serde_json::Value;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

use super::{EventStore, StoredEventId};
use crate::{EventRecord, StoreError, StoreResult};

const SELECT_COLUMNS: &str = "event_type, timestamp, device_id, session_id, notification_id, \
                              user_id, data, ttl_seconds, retry_count";

/// SQLite storage for pending events.
pub struct SqliteEventStore {
    conn: Mutex<Connection>,
}

impl SqliteEventStore {
    /// Opens a SQLite database at the given path.
    ///
    /// Creates the database and schema if they don't exist.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Self::from_connection(conn)
    }

    /// Creates an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn in_memory() -> StoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

fn init_schema(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS pending_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_type TEXT NOT NULL,
            timestamp INTEGER NOT NULL,
            device_id TEXT NOT NULL,
            session_id TEXT,
            notification_id TEXT,
            user_id TEXT,
            data TEXT,
            ttl_seconds INTEGER NOT NULL,
            retry_count INTEGER NOT NULL DEFAULT 0
        );
        "#,
    )?;
    Ok(())
}

impl EventStore for SqliteEventStore {
    fn insert(&self, record: &EventRecord) -> StoreResult<StoredEventId> {
        let data = record.data().map(serde_json::to_string).transpose()?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO pending_events (event_type, timestamp, device_id, session_id, \
             notification_id, user_id, data, ttl_seconds, retry_count) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                record.event_type(),
                record.timestamp(),
                record.device_id(),
                record.session_id(),
                record.notification_id(),
                record.user_id(),
                data,
                record.ttl_seconds(),
                record.retry_count(),
            ],
        )?;
        let id = StoredEventId(conn.last_insert_rowid());
        debug!(id = %id, event_type = %record.event_type(), "Persisted pending event");
        Ok(id)
    }

    fn pending_ids(&self) -> StoreResult<Vec<StoredEventId>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT id FROM pending_events ORDER BY id")?;
        let rows = stmt.query_map([], |row| row.get::<_, i64>(0).map(StoredEventId))?;

        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }
        Ok(ids)
    }

    fn load(&self, id: StoredEventId) -> StoreResult<Option<EventRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SELECT_COLUMNS} FROM pending_events WHERE id = ?1"
        ))?;
        let mut rows = stmt.query(params![id.0])?;

        match rows.next()? {
            Some(row) => decode_row(id, row).map(Some),
            None => Ok(None),
        }
    }

    fn set_retry_count(&self, id: StoredEventId, retry_count: u32) -> StoreResult<bool> {
        let conn = self.lock()?;
        let affected = conn.execute(
            "UPDATE pending_events SET retry_count = ?1 WHERE id = ?2",
            params![retry_count, id.0],
        )?;
        Ok(affected > 0)
    }

    fn remove(&self, id: StoredEventId) -> StoreResult<bool> {
        let conn = self.lock()?;
        let affected = conn.execute("DELETE FROM pending_events WHERE id = ?1", params![id.0])?;
        Ok(affected > 0)
    }

    fn len(&self) -> StoreResult<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM pending_events", [], |row| {
            row.get(0)
        })?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}

/// Decodes one row. Any column that fails to decode marks the row corrupt.
fn decode_row(id: StoredEventId, row: &Row<'_>) -> StoreResult<EventRecord> {
    let corrupt = |reason: String| StoreError::CorruptRecord { id: id.0, reason };

    let event_type: String = row.get(0).map_err(|e| corrupt(format!("event_type: {e}")))?;
    let timestamp: i64 = row.get(1).map_err(|e| corrupt(format!("timestamp: {e}")))?;
    let device_id: String = row.get(2).map_err(|e| corrupt(format!("device_id: {e}")))?;
    let session_id: Option<String> =
        row.get(3).map_err(|e| corrupt(format!("session_id: {e}")))?;
    let notification_id: Option<String> = row
        .get(4)
        .map_err(|e| corrupt(format!("notification_id: {e}")))?;
    let user_id: Option<String> = row.get(5).map_err(|e| corrupt(format!("user_id: {e}")))?;
    let data: Option<String> = row.get(6).map_err(|e| corrupt(format!("data: {e}")))?;
    let ttl_seconds: i64 = row.get(7).map_err(|e| corrupt(format!("ttl_seconds: {e}")))?;
    let retry_count: i64 = row.get(8).map_err(|e| corrupt(format!("retry_count: {e}")))?;

    if event_type.is_empty() {
        return Err(corrupt("empty event_type".to_string()));
    }
    if device_id.is_empty() {
        return Err(corrupt("empty device_id".to_string()));
    }
    let retry_count =
        u32::try_from(retry_count).map_err(|_| corrupt(format!("retry_count {retry_count}")))?;

    let data = match data {
        None => None,
        Some(text) => match serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(map)) => Some(map),
            Ok(other) => return Err(corrupt(format!("data is not an object: {other}"))),
            Err(e) => return Err(corrupt(format!("data: {e}"))),
        },
    };

    Ok(EventRecord::new(event_type, device_id, timestamp)
        .with_session_id(session_id)
        .with_notification_id(notification_id)
        .with_user_id(user_id)
        .with_data(data)
        .with_ttl_seconds(ttl_seconds)
        .with_retry_count(retry_count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EventData;
    use serde_json::json;
    use tempfile::NamedTempFile;

    fn sample(event_type: &str) -> EventRecord {
        let mut data = EventData::new();
        data.insert("plan".to_string(), json!("pro"));
        EventRecord::new(event_type, "device-1", 1_700_000_000_000)
            .with_session_id(Some("session-1".to_string()))
            .with_data(Some(data))
    }

    #[test]
    fn test_insert_and_load() {
        let store = SqliteEventStore::in_memory().unwrap();
        let record = sample("custom.purchase");

        let id = store.insert(&record).unwrap();
        let loaded = store.load(id).unwrap().unwrap();

        assert_eq!(loaded, record);
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn test_pending_ids_in_insertion_order() {
        let store = SqliteEventStore::in_memory().unwrap();
        let first = store.insert(&sample("custom.a")).unwrap();
        let second = store.insert(&sample("custom.b")).unwrap();
        let third = store.insert(&sample("custom.c")).unwrap();

        assert_eq!(store.pending_ids().unwrap(), vec![first, second, third]);
    }

    #[test]
    fn test_ids_not_reused_after_delete() {
        let store = SqliteEventStore::in_memory().unwrap();
        let first = store.insert(&sample("custom.a")).unwrap();
        assert!(store.remove(first).unwrap());

        let second = store.insert(&sample("custom.b")).unwrap();
        assert!(second > first);
    }

    #[test]
    fn test_set_retry_count_persists() {
        let store = SqliteEventStore::in_memory().unwrap();
        let id = store.insert(&sample("custom.a")).unwrap();

        assert!(store.set_retry_count(id, 3).unwrap());
        assert_eq!(store.load(id).unwrap().unwrap().retry_count(), 3);
    }

    #[test]
    fn test_missing_record() {
        let store = SqliteEventStore::in_memory().unwrap();
        let missing = StoredEventId(42);

        assert!(store.load(missing).unwrap().is_none());
        assert!(!store.set_retry_count(missing, 1).unwrap());
        assert!(!store.remove(missing).unwrap());
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn test_records_survive_reopen() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path();

        let id = {
            let store = SqliteEventStore::open(path).unwrap();
            let id = store.insert(&sample("app.install")).unwrap();
            store.set_retry_count(id, 2).unwrap();
            id
        };

        let store = SqliteEventStore::open(path).unwrap();
        let loaded = store.load(id).unwrap().unwrap();
        assert_eq!(loaded.event_type(), "app.install");
        assert_eq!(loaded.retry_count(), 2);
    }

    #[test]
    fn test_corrupt_data_column_reported() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path();
        let store = SqliteEventStore::open(path).unwrap();

        let raw = Connection::open(path).unwrap();
        raw.execute(
            "INSERT INTO pending_events (event_type, timestamp, device_id, data, ttl_seconds, retry_count) \
             VALUES ('custom.bad', 1, 'device-1', '{not json', 60, 0)",
            [],
        )
        .unwrap();
        let id = StoredEventId(raw.last_insert_rowid());

        let err = store.load(id).unwrap_err();
        assert!(matches!(err, StoreError::CorruptRecord { id: bad, .. } if bad == id.0));
    }

    #[test]
    fn test_negative_retry_count_is_corrupt() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path();
        let store = SqliteEventStore::open(path).unwrap();

        let raw = Connection::open(path).unwrap();
        raw.execute(
            "INSERT INTO pending_events (event_type, timestamp, device_id, ttl_seconds, retry_count) \
             VALUES ('custom.bad', 1, 'device-1', 60, -1)",
            [],
        )
        .unwrap();
        let id = StoredEventId(raw.last_insert_rowid());

        assert!(matches!(
            store.load(id),
            Err(StoreError::CorruptRecord { .. })
        ));
    }
}
