//! Durable store for event records awaiting delivery.
//!
//! The store is the only state shared between the logger (insert) and the
//! flush coordinator (read/update/delete). Implementations serialize every
//! mutation behind a single lock, so a retry-count update is never lost to a
//! concurrent writer.

mod memory;
mod sqlite;

pub use memory::MemoryEventStore;
pub use sqlite::SqliteEventStore;

use crate::{EventRecord, StoreResult};
use std::fmt;

/// Row identifier assigned on insert. Ascending ids give insertion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StoredEventId(pub i64);

impl fmt::Display for StoredEventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Persistent ordered collection of pending event records.
pub trait EventStore: Send + Sync {
    /// Persist a record and return its id.
    fn insert(&self, record: &EventRecord) -> StoreResult<StoredEventId>;

    /// Ids of all pending records, oldest first.
    fn pending_ids(&self) -> StoreResult<Vec<StoredEventId>>;

    /// Load one record.
    ///
    /// Returns `Ok(None)` if the record was removed, and
    /// `StoreError::CorruptRecord` if the row exists but cannot be decoded.
    fn load(&self, id: StoredEventId) -> StoreResult<Option<EventRecord>>;

    /// Persist a new retry count. Returns false if the record no longer exists.
    fn set_retry_count(&self, id: StoredEventId, retry_count: u32) -> StoreResult<bool>;

    /// Delete a record. Returns false if it was already gone.
    fn remove(&self, id: StoredEventId) -> StoreResult<bool>;

    /// Number of pending records.
    fn len(&self) -> StoreResult<usize>;

    /// Whether the store holds no pending records.
    fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }
}
