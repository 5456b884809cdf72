//! In-memory event store for tests and hosts without a writable disk.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use super::{EventStore, StoredEventId};
use crate::{EventRecord, StoreError, StoreResult};

#[derive(Default)]
struct Inner {
    next_id: i64,
    records: BTreeMap<StoredEventId, EventRecord>,
}

/// Volatile store with the same ordering semantics as the SQLite store.
#[derive(Default)]
pub struct MemoryEventStore {
    inner: Mutex<Inner>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Inner>> {
        self.inner.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

impl EventStore for MemoryEventStore {
    fn insert(&self, record: &EventRecord) -> StoreResult<StoredEventId> {
        let mut inner = self.lock()?;
        inner.next_id += 1;
        let id = StoredEventId(inner.next_id);
        inner.records.insert(id, record.clone());
        Ok(id)
    }

    fn pending_ids(&self) -> StoreResult<Vec<StoredEventId>> {
        Ok(self.lock()?.records.keys().copied().collect())
    }

    fn load(&self, id: StoredEventId) -> StoreResult<Option<EventRecord>> {
        Ok(self.lock()?.records.get(&id).cloned())
    }

    fn set_retry_count(&self, id: StoredEventId, retry_count: u32) -> StoreResult<bool> {
        let mut inner = self.lock()?;
        match inner.records.remove(&id) {
            Some(record) => {
                inner
                    .records
                    .insert(id, record.with_retry_count(retry_count));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn remove(&self, id: StoredEventId) -> StoreResult<bool> {
        Ok(self.lock()?.records.remove(&id).is_some())
    }

    fn len(&self) -> StoreResult<usize> {
        Ok(self.lock()?.records.len())
    }
}
