//! In-memory reading store for tests and demos.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use hvwatch_types::ParamValue;
use parking_lot::Mutex;

use super::{ReadingRow, ReadingStore, StoreError};

/// A [`ReadingStore`] backed by a map keyed on (timestamp, slot, channel),
/// with the same insert-if-absent semantics as the SQLite sink.
///
/// `set_unavailable` turns every insert into a failure, which is how the
/// committer's recovery path is exercised without a database.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: Mutex<BTreeMap<(NaiveDateTime, u16, u16), Vec<ParamValue>>>,
    unavailable: Mutex<Option<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent insert fail with the given message, until
    /// cleared with [`MemoryStore::set_available`].
    pub fn set_unavailable(&self, reason: impl Into<String>) {
        *self.unavailable.lock() = Some(reason.into());
    }

    /// Let inserts succeed again.
    pub fn set_available(&self) {
        *self.unavailable.lock() = None;
    }

    /// Number of stored rows.
    pub fn row_count(&self) -> usize {
        self.rows.lock().len()
    }

    /// True if a row exists for the given key.
    pub fn contains(&self, captured_at: NaiveDateTime, slot: u16, channel: u16) -> bool {
        self.rows.lock().contains_key(&(captured_at, slot, channel))
    }
}

#[async_trait]
impl ReadingStore for MemoryStore {
    async fn insert_batch(&self, rows: &[ReadingRow]) -> Result<u64, StoreError> {
        if let Some(reason) = self.unavailable.lock().clone() {
            return Err(StoreError::Unavailable(reason));
        }

        let mut stored = self.rows.lock();
        let mut inserted = 0;
        for row in rows {
            stored
                .entry((row.captured_at, row.slot, row.channel))
                .or_insert_with(|| {
                    inserted += 1;
                    row.values.clone()
                });
        }
        Ok(inserted)
    }
}
