//! Durable storage for flattened channel readings.
//!
//! The committer hands a store one flat batch of rows - one row per
//! (timestamp, slot, channel) - and expects insert-if-absent semantics on
//! that composite key, so re-submitting a batch after an ambiguous failure
//! is always safe. [`SqliteStore`] is the production sink;
//! [`MemoryStore`] backs tests and demos with the same contract.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use hvwatch_types::ParamValue;
use thiserror::Error;

/// One persisted reading: every tracked parameter of one channel at one
/// capture time. `values` is aligned with the engine's parameter set
/// order.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadingRow {
    pub captured_at: NaiveDateTime,
    pub slot: u16,
    pub channel: u16,
    pub values: Vec<ParamValue>,
}

/// Errors surfaced by a reading store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The store refused or could not accept the batch for a
    /// non-database reason (used by test doubles and the final-flush
    /// path).
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// A durable sink for reading rows.
///
/// `insert_batch` must be all-or-nothing: either every row of the batch
/// is durably committed in one transaction, or none is and the error is
/// returned. Rows whose (timestamp, slot, channel) key already exists are
/// ignored, not errors; the returned count is the number of rows actually
/// inserted, which makes retry idempotency observable in tests.
#[async_trait]
pub trait ReadingStore: Send + Sync {
    async fn insert_batch(&self, rows: &[ReadingRow]) -> Result<u64, StoreError>;
}
