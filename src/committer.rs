//! Batched durable commits on an independent schedule.

use std::sync::Arc;
use std::time::Duration;

use hvwatch_types::{CrateSnapshot, ParameterSet};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::buffer::SnapshotBuffer;
use crate::store::{ReadingRow, ReadingStore, StoreError};

/// Errors from a commit cycle.
#[derive(Debug, Error)]
pub enum CommitError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A buffered reading was missing a tracked parameter. Snapshots from
    /// the poller are complete by construction, so this indicates a bug
    /// upstream; it is surfaced rather than silently persisted short.
    #[error("incomplete reading for slot {slot} channel {channel}: missing {parameter}")]
    IncompleteReading {
        slot: u16,
        channel: u16,
        parameter: String,
    },

    /// The bounded final flush at shutdown did not finish in time.
    #[error("final flush timed out after {0:?}")]
    FlushTimedOut(Duration),
}

/// What a commit cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The drained batch was durably written and the buffer stays empty.
    Committed {
        snapshots: usize,
        rows: usize,
        /// Rows actually inserted; lower than `rows` when a retry
        /// overlaps an earlier partial success.
        inserted: u64,
    },
    /// The buffer was empty; nothing to do.
    Empty,
}

/// Drains the buffer and writes its contents as one all-or-nothing batch.
///
/// One cycle = drain, flatten to one row per (timestamp, slot, channel),
/// single batched insert, single transaction commit. Per-row or per-
/// snapshot commits would leave the store internally inconsistent for a
/// timestamp, so they are structurally impossible here: the store trait
/// only offers whole-batch insertion.
///
/// On failure the drained entries go back to the front of the buffer in
/// their original order - nothing is lost, and the next cycle retries.
/// The store ignores duplicate keys, so a retry that overlaps an
/// ambiguous earlier outcome is safe.
pub struct BatchCommitter {
    buffer: Arc<SnapshotBuffer>,
    store: Arc<dyn ReadingStore>,
    parameters: ParameterSet,
}

impl BatchCommitter {
    pub fn new(
        buffer: Arc<SnapshotBuffer>,
        store: Arc<dyn ReadingStore>,
        parameters: ParameterSet,
    ) -> Self {
        Self {
            buffer,
            store,
            parameters,
        }
    }

    /// Run one commit cycle.
    pub async fn run_cycle(&self) -> Result<CommitOutcome, CommitError> {
        let batch = self.buffer.drain();
        if batch.is_empty() {
            debug!("commit tick found an empty buffer");
            return Ok(CommitOutcome::Empty);
        }

        let rows = match flatten(&batch, &self.parameters) {
            Ok(rows) => rows,
            Err(e) => {
                self.buffer.restore(batch);
                return Err(e);
            }
        };

        info!(
            snapshots = batch.len(),
            rows = rows.len(),
            "committing buffered snapshots"
        );

        match self.store.insert_batch(&rows).await {
            Ok(inserted) => {
                info!(inserted, "database commit successful");
                Ok(CommitOutcome::Committed {
                    snapshots: batch.len(),
                    rows: rows.len(),
                    inserted,
                })
            }
            Err(e) => {
                warn!(error = %e, snapshots = batch.len(), "commit failed, batch returned to buffer");
                self.buffer.restore(batch);
                Err(e.into())
            }
        }
    }
}

/// Flatten buffered snapshots into store rows, values in parameter-set
/// order.
fn flatten(
    batch: &[Arc<CrateSnapshot>],
    parameters: &ParameterSet,
) -> Result<Vec<ReadingRow>, CommitError> {
    let mut rows = Vec::new();
    for snapshot in batch {
        for (slot, channel, reading) in snapshot.iter() {
            let values = parameters
                .iter()
                .map(|p| {
                    reading
                        .get(p.name())
                        .ok_or_else(|| CommitError::IncompleteReading {
                            slot,
                            channel,
                            parameter: p.name().to_string(),
                        })
                })
                .collect::<Result<Vec<_>, _>>()?;
            rows.push(ReadingRow {
                captured_at: snapshot.captured_at,
                slot,
                channel,
                values,
            });
        }
    }
    Ok(rows)
}
