//! In-memory staging for snapshots between commit cycles.

use std::collections::VecDeque;
use std::sync::Arc;

use hvwatch_types::CrateSnapshot;
use parking_lot::Mutex;

/// FIFO of snapshots awaiting durable commit.
///
/// `append` and `drain` are mutually exclusive through one lock, which is
/// the whole correctness story: the committer never observes a buffer
/// mutated mid-read, and the poller never waits on a commit in progress -
/// only on the microsecond-scale lock hand-off. Entries appended while a
/// drained batch is being committed simply belong to the next cycle.
#[derive(Debug, Default)]
pub struct SnapshotBuffer {
    entries: Mutex<VecDeque<Arc<CrateSnapshot>>>,
}

impl SnapshotBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one snapshot. O(1), never blocks the poller on I/O, never
    /// fails.
    pub fn append(&self, snapshot: Arc<CrateSnapshot>) {
        self.entries.lock().push_back(snapshot);
    }

    /// Atomically remove and return every entry present at call time, in
    /// append order.
    pub fn drain(&self) -> Vec<Arc<CrateSnapshot>> {
        let mut entries = self.entries.lock();
        entries.drain(..).collect()
    }

    /// Put a failed commit's entries back at the front, preserving their
    /// original order ahead of anything appended since the drain.
    pub fn restore(&self, batch: Vec<Arc<CrateSnapshot>>) {
        let mut entries = self.entries.lock();
        for snapshot in batch.into_iter().rev() {
            entries.push_front(snapshot);
        }
    }

    /// Number of queued snapshots.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// True if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
