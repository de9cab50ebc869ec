//! Push interfaces toward consumers.
//!
//! Both feeds are `tokio::sync::watch` channels: publishing replaces the
//! latest value and never blocks, so a slow or absent subscriber cannot
//! stall the poll or commit cycles, and a consumer that only cares about
//! "now" never has to drain history.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use hvwatch_gateway::GatewayError;
use hvwatch_types::CrateSnapshot;
use tokio::sync::watch;

use crate::committer::CommitError;

/// Receiver side of the snapshot feed. Holds the most recent complete
/// snapshot, or `None` before the first successful poll.
pub type SnapshotReceiver = watch::Receiver<Option<Arc<CrateSnapshot>>>;

/// Receiver side of the error feed. Holds the most recent engine error,
/// or `None` while none has occurred.
pub type ErrorReceiver = watch::Receiver<Option<ErrorEvent>>;

/// Which half of the engine an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    DeviceCommunication,
    PersistenceCommit,
}

/// A structured engine error for status display or alerting.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorEvent {
    pub category: ErrorCategory,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl ErrorEvent {
    /// Wrap a failed poll tick.
    pub fn device(err: &GatewayError) -> Self {
        Self {
            category: ErrorCategory::DeviceCommunication,
            message: err.to_string(),
            at: Utc::now(),
        }
    }

    /// Wrap a failed commit cycle.
    pub fn persistence(err: &CommitError) -> Self {
        Self {
            category: ErrorCategory::PersistenceCommit,
            message: err.to_string(),
            at: Utc::now(),
        }
    }
}

/// The engine's outbound notification channels.
#[derive(Debug)]
pub(crate) struct Feeds {
    snapshot_tx: watch::Sender<Option<Arc<CrateSnapshot>>>,
    error_tx: watch::Sender<Option<ErrorEvent>>,
}

impl Feeds {
    pub(crate) fn new() -> Self {
        let (snapshot_tx, _) = watch::channel(None);
        let (error_tx, _) = watch::channel(None);
        Self {
            snapshot_tx,
            error_tx,
        }
    }

    /// Publish a newly completed snapshot. Fire-and-forget.
    pub(crate) fn publish_snapshot(&self, snapshot: Arc<CrateSnapshot>) {
        self.snapshot_tx.send_replace(Some(snapshot));
    }

    /// Publish an engine error. Fire-and-forget.
    pub(crate) fn publish_error(&self, event: ErrorEvent) {
        self.error_tx.send_replace(Some(event));
    }

    pub(crate) fn subscribe_snapshots(&self) -> SnapshotReceiver {
        self.snapshot_tx.subscribe()
    }

    pub(crate) fn subscribe_errors(&self) -> ErrorReceiver {
        self.error_tx.subscribe()
    }
}
