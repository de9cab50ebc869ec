//! The telemetry engine: two periodic tasks around one shared buffer.

use std::sync::Arc;
use std::time::Duration;

use hvwatch_gateway::DeviceGateway;
use hvwatch_types::{ParameterSet, Topology};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::buffer::SnapshotBuffer;
use crate::committer::{BatchCommitter, CommitError, CommitOutcome};
use crate::notify::{ErrorEvent, ErrorReceiver, Feeds, SnapshotReceiver};
use crate::poller::BulkPoller;
use crate::store::ReadingStore;

/// The polling and batched-persistence engine.
///
/// Two independent timers drive the engine once started: a fast poll tick
/// that captures a snapshot, buffers it, and pushes it to subscribers,
/// and a slower commit tick that drains the buffer into the durable
/// store. The timers never block each other; their only shared state is
/// the lock-guarded buffer.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use std::time::Duration;
/// use hvwatch::engine::Engine;
/// use hvwatch::store::MemoryStore;
/// use hvwatch_gateway::sim::SimCrate;
/// use hvwatch_types::Topology;
///
/// # tokio_test::block_on(async {
/// let topology = Topology::from_entries([(1, "A7030P", 48)]).unwrap();
/// let gateway = Arc::new(SimCrate::builder(topology.clone()).build());
/// let store = Arc::new(MemoryStore::new());
///
/// let engine = Engine::builder(gateway, store, topology)
///     .poll_interval(Duration::from_secs(1))
///     .commit_interval(Duration::from_secs(30))
///     .build();
///
/// let mut snapshots = engine.subscribe_snapshots();
/// let handle = engine.start();
///
/// // ... later ...
/// let _ = handle.shutdown(Duration::from_secs(5)).await;
/// # });
/// ```
pub struct Engine {
    poller: Arc<BulkPoller>,
    committer: Arc<BatchCommitter>,
    buffer: Arc<SnapshotBuffer>,
    feeds: Arc<Feeds>,
    poll_interval: Duration,
    commit_interval: Duration,
}

impl Engine {
    /// Create a builder from the engine's three collaborators.
    pub fn builder(
        gateway: Arc<dyn DeviceGateway>,
        store: Arc<dyn ReadingStore>,
        topology: Topology,
    ) -> EngineBuilder {
        EngineBuilder {
            gateway,
            store,
            topology,
            parameters: ParameterSet::default_set(),
            poll_interval: Duration::from_secs(1),
            commit_interval: Duration::from_secs(30),
        }
    }

    /// Subscribe to the latest-snapshot feed.
    pub fn subscribe_snapshots(&self) -> SnapshotReceiver {
        self.feeds.subscribe_snapshots()
    }

    /// Subscribe to the latest-error feed.
    pub fn subscribe_errors(&self) -> ErrorReceiver {
        self.feeds.subscribe_errors()
    }

    /// Snapshots currently waiting for the next commit cycle.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Start the poll and commit timers.
    ///
    /// Both timers fire one full interval after start (not immediately)
    /// and skip rather than queue when a slow tick overruns: at most one
    /// poll and one commit are ever in flight.
    pub fn start(&self) -> EngineHandle {
        let (stop_tx, stop_rx) = watch::channel(false);

        let poll_task = {
            let poller = self.poller.clone();
            let buffer = self.buffer.clone();
            let feeds = self.feeds.clone();
            let interval = self.poll_interval;
            let mut stop_rx = stop_rx.clone();
            tokio::spawn(async move {
                let mut ticker =
                    time::interval_at(time::Instant::now() + interval, interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            match poller.poll().await {
                                Ok(snapshot) => {
                                    let snapshot = Arc::new(snapshot);
                                    buffer.append(snapshot.clone());
                                    feeds.publish_snapshot(snapshot);
                                }
                                Err(e) => {
                                    warn!(error = %e, "poll tick failed, no snapshot produced");
                                    feeds.publish_error(ErrorEvent::device(&e));
                                }
                            }
                        }
                        changed = stop_rx.changed() => {
                            // A dropped handle counts as a stop signal.
                            if changed.is_err() || *stop_rx.borrow() {
                                break;
                            }
                        }
                    }
                }
                debug!("poll loop stopped");
            })
        };

        let commit_task = {
            let committer = self.committer.clone();
            let feeds = self.feeds.clone();
            let interval = self.commit_interval;
            let mut stop_rx = stop_rx;
            tokio::spawn(async move {
                let mut ticker =
                    time::interval_at(time::Instant::now() + interval, interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            if let Err(e) = committer.run_cycle().await {
                                feeds.publish_error(ErrorEvent::persistence(&e));
                            }
                        }
                        changed = stop_rx.changed() => {
                            if changed.is_err() || *stop_rx.borrow() {
                                break;
                            }
                        }
                    }
                }
                debug!("commit loop stopped");
            })
        };

        info!(
            poll_interval = ?self.poll_interval,
            commit_interval = ?self.commit_interval,
            "engine started"
        );

        EngineHandle {
            stop_tx,
            poll_task,
            commit_task,
            committer: self.committer.clone(),
        }
    }
}

/// Builder for [`Engine`].
pub struct EngineBuilder {
    gateway: Arc<dyn DeviceGateway>,
    store: Arc<dyn ReadingStore>,
    topology: Topology,
    parameters: ParameterSet,
    poll_interval: Duration,
    commit_interval: Duration,
}

impl EngineBuilder {
    /// Override the tracked parameter set (default: the standard seven).
    pub fn parameters(mut self, parameters: ParameterSet) -> Self {
        self.parameters = parameters;
        self
    }

    /// Interval between poll ticks (default 1 s, must be non-zero).
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Interval between commit cycles (default 30 s, must be non-zero).
    pub fn commit_interval(mut self, interval: Duration) -> Self {
        self.commit_interval = interval;
        self
    }

    /// Build the engine.
    pub fn build(self) -> Engine {
        let buffer = Arc::new(SnapshotBuffer::new());
        let poller = Arc::new(BulkPoller::new(
            self.gateway,
            self.topology,
            self.parameters.clone(),
        ));
        let committer = Arc::new(BatchCommitter::new(
            buffer.clone(),
            self.store,
            self.parameters,
        ));
        Engine {
            poller,
            committer,
            buffer,
            feeds: Arc::new(Feeds::new()),
            poll_interval: self.poll_interval,
            commit_interval: self.commit_interval,
        }
    }
}

/// Handle to a running engine.
///
/// Dropping the handle stops both timers without flushing; call
/// [`EngineHandle::shutdown`] for an orderly stop with a bounded final
/// flush.
pub struct EngineHandle {
    stop_tx: watch::Sender<bool>,
    poll_task: JoinHandle<()>,
    commit_task: JoinHandle<()>,
    committer: Arc<BatchCommitter>,
}

impl EngineHandle {
    /// Signal both timers to stop without waiting.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    /// Stop both timers, wait up to `wait` for each task to wind down
    /// (forcing teardown after that), then attempt one final flush of the
    /// buffer, also bounded by `wait`.
    ///
    /// A failed or timed-out final flush is reported through the returned
    /// error; the caller is expected to exit regardless rather than hang
    /// on an unreachable store.
    pub async fn shutdown(mut self, wait: Duration) -> Result<CommitOutcome, CommitError> {
        let _ = self.stop_tx.send(true);

        for task in [&mut self.poll_task, &mut self.commit_task] {
            if time::timeout(wait, &mut *task).await.is_err() {
                warn!("engine task did not stop in time, aborting it");
                task.abort();
            }
        }

        info!("final flush before shutdown");
        match time::timeout(wait, self.committer.run_cycle()).await {
            Ok(result) => result,
            Err(_) => Err(CommitError::FlushTimedOut(wait)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::ErrorCategory;
    use crate::store::MemoryStore;
    use hvwatch_gateway::sim::SimCrate;
    use hvwatch_types::Parameter;

    const FAR: Duration = Duration::from_secs(3600);

    fn topology() -> Topology {
        Topology::from_entries([(1, "A7030P", 4)]).unwrap()
    }

    fn params() -> ParameterSet {
        ParameterSet::new(vec![
            Parameter::flag("Pw", "power"),
            Parameter::analog("VMon", "vmon"),
        ])
        .unwrap()
    }

    fn build(
        gateway: Arc<SimCrate>,
        store: Arc<MemoryStore>,
        poll: Duration,
        commit: Duration,
    ) -> Engine {
        Engine::builder(gateway, store, topology())
            .parameters(params())
            .poll_interval(poll)
            .commit_interval(commit)
            .build()
    }

    /// Let spawned tasks run between virtual-time jumps.
    async fn settle() {
        for _ in 0..50 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn poll_ticks_buffer_and_publish() {
        let gateway = Arc::new(SimCrate::builder(topology()).build());
        let store = Arc::new(MemoryStore::new());
        let engine = build(gateway, store.clone(), Duration::from_secs(1), FAR);

        let mut snapshots = engine.subscribe_snapshots();
        let handle = engine.start();
        settle().await;
        assert_eq!(engine.buffered(), 0);

        for expected in 1usize..=3 {
            time::advance(Duration::from_secs(1)).await;
            settle().await;
            assert_eq!(engine.buffered(), expected);
        }

        let latest = snapshots.borrow_and_update().clone().unwrap();
        assert_eq!(latest.channel_count(), 4);
        // Nothing commits until the commit timer fires.
        assert_eq!(store.row_count(), 0);

        handle.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn failed_poll_appends_nothing_and_publishes_the_error() {
        let gateway = Arc::new(SimCrate::builder(topology()).build());
        gateway.set_link_down(true);
        let store = Arc::new(MemoryStore::new());
        let engine = build(gateway, store, Duration::from_secs(1), FAR);

        let snapshots = engine.subscribe_snapshots();
        let errors = engine.subscribe_errors();
        let handle = engine.start();

        time::advance(Duration::from_secs(1)).await;
        settle().await;

        assert_eq!(engine.buffered(), 0);
        assert!(snapshots.borrow().is_none());
        let event = errors.borrow().clone().unwrap();
        assert_eq!(event.category, ErrorCategory::DeviceCommunication);

        handle.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn commit_tick_drains_the_buffer_into_the_store() {
        let gateway = Arc::new(SimCrate::builder(topology()).build());
        let store = Arc::new(MemoryStore::new());
        let engine = build(gateway, store.clone(), FAR, Duration::from_secs(10));

        // Seed the buffer directly; the poll timer is parked far away.
        engine.buffer.append(Arc::new(sample_snapshot(0)));
        engine.buffer.append(Arc::new(sample_snapshot(1)));

        let handle = engine.start();
        time::advance(Duration::from_secs(10)).await;
        settle().await;

        assert_eq!(engine.buffered(), 0);
        assert_eq!(store.row_count(), 4);

        handle.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn failed_commit_keeps_the_batch_and_retries_next_tick() {
        let gateway = Arc::new(SimCrate::builder(topology()).build());
        let store = Arc::new(MemoryStore::new());
        let engine = build(gateway, store.clone(), FAR, Duration::from_secs(10));
        let errors = engine.subscribe_errors();

        engine.buffer.append(Arc::new(sample_snapshot(0)));
        store.set_unavailable("connection refused");

        let handle = engine.start();
        time::advance(Duration::from_secs(10)).await;
        settle().await;

        assert_eq!(engine.buffered(), 1);
        assert_eq!(store.row_count(), 0);
        let event = errors.borrow().clone().unwrap();
        assert_eq!(event.category, ErrorCategory::PersistenceCommit);

        store.set_available();
        time::advance(Duration::from_secs(10)).await;
        settle().await;

        assert_eq!(engine.buffered(), 0);
        assert_eq!(store.row_count(), 2);

        handle.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_flushes_remaining_snapshots() {
        let gateway = Arc::new(SimCrate::builder(topology()).build());
        let store = Arc::new(MemoryStore::new());
        let engine = build(gateway, store.clone(), FAR, FAR);

        engine.buffer.append(Arc::new(sample_snapshot(0)));

        let handle = engine.start();
        settle().await;

        let outcome = handle.shutdown(Duration::from_secs(5)).await.unwrap();
        assert!(matches!(
            outcome,
            CommitOutcome::Committed { snapshots: 1, .. }
        ));
        assert_eq!(store.row_count(), 2);
        assert_eq!(engine.buffered(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_reports_a_failed_final_flush_and_returns() {
        let gateway = Arc::new(SimCrate::builder(topology()).build());
        let store = Arc::new(MemoryStore::new());
        let engine = build(gateway, store.clone(), FAR, FAR);

        engine.buffer.append(Arc::new(sample_snapshot(0)));
        store.set_unavailable("store is gone");

        let handle = engine.start();
        settle().await;

        let err = handle.shutdown(Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, CommitError::Store(_)));
        // Data survives in the buffer even though the process will exit.
        assert_eq!(engine.buffered(), 1);
    }

    fn sample_snapshot(second: u32) -> hvwatch_types::CrateSnapshot {
        use chrono::NaiveDate;
        use hvwatch_types::{ChannelReading, CrateSnapshot, ParamValue};

        let ts = NaiveDate::from_ymd_opt(2025, 3, 14)
            .unwrap()
            .and_hms_opt(9, 0, second)
            .unwrap();
        let mut snapshot = CrateSnapshot::at(ts);
        for ch in 0..2 {
            let mut reading = ChannelReading::new();
            reading.insert("Pw", ParamValue::Int(1));
            reading.insert("VMon", ParamValue::Float(1500.0));
            snapshot.insert_reading(1, ch, reading);
        }
        snapshot
    }
}
