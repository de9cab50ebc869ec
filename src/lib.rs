//! # hvwatch
//!
//! Telemetry polling and batched-persistence engine for multi-slot HV
//! power-supply crates.
//!
//! The engine continuously samples electrical status (power state,
//! voltages, currents, setpoints) from every channel of every board,
//! keeps the latest snapshot available to consumers with minimal latency,
//! and persists time-stamped snapshots to a relational store on an
//! independent, slower schedule with all-or-nothing batch semantics.
//!
//! ## Architecture
//!
//! ```text
//!                ┌─────────────────────────────────────────────────────┐
//!                │                      Engine                         │
//! DeviceGateway  │  ┌────────┐    ┌────────┐    ┌───────────┐          │
//! (bulk reads) ──┼─▶│ poller │───▶│ buffer │───▶│ committer │──▶ Store │
//!                │  └───┬────┘    └────────┘    └───────────┘          │
//!                │      │ poll timer              commit timer         │
//!                │      ▼                                              │
//!                │  ┌────────┐  snapshot / error feeds                 │
//!                │  │ notify │───────────────────────────▶ consumers   │
//!                │  └────────┘  (dashboards, alerting)                 │
//!                └─────────────────────────────────────────────────────┘
//! ```
//!
//! - **[`poller`]**: one bulk read per (slot, parameter) pair per tick,
//!   so device round trips stay at `#slots x #parameters` regardless of
//!   channel count; a failed or malformed tick is discarded whole
//! - **[`buffer`]**: lock-guarded FIFO staging snapshots between commit
//!   cycles; append and drain are atomic with respect to each other
//! - **[`committer`]**: drains the buffer into a single transactional
//!   batch insert; a failed commit restores the batch for retry
//! - **[`store`]**: the durable sink trait, its SQLite implementation,
//!   and an in-memory double with identical insert-if-absent semantics
//! - **[`notify`]**: watch-channel feeds pushing the latest snapshot and
//!   the latest structured error to any number of subscribers
//! - **[`engine`]**: wires the above to two independent timers and an
//!   orderly shutdown with a bounded final flush
//! - **[`config`]**: startup configuration, validated once, fatal if
//!   malformed
//!
//! Health classification ([`hvwatch_types::classify`]) is derived at
//! consumption time and never persisted, so threshold changes need no
//! data migration.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use hvwatch::engine::Engine;
//! use hvwatch::store::SqliteStore;
//! use hvwatch_gateway::sim::SimCrate;
//! use hvwatch_types::{ParameterSet, Topology};
//!
//! # tokio_test::block_on(async {
//! let topology = Topology::from_entries([(1, "A7030P", 48)])?;
//! let gateway = Arc::new(SimCrate::builder(topology.clone()).build());
//! let store = Arc::new(
//!     SqliteStore::connect("sqlite://hvwatch.db?mode=rwc", ParameterSet::default_set())
//!         .await?,
//! );
//!
//! let engine = Engine::builder(gateway, store, topology)
//!     .poll_interval(Duration::from_secs(1))
//!     .commit_interval(Duration::from_secs(30))
//!     .build();
//!
//! let mut snapshots = engine.subscribe_snapshots();
//! let handle = engine.start();
//!
//! snapshots.changed().await?;
//! if let Some(snapshot) = snapshots.borrow_and_update().clone() {
//!     println!("{} channels captured", snapshot.channel_count());
//! }
//!
//! handle.shutdown(Duration::from_secs(5)).await?;
//! # Ok::<_, Box<dyn std::error::Error>>(())
//! # });
//! ```

pub mod buffer;
pub mod committer;
pub mod config;
pub mod engine;
pub mod notify;
pub mod poller;
pub mod store;

// Re-export main types for convenience
pub use buffer::SnapshotBuffer;
pub use committer::{BatchCommitter, CommitError, CommitOutcome};
pub use config::EngineConfig;
pub use engine::{Engine, EngineBuilder, EngineHandle};
pub use notify::{ErrorCategory, ErrorEvent, ErrorReceiver, SnapshotReceiver};
pub use poller::BulkPoller;
pub use store::{MemoryStore, ReadingRow, ReadingStore, SqliteStore, StoreError};
