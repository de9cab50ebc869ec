//! # hvwatch-types
//!
//! Core types for HV crate telemetry. This crate defines the schema shared
//! by the polling engine, the persistence layer, and any presentation
//! consumer: which boards sit in which slots, which parameters are tracked
//! per channel, what a captured snapshot looks like, and how a channel's
//! health band is derived from its readings.
//!
//! ## Design Goals
//!
//! - **Presentation-free**: consumers (dashboards, alerting) depend on this
//!   crate alone, without pulling in the engine or any I/O stack
//! - **Optional serialization**: enable the `serde` feature when snapshots
//!   cross a process boundary
//! - **Validated at construction**: malformed topologies and parameter sets
//!   are rejected when built, never at poll time
//! - **Derived health**: severity bands are a pure function of a reading and
//!   are never stored, so threshold changes need no data migration
//!
//! ## Example
//!
//! ```rust
//! use hvwatch_types::{classify, ParamValue, SeverityBand, Topology};
//!
//! let topology = Topology::from_entries([
//!     (1, "A7030P", 48),
//!     (4, "A7435SN", 24),
//! ])
//! .unwrap();
//!
//! assert_eq!(topology.channels(4), Some(24));
//!
//! // 5 V deviation from setpoint is within the nominal band
//! let health = classify(100.0, 95.0, 1.2);
//! assert_eq!(health.band, SeverityBand::Nominal);
//! ```

mod health;
mod parameter;
mod snapshot;
mod topology;

pub use health::*;
pub use parameter::*;
pub use snapshot::*;
pub use topology::*;
