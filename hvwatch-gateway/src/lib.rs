//! # hvwatch-gateway
//!
//! The device gateway boundary for HV crate telemetry.
//!
//! The polling engine talks to hardware through exactly one operation: a
//! per-slot bulk read of one parameter for a list of channels. This crate
//! defines that operation as the [`DeviceGateway`] trait, the typed
//! [`GatewayError`] taxonomy shared by every implementation, and - behind
//! the `sim` feature - a deterministic simulated crate for running the
//! engine without hardware.
//!
//! Connection establishment and the wire protocol itself belong to each
//! implementation; the engine only sees this trait.
//!
//! ## Quick Start (simulated crate)
//!
//! ```rust,no_run
//! use hvwatch_gateway::{sim::SimCrate, DeviceGateway};
//! use hvwatch_types::Topology;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let topology = Topology::from_entries([(1, "A7030P", 48)])?;
//!     let gateway = SimCrate::builder(topology)
//!         .target_voltage(1500.0)
//!         .build();
//!
//!     let values = gateway.read_param(1, &[0, 1, 2], "VMon").await?;
//!     assert_eq!(values.len(), 3);
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use hvwatch_types::RawValue;

pub mod error;

#[cfg(feature = "sim")]
pub mod sim;

pub use error::GatewayError;

/// The sole I/O boundary between the engine and the crate hardware.
///
/// One call reads one named parameter for many channels of one slot; the
/// returned values are aligned index-for-index with `channels`. Keeping
/// the granularity at (slot, parameter) bounds device round-trips per poll
/// tick to `#slots x #parameters`, independent of channel count.
#[async_trait]
pub trait DeviceGateway: Send + Sync {
    /// Bulk-read `parameter` for the given channels of `slot`.
    ///
    /// Implementations must either return exactly one value per requested
    /// channel, in request order, or fail the whole call. Values are raw;
    /// normalization to the parameter's kind happens in the poller.
    async fn read_param(
        &self,
        slot: u16,
        channels: &[u16],
        parameter: &str,
    ) -> Result<Vec<RawValue>, GatewayError>;
}
