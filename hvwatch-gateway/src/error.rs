//! Error taxonomy for the device gateway boundary.

use thiserror::Error;

/// Errors that can occur while bulk-reading from the crate.
///
/// Any of these discards the whole poll tick: a malformed single value is
/// treated as grounds for distrusting the entire bulk response, since it
/// usually indicates a link or protocol fault rather than one bad channel.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The device did not answer within the link timeout.
    #[error("device request timed out")]
    Timeout,

    /// The link to the crate is down.
    #[error("link down: {0}")]
    LinkDown(String),

    /// The device answered with something the protocol does not allow
    /// (unknown slot or parameter, misaligned response, framing error).
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// A returned value could not be coerced to the parameter's kind.
    #[error("malformed value for {parameter} on slot {slot} channel {channel}: {detail}")]
    MalformedValue {
        slot: u16,
        channel: u16,
        parameter: String,
        detail: String,
    },
}
