//! Crate topology - which board sits in which slot.

use std::collections::BTreeMap;

use thiserror::Error;

/// A board installed in one crate slot.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Board {
    /// Manufacturer model name (e.g. "A7030P").
    pub model: String,
    /// Number of output channels on the board. Channel ids are zero-based
    /// and contiguous in `[0, channels)`.
    pub channels: u16,
}

impl Board {
    /// Create a board description.
    pub fn new(model: impl Into<String>, channels: u16) -> Self {
        Self {
            model: model.into(),
            channels,
        }
    }
}

/// Errors rejected when constructing a [`Topology`].
///
/// All of these are startup-time configuration faults; a constructed
/// topology is immutable and cannot fail at poll time.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TopologyError {
    /// The topology describes no slots at all.
    #[error("topology contains no slots")]
    Empty,

    /// A board was declared with zero channels.
    #[error("slot {slot} declares zero channels")]
    ZeroChannels { slot: u16 },

    /// The same slot id appeared more than once.
    #[error("slot {slot} declared more than once")]
    DuplicateSlot { slot: u16 },
}

/// Static description of the crate: a read-only mapping from slot id to
/// the board installed there.
///
/// Loaded once at startup and immutable for the process lifetime. Every
/// other component (poller, store, consumers) treats this as the single
/// source of truth for which (slot, channel) pairs exist.
///
/// # Example
///
/// ```rust
/// use hvwatch_types::Topology;
///
/// let topology = Topology::from_entries([
///     (1, "A7030P", 48),
///     (4, "A7435SN", 24),
///     (8, "A7435SN", 24),
/// ])
/// .unwrap();
///
/// assert_eq!(topology.len(), 3);
/// assert_eq!(topology.channels(1), Some(48));
/// assert_eq!(topology.total_channels(), 96);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    slots: BTreeMap<u16, Board>,
}

impl Topology {
    /// Build a topology from (slot, model, channel count) entries.
    ///
    /// Fails fast on an empty topology, a zero-channel board, or a slot id
    /// declared twice.
    pub fn from_entries<I, S>(entries: I) -> Result<Self, TopologyError>
    where
        I: IntoIterator<Item = (u16, S, u16)>,
        S: Into<String>,
    {
        let mut slots = BTreeMap::new();
        for (slot, model, channels) in entries {
            if channels == 0 {
                return Err(TopologyError::ZeroChannels { slot });
            }
            if slots.insert(slot, Board::new(model, channels)).is_some() {
                return Err(TopologyError::DuplicateSlot { slot });
            }
        }
        if slots.is_empty() {
            return Err(TopologyError::Empty);
        }
        Ok(Self { slots })
    }

    /// Iterate over slot ids in ascending order.
    pub fn slots(&self) -> impl Iterator<Item = u16> + '_ {
        self.slots.keys().copied()
    }

    /// The board installed in `slot`, if any.
    pub fn board(&self, slot: u16) -> Option<&Board> {
        self.slots.get(&slot)
    }

    /// Channel count of the board in `slot`, if any.
    pub fn channels(&self, slot: u16) -> Option<u16> {
        self.slots.get(&slot).map(|b| b.channels)
    }

    /// The contiguous channel id list `[0, channels)` for `slot`.
    ///
    /// This is the list handed to the device gateway for a bulk read.
    pub fn channel_ids(&self, slot: u16) -> Option<Vec<u16>> {
        self.channels(slot).map(|n| (0..n).collect())
    }

    /// Number of populated slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True if the topology has no slots (unreachable via `from_entries`).
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Total channel count across all slots.
    pub fn total_channels(&self) -> usize {
        self.slots.values().map(|b| b.channels as usize).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_from_entries() {
        let topology =
            Topology::from_entries([(1, "A7030P", 48), (4, "A7435SN", 24)]).unwrap();

        assert_eq!(topology.len(), 2);
        assert_eq!(topology.board(1).unwrap().model, "A7030P");
        assert_eq!(topology.channels(4), Some(24));
        assert_eq!(topology.channels(2), None);
        assert_eq!(topology.total_channels(), 72);
    }

    #[test]
    fn slots_iterate_in_ascending_order() {
        let topology =
            Topology::from_entries([(8, "A7435SN", 24), (1, "A7030P", 48)]).unwrap();

        let slots: Vec<u16> = topology.slots().collect();
        assert_eq!(slots, vec![1, 8]);
    }

    #[test]
    fn channel_ids_are_zero_based_and_contiguous() {
        let topology = Topology::from_entries([(4, "A7435SN", 4)]).unwrap();
        assert_eq!(topology.channel_ids(4), Some(vec![0, 1, 2, 3]));
        assert_eq!(topology.channel_ids(5), None);
    }

    #[test]
    fn rejects_zero_channel_board() {
        let err = Topology::from_entries([(1, "A7030P", 0)]).unwrap_err();
        assert_eq!(err, TopologyError::ZeroChannels { slot: 1 });
    }

    #[test]
    fn rejects_duplicate_slot() {
        let err =
            Topology::from_entries([(4, "A7435SN", 24), (4, "A7030P", 48)]).unwrap_err();
        assert_eq!(err, TopologyError::DuplicateSlot { slot: 4 });
    }

    #[test]
    fn rejects_empty_topology() {
        let entries: [(u16, &str, u16); 0] = [];
        let err = Topology::from_entries(entries).unwrap_err();
        assert_eq!(err, TopologyError::Empty);
    }
}
