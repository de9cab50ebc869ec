//! Snapshots - the complete per-channel state captured at one instant.

use std::collections::BTreeMap;

use chrono::{NaiveDateTime, SubsecRound, Utc};

use crate::{ParamValue, ParameterSet, PARAM_IMON, PARAM_PW, PARAM_V0SET, PARAM_VMON};

/// Every tracked parameter value for one (slot, channel) pair at one
/// instant.
///
/// A reading produced by a successful poll always carries every parameter
/// in the engine's [`ParameterSet`]; [`ChannelReading::is_complete`] lets a
/// consumer verify that rather than assume it.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct ChannelReading {
    values: BTreeMap<String, ParamValue>,
}

impl ChannelReading {
    /// An empty reading, populated parameter by parameter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set one parameter value.
    pub fn insert(&mut self, name: impl Into<String>, value: ParamValue) {
        self.values.insert(name.into(), value);
    }

    /// The value of a parameter by wire name.
    pub fn get(&self, name: &str) -> Option<ParamValue> {
        self.values.get(name).copied()
    }

    /// True if every parameter in `params` is present.
    pub fn is_complete(&self, params: &ParameterSet) -> bool {
        params.iter().all(|p| self.values.contains_key(p.name()))
    }

    /// Number of parameter values present.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True if no values are present.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Power state (`Pw`), if tracked. `Some(0)` means powered off.
    pub fn power(&self) -> Option<i64> {
        self.get(PARAM_PW).and_then(|v| v.as_i64())
    }

    /// Monitored voltage (`VMon`) in volts, if tracked.
    pub fn vmon(&self) -> Option<f64> {
        self.get(PARAM_VMON).map(|v| v.as_f64())
    }

    /// Monitored current (`IMon`) in microamps, if tracked.
    pub fn imon(&self) -> Option<f64> {
        self.get(PARAM_IMON).map(|v| v.as_f64())
    }

    /// Voltage setpoint (`V0Set`) in volts, if tracked.
    pub fn v0set(&self) -> Option<f64> {
        self.get(PARAM_V0SET).map(|v| v.as_f64())
    }
}

/// The complete per-channel parameter state of the crate at one instant.
///
/// Produced once per successful poll tick and immutable afterwards: the
/// persistence buffer and the live notification path share `Arc`s to the
/// same snapshot and neither mutates it.
///
/// `captured_at` is truncated to whole seconds. The durable store keys
/// rows by (timestamp, slot, channel), so two polls inside the same second
/// alias to one stored row - accepted storage granularity, not data loss.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CrateSnapshot {
    /// Capture time, UTC, whole-second resolution.
    pub captured_at: NaiveDateTime,

    /// Readings keyed by slot, then channel.
    pub slots: BTreeMap<u16, BTreeMap<u16, ChannelReading>>,
}

impl CrateSnapshot {
    /// An empty snapshot stamped with the current time.
    pub fn capture_now() -> Self {
        Self::at(Utc::now().trunc_subsecs(0).naive_utc())
    }

    /// An empty snapshot with an explicit capture time.
    pub fn at(captured_at: NaiveDateTime) -> Self {
        Self {
            captured_at: captured_at.trunc_subsecs(0),
            slots: BTreeMap::new(),
        }
    }

    /// Add one channel's reading.
    pub fn insert_reading(&mut self, slot: u16, channel: u16, reading: ChannelReading) {
        self.slots.entry(slot).or_default().insert(channel, reading);
    }

    /// The reading for one (slot, channel) pair, if present.
    pub fn channel(&self, slot: u16, channel: u16) -> Option<&ChannelReading> {
        self.slots.get(&slot)?.get(&channel)
    }

    /// Iterate all readings as (slot, channel, reading) triples, ordered
    /// by slot then channel.
    pub fn iter(&self) -> impl Iterator<Item = (u16, u16, &ChannelReading)> {
        self.slots.iter().flat_map(|(slot, channels)| {
            channels
                .iter()
                .map(move |(channel, reading)| (*slot, *channel, reading))
        })
    }

    /// Number of slots with at least one reading.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True if the snapshot carries no readings.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Total number of channel readings across all slots.
    pub fn channel_count(&self) -> usize {
        self.slots.values().map(|c| c.len()).sum()
    }
}
