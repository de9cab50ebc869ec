//! Channel health classification.
//!
//! Health is derived, never stored: a pure function of the monitored
//! voltage, the voltage setpoint, and the monitored current. Reclassifying
//! thresholds therefore never requires migrating historical rows.

use crate::ChannelReading;

/// Voltage deviation ceiling for [`SeverityBand::Nominal`], in volts.
pub const NOMINAL_MAX_DEVIATION_V: f64 = 10.0;
/// Voltage deviation ceiling for [`SeverityBand::Elevated`], in volts.
pub const ELEVATED_MAX_DEVIATION_V: f64 = 30.0;
/// Voltage deviation ceiling for [`SeverityBand::High`], in volts.
pub const HIGH_MAX_DEVIATION_V: f64 = 50.0;

/// Discrete severity derived from `|VMon - V0Set|`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SeverityBand {
    /// Deviation within 10 V of the setpoint.
    Nominal,
    /// Deviation in (10 V, 30 V].
    Elevated,
    /// Deviation in (30 V, 50 V].
    High,
    /// Deviation above 50 V.
    Critical,
}

impl SeverityBand {
    /// Classify an absolute voltage deviation in volts.
    pub fn from_deviation(deviation_v: f64) -> Self {
        let d = deviation_v.abs();
        if d <= NOMINAL_MAX_DEVIATION_V {
            SeverityBand::Nominal
        } else if d <= ELEVATED_MAX_DEVIATION_V {
            SeverityBand::Elevated
        } else if d <= HIGH_MAX_DEVIATION_V {
            SeverityBand::High
        } else {
            SeverityBand::Critical
        }
    }

    /// Short label for logs and status lines.
    pub fn symbol(&self) -> &'static str {
        match self {
            SeverityBand::Nominal => "OK",
            SeverityBand::Elevated => "ELEV",
            SeverityBand::High => "HIGH",
            SeverityBand::Critical => "CRIT",
        }
    }
}

/// Sign of the monitored current, used by presentation layers for
/// contrast only - it never affects severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Polarity {
    NonNegative,
    Negative,
}

impl Polarity {
    /// Polarity of a monitored current in microamps.
    pub fn of(imon_ua: f64) -> Self {
        if imon_ua >= 0.0 {
            Polarity::NonNegative
        } else {
            Polarity::Negative
        }
    }
}

/// Derived health of a powered channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChannelHealth {
    pub band: SeverityBand,
    pub polarity: Polarity,
}

/// Classify a channel from its monitored voltage, voltage setpoint, and
/// monitored current.
///
/// Pure and total: defined for every input, no failure mode. Power-state
/// gating is deliberately not performed here - whether a powered-off
/// channel should display as a distinct state is presentation policy, and
/// belongs to the caller (see [`channel_status`]).
///
/// # Example
///
/// ```rust
/// use hvwatch_types::{classify, SeverityBand};
///
/// assert_eq!(classify(100.0, 95.0, 1.0).band, SeverityBand::Nominal);
/// assert_eq!(classify(100.0, 40.0, 1.0).band, SeverityBand::Critical);
/// ```
pub fn classify(vmon: f64, v0set: f64, imon: f64) -> ChannelHealth {
    ChannelHealth {
        band: SeverityBand::from_deviation(vmon - v0set),
        polarity: Polarity::of(imon),
    }
}

/// Presentation-level status of a channel: powered off, or live with a
/// derived health.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ChannelStatus {
    PoweredOff,
    Live(ChannelHealth),
}

/// Evaluate a reading into a [`ChannelStatus`], gating on the power flag.
///
/// Returns `None` for a partial reading (missing power, voltage, or
/// current values) rather than classifying garbage; complete snapshots
/// from the poller never hit that path.
pub fn channel_status(reading: &ChannelReading) -> Option<ChannelStatus> {
    if reading.power()? == 0 {
        return Some(ChannelStatus::PoweredOff);
    }
    let vmon = reading.vmon()?;
    let v0set = reading.v0set()?;
    let imon = reading.imon()?;
    Some(ChannelStatus::Live(classify(vmon, v0set, imon)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ParamValue;

    #[test]
    fn bands_follow_deviation_thresholds() {
        assert_eq!(classify(100.0, 95.0, 1.0).band, SeverityBand::Nominal);
        assert_eq!(classify(100.0, 75.0, 1.0).band, SeverityBand::Elevated);
        assert_eq!(classify(100.0, 60.0, 1.0).band, SeverityBand::High);
        assert_eq!(classify(100.0, 40.0, 1.0).band, SeverityBand::Critical);
    }

    #[test]
    fn deviation_is_symmetric() {
        assert_eq!(classify(95.0, 100.0, 1.0).band, SeverityBand::Nominal);
        assert_eq!(classify(40.0, 100.0, 1.0).band, SeverityBand::Critical);
    }

    #[test]
    fn band_boundaries_are_inclusive() {
        assert_eq!(SeverityBand::from_deviation(10.0), SeverityBand::Nominal);
        assert_eq!(SeverityBand::from_deviation(30.0), SeverityBand::Elevated);
        assert_eq!(SeverityBand::from_deviation(50.0), SeverityBand::High);
        assert_eq!(SeverityBand::from_deviation(50.001), SeverityBand::Critical);
    }

    #[test]
    fn polarity_tracks_current_sign() {
        assert_eq!(classify(100.0, 100.0, 0.0).polarity, Polarity::NonNegative);
        assert_eq!(classify(100.0, 100.0, 2.5).polarity, Polarity::NonNegative);
        assert_eq!(classify(100.0, 100.0, -0.1).polarity, Polarity::Negative);
    }

    #[test]
    fn bands_order_by_severity() {
        assert!(SeverityBand::Nominal < SeverityBand::Elevated);
        assert!(SeverityBand::Elevated < SeverityBand::High);
        assert!(SeverityBand::High < SeverityBand::Critical);
    }

    fn reading(pw: i64, vmon: f64, v0set: f64, imon: f64) -> ChannelReading {
        let mut r = ChannelReading::new();
        r.insert("Pw", ParamValue::Int(pw));
        r.insert("VMon", ParamValue::Float(vmon));
        r.insert("V0Set", ParamValue::Float(v0set));
        r.insert("IMon", ParamValue::Float(imon));
        r
    }

    #[test]
    fn powered_off_channels_bypass_classification() {
        let status = channel_status(&reading(0, 0.0, 1500.0, 0.0)).unwrap();
        assert_eq!(status, ChannelStatus::PoweredOff);
    }

    #[test]
    fn live_channels_are_classified() {
        let status = channel_status(&reading(1, 100.0, 75.0, -1.0)).unwrap();
        assert_eq!(
            status,
            ChannelStatus::Live(ChannelHealth {
                band: SeverityBand::Elevated,
                polarity: Polarity::Negative,
            })
        );
    }

    #[test]
    fn partial_readings_are_not_classified() {
        let mut partial = ChannelReading::new();
        partial.insert("Pw", ParamValue::Int(1));
        assert_eq!(channel_status(&partial), None);
    }
}
