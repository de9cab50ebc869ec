//! Simulated HV crate.
//!
//! A [`DeviceGateway`] that answers bulk reads from a configured topology
//! instead of real hardware. Deterministic by default; optional
//! measurement noise, per-read latency, powered-off channels, and a
//! link-failure switch cover the failure paths the engine has to handle.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use hvwatch_types::{RawValue, Topology};

use crate::{DeviceGateway, GatewayError};

/// A simulated multi-slot HV crate.
///
/// Channels report the configured setpoints back as their monitored
/// values, plus optional uniform noise, so a freshly started engine sees
/// every channel in the nominal band.
///
/// # Example
///
/// ```rust,no_run
/// use hvwatch_gateway::sim::SimCrate;
/// use hvwatch_types::Topology;
///
/// let topology = Topology::from_entries([(4, "A7435SN", 24)]).unwrap();
/// let gateway = SimCrate::builder(topology)
///     .target_voltage(1450.0)
///     .current_ua(0.8)
///     .noise(0.5)
///     .powered_off(4, 23)
///     .build();
/// ```
#[derive(Debug)]
pub struct SimCrate {
    topology: Topology,
    target_voltage: f64,
    current_ua: f64,
    noise: f64,
    latency: Option<Duration>,
    off_channels: BTreeSet<(u16, u16)>,
    link_down: AtomicBool,
}

impl SimCrate {
    /// Create a builder for the given topology.
    pub fn builder(topology: Topology) -> SimCrateBuilder {
        SimCrateBuilder {
            topology,
            target_voltage: 1500.0,
            current_ua: 1.0,
            noise: 0.0,
            latency: None,
            off_channels: BTreeSet::new(),
        }
    }

    /// Take the simulated link down (or back up). While down, every read
    /// fails with [`GatewayError::LinkDown`].
    pub fn set_link_down(&self, down: bool) {
        self.link_down.store(down, Ordering::SeqCst);
    }

    fn jitter(&self) -> f64 {
        if self.noise > 0.0 {
            use rand::Rng;
            rand::thread_rng().gen_range(-self.noise..=self.noise)
        } else {
            0.0
        }
    }

    fn value_for(&self, slot: u16, channel: u16, parameter: &str) -> Option<RawValue> {
        let off = self.off_channels.contains(&(slot, channel));
        let value = match parameter {
            "Pw" => RawValue::Int(if off { 0 } else { 1 }),
            "POn" => RawValue::Int(1),
            "PDwn" => RawValue::Int(0),
            "VMon" => RawValue::Float(if off {
                0.0
            } else {
                self.target_voltage + self.jitter()
            }),
            "IMon" => RawValue::Float(if off {
                0.0
            } else {
                self.current_ua + self.jitter() / 100.0
            }),
            "V0Set" => RawValue::Float(self.target_voltage),
            "I0Set" => RawValue::Float(self.current_ua),
            _ => return None,
        };
        Some(value)
    }
}

#[async_trait]
impl DeviceGateway for SimCrate {
    async fn read_param(
        &self,
        slot: u16,
        channels: &[u16],
        parameter: &str,
    ) -> Result<Vec<RawValue>, GatewayError> {
        if self.link_down.load(Ordering::SeqCst) {
            return Err(GatewayError::LinkDown("simulated link failure".into()));
        }

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let board = self
            .topology
            .board(slot)
            .ok_or_else(|| GatewayError::Protocol(format!("unknown slot {slot}")))?;

        let mut values = Vec::with_capacity(channels.len());
        for &channel in channels {
            if channel >= board.channels {
                return Err(GatewayError::Protocol(format!(
                    "slot {slot} has no channel {channel}"
                )));
            }
            let value = self.value_for(slot, channel, parameter).ok_or_else(|| {
                GatewayError::Protocol(format!("unknown parameter {parameter:?}"))
            })?;
            values.push(value);
        }
        Ok(values)
    }
}

/// Builder for [`SimCrate`].
#[derive(Debug)]
pub struct SimCrateBuilder {
    topology: Topology,
    target_voltage: f64,
    current_ua: f64,
    noise: f64,
    latency: Option<Duration>,
    off_channels: BTreeSet<(u16, u16)>,
}

impl SimCrateBuilder {
    /// Voltage setpoint reported for every channel (default 1500 V).
    pub fn target_voltage(mut self, volts: f64) -> Self {
        self.target_voltage = volts;
        self
    }

    /// Current setpoint reported for every channel (default 1 uA).
    pub fn current_ua(mut self, ua: f64) -> Self {
        self.current_ua = ua;
        self
    }

    /// Uniform noise amplitude added to monitored values (default 0,
    /// fully deterministic).
    pub fn noise(mut self, volts: f64) -> Self {
        self.noise = volts;
        self
    }

    /// Artificial latency per bulk read (default none).
    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Mark one channel as powered off.
    pub fn powered_off(mut self, slot: u16, channel: u16) -> Self {
        self.off_channels.insert((slot, channel));
        self
    }

    /// Build the simulated crate.
    pub fn build(self) -> SimCrate {
        SimCrate {
            topology: self.topology,
            target_voltage: self.target_voltage,
            current_ua: self.current_ua,
            noise: self.noise,
            latency: self.latency,
            off_channels: self.off_channels,
            link_down: AtomicBool::new(false),
        }
    }
}
