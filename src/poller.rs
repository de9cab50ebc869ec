//! Slot-level bulk polling.

use std::sync::Arc;

use chrono::{SubsecRound, Utc};
use hvwatch_gateway::{DeviceGateway, GatewayError};
use hvwatch_types::{ChannelReading, CrateSnapshot, ParameterSet, Topology};
use tracing::trace;

/// Captures one complete [`CrateSnapshot`] per tick through slot-level
/// bulk reads.
///
/// For every slot the channel index list is built once, then one gateway
/// call is issued per (slot, parameter) pair. That bounds device round
/// trips per tick to `#slots x #parameters`, independent of how many
/// channels each board carries - the decisive saving over one call per
/// (slot, channel, parameter).
///
/// Any gateway error, misaligned response, or uncoercible value discards
/// the whole tick: the poller returns the error and no partial snapshot
/// ever reaches the buffer or a consumer.
pub struct BulkPoller {
    gateway: Arc<dyn DeviceGateway>,
    topology: Topology,
    parameters: ParameterSet,
}

impl BulkPoller {
    pub fn new(
        gateway: Arc<dyn DeviceGateway>,
        topology: Topology,
        parameters: ParameterSet,
    ) -> Self {
        Self {
            gateway,
            topology,
            parameters,
        }
    }

    /// Read every tracked parameter for every channel of every slot.
    pub async fn poll(&self) -> Result<CrateSnapshot, GatewayError> {
        let mut snapshot = CrateSnapshot::at(Utc::now().trunc_subsecs(0).naive_utc());

        for slot in self.topology.slots() {
            // channel_ids is Some for every slot the topology yields
            let channels = self.topology.channel_ids(slot).unwrap_or_default();
            let mut readings: Vec<ChannelReading> =
                vec![ChannelReading::new(); channels.len()];

            for parameter in self.parameters.iter() {
                let raw = self
                    .gateway
                    .read_param(slot, &channels, parameter.name())
                    .await?;

                if raw.len() != channels.len() {
                    return Err(GatewayError::Protocol(format!(
                        "slot {slot} {}: expected {} values, got {}",
                        parameter.name(),
                        channels.len(),
                        raw.len()
                    )));
                }

                for ((channel, value), reading) in
                    channels.iter().zip(&raw).zip(readings.iter_mut())
                {
                    let normalized = parameter.kind().normalize(value).map_err(|e| {
                        GatewayError::MalformedValue {
                            slot,
                            channel: *channel,
                            parameter: parameter.name().to_string(),
                            detail: e.to_string(),
                        }
                    })?;
                    reading.insert(parameter.name(), normalized);
                }
            }

            for (channel, reading) in channels.into_iter().zip(readings) {
                snapshot.insert_reading(slot, channel, reading);
            }
        }

        trace!(
            channels = snapshot.channel_count(),
            "poll tick captured snapshot"
        );
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use hvwatch_types::RawValue;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Gateway double that counts calls and can misbehave on cue.
    #[derive(Default)]
    struct ScriptedGateway {
        calls: AtomicUsize,
        fail_on_call: Option<usize>,
        garbage_for: Option<&'static str>,
        short_for: Option<&'static str>,
    }

    impl ScriptedGateway {
        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DeviceGateway for ScriptedGateway {
        async fn read_param(
            &self,
            slot: u16,
            channels: &[u16],
            parameter: &str,
        ) -> Result<Vec<RawValue>, GatewayError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_on_call == Some(call) {
                return Err(GatewayError::Timeout);
            }

            let mut values: Vec<RawValue> = channels
                .iter()
                .map(|&ch| {
                    if self.garbage_for == Some(parameter) {
                        RawValue::Text("??".into())
                    } else if matches!(parameter, "Pw" | "POn" | "PDwn") {
                        RawValue::Int(1)
                    } else {
                        RawValue::Float(f64::from(slot) * 1000.0 + f64::from(ch))
                    }
                })
                .collect();
            if self.short_for == Some(parameter) {
                values.pop();
            }
            Ok(values)
        }
    }

    fn topology() -> Topology {
        Topology::from_entries([(1, "A7030P", 48), (4, "A7435SN", 24), (8, "A7435SN", 24)])
            .unwrap()
    }

    fn poller(gateway: Arc<ScriptedGateway>) -> BulkPoller {
        BulkPoller::new(gateway, topology(), ParameterSet::default_set())
    }

    #[tokio::test]
    async fn round_trips_are_slots_times_parameters() {
        let gateway = Arc::new(ScriptedGateway::default());
        let snapshot = poller(gateway.clone()).poll().await.unwrap();

        // 3 slots x 7 parameters, independent of the 96 channels.
        assert_eq!(gateway.call_count(), 21);
        assert_eq!(snapshot.channel_count(), 96);
    }

    #[tokio::test]
    async fn successful_poll_yields_complete_readings() {
        let gateway = Arc::new(ScriptedGateway::default());
        let snapshot = poller(gateway).poll().await.unwrap();

        let params = ParameterSet::default_set();
        for (_, _, reading) in snapshot.iter() {
            assert!(reading.is_complete(&params));
        }
        assert_eq!(snapshot.channel(4, 17).unwrap().vmon(), Some(4017.0));
    }

    #[tokio::test]
    async fn gateway_error_discards_the_tick() {
        let gateway = Arc::new(ScriptedGateway {
            fail_on_call: Some(9),
            ..Default::default()
        });
        let err = poller(gateway).poll().await.unwrap_err();
        assert!(matches!(err, GatewayError::Timeout));
    }

    #[tokio::test]
    async fn one_uncoercible_value_fails_the_whole_tick() {
        let gateway = Arc::new(ScriptedGateway {
            garbage_for: Some("VMon"),
            ..Default::default()
        });
        let err = poller(gateway).poll().await.unwrap_err();
        assert!(matches!(
            err,
            GatewayError::MalformedValue { slot: 1, channel: 0, .. }
        ));
    }

    #[tokio::test]
    async fn misaligned_response_is_a_protocol_error() {
        let gateway = Arc::new(ScriptedGateway {
            short_for: Some("IMon"),
            ..Default::default()
        });
        let err = poller(gateway).poll().await.unwrap_err();
        assert!(matches!(err, GatewayError::Protocol(_)));
    }
}
