use anyhow::Context;
use serde::Deserialize;
use serde_with::{DurationMilliSeconds, serde_as};
use std::path::Path;
use std::time::Duration;
use wireless_network::energy::{EnergySourceSpec, RadioEnergySpec};
use wireless_network::network::spec::{MacSpec, NetworkSpec, RadioSpec};

/// Overrides for the physical, energy and MAC parameters of every device
///
/// Fields that are absent keep their default value.
#[serde_as]
#[derive(Deserialize, Clone, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct RadioConfigJson {
    /// Transmission power, in dBm
    pub tx_power_dbm: Option<f64>,
    /// Weakest signal a device is able to decode, in dBm
    pub rx_sensitivity_dbm: Option<f64>,
    /// Battery capacity of every node, in joules
    pub initial_energy_j: Option<f64>,
    pub supply_voltage_v: Option<f64>,
    pub idle_current_a: Option<f64>,
    pub tx_current_a: Option<f64>,
    pub rx_current_a: Option<f64>,
    /// Capacity of the per-device transmission queue, in packets
    pub mac_queue_packets: Option<usize>,
    /// Retransmissions of a unicast frame before giving up on the next hop
    pub retry_limit: Option<u32>,
    /// Packets in flight for longer than this are counted as lost by the flow monitor
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    #[serde(default, rename = "max_per_hop_delay_ms")]
    pub max_per_hop_delay: Option<Duration>,
}

/// Radio, energy and MAC parameters of a run
#[derive(Clone, Debug, Default)]
pub struct RadioConfig {
    pub network: NetworkSpec,
    pub energy_source: EnergySourceSpec,
    pub radio_energy: RadioEnergySpec,
}

impl RadioConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read radio config from {}", path.display()))?;
        let overrides: RadioConfigJson = serde_json::from_str(&json)
            .with_context(|| format!("invalid radio config at {}", path.display()))?;
        Ok(overrides.into())
    }
}

impl From<RadioConfigJson> for RadioConfig {
    fn from(json: RadioConfigJson) -> Self {
        let default_radio = RadioSpec::default();
        let default_mac = MacSpec::default();
        let radio = RadioSpec {
            tx_power_dbm: json.tx_power_dbm.unwrap_or(default_radio.tx_power_dbm),
            rx_sensitivity_dbm: json
                .rx_sensitivity_dbm
                .unwrap_or(default_radio.rx_sensitivity_dbm),
            ..default_radio
        };
        let mac = MacSpec {
            queue_capacity_packets: json
                .mac_queue_packets
                .unwrap_or(default_mac.queue_capacity_packets),
            retry_limit: json.retry_limit.unwrap_or(default_mac.retry_limit),
            ..default_mac
        };

        let mut network = NetworkSpec::new(radio, mac);
        if let Some(delay) = json.max_per_hop_delay {
            network.max_per_hop_delay = delay;
        }

        let default_source = EnergySourceSpec::default();
        let energy_source = EnergySourceSpec {
            initial_energy_j: json
                .initial_energy_j
                .unwrap_or(default_source.initial_energy_j),
            supply_voltage_v: json
                .supply_voltage_v
                .unwrap_or(default_source.supply_voltage_v),
        };

        let default_currents = RadioEnergySpec::default();
        let radio_energy = RadioEnergySpec {
            idle_current_a: json
                .idle_current_a
                .unwrap_or(default_currents.idle_current_a),
            tx_current_a: json.tx_current_a.unwrap_or(default_currents.tx_current_a),
            rx_current_a: json.rx_current_a.unwrap_or(default_currents.rx_current_a),
        };

        Self {
            network,
            energy_source,
            radio_energy,
        }
    }
}
