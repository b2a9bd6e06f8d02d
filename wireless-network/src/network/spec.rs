use std::time::Duration;

/// Static configuration of the wireless network
#[derive(Clone, Debug)]
pub struct NetworkSpec {
    pub radio: RadioSpec,
    pub mac: MacSpec,
    /// Packets in flight for longer than this are considered lost by the flow monitor
    pub max_per_hop_delay: Duration,
}

impl NetworkSpec {
    pub fn new(radio: RadioSpec, mac: MacSpec) -> Self {
        Self {
            radio,
            mac,
            max_per_hop_delay: Duration::from_secs(10),
        }
    }
}

impl Default for NetworkSpec {
    fn default() -> Self {
        Self::new(RadioSpec::default(), MacSpec::default())
    }
}

/// Physical layer parameters, shared by all devices
#[derive(Clone, Debug)]
pub struct RadioSpec {
    pub tx_power_dbm: f64,
    pub rx_sensitivity_dbm: f64,
    pub noise_floor_dbm: f64,
    /// Log-distance path loss at the one meter reference distance
    pub reference_loss_db: f64,
    pub path_loss_exponent: f64,
}

impl Default for RadioSpec {
    fn default() -> Self {
        Self {
            tx_power_dbm: 23.0,
            rx_sensitivity_dbm: -80.0,
            noise_floor_dbm: -94.0,
            reference_loss_db: 46.6777,
            path_loss_exponent: 3.0,
        }
    }
}

/// Medium access parameters, shared by all devices
#[derive(Clone, Debug)]
pub struct MacSpec {
    pub queue_capacity_packets: usize,
    /// Retransmissions attempted before declaring the link to the next hop broken
    pub retry_limit: u32,
    pub slot_time: Duration,
    pub sifs: Duration,
    pub min_contention_window: u32,
}

impl MacSpec {
    pub fn difs(&self) -> Duration {
        self.sifs + 2 * self.slot_time
    }
}

impl Default for MacSpec {
    fn default() -> Self {
        Self {
            queue_capacity_packets: 500,
            retry_limit: 7,
            slot_time: Duration::from_micros(9),
            sifs: Duration::from_micros(10),
            min_contention_window: 15,
        }
    }
}
