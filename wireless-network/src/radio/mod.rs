//! Shared radio medium: propagation, rate selection and frame errors

pub mod mac;

use crate::network::spec::RadioSpec;
use std::time::Duration;

pub use mac::WifiDevice;

/// MAC header, LLC/SNAP encapsulation and frame check sequence
pub const MAC_OVERHEAD_BYTES: usize = 36;
const ACK_FRAME_BYTES: usize = 14;

const PREAMBLE_AND_HEADER: Duration = Duration::from_micros(20);
const OFDM_SYMBOL: Duration = Duration::from_micros(4);
const SIGNAL_EXTENSION: Duration = Duration::from_micros(6);
const SERVICE_AND_TAIL_BITS: usize = 22;

/// Extra SNR required on top of a rate's threshold before the rate manager picks it
const RATE_SELECTION_MARGIN_DB: f64 = 3.0;

#[derive(Debug, PartialEq)]
pub struct DataRate {
    pub mbps: u32,
    pub min_snr_db: f64,
}

/// The 802.11g ERP-OFDM rates, from slowest to fastest
pub static ERP_OFDM_RATES: [DataRate; 8] = [
    DataRate {
        mbps: 6,
        min_snr_db: 6.0,
    },
    DataRate {
        mbps: 9,
        min_snr_db: 7.8,
    },
    DataRate {
        mbps: 12,
        min_snr_db: 9.0,
    },
    DataRate {
        mbps: 18,
        min_snr_db: 10.8,
    },
    DataRate {
        mbps: 24,
        min_snr_db: 17.0,
    },
    DataRate {
        mbps: 36,
        min_snr_db: 18.8,
    },
    DataRate {
        mbps: 48,
        min_snr_db: 24.0,
    },
    DataRate {
        mbps: 54,
        min_snr_db: 24.6,
    },
];

/// Rate used for broadcast control traffic
pub fn basic_rate() -> &'static DataRate {
    &ERP_OFDM_RATES[0]
}

/// Received power in dBm after log-distance path loss
pub fn rx_power_dbm(spec: &RadioSpec, distance_m: f64) -> f64 {
    // Inside the reference distance the loss is constant
    let distance_m = distance_m.max(1.0);
    spec.tx_power_dbm - spec.reference_loss_db - 10.0 * spec.path_loss_exponent * distance_m.log10()
}

pub fn can_hear(spec: &RadioSpec, distance_m: f64) -> bool {
    rx_power_dbm(spec, distance_m) >= spec.rx_sensitivity_dbm
}

pub fn snr_db(spec: &RadioSpec, rx_power_dbm: f64) -> f64 {
    rx_power_dbm - spec.noise_floor_dbm
}

/// Ideal rate selection: the fastest rate whose threshold plus margin is met by the SNR
pub fn select_rate(snr_db: f64) -> &'static DataRate {
    ERP_OFDM_RATES
        .iter()
        .rev()
        .find(|rate| snr_db >= rate.min_snr_db + RATE_SELECTION_MARGIN_DB)
        .unwrap_or(basic_rate())
}

/// Time on air of a frame of `frame_bytes` bytes (MAC overhead included)
pub fn airtime(rate: &DataRate, frame_bytes: usize) -> Duration {
    let bits_per_symbol = rate.mbps as usize * 4;
    let bits = SERVICE_AND_TAIL_BITS + 8 * frame_bytes;
    let symbols = bits.div_ceil(bits_per_symbol);
    PREAMBLE_AND_HEADER + OFDM_SYMBOL * symbols as u32 + SIGNAL_EXTENSION
}

pub fn ack_airtime() -> Duration {
    airtime(basic_rate(), ACK_FRAME_BYTES)
}

/// Probability that a frame sent at `rate` is corrupted at the given SNR
pub fn frame_error_probability(rate: &DataRate, snr_db: f64) -> f64 {
    let margin = snr_db - rate.min_snr_db;
    1.0 / (1.0 + (2.0 * margin).exp())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_log_distance_path_loss() {
        let spec = RadioSpec::default();
        assert!((rx_power_dbm(&spec, 1.0) - (23.0 - 46.6777)).abs() < 1e-9);
        assert!((rx_power_dbm(&spec, 10.0) - (23.0 - 46.6777 - 30.0)).abs() < 1e-9);

        // Closer than the reference distance behaves like the reference distance
        assert_eq!(rx_power_dbm(&spec, 0.0), rx_power_dbm(&spec, 1.0));
    }

    #[test]
    fn test_communication_range() {
        let spec = RadioSpec::default();
        assert!(can_hear(&spec, 20.0));
        assert!(can_hear(&spec, 75.0));
        assert!(!can_hear(&spec, 80.0));
    }

    #[test]
    fn test_rate_selection() {
        assert_eq!(select_rate(50.0).mbps, 54);
        assert_eq!(select_rate(27.5).mbps, 48);
        assert_eq!(select_rate(14.0).mbps, 18);
        assert_eq!(select_rate(0.0).mbps, 6);
    }

    #[test]
    fn test_airtime() {
        // 540 bytes at 54 Mbps: (22 + 4320) / 216 bits per symbol = 21 symbols
        assert_eq!(
            airtime(&ERP_OFDM_RATES[7], 540),
            Duration::from_micros(20 + 21 * 4 + 6)
        );
        assert!(airtime(&ERP_OFDM_RATES[0], 540) > airtime(&ERP_OFDM_RATES[7], 540));
    }

    #[test]
    fn test_frame_errors_fall_with_snr() {
        let rate = &ERP_OFDM_RATES[3];
        assert!((frame_error_probability(rate, rate.min_snr_db) - 0.5).abs() < 1e-9);
        assert!(frame_error_probability(rate, rate.min_snr_db + 10.0) < 1e-6);
    }
}
