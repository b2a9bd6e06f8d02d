//! Battery and radio energy accounting

use event_runtime::SimTime;
use std::time::Duration;

/// Parameters of a node's battery
#[derive(Copy, Clone, Debug)]
pub struct EnergySourceSpec {
    pub initial_energy_j: f64,
    pub supply_voltage_v: f64,
}

impl Default for EnergySourceSpec {
    fn default() -> Self {
        Self {
            initial_energy_j: 100.0,
            supply_voltage_v: 3.0,
        }
    }
}

/// Current drawn by the radio in each of its states
#[derive(Copy, Clone, Debug)]
pub struct RadioEnergySpec {
    pub idle_current_a: f64,
    pub tx_current_a: f64,
    pub rx_current_a: f64,
}

impl Default for RadioEnergySpec {
    fn default() -> Self {
        Self {
            idle_current_a: 0.273,
            tx_current_a: 0.380,
            rx_current_a: 0.313,
        }
    }
}

/// A battery drained by an (optional) radio energy model
///
/// The radio is idle unless it is transmitting or receiving, so the drain is the idle current over
/// the whole elapsed time plus the extra current of the busy states over their accumulated time.
#[derive(Clone, Debug)]
pub struct EnergySource {
    spec: EnergySourceSpec,
    radio: Option<RadioEnergySpec>,
    tx_time: Duration,
    rx_time: Duration,
}

impl EnergySource {
    pub fn new(spec: EnergySourceSpec) -> Self {
        Self {
            spec,
            radio: None,
            tx_time: Duration::ZERO,
            rx_time: Duration::ZERO,
        }
    }

    pub(crate) fn attach_radio_model(&mut self, radio: RadioEnergySpec) {
        self.radio = Some(radio);
    }

    pub fn initial_energy_j(&self) -> f64 {
        self.spec.initial_energy_j
    }

    /// Remaining energy in joules, never negative
    pub fn remaining_energy_j(&self, now: SimTime) -> f64 {
        let Some(radio) = &self.radio else {
            return self.spec.initial_energy_j;
        };

        let charge = radio.idle_current_a * now.since_start().as_secs_f64()
            + (radio.tx_current_a - radio.idle_current_a) * self.tx_time.as_secs_f64()
            + (radio.rx_current_a - radio.idle_current_a) * self.rx_time.as_secs_f64();
        let consumed = self.spec.supply_voltage_v * charge;

        (self.spec.initial_energy_j - consumed).max(0.0)
    }

    pub fn is_depleted(&self, now: SimTime) -> bool {
        self.remaining_energy_j(now) <= 0.0
    }

    pub(crate) fn record_tx(&mut self, airtime: Duration) {
        self.tx_time += airtime;
    }

    pub(crate) fn record_rx(&mut self, airtime: Duration) {
        self.rx_time += airtime;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn source_with_radio() -> EnergySource {
        let mut source = EnergySource::new(EnergySourceSpec::default());
        source.attach_radio_model(RadioEnergySpec::default());
        source
    }

    #[test]
    fn test_no_radio_model_means_no_drain() {
        let source = EnergySource::new(EnergySourceSpec::default());
        assert_eq!(source.remaining_energy_j(SimTime::from_secs(1000)), 100.0);
    }

    #[test]
    fn test_idle_drain() {
        let source = source_with_radio();
        let remaining = source.remaining_energy_j(SimTime::from_secs(10));
        assert!((remaining - (100.0 - 3.0 * 0.273 * 10.0)).abs() < 1e-9);
    }

    #[test]
    fn test_tx_and_rx_add_to_idle_drain() {
        let mut source = source_with_radio();
        source.record_tx(Duration::from_secs(2));
        source.record_rx(Duration::from_secs(1));

        let expected = 100.0 - 3.0 * (0.273 * 10.0 + (0.380 - 0.273) * 2.0 + (0.313 - 0.273));
        let remaining = source.remaining_energy_j(SimTime::from_secs(10));
        assert!((remaining - expected).abs() < 1e-9);
    }

    #[test]
    fn test_remaining_energy_never_negative() {
        let source = source_with_radio();

        // 100 J / (3 V * 0.273 A) is roughly 122 seconds of idle listening
        assert!(!source.is_depleted(SimTime::from_secs(100)));
        assert_eq!(source.remaining_energy_j(SimTime::from_secs(200)), 0.0);
        assert!(source.is_depleted(SimTime::from_secs(200)));
    }
}
