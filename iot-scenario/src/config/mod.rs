use crate::config::cli::CliOpt;
use crate::config::radio::RadioConfig;
use crate::error::BuildError;
use std::path::PathBuf;
use std::time::Duration;

pub mod cli;
pub mod radio;

/// Size of each node population
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct PopulationCounts {
    pub fixed: u32,
    pub mobile: u32,
    pub malicious: u32,
    pub interfering: u32,
}

impl PopulationCounts {
    pub fn total(&self) -> u32 {
        self.fixed + self.mobile + self.malicious + self.interfering
    }
}

/// The immutable parameters of a single run
#[derive(Clone, Debug)]
pub struct RunConfig {
    pub populations: PopulationCounts,
    /// Simulated duration, in seconds
    pub sim_time: f64,
    /// Period of the per-node metric sampler, in seconds
    pub sampling_interval: f64,
    pub normal_interval: Duration,
    pub malicious_interval: Duration,
    pub packet_size: usize,
    /// Kept verbatim, it is parsed when the routing agents are installed
    pub routing_protocol: String,
    pub config_name: String,
    pub output_dir: PathBuf,
    pub pcap_prefix: String,
    pub log_control_messages: bool,
    pub seed: u64,
    pub radio: RadioConfig,
}

impl RunConfig {
    pub fn from_cli(options: &CliOpt) -> anyhow::Result<Self> {
        let radio = match &options.radio_config {
            Some(path) => RadioConfig::load(path)?,
            None => RadioConfig::default(),
        };

        let config = Self {
            populations: PopulationCounts {
                fixed: options.n_fixed_nodes,
                mobile: options.n_mobile_nodes,
                malicious: options.n_malicious_nodes,
                interfering: options.n_interfering_nodes,
            },
            sim_time: options.sim_time,
            sampling_interval: options.sampling_interval,
            normal_interval: positive_duration("normalInterval", options.normal_interval)?,
            malicious_interval: positive_duration(
                "maliciousInterval",
                options.malicious_interval,
            )?,
            packet_size: options.packet_size,
            routing_protocol: options.routing_protocol.clone(),
            config_name: options.config_name.clone(),
            output_dir: options.output_dir.clone(),
            pcap_prefix: options.pcap_prefix.clone(),
            log_control_messages: options.log_control_messages,
            seed: options.seed,
            radio,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), BuildError> {
        check_positive("simTime", self.sim_time)?;
        check_positive("samplingInterval", self.sampling_interval)?;
        if self.packet_size == 0 {
            return Err(BuildError::InvalidConfig(
                "packetSize must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Prefix shared by every pcap file of the run
    ///
    /// The position of each component is relied upon by downstream tooling.
    pub fn pcap_file_prefix(&self) -> String {
        let p = &self.populations;
        format!(
            "{}_{}_{}f_{}m_{}mal_{}i_{}",
            self.pcap_prefix,
            self.routing_protocol,
            p.fixed,
            p.mobile,
            p.malicious,
            p.interfering,
            self.config_name
        )
    }
}

fn check_positive(name: &str, value: f64) -> Result<(), BuildError> {
    positive_duration(name, value).map(|_| ())
}

/// Accepts positive numbers of seconds that fit in a [`Duration`]
fn positive_duration(name: &str, secs: f64) -> Result<Duration, BuildError> {
    match Duration::try_from_secs_f64(secs) {
        Ok(duration) if !duration.is_zero() => Ok(duration),
        _ => Err(BuildError::InvalidConfig(format!(
            "{name} must be a positive number of seconds (got {secs})"
        ))),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use clap::Parser;

    fn config(args: &[&str]) -> anyhow::Result<RunConfig> {
        let args = std::iter::once("iot-scenario").chain(args.iter().copied());
        RunConfig::from_cli(&CliOpt::parse_from(args))
    }

    #[test]
    fn test_default_config() {
        let config = config(&[]).unwrap();
        assert_eq!(config.populations.total(), 30);
        assert_eq!(config.normal_interval, Duration::from_secs(2));
        assert_eq!(config.malicious_interval, Duration::from_millis(10));
        assert_eq!(
            config.pcap_file_prefix(),
            "iot_simulation_AODV_20f_10m_0mal_0i_mal_int"
        );
    }

    #[test]
    fn test_pcap_prefix_encodes_the_scenario() {
        let config = config(&[
            "--nFixedNodes=4",
            "--nMobileNodes=2",
            "--nMaliciousNodes=3",
            "--nInterferingNodes=1",
            "--routingProtocol=DSR",
            "--configName=attack",
            "--pcapPrefix=run",
        ])
        .unwrap();

        assert_eq!(config.pcap_file_prefix(), "run_DSR_4f_2m_3mal_1i_attack");
    }

    #[test]
    fn test_non_positive_durations_are_rejected() {
        for args in [
            ["--simTime=0"],
            ["--simTime=-3"],
            ["--normalInterval=0"],
            ["--maliciousInterval=-0.5"],
            ["--samplingInterval=0"],
            ["--simTime=1e30"],
            ["--normalInterval=1e30"],
            ["--maliciousInterval=inf"],
            ["--samplingInterval=NaN"],
        ] {
            let error = config(&args).unwrap_err();
            assert!(
                matches!(
                    error.downcast_ref::<BuildError>(),
                    Some(BuildError::InvalidConfig(_))
                ),
                "{args:?} should be rejected, got {error:?}"
            );
        }
    }

    #[test]
    fn test_empty_payload_is_rejected() {
        assert!(config(&["--packetSize=0"]).is_err());
    }
}
