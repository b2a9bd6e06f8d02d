//! Constant-rate UDP senders and the packet sinks they target

use crate::config::RunConfig;
use crate::error::BuildError;
use crate::topology::{Population, Topology};
use crate::traffic_class::TrafficClass;
use anyhow::Context;
use event_runtime::SimTime;
use std::net::SocketAddrV4;
use std::time::Duration;
use wireless_network::applications::{AppId, OnOffSpec};
use wireless_network::Network;

/// Port of the sink receiving normal and interfering traffic
pub const NORMAL_PORT: u16 = 9;
/// Port of the sink receiving malicious traffic
pub const MALICIOUS_PORT: u16 = 10;

/// The two sinks, both hosted on the first fixed node
#[derive(Copy, Clone, Debug)]
pub struct Sinks {
    pub normal: AppId,
    pub malicious: AppId,
}

impl TrafficClass {
    /// The population sending this class of traffic, along with when senders start
    ///
    /// Starts are staggered so routing can settle before the attack and the interference begin.
    fn senders(&self) -> (&'static [Population], SimTime) {
        match self {
            TrafficClass::Normal => (
                &[Population::Fixed, Population::Mobile],
                SimTime::from_secs(1),
            ),
            TrafficClass::Malicious => (&[Population::Malicious], SimTime::from_secs(10)),
            TrafficClass::Interfering => (&[Population::Interfering], SimTime::from_secs(5)),
        }
    }

    pub fn destination_port(&self) -> u16 {
        match self {
            TrafficClass::Normal | TrafficClass::Interfering => NORMAL_PORT,
            TrafficClass::Malicious => MALICIOUS_PORT,
        }
    }

    fn emit_interval(&self, config: &RunConfig) -> Duration {
        match self {
            TrafficClass::Normal | TrafficClass::Interfering => config.normal_interval,
            TrafficClass::Malicious => config.malicious_interval,
        }
    }
}

/// Installs every sender, then the two sinks on the first fixed node
///
/// All senders run until the end of the simulation and tag their packets with their class.
pub fn install(
    network: &mut Network,
    topology: &Topology,
    config: &RunConfig,
) -> anyhow::Result<Sinks> {
    let sink_node = topology
        .sink_node()
        .ok_or(BuildError::MissingSink(NORMAL_PORT))?;
    let sink_address = network
        .address_of(sink_node)
        .ok_or(BuildError::MissingSink(NORMAL_PORT))?;
    let stop = SimTime::from_secs_f64(config.sim_time);

    for class in [
        TrafficClass::Normal,
        TrafficClass::Malicious,
        TrafficClass::Interfering,
    ] {
        let (populations, start) = class.senders();
        let spec = OnOffSpec {
            remote: SocketAddrV4::new(sink_address, class.destination_port()),
            payload_size: config.packet_size,
            interval: class.emit_interval(config),
            tag: Some(class.tag()),
        };

        tracing::info!(
            "Configuring {class} traffic applications ({:.0} bps per sender)",
            spec.data_rate_bps()
        );
        for &population in populations {
            for &node in topology.population(population) {
                network
                    .install_on_off(node, spec.clone(), start, stop)
                    .with_context(|| format!("failed to install a sender on node {node}"))?;
            }
        }
    }

    tracing::info!("Configuring packet sinks");
    let install_sink = |network: &mut Network, port| {
        network
            .install_packet_sink(sink_node, port, SimTime::ZERO, stop)
            .map_err(|e| {
                tracing::error!("failed to create the packet sink on port {port}: {e}");
                BuildError::MissingSink(port)
            })
    };

    Ok(Sinks {
        normal: install_sink(network, NORMAL_PORT)?,
        malicious: install_sink(network, MALICIOUS_PORT)?,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::cli::CliOpt;
    use crate::topology;
    use clap::Parser;
    use fastrand::Rng;
    use wireless_network::applications::Application;
    use wireless_network::network::spec::NetworkSpec;

    fn install_with(args: &[&str]) -> (Network, Topology, anyhow::Result<Sinks>) {
        let args = std::iter::once("iot-scenario").chain(args.iter().copied());
        let config = RunConfig::from_cli(&CliOpt::parse_from(args)).unwrap();
        let mut rng = Rng::with_seed(config.seed);
        let mut network = Network::new(NetworkSpec::default(), rng.fork());
        let topology = topology::build(&mut network, &config, &mut rng).unwrap();
        let sinks = install(&mut network, &topology, &config);
        (network, topology, sinks)
    }

    #[test]
    fn test_sinks_listen_on_both_ports() {
        let (network, _, sinks) = install_with(&["--nFixedNodes=2", "--nMobileNodes=1"]);
        let sinks = sinks.unwrap();

        assert_eq!(network.packet_sink(sinks.normal).unwrap().port(), NORMAL_PORT);
        assert_eq!(
            network.packet_sink(sinks.malicious).unwrap().port(),
            MALICIOUS_PORT
        );
    }

    #[test]
    fn test_one_sender_per_node_including_the_sink() {
        let (network, topology, sinks) = install_with(&[
            "--nFixedNodes=2",
            "--nMobileNodes=3",
            "--nMaliciousNodes=2",
            "--nInterferingNodes=1",
        ]);
        let sinks = sinks.unwrap();

        // Every node sends, the sink node included. Senders are installed first, sinks last
        let senders = (0..sinks.normal.0)
            .filter(|&i| matches!(network.application(AppId(i)), Some(Application::OnOff(_))))
            .count();
        assert_eq!(senders, topology.all_nodes().len());
        assert!(network.packet_sink(AppId(0)).is_none());
    }

    #[test]
    fn test_classes_use_their_port() {
        assert_eq!(TrafficClass::Normal.destination_port(), 9);
        assert_eq!(TrafficClass::Interfering.destination_port(), 9);
        assert_eq!(TrafficClass::Malicious.destination_port(), 10);
    }

    #[test]
    fn test_staggered_starts() {
        assert_eq!(TrafficClass::Normal.senders().1, SimTime::from_secs(1));
        assert_eq!(TrafficClass::Interfering.senders().1, SimTime::from_secs(5));
        assert_eq!(TrafficClass::Malicious.senders().1, SimTime::from_secs(10));
    }

    #[test]
    fn test_no_fixed_node_means_no_sink() {
        let (_, _, sinks) = install_with(&["--nFixedNodes=0", "--nMobileNodes=3"]);
        let error = sinks.unwrap_err();
        assert_eq!(
            error.downcast_ref::<BuildError>(),
            Some(&BuildError::MissingSink(NORMAL_PORT))
        );
    }
}
