//! Node populations, their placement and movement, energy sources and routing

use crate::config::RunConfig;
use crate::error::BuildError;
use anyhow::Context;
use fastrand::Rng;
use std::net::Ipv4Addr;
use std::time::Duration;
use wireless_network::mobility::{PositionAllocator, RandomWalkSpec, Rectangle};
use wireless_network::network::ip::Ipv4Cidr;
use wireless_network::routing::{RoutingProtocolKind, UnsupportedRoutingProtocol};
use wireless_network::{Network, NodeId};

/// All nodes share this subnet, addresses are handed out in node creation order
pub const SUBNET: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 0);
pub const SUBNET_PREFIX: u8 = 24;

const GRID_SPACING_M: f64 = 15.0;
const GRID_WIDTH: u32 = 5;
const WALK_SPEED_MPS: f64 = 1.0;
const WALK_DIRECTION_CHANGE: Duration = Duration::from_secs(2);

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub enum Population {
    Fixed,
    Mobile,
    Malicious,
    Interfering,
}

impl Population {
    pub const ALL: [Population; 4] = [
        Population::Fixed,
        Population::Mobile,
        Population::Malicious,
        Population::Interfering,
    ];

    /// The label written to the node metadata
    pub fn label(&self) -> &'static str {
        match self {
            Population::Fixed => "Fijo",
            Population::Mobile => "Móvil",
            Population::Malicious => "Malicioso",
            Population::Interfering => "Interferente",
        }
    }

    fn deployment_area(&self) -> Option<Rectangle> {
        match self {
            Population::Fixed => None,
            Population::Mobile => Some(Rectangle::new(0.0, 100.0, 0.0, 100.0)),
            Population::Malicious => Some(Rectangle::new(60.0, 90.0, 60.0, 90.0)),
            Population::Interfering => Some(Rectangle::new(120.0, 150.0, 120.0, 150.0)),
        }
    }

    fn walks(&self) -> bool {
        matches!(self, Population::Mobile | Population::Malicious)
    }
}

/// The nodes of a scenario, grouped by population
#[derive(Clone, Debug)]
pub struct Topology {
    pub fixed: Vec<NodeId>,
    pub mobile: Vec<NodeId>,
    pub malicious: Vec<NodeId>,
    pub interfering: Vec<NodeId>,
    pub protocol: RoutingProtocolKind,
    /// Indexed by position in [`Topology::all_nodes`]
    pub addresses: Vec<Ipv4Addr>,
}

impl Topology {
    pub fn population(&self, population: Population) -> &[NodeId] {
        match population {
            Population::Fixed => &self.fixed,
            Population::Mobile => &self.mobile,
            Population::Malicious => &self.malicious,
            Population::Interfering => &self.interfering,
        }
    }

    /// Every node, in creation order
    pub fn all_nodes(&self) -> Vec<NodeId> {
        Population::ALL
            .iter()
            .flat_map(|&p| self.population(p).iter().copied())
            .collect()
    }

    /// The fixed node hosting the packet sinks, if there is any fixed node
    pub fn sink_node(&self) -> Option<NodeId> {
        self.fixed.first().copied()
    }
}

/// Creates the node populations and installs everything they need to take part in the network
///
/// Nodes are created fixed first, then mobile, malicious and interfering, so ids (and
/// addresses) follow that order.
pub fn build(network: &mut Network, config: &RunConfig, rng: &mut Rng) -> anyhow::Result<Topology> {
    let counts = config.populations;
    let fixed = network.create_nodes(counts.fixed);
    let mobile = network.create_nodes(counts.mobile);
    let malicious = network.create_nodes(counts.malicious);
    let interfering = network.create_nodes(counts.interfering);

    let all_nodes: Vec<_> = [&fixed, &mobile, &malicious, &interfering]
        .into_iter()
        .flatten()
        .copied()
        .collect();
    tracing::info!("Total nodes created: {}", all_nodes.len());
    if all_nodes.is_empty() {
        return Err(BuildError::NoNodes.into());
    }

    let devices = network.install_wifi_devices(&all_nodes);
    tracing::info!("Total devices created: {devices}");
    if devices == 0 {
        return Err(BuildError::NoDevices.into());
    }

    for (population, nodes) in Population::ALL
        .iter()
        .zip([&fixed, &mobile, &malicious, &interfering])
    {
        install_mobility(network, *population, nodes, rng);
    }
    tracing::info!("Mobility configured");

    network.install_energy_sources(
        &all_nodes,
        config.radio.energy_source,
        config.radio.radio_energy,
    );
    tracing::info!("Energy sources configured");

    let protocol: RoutingProtocolKind = config
        .routing_protocol
        .parse()
        .map_err(|UnsupportedRoutingProtocol(name)| BuildError::UnsupportedRoutingProtocol(name))?;
    network.install_internet_stack(&all_nodes, protocol);
    if protocol == RoutingProtocolKind::Dsr {
        network.install_dsr(&all_nodes)?;
    }
    tracing::info!("Internet stack installed with {protocol} routing");

    let subnet = Ipv4Cidr::new(SUBNET, SUBNET_PREFIX)?;
    let addresses = network
        .assign_addresses(&all_nodes, subnet)
        .context("failed to assign addresses")?;
    tracing::info!("IP addresses assigned");

    Ok(Topology {
        fixed,
        mobile,
        malicious,
        interfering,
        protocol,
        addresses,
    })
}

fn install_mobility(
    network: &mut Network,
    population: Population,
    nodes: &[NodeId],
    rng: &mut Rng,
) {
    let (mut allocator, walk) = match population.deployment_area() {
        None => (
            PositionAllocator::grid(0.0, 0.0, GRID_SPACING_M, GRID_SPACING_M, GRID_WIDTH),
            None,
        ),
        Some(area) => {
            let walk = population.walks().then_some(RandomWalkSpec {
                bounds: area,
                speed_mps: WALK_SPEED_MPS,
                direction_change_interval: WALK_DIRECTION_CHANGE,
            });
            (PositionAllocator::random_rectangle(area, rng.fork()), walk)
        }
    };

    network.install_mobility(nodes, &mut allocator, walk);
}
