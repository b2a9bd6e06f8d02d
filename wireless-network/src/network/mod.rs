//! The wireless network world
//!
//! Nodes are created empty and then equipped, in the order a scenario builder would do it, with
//! mobility, a radio device, an energy source, an internet stack with a routing protocol,
//! addresses and applications. Nothing happens until [`initialize`] schedules the behavior that
//! runs on its own (movement, routing, applications) and the simulation runs.

pub(crate) mod forwarding;
pub mod ip;
mod node;
pub mod spec;

use crate::Sim;
use crate::applications::{self, Application};
use crate::energy::{EnergySource, EnergySourceSpec, RadioEnergySpec};
use crate::flow_monitor::{DropReason, FlowMonitor};
use crate::mobility::{self, MobilityModel, PositionAllocator, RandomWalkSpec, Vector};
use crate::packet::Packet;
use crate::pcap_exporter::PcapExporterFactory;
use crate::radio::WifiDevice;
use crate::routing::{self, ControlMessageTrace};
use anyhow::{Context, bail};
use event_runtime::SimTime;
use fastrand::Rng;
use ip::{Ipv4AddressAllocator, Ipv4Cidr};
use spec::NetworkSpec;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::net::Ipv4Addr;

pub use node::Node;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct NodeId(pub u32);

impl Display for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub struct Network {
    pub(crate) spec: NetworkSpec,
    pub(crate) nodes: Vec<Node>,
    pub(crate) rng: Rng,
    pub(crate) addresses: BTreeMap<Ipv4Addr, NodeId>,
    pub(crate) applications: Vec<Application>,
    pub(crate) flow_monitor: Option<FlowMonitor>,
    pub(crate) control_trace: Option<ControlMessageTrace>,
    next_packet_uid: u64,
    next_frame_id: u64,
    initialized: bool,
}

impl Network {
    pub fn new(spec: NetworkSpec, rng: Rng) -> Self {
        Self {
            spec,
            nodes: Vec::new(),
            rng,
            addresses: BTreeMap::new(),
            applications: Vec::new(),
            flow_monitor: None,
            control_trace: None,
            next_packet_uid: 0,
            next_frame_id: 0,
            initialized: false,
        }
    }

    pub fn spec(&self) -> &NetworkSpec {
        &self.spec
    }

    /// Creates `count` nodes, with ids continuing from the last created node
    pub fn create_nodes(&mut self, count: u32) -> Vec<NodeId> {
        let first = self.nodes.len() as u32;
        (first..first + count)
            .map(|id| {
                let id = NodeId(id);
                self.nodes.push(Node::new(id));
                id
            })
            .collect()
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0 as usize)
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0 as usize)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn node_by_address(&self, address: Ipv4Addr) -> Option<NodeId> {
        self.addresses.get(&address).copied()
    }

    pub fn address_of(&self, node: NodeId) -> Option<Ipv4Addr> {
        self.node(node)?.address
    }

    /// Places each node with `allocator`, then keeps it still or lets it walk
    pub fn install_mobility(
        &mut self,
        nodes: &[NodeId],
        allocator: &mut PositionAllocator,
        walk: Option<RandomWalkSpec>,
    ) {
        for &id in nodes {
            let position = allocator.next_position();
            let model = match walk {
                Some(spec) => MobilityModel::random_walk(spec, position, self.rng.fork()),
                None => MobilityModel::constant(position),
            };

            if let Some(node) = self.node_mut(id) {
                node.mobility = Some(model);
            }
        }
    }

    /// Installs an ad-hoc radio device on each node, returning the number of installed devices
    pub fn install_wifi_devices(&mut self, nodes: &[NodeId]) -> usize {
        let mut installed = 0;
        for &id in nodes {
            if let Some(node) = self.node_mut(id) {
                node.device = Some(WifiDevice::new());
                installed += 1;
            }
        }

        installed
    }

    /// Installs a battery on each node, drained by the node's radio if it has one
    pub fn install_energy_sources(
        &mut self,
        nodes: &[NodeId],
        source: EnergySourceSpec,
        radio: RadioEnergySpec,
    ) {
        for &id in nodes {
            if let Some(node) = self.node_mut(id) {
                let mut energy = EnergySource::new(source);
                if node.device.is_some() {
                    energy.attach_radio_model(radio);
                }

                node.energy = Some(energy);
            }
        }
    }

    /// Assigns consecutive host addresses of `network` to the nodes' devices, in order
    pub fn assign_addresses(
        &mut self,
        nodes: &[NodeId],
        network: Ipv4Cidr,
    ) -> anyhow::Result<Vec<Ipv4Addr>> {
        let mut allocator = Ipv4AddressAllocator::new(network);
        let mut assigned = Vec::with_capacity(nodes.len());
        for &id in nodes {
            let Some(node) = self.node_mut(id) else {
                bail!("node {id} does not exist");
            };

            if !node.has_device() {
                bail!("node {id} has no network device to assign an address to");
            }

            if !node.has_internet_stack() {
                bail!("node {id} has no internet stack");
            }

            let address = allocator
                .next_address()
                .with_context(|| format!("failed to assign an address to node {id}"))?;
            node.address = Some(address);
            self.addresses.insert(address, id);
            assigned.push(address);
        }

        Ok(assigned)
    }

    /// Starts tracking flows originating at, forwarded by, or delivered to `nodes`
    pub fn install_flow_monitor(&mut self, nodes: &[NodeId]) {
        let monitor = self
            .flow_monitor
            .get_or_insert_with(|| FlowMonitor::new(self.spec.max_per_hop_delay));
        monitor.monitor_nodes(nodes);
    }

    pub fn flow_monitor(&self) -> Option<&FlowMonitor> {
        self.flow_monitor.as_ref()
    }

    pub fn flow_monitor_mut(&mut self) -> Option<&mut FlowMonitor> {
        self.flow_monitor.as_mut()
    }

    /// Creates one pcap exporter per device, named `<prefix>-<node>-0`
    pub fn enable_pcap(
        &mut self,
        factory: &dyn PcapExporterFactory,
        prefix: &str,
        nodes: &[NodeId],
    ) -> anyhow::Result<()> {
        for &id in nodes {
            let Some(device) = self.device_mut(id) else {
                continue;
            };

            let name = format!("{prefix}-{id}-0");
            device.pcap = Some(factory.create_pcap_exporter(&name)?);
        }

        Ok(())
    }

    pub fn flush_pcap_exporters(&mut self) -> anyhow::Result<()> {
        for node in &mut self.nodes {
            if let Some(pcap) = node.device.as_mut().and_then(|d| d.pcap.as_mut()) {
                pcap.flush()
                    .with_context(|| format!("failed to flush pcap of node {}", node.id))?;
            }
        }

        Ok(())
    }

    pub(crate) fn device_mut(&mut self, id: NodeId) -> Option<&mut WifiDevice> {
        self.node_mut(id)?.device.as_mut()
    }

    pub(crate) fn mobility_mut(&mut self, id: NodeId) -> Option<&mut MobilityModel> {
        self.node_mut(id)?.mobility.as_mut()
    }

    pub(crate) fn energy_mut(&mut self, id: NodeId) -> Option<&mut EnergySource> {
        self.node_mut(id)?.energy.as_mut()
    }

    pub(crate) fn is_alive(&self, id: NodeId, now: SimTime) -> bool {
        self.node(id).is_some_and(|n| n.is_alive(now))
    }

    pub(crate) fn position(&self, id: NodeId, now: SimTime) -> Vector {
        self.node(id)
            .map(|n| n.position(now))
            .unwrap_or_default()
    }

    pub(crate) fn next_packet_uid(&mut self) -> u64 {
        let uid = self.next_packet_uid;
        self.next_packet_uid += 1;
        uid
    }

    pub(crate) fn next_frame_id(&mut self) -> u64 {
        let id = self.next_frame_id;
        self.next_frame_id += 1;
        id
    }

    pub(crate) fn drop_packet(
        &mut self,
        node: NodeId,
        now: SimTime,
        packet: &Packet,
        reason: DropReason,
    ) {
        tracing::debug!(
            "{now}s node {node} dropped packet #{} ({} -> {}): {reason}",
            packet.uid,
            packet.source,
            packet.destination
        );

        if let Some(monitor) = &mut self.flow_monitor {
            monitor.report_drop(node, now, packet, reason);
        }
    }
}

/// Schedules everything that runs without external stimulus: random walk direction changes,
/// routing protocol timers and application start times
pub fn initialize(sim: &mut Sim) {
    let network = sim.world_mut();
    if network.initialized {
        tracing::warn!("attempted to initialize the network twice");
        return;
    }
    network.initialized = true;

    let walkers: Vec<_> = network
        .nodes
        .iter()
        .filter_map(|n| {
            let interval = n.mobility.as_ref()?.direction_change_interval()?;
            Some((n.id, interval))
        })
        .collect();
    for (node, interval) in walkers {
        mobility::schedule_direction_change(sim, node, interval);
    }

    routing::start(sim);
    applications::start(sim);
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mobility::Rectangle;
    use crate::routing::RoutingProtocolKind;
    use std::time::Duration;

    fn network_with_nodes(count: u32) -> (Network, Vec<NodeId>) {
        let mut network = Network::new(NetworkSpec::default(), Rng::with_seed(1));
        let nodes = network.create_nodes(count);
        (network, nodes)
    }

    #[test]
    fn test_node_ids_continue_across_containers() {
        let (mut network, fixed) = network_with_nodes(3);
        let mobile = network.create_nodes(2);

        assert_eq!(fixed, vec![NodeId(0), NodeId(1), NodeId(2)]);
        assert_eq!(mobile, vec![NodeId(3), NodeId(4)]);
        assert_eq!(network.node_count(), 5);
    }

    #[test]
    fn test_assign_addresses_in_device_order() {
        let (mut network, nodes) = network_with_nodes(3);
        network.install_wifi_devices(&nodes);
        network.install_internet_stack(&nodes, RoutingProtocolKind::Olsr);

        let addresses = network
            .assign_addresses(&nodes, "10.1.1.0/24".parse().unwrap())
            .unwrap();
        assert_eq!(
            addresses,
            vec![
                Ipv4Addr::new(10, 1, 1, 1),
                Ipv4Addr::new(10, 1, 1, 2),
                Ipv4Addr::new(10, 1, 1, 3)
            ]
        );
        assert_eq!(
            network.node_by_address(Ipv4Addr::new(10, 1, 1, 2)),
            Some(NodeId(1))
        );
    }

    #[test]
    fn test_assign_addresses_requires_device_and_stack() {
        let (mut network, nodes) = network_with_nodes(1);
        let subnet: Ipv4Cidr = "10.1.1.0/24".parse().unwrap();
        assert!(network.assign_addresses(&nodes, subnet).is_err());

        network.install_wifi_devices(&nodes);
        assert!(network.assign_addresses(&nodes, subnet).is_err());

        network.install_internet_stack(&nodes, RoutingProtocolKind::Aodv);
        assert!(network.assign_addresses(&nodes, subnet).is_ok());
    }

    #[test]
    fn test_energy_without_device_does_not_drain() {
        let (mut network, nodes) = network_with_nodes(2);
        network.install_wifi_devices(&nodes[..1]);
        network.install_energy_sources(
            &nodes,
            EnergySourceSpec::default(),
            RadioEnergySpec::default(),
        );

        let later = SimTime::from_secs(10);
        let with_radio = network.node(nodes[0]).unwrap().remaining_energy_j(later);
        let without_radio = network.node(nodes[1]).unwrap().remaining_energy_j(later);
        assert!(with_radio.unwrap() < 100.0);
        assert_eq!(without_radio, Some(100.0));
    }

    #[test]
    fn test_walking_nodes_change_direction() {
        let (mut network, nodes) = network_with_nodes(1);
        let bounds = Rectangle::new(0.0, 100.0, 0.0, 100.0);
        let walk = RandomWalkSpec {
            bounds,
            speed_mps: 1.0,
            direction_change_interval: Duration::from_secs(2),
        };
        let mut allocator = PositionAllocator::random_rectangle(bounds, Rng::with_seed(3));
        network.install_mobility(&nodes, &mut allocator, Some(walk));

        let mut sim = Sim::new(network);
        initialize(&mut sim);
        sim.stop(Duration::from_secs(7));
        sim.run();

        // Direction changes at 2, 4 and 6 seconds; the next one is still pending
        assert_eq!(sim.executed_events(), 4);
        assert_eq!(sim.pending_events(), 1);
        let position = sim.world().node(nodes[0]).unwrap().position(sim.now());
        assert!(bounds.contains(&position));
    }
}
