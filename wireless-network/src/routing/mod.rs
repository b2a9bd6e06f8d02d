//! Ad-hoc routing protocols
//!
//! Every node with an internet stack runs one routing agent. Proactive agents (OLSR, DSDV) keep a
//! complete table that is periodically recomputed from the current connectivity. Reactive agents
//! (AODV, DSR) discover routes on demand, buffering packets in the meantime.
//!
//! Protocol signalling is not put on the air. Instead, each control message charges the sender's
//! battery for its transmission and is reported through the optional control message trace.

mod proactive;
mod reactive;
pub(crate) mod topology;

use crate::Sim;
use crate::flow_monitor::DropReason;
use crate::network::{Network, NodeId};
use crate::packet::{IPV4_HEADER_SIZE, Packet, UDP_HEADER_SIZE};
use crate::radio::{self, MAC_OVERHEAD_BYTES};
use anyhow::bail;
use event_runtime::SimTime;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::time::Duration;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub enum RoutingProtocolKind {
    Aodv,
    Olsr,
    Dsdv,
    Dsr,
}

impl RoutingProtocolKind {
    pub fn name(&self) -> &'static str {
        match self {
            RoutingProtocolKind::Aodv => "AODV",
            RoutingProtocolKind::Olsr => "OLSR",
            RoutingProtocolKind::Dsdv => "DSDV",
            RoutingProtocolKind::Dsr => "DSR",
        }
    }

    /// Interval between two table recomputations of a proactive protocol
    pub(crate) fn refresh_interval(&self) -> Option<Duration> {
        match self {
            RoutingProtocolKind::Olsr => Some(Duration::from_secs(2)),
            RoutingProtocolKind::Dsdv => Some(Duration::from_secs(15)),
            RoutingProtocolKind::Aodv | RoutingProtocolKind::Dsr => None,
        }
    }
}

impl Display for RoutingProtocolKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("unsupported routing protocol: {0}")]
pub struct UnsupportedRoutingProtocol(pub String);

impl FromStr for RoutingProtocolKind {
    type Err = UnsupportedRoutingProtocol;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AODV" => Ok(RoutingProtocolKind::Aodv),
            "OLSR" => Ok(RoutingProtocolKind::Olsr),
            "DSDV" => Ok(RoutingProtocolKind::Dsdv),
            "DSR" => Ok(RoutingProtocolKind::Dsr),
            other => Err(UnsupportedRoutingProtocol(other.to_string())),
        }
    }
}

/// A routing protocol message, as reported to the control message trace
#[derive(Clone, Debug, PartialEq)]
pub struct ControlMessage {
    pub protocol: RoutingProtocolKind,
    pub node: NodeId,
    pub message_type: &'static str,
    pub size_bytes: u32,
}

pub type ControlMessageTrace = Box<dyn FnMut(SimTime, &ControlMessage)>;

#[derive(Clone, Debug)]
pub(crate) struct RouteEntry {
    pub(crate) next_hop: NodeId,
    pub(crate) hops: u32,
    /// Proactive routes live until the next table recomputation
    pub(crate) expires_at: Option<SimTime>,
}

impl RouteEntry {
    fn is_valid(&self, now: SimTime) -> bool {
        self.expires_at.is_none_or(|expiry| expiry > now)
    }
}

#[derive(Clone, Debug)]
pub(crate) struct CachedRoute {
    /// Full path, starting at the caching node
    pub(crate) path: Vec<NodeId>,
    pub(crate) expires_at: SimTime,
}

pub struct RoutingAgent {
    kind: RoutingProtocolKind,
    pub(crate) table: BTreeMap<NodeId, RouteEntry>,
    pub(crate) route_cache: BTreeMap<NodeId, CachedRoute>,
    pub(crate) send_buffer: VecDeque<(NodeId, Packet)>,
    pub(crate) pending_discoveries: BTreeSet<NodeId>,
}

impl RoutingAgent {
    fn new(kind: RoutingProtocolKind) -> Self {
        Self {
            kind,
            table: BTreeMap::new(),
            route_cache: BTreeMap::new(),
            send_buffer: VecDeque::new(),
            pending_discoveries: BTreeSet::new(),
        }
    }

    pub fn kind(&self) -> RoutingProtocolKind {
        self.kind
    }

    /// Number of destinations this node currently knows a valid route to
    pub fn route_count(&self, now: SimTime) -> usize {
        match self.kind {
            RoutingProtocolKind::Dsr => self
                .route_cache
                .values()
                .filter(|r| r.expires_at > now)
                .count(),
            _ => self.table.values().filter(|r| r.is_valid(now)).count(),
        }
    }

    pub(crate) fn valid_route(&self, destination: NodeId, now: SimTime) -> Option<&RouteEntry> {
        self.table.get(&destination).filter(|r| r.is_valid(now))
    }
}

impl Network {
    /// Installs IPv4 and UDP on the nodes, along with an agent of `protocol`
    ///
    /// Source routing needs a second installation step, see [`Network::install_dsr`]. Until then,
    /// nodes have a stack without any routing agent.
    pub fn install_internet_stack(&mut self, nodes: &[NodeId], protocol: RoutingProtocolKind) {
        for &id in nodes {
            if let Some(node) = self.node_mut(id) {
                node.internet_stack = true;
                if protocol != RoutingProtocolKind::Dsr {
                    node.routing = Some(RoutingAgent::new(protocol));
                }
            }
        }
    }

    /// Installs the source routing agent on nodes that already have an internet stack
    pub fn install_dsr(&mut self, nodes: &[NodeId]) -> anyhow::Result<()> {
        for &id in nodes {
            let Some(node) = self.node_mut(id) else {
                bail!("node {id} does not exist");
            };

            if !node.internet_stack {
                bail!("DSR requires an internet stack on node {id}");
            }

            node.routing = Some(RoutingAgent::new(RoutingProtocolKind::Dsr));
        }

        Ok(())
    }

    pub fn set_control_message_trace(
        &mut self,
        trace: impl FnMut(SimTime, &ControlMessage) + 'static,
    ) {
        self.control_trace = Some(Box::new(trace));
    }

    pub(crate) fn agent(&self, node: NodeId) -> Option<&RoutingAgent> {
        self.node(node)?.routing.as_ref()
    }

    pub(crate) fn agent_mut(&mut self, node: NodeId) -> Option<&mut RoutingAgent> {
        self.node_mut(node)?.routing.as_mut()
    }

    /// Accounts for a control message sent by `node`
    pub(crate) fn emit_control(
        &mut self,
        now: SimTime,
        node: NodeId,
        message_type: &'static str,
        size_bytes: u32,
    ) {
        if !self.is_alive(node, now) {
            return;
        }

        let Some(protocol) = self.agent(node).map(|a| a.kind()) else {
            return;
        };

        let frame_bytes =
            size_bytes as usize + UDP_HEADER_SIZE + IPV4_HEADER_SIZE + MAC_OVERHEAD_BYTES;
        let airtime = radio::airtime(radio::basic_rate(), frame_bytes);
        if let Some(energy) = self.energy_mut(node) {
            energy.record_tx(airtime);
        }

        if let Some(trace) = &mut self.control_trace {
            trace(
                now,
                &ControlMessage {
                    protocol,
                    node,
                    message_type,
                    size_bytes,
                },
            );
        }
    }
}

/// Starts the periodic behavior of every routing agent
pub(crate) fn start(sim: &mut Sim) {
    let agents: Vec<_> = sim
        .world()
        .nodes()
        .filter_map(|n| Some((n.id(), n.routing_protocol()?)))
        .collect();

    for (node, kind) in agents {
        let jitter = Duration::from_secs_f64(sim.world_mut().rng.f64() * 0.5);
        match kind {
            RoutingProtocolKind::Olsr | RoutingProtocolKind::Dsdv => {
                sim.schedule(jitter, move |sim| proactive::refresh(sim, node));
            }
            RoutingProtocolKind::Aodv => {
                sim.schedule(jitter, move |sim| reactive::hello(sim, node));
            }
            RoutingProtocolKind::Dsr => {}
        }
    }
}

/// Routes a packet originating at `node`
pub(crate) fn route_output(sim: &mut Sim, node: NodeId, packet: Packet) {
    let Some((destination, kind)) = resolve(sim, node, &packet) else {
        return;
    };

    match kind {
        RoutingProtocolKind::Olsr | RoutingProtocolKind::Dsdv => {
            proactive::route(sim, node, destination, packet)
        }
        RoutingProtocolKind::Aodv => reactive::aodv_route_output(sim, node, destination, packet),
        RoutingProtocolKind::Dsr => reactive::dsr_route_output(sim, node, destination, packet),
    }
}

/// Routes a packet that `node` received on behalf of another node
pub(crate) fn route_input(sim: &mut Sim, node: NodeId, packet: Packet) {
    let Some((destination, kind)) = resolve(sim, node, &packet) else {
        return;
    };

    match kind {
        RoutingProtocolKind::Olsr | RoutingProtocolKind::Dsdv => {
            proactive::route(sim, node, destination, packet)
        }
        RoutingProtocolKind::Aodv => reactive::aodv_route_input(sim, node, destination, packet),
        RoutingProtocolKind::Dsr => reactive::dsr_route_input(sim, node, packet),
    }
}

/// Finds the destination node and the local protocol, dropping the packet if either is missing
fn resolve(
    sim: &mut Sim,
    node: NodeId,
    packet: &Packet,
) -> Option<(NodeId, RoutingProtocolKind)> {
    let now = sim.now();
    let network = sim.world_mut();
    let destination = network.node_by_address(*packet.destination.ip());
    let kind = network.agent(node).map(|a| a.kind());

    match destination.zip(kind) {
        Some(resolved) => Some(resolved),
        None => {
            network.drop_packet(node, now, packet, DropReason::NoRoute);
            None
        }
    }
}

/// Reacts to the MAC giving up on the link from `node` to `next_hop`
pub(crate) fn handle_link_failure(
    sim: &mut Sim,
    node: NodeId,
    next_hop: NodeId,
    packet: &Packet,
) {
    let now = sim.now();
    let network = sim.world_mut();
    let Some(kind) = network.agent(node).map(|a| a.kind()) else {
        return;
    };

    match kind {
        RoutingProtocolKind::Aodv => reactive::aodv_link_failure(network, now, node, next_hop),
        RoutingProtocolKind::Dsr => {
            reactive::dsr_link_failure(network, now, node, next_hop, packet)
        }
        // The next table recomputation routes around the broken link
        RoutingProtocolKind::Olsr | RoutingProtocolKind::Dsdv => {}
    }
}
