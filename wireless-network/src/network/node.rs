use crate::applications::AppId;
use crate::energy::EnergySource;
use crate::mobility::{MobilityModel, Vector};
use crate::network::NodeId;
use crate::radio::WifiDevice;
use crate::routing::{RoutingAgent, RoutingProtocolKind};
use event_runtime::SimTime;
use std::collections::BTreeMap;
use std::net::Ipv4Addr;

const FIRST_EPHEMERAL_PORT: u16 = 49153;

pub struct Node {
    pub(crate) id: NodeId,
    pub(crate) device: Option<WifiDevice>,
    pub(crate) mobility: Option<MobilityModel>,
    pub(crate) energy: Option<EnergySource>,
    pub(crate) address: Option<Ipv4Addr>,
    pub(crate) internet_stack: bool,
    pub(crate) routing: Option<RoutingAgent>,
    pub(crate) sockets: BTreeMap<u16, AppId>,
    next_ephemeral_port: u16,
}

impl Node {
    pub(crate) fn new(id: NodeId) -> Self {
        Self {
            id,
            device: None,
            mobility: None,
            energy: None,
            address: None,
            internet_stack: false,
            routing: None,
            sockets: BTreeMap::new(),
            next_ephemeral_port: FIRST_EPHEMERAL_PORT,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn address(&self) -> Option<Ipv4Addr> {
        self.address
    }

    pub fn has_device(&self) -> bool {
        self.device.is_some()
    }

    pub fn mobility(&self) -> Option<&MobilityModel> {
        self.mobility.as_ref()
    }

    /// Nodes without a mobility model sit at the origin
    pub fn position(&self, now: SimTime) -> Vector {
        self.mobility
            .as_ref()
            .map(|m| m.position(now))
            .unwrap_or_default()
    }

    /// Remaining battery energy, or `None` if no energy source is installed
    pub fn remaining_energy_j(&self, now: SimTime) -> Option<f64> {
        self.energy.as_ref().map(|e| e.remaining_energy_j(now))
    }

    pub fn has_internet_stack(&self) -> bool {
        self.internet_stack
    }

    pub fn routing_protocol(&self) -> Option<RoutingProtocolKind> {
        self.routing.as_ref().map(|r| r.kind())
    }

    /// Whether the node's radio still works
    pub fn is_alive(&self, now: SimTime) -> bool {
        self.device.is_some() && !self.energy.as_ref().is_some_and(|e| e.is_depleted(now))
    }

    pub(crate) fn allocate_ephemeral_port(&mut self) -> u16 {
        while self.sockets.contains_key(&self.next_ephemeral_port) {
            self.next_ephemeral_port = next_ephemeral_port(self.next_ephemeral_port);
        }

        let port = self.next_ephemeral_port;
        self.next_ephemeral_port = next_ephemeral_port(port);
        port
    }
}

fn next_ephemeral_port(port: u16) -> u16 {
    port.checked_add(1).unwrap_or(FIRST_EPHEMERAL_PORT)
}
