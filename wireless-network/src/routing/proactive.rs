//! Table-driven routing (OLSR, DSDV)

use super::{RouteEntry, RoutingProtocolKind, topology};
use crate::Sim;
use crate::flow_monitor::DropReason;
use crate::network::NodeId;
use crate::packet::Packet;
use crate::radio::mac;
use std::collections::BTreeMap;

const OLSR_HEADER_BYTES: u32 = 16;
const OLSR_BYTES_PER_NEIGHBOR: u32 = 4;
const DSDV_BYTES_PER_ROUTE: u32 = 12;

/// Recomputes the node's table and announces it, then schedules the next refresh
pub(super) fn refresh(sim: &mut Sim, node: NodeId) {
    let now = sim.now();
    let network = sim.world_mut();
    let Some(kind) = network.agent(node).map(|a| a.kind()) else {
        return;
    };
    let Some(interval) = kind.refresh_interval() else {
        return;
    };

    if !network.is_alive(node, now) {
        // A depleted node never comes back
        return;
    }

    let paths = topology::shortest_paths(network, now, node);
    let table: BTreeMap<_, _> = paths
        .into_iter()
        .filter(|(destination, _)| *destination != node)
        .map(|(destination, path)| {
            let entry = RouteEntry {
                next_hop: path[1],
                hops: path.len() as u32 - 1,
                expires_at: None,
            };
            (destination, entry)
        })
        .collect();

    let neighbors = table.values().filter(|r| r.hops == 1).count() as u32;
    let routes = table.len() as u32;
    if let Some(agent) = network.agent_mut(node) {
        agent.table = table;
    }

    match kind {
        RoutingProtocolKind::Olsr => {
            let size = OLSR_HEADER_BYTES + OLSR_BYTES_PER_NEIGHBOR * neighbors;
            network.emit_control(now, node, "HELLO", size);
            network.emit_control(now, node, "TC", size);
        }
        RoutingProtocolKind::Dsdv => {
            network.emit_control(now, node, "UPDATE", DSDV_BYTES_PER_ROUTE * (routes + 1));
        }
        RoutingProtocolKind::Aodv | RoutingProtocolKind::Dsr => {}
    }

    sim.schedule(interval, move |sim| refresh(sim, node));
}

/// Forwards along the table, dropping the packet if the destination is unknown
pub(super) fn route(sim: &mut Sim, node: NodeId, destination: NodeId, packet: Packet) {
    let now = sim.now();
    let network = sim.world_mut();
    let next_hop = network
        .agent(node)
        .and_then(|a| a.valid_route(destination, now))
        .map(|r| r.next_hop);

    match next_hop {
        Some(next_hop) => mac::enqueue(sim, node, packet, next_hop),
        None => network.drop_packet(node, now, &packet, DropReason::NoRoute),
    }
}
