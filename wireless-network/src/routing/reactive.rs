//! On-demand routing (AODV, DSR)
//!
//! A source without a usable route buffers the packet and floods a route request. When the
//! destination is reachable, the reply arrives after a per-hop traversal latency and installs the
//! route: hop-by-hop table entries for AODV, a source route cache entry for DSR. Unanswered
//! requests are retried with exponential backoff before the buffered packets are dropped.

use super::{CachedRoute, RouteEntry, RoutingProtocolKind, topology};
use crate::Sim;
use crate::flow_monitor::DropReason;
use crate::network::{Network, NodeId};
use crate::packet::Packet;
use crate::radio::mac;
use event_runtime::SimTime;
use std::collections::VecDeque;
use std::time::Duration;

const ACTIVE_ROUTE_TIMEOUT: Duration = Duration::from_secs(3);
const ROUTE_CACHE_TIMEOUT: Duration = Duration::from_secs(300);
const HELLO_INTERVAL: Duration = Duration::from_secs(1);
const NODE_TRAVERSAL_TIME: Duration = Duration::from_millis(40);
const NET_DIAMETER: u32 = 35;
const RREQ_RETRIES: u32 = 2;
const SEND_BUFFER_CAPACITY: usize = 64;

const RREQ_BYTES: u32 = 24;
const RREP_BYTES: u32 = 20;
const RERR_BYTES: u32 = 12;
const BYTES_PER_ADDRESS: u32 = 4;

fn net_traversal_time() -> Duration {
    NODE_TRAVERSAL_TIME * 2 * NET_DIAMETER
}

/// Periodic AODV neighbor announcement
pub(super) fn hello(sim: &mut Sim, node: NodeId) {
    let now = sim.now();
    let network = sim.world_mut();
    if !network.is_alive(node, now) {
        return;
    }

    network.emit_control(now, node, "HELLO", RREP_BYTES);
    sim.schedule(HELLO_INTERVAL, move |sim| hello(sim, node));
}

/// Returns the next hop towards `destination`, extending the route's lifetime
fn use_route(
    network: &mut Network,
    node: NodeId,
    destination: NodeId,
    now: SimTime,
) -> Option<NodeId> {
    let agent = network.agent_mut(node)?;
    let entry = agent.table.get_mut(&destination)?;
    if !entry.is_valid(now) {
        return None;
    }

    let refreshed = now + ACTIVE_ROUTE_TIMEOUT;
    entry.expires_at = entry.expires_at.max(Some(refreshed));
    Some(entry.next_hop)
}

pub(super) fn aodv_route_output(
    sim: &mut Sim,
    node: NodeId,
    destination: NodeId,
    packet: Packet,
) {
    let now = sim.now();
    match use_route(sim.world_mut(), node, destination, now) {
        Some(next_hop) => mac::enqueue(sim, node, packet, next_hop),
        None => buffer_and_discover(sim, node, destination, packet),
    }
}

pub(super) fn aodv_route_input(
    sim: &mut Sim,
    node: NodeId,
    destination: NodeId,
    packet: Packet,
) {
    let now = sim.now();
    let network = sim.world_mut();
    match use_route(network, node, destination, now) {
        Some(next_hop) => mac::enqueue(sim, node, packet, next_hop),
        None => {
            network.drop_packet(node, now, &packet, DropReason::NoRoute);
            network.emit_control(now, node, "RERR", RERR_BYTES + BYTES_PER_ADDRESS);
        }
    }
}

pub(super) fn dsr_route_output(
    sim: &mut Sim,
    node: NodeId,
    destination: NodeId,
    mut packet: Packet,
) {
    let now = sim.now();
    let path = sim
        .world()
        .agent(node)
        .and_then(|a| a.route_cache.get(&destination))
        .filter(|r| r.expires_at > now && r.path.len() >= 2)
        .map(|r| r.path.clone());

    match path {
        Some(path) => {
            let next_hop = path[1];
            packet.source_route = Some(path);
            mac::enqueue(sim, node, packet, next_hop);
        }
        None => buffer_and_discover(sim, node, destination, packet),
    }
}

/// Follows the route carried by the packet
pub(super) fn dsr_route_input(sim: &mut Sim, node: NodeId, packet: Packet) {
    let now = sim.now();
    let next_hop = packet.source_route.as_ref().and_then(|route| {
        let position = route.iter().position(|&hop| hop == node)?;
        route.get(position + 1).copied()
    });

    match next_hop {
        Some(next_hop) => mac::enqueue(sim, node, packet, next_hop),
        None => {
            let network = sim.world_mut();
            network.drop_packet(node, now, &packet, DropReason::NoRoute);
            network.emit_control(now, node, "RERR", RERR_BYTES + BYTES_PER_ADDRESS);
        }
    }
}

fn buffer_and_discover(sim: &mut Sim, node: NodeId, destination: NodeId, packet: Packet) {
    let now = sim.now();
    let network = sim.world_mut();
    let Some(agent) = network.agent_mut(node) else {
        network.drop_packet(node, now, &packet, DropReason::NoRoute);
        return;
    };

    // A full buffer makes room by evicting its oldest packet
    let evicted = if agent.send_buffer.len() >= SEND_BUFFER_CAPACITY {
        agent.send_buffer.pop_front()
    } else {
        None
    };
    agent.send_buffer.push_back((destination, packet));
    let new_discovery = agent.pending_discoveries.insert(destination);

    if let Some((_, evicted)) = evicted {
        network.drop_packet(node, now, &evicted, DropReason::SendBufferFull);
    }

    if new_discovery {
        start_discovery(sim, node, destination, 0);
    }
}

fn start_discovery(sim: &mut Sim, source: NodeId, destination: NodeId, attempt: u32) {
    let now = sim.now();
    let network = sim.world_mut();
    let paths = topology::shortest_paths(network, now, source);

    // Every node reached by the flood rebroadcasts the request once, except the destination
    for &relay in paths.keys().filter(|&&n| n != destination) {
        network.emit_control(now, relay, "RREQ", RREQ_BYTES);
    }

    match paths.get(&destination).cloned() {
        Some(path) => {
            let hops = path.len() as u32 - 1;
            let latency = NODE_TRAVERSAL_TIME * 2 * hops;
            sim.schedule(latency, move |sim| complete_discovery(sim, source, destination, path));
        }
        None => {
            let timeout = net_traversal_time() * (1 << attempt);
            tracing::debug!(
                "{now}s node {source} found no route to node {destination} (attempt {attempt})"
            );
            sim.schedule(timeout, move |sim| {
                if attempt < RREQ_RETRIES {
                    start_discovery(sim, source, destination, attempt + 1);
                } else {
                    fail_discovery(sim, source, destination);
                }
            });
        }
    }
}

fn complete_discovery(sim: &mut Sim, source: NodeId, destination: NodeId, path: Vec<NodeId>) {
    let now = sim.now();
    let network = sim.world_mut();
    let Some(kind) = network.agent(source).map(|a| a.kind()) else {
        return;
    };

    // The reply travels back from the destination, relayed by every intermediate node
    for &hop in path.iter().skip(1).rev() {
        let size = match kind {
            RoutingProtocolKind::Dsr => RREP_BYTES + BYTES_PER_ADDRESS * path.len() as u32,
            _ => RREP_BYTES,
        };
        network.emit_control(now, hop, "RREP", size);
    }

    match kind {
        RoutingProtocolKind::Dsr => install_source_routes(network, now, &path),
        _ => install_hop_by_hop_routes(network, now, &path),
    }

    let Some(agent) = network.agent_mut(source) else {
        return;
    };
    agent.pending_discoveries.remove(&destination);
    let (ready, waiting): (VecDeque<_>, VecDeque<_>) = agent
        .send_buffer
        .drain(..)
        .partition(|(d, _)| *d == destination);
    agent.send_buffer = waiting;

    for (_, packet) in ready {
        match kind {
            RoutingProtocolKind::Dsr => dsr_route_output(sim, source, destination, packet),
            _ => aodv_route_output(sim, source, destination, packet),
        }
    }
}

fn fail_discovery(sim: &mut Sim, source: NodeId, destination: NodeId) {
    let now = sim.now();
    let network = sim.world_mut();
    let Some(agent) = network.agent_mut(source) else {
        return;
    };

    agent.pending_discoveries.remove(&destination);
    let (failed, waiting): (VecDeque<_>, VecDeque<_>) = agent
        .send_buffer
        .drain(..)
        .partition(|(d, _)| *d == destination);
    agent.send_buffer = waiting;

    tracing::debug!(
        "{now}s node {source} gave up on node {destination}, dropping {} packets",
        failed.len()
    );
    for (_, packet) in failed {
        network.drop_packet(source, now, &packet, DropReason::DiscoveryFailed);
    }
}

/// Installs forward routes towards the destination and reverse routes towards the source
fn install_hop_by_hop_routes(network: &mut Network, now: SimTime, path: &[NodeId]) {
    let (Some(&source), Some(&destination)) = (path.first(), path.last()) else {
        return;
    };

    let expires_at = Some(now + ACTIVE_ROUTE_TIMEOUT);
    for (i, &hop) in path.iter().enumerate() {
        let Some(agent) = network.agent_mut(hop) else {
            continue;
        };

        if let Some(&next_hop) = path.get(i + 1) {
            agent.table.insert(
                destination,
                RouteEntry {
                    next_hop,
                    hops: (path.len() - 1 - i) as u32,
                    expires_at,
                },
            );
        }

        if i > 0 {
            agent.table.insert(
                source,
                RouteEntry {
                    next_hop: path[i - 1],
                    hops: i as u32,
                    expires_at,
                },
            );
        }
    }
}

/// Caches the path at the source, and its reverse at the destination
fn install_source_routes(network: &mut Network, now: SimTime, path: &[NodeId]) {
    let (Some(&source), Some(&destination)) = (path.first(), path.last()) else {
        return;
    };

    let expires_at = now + ROUTE_CACHE_TIMEOUT;
    if let Some(agent) = network.agent_mut(source) {
        agent.route_cache.insert(
            destination,
            CachedRoute {
                path: path.to_vec(),
                expires_at,
            },
        );
    }

    if let Some(agent) = network.agent_mut(destination) {
        agent.route_cache.insert(
            source,
            CachedRoute {
                path: path.iter().rev().copied().collect(),
                expires_at,
            },
        );
    }
}

/// Invalidates every route through the broken link
pub(super) fn aodv_link_failure(
    network: &mut Network,
    now: SimTime,
    node: NodeId,
    next_hop: NodeId,
) {
    let Some(agent) = network.agent_mut(node) else {
        return;
    };

    let before = agent.table.len();
    agent.table.retain(|_, route| route.next_hop != next_hop);
    let unreachable = (before - agent.table.len()) as u32;

    if unreachable > 0 {
        let size = RERR_BYTES + BYTES_PER_ADDRESS * unreachable;
        network.emit_control(now, node, "RERR", size);
    }
}

/// Purges cached routes containing the broken link, at the detecting node and at the source
pub(super) fn dsr_link_failure(
    network: &mut Network,
    now: SimTime,
    node: NodeId,
    next_hop: NodeId,
    packet: &Packet,
) {
    let source = network.node_by_address(*packet.source.ip());
    for holder in [Some(node), source].into_iter().flatten() {
        if let Some(agent) = network.agent_mut(holder) {
            agent.route_cache.retain(|_, route| {
                !route
                    .path
                    .windows(2)
                    .any(|link| link[0] == node && link[1] == next_hop)
            });
        }
    }

    network.emit_control(now, node, "RERR", RERR_BYTES + BYTES_PER_ADDRESS);
}
