//! The IP layer: local delivery and hand-off to routing

use crate::Sim;
use crate::applications;
use crate::flow_monitor::DropReason;
use crate::network::NodeId;
use crate::packet::Packet;
use crate::routing;

/// Sends a datagram written by a local socket
pub(crate) fn send(sim: &mut Sim, node: NodeId, packet: Packet) {
    let now = sim.now();
    let network = sim.world_mut();
    if let Some(monitor) = &mut network.flow_monitor {
        monitor.report_first_tx(node, now, &packet);
    }

    if network.address_of(node) == Some(*packet.destination.ip()) {
        // Loopback
        sim.schedule_now(move |sim| deliver_locally(sim, node, packet));
        return;
    }

    routing::route_output(sim, node, packet);
}

/// Handles a datagram received by the node's radio
pub(crate) fn receive(sim: &mut Sim, node: NodeId, packet: Packet) {
    let now = sim.now();
    let network = sim.world_mut();
    if !network.is_alive(node, now) {
        network.drop_packet(node, now, &packet, DropReason::NodeDepleted);
        return;
    }

    if network.address_of(node) == Some(*packet.destination.ip()) {
        deliver_locally(sim, node, packet);
        return;
    }

    if let Some(monitor) = &mut network.flow_monitor {
        monitor.report_forwarding(node, now, &packet);
    }

    routing::route_input(sim, node, packet);
}

fn deliver_locally(sim: &mut Sim, node: NodeId, packet: Packet) {
    let now = sim.now();
    let network = sim.world_mut();
    if let Some(monitor) = &mut network.flow_monitor {
        monitor.report_last_rx(node, now, &packet);
    }

    applications::deliver(network, now, node, packet);
}
