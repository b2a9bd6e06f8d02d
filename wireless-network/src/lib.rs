//! In-memory wireless ad-hoc network simulator
//!
//! Provides nodes on a shared 802.11g-like radio medium, with mobility, energy accounting, four
//! ad-hoc routing protocols, constant-rate UDP applications, a flow monitor and pcap export. The
//! network is the world of an [`event_runtime::Rt`], and all of its behavior is driven by
//! scheduled callbacks.

pub mod applications;
pub mod energy;
pub mod flow_monitor;
pub mod mobility;
pub mod network;
pub mod packet;
pub mod pcap_exporter;
pub mod radio;
pub mod routing;

pub use network::{Network, NodeId};
pub use packet::Packet;

/// A simulation whose world is a wireless [`Network`]
pub type Sim = event_runtime::Rt<Network>;

#[cfg(test)]
mod test {
    use super::*;
    use crate::applications::OnOffSpec;
    use crate::energy::{EnergySourceSpec, RadioEnergySpec};
    use crate::flow_monitor::{DropReason, FlowId};
    use crate::mobility::PositionAllocator;
    use crate::network::spec::NetworkSpec;
    use crate::routing::{ControlMessage, RoutingProtocolKind};
    use bon::builder;
    use event_runtime::SimTime;
    use fastrand::Rng;
    use std::cell::RefCell;
    use std::net::SocketAddrV4;
    use std::rc::Rc;
    use std::time::Duration;

    const SINK_PORT: u16 = 9;

    struct Fixture {
        sim: Sim,
        received: Rc<RefCell<Vec<(SimTime, Option<u8>)>>>,
        control_messages: Rc<RefCell<Vec<ControlMessage>>>,
    }

    /// Nodes on a horizontal line; the last one sends to a sink on the first one
    #[builder]
    fn line_network(
        nodes: u32,
        spacing: Option<f64>,
        protocol: Option<RoutingProtocolKind>,
        tag: Option<u8>,
        duration_secs: Option<u64>,
        initial_energy_j: Option<f64>,
    ) -> Fixture {
        let spacing = spacing.unwrap_or(50.0);
        let protocol = protocol.unwrap_or(RoutingProtocolKind::Aodv);
        let stop = SimTime::from_secs(duration_secs.unwrap_or(10));

        let mut network = Network::new(NetworkSpec::default(), Rng::with_seed(42));
        let ids = network.create_nodes(nodes);
        let mut allocator = PositionAllocator::grid(0.0, 0.0, spacing, spacing, nodes);
        network.install_mobility(&ids, &mut allocator, None);
        network.install_wifi_devices(&ids);
        network.install_energy_sources(
            &ids,
            EnergySourceSpec {
                initial_energy_j: initial_energy_j.unwrap_or(100.0),
                ..Default::default()
            },
            RadioEnergySpec::default(),
        );
        network.install_internet_stack(&ids, protocol);
        if protocol == RoutingProtocolKind::Dsr {
            network.install_dsr(&ids).unwrap();
        }

        let addresses = network
            .assign_addresses(&ids, "192.168.1.0/24".parse().unwrap())
            .unwrap();
        network.install_flow_monitor(&ids);

        let control_messages = Rc::new(RefCell::new(Vec::new()));
        let control_messages_clone = control_messages.clone();
        network.set_control_message_trace(move |_, message| {
            control_messages_clone.borrow_mut().push(message.clone())
        });

        let sink = network
            .install_packet_sink(ids[0], SINK_PORT, SimTime::ZERO, stop)
            .unwrap();
        let received = Rc::new(RefCell::new(Vec::new()));
        let received_clone = received.clone();
        network
            .connect_rx_trace(sink, move |now, packet, _| {
                received_clone.borrow_mut().push((now, packet.tag))
            })
            .unwrap();

        let spec = OnOffSpec {
            remote: SocketAddrV4::new(addresses[0], SINK_PORT),
            payload_size: 512,
            interval: Duration::from_millis(500),
            tag,
        };
        let sender = ids[ids.len() - 1];
        network
            .install_on_off(sender, spec, SimTime::from_secs(1), stop)
            .unwrap();

        let mut sim = Sim::new(network);
        network::initialize(&mut sim);
        sim.stop(stop.since_start());

        Fixture {
            sim,
            received,
            control_messages,
        }
    }

    fn flow_stats(sim: &Sim) -> flow_monitor::FlowStats {
        sim.world().flow_monitor().unwrap().flow_stats()[&FlowId(1)].clone()
    }

    #[test]
    fn test_multi_hop_delivery_with_every_protocol() {
        for protocol in [
            RoutingProtocolKind::Aodv,
            RoutingProtocolKind::Olsr,
            RoutingProtocolKind::Dsdv,
            RoutingProtocolKind::Dsr,
        ] {
            let mut fixture = line_network().nodes(4).protocol(protocol).call();
            fixture.sim.run();

            // Packets leave at 1.5, 2.0, ..., 9.5 seconds
            let stats = flow_stats(&fixture.sim);
            assert_eq!(stats.tx_packets, 17, "{protocol}");
            assert!(stats.rx_packets >= 15, "{protocol}: {stats:?}");
            assert_eq!(
                fixture.received.borrow().len() as u64,
                stats.rx_packets,
                "{protocol}"
            );
            assert!(stats.times_forwarded >= 2 * stats.rx_packets, "{protocol}");
            assert!(stats.delay_sum > Duration::ZERO, "{protocol}");

            let now = fixture.sim.now();
            let sender = fixture.sim.world().node(NodeId(3)).unwrap();
            let agent = sender.routing.as_ref().unwrap();
            assert!(agent.route_count(now) >= 1, "{protocol}");
        }
    }

    #[test]
    fn test_tag_survives_forwarding() {
        let mut fixture = line_network().nodes(3).tag(1).call();
        fixture.sim.run();

        let received = fixture.received.borrow();
        assert!(!received.is_empty());
        assert!(received.iter().all(|(_, tag)| *tag == Some(1)));
    }

    #[test]
    fn test_untagged_packets_arrive_without_tag() {
        let mut fixture = line_network().nodes(2).call();
        fixture.sim.run();

        let received = fixture.received.borrow();
        assert!(!received.is_empty());
        assert!(received.iter().all(|(_, tag)| tag.is_none()));
    }

    #[test]
    fn test_proactive_routing_drops_without_route() {
        let mut fixture = line_network()
            .nodes(2)
            .spacing(200.0)
            .protocol(RoutingProtocolKind::Olsr)
            .call();
        fixture.sim.run();

        let stats = flow_stats(&fixture.sim);
        assert!(fixture.received.borrow().is_empty());
        assert_eq!(stats.lost_packets, stats.tx_packets);
        assert_eq!(stats.packets_dropped[&DropReason::NoRoute], stats.tx_packets);
    }

    #[test]
    fn test_reactive_routing_gives_up_on_unreachable_destination() {
        let mut fixture = line_network()
            .nodes(2)
            .spacing(200.0)
            .duration_secs(30)
            .call();
        fixture.sim.run();

        let stats = flow_stats(&fixture.sim);
        assert!(fixture.received.borrow().is_empty());
        assert!(stats.packets_dropped[&DropReason::DiscoveryFailed] > 0);

        let now = fixture.sim.now();
        let sender = fixture.sim.world().node(NodeId(1)).unwrap();
        assert_eq!(sender.routing.as_ref().unwrap().route_count(now), 0);

        let route_requests = fixture
            .control_messages
            .borrow()
            .iter()
            .filter(|m| m.message_type == "RREQ")
            .count();
        assert!(route_requests >= 3);
    }

    #[test]
    fn test_proactive_protocols_announce_periodically() {
        let mut fixture = line_network()
            .nodes(3)
            .protocol(RoutingProtocolKind::Olsr)
            .call();
        fixture.sim.run();

        let messages = fixture.control_messages.borrow();
        let hellos = messages.iter().filter(|m| m.message_type == "HELLO").count();
        let topology_controls = messages.iter().filter(|m| m.message_type == "TC").count();

        // Three nodes refreshing every 2 seconds within 10 seconds
        assert_eq!(hellos, 15);
        assert_eq!(topology_controls, 15);
        assert!(messages.iter().all(|m| m.protocol == RoutingProtocolKind::Olsr));
    }

    #[test]
    fn test_depleted_nodes_stop_communicating() {
        // Idle listening alone drains half a joule in well under a second
        let mut fixture = line_network().nodes(2).initial_energy_j(0.5).call();
        fixture.sim.run();

        let network = fixture.sim.world();
        assert!(fixture.received.borrow().is_empty());
        assert_eq!(
            network.node(NodeId(1)).unwrap().remaining_energy_j(fixture.sim.now()),
            Some(0.0)
        );
    }

    #[test]
    fn test_runs_are_deterministic() {
        let run = || {
            let mut fixture = line_network().nodes(4).protocol(RoutingProtocolKind::Aodv).call();
            fixture.sim.run();
            let received = fixture.received.borrow().clone();
            (received, format!("{:?}", flow_stats(&fixture.sim)))
        };

        assert_eq!(run(), run());
    }
}
