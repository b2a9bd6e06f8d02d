//! Per-flow statistics of the UDP traffic crossing monitored nodes

use crate::network::NodeId;
use crate::packet::Packet;
use event_runtime::SimTime;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};
use std::net::Ipv4Addr;
use std::time::Duration;

const UDP_PROTOCOL: u8 = 17;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub enum DropReason {
    NoDevice,
    NodeDepleted,
    QueueFull,
    RetryLimit,
    NoRoute,
    SendBufferFull,
    DiscoveryFailed,
}

impl Display for DropReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            DropReason::NoDevice => "no network device",
            DropReason::NodeDepleted => "node out of energy",
            DropReason::QueueFull => "MAC queue full",
            DropReason::RetryLimit => "retry limit exceeded",
            DropReason::NoRoute => "no route",
            DropReason::SendBufferFull => "route discovery buffer full",
            DropReason::DiscoveryFailed => "route discovery failed",
        };

        f.write_str(reason)
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct FlowId(pub u32);

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct FiveTuple {
    pub source: Ipv4Addr,
    pub destination: Ipv4Addr,
    pub protocol: u8,
    pub source_port: u16,
    pub destination_port: u16,
}

impl FiveTuple {
    fn of(packet: &Packet) -> Self {
        Self {
            source: *packet.source.ip(),
            destination: *packet.destination.ip(),
            protocol: UDP_PROTOCOL,
            source_port: packet.source.port(),
            destination_port: packet.destination.port(),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct FlowStats {
    pub time_first_tx_packet: Option<SimTime>,
    pub time_last_tx_packet: Option<SimTime>,
    pub time_first_rx_packet: Option<SimTime>,
    pub time_last_rx_packet: Option<SimTime>,
    pub delay_sum: Duration,
    pub jitter_sum: Duration,
    pub last_delay: Option<Duration>,
    pub tx_bytes: u64,
    pub rx_bytes: u64,
    pub tx_packets: u64,
    pub rx_packets: u64,
    pub lost_packets: u64,
    pub times_forwarded: u64,
    pub packets_dropped: BTreeMap<DropReason, u64>,
}

struct InFlightPacket {
    flow_id: FlowId,
    first_seen: SimTime,
    last_seen: SimTime,
}

/// Tracks every packet from its first transmission until it is received, dropped, or declared lost
pub struct FlowMonitor {
    max_per_hop_delay: Duration,
    monitored: BTreeSet<NodeId>,
    classifier: BTreeMap<FiveTuple, FlowId>,
    flows: BTreeMap<FlowId, FlowStats>,
    in_flight: BTreeMap<u64, InFlightPacket>,
}

impl FlowMonitor {
    pub fn new(max_per_hop_delay: Duration) -> Self {
        Self {
            max_per_hop_delay,
            monitored: BTreeSet::new(),
            classifier: BTreeMap::new(),
            flows: BTreeMap::new(),
            in_flight: BTreeMap::new(),
        }
    }

    pub(crate) fn monitor_nodes(&mut self, nodes: &[NodeId]) {
        self.monitored.extend(nodes.iter().copied());
    }

    /// Flow statistics, ordered by flow id
    pub fn flow_stats(&self) -> &BTreeMap<FlowId, FlowStats> {
        &self.flows
    }

    pub fn find_flow(&self, flow_id: FlowId) -> Option<FiveTuple> {
        self.classifier
            .iter()
            .find(|(_, id)| **id == flow_id)
            .map(|(tuple, _)| *tuple)
    }

    /// Packets that were sent but are neither received, dropped, nor declared lost yet
    pub fn packets_in_flight(&self) -> usize {
        self.in_flight.len()
    }

    fn classify(&mut self, packet: &Packet) -> FlowId {
        let next_id = FlowId(self.classifier.len() as u32 + 1);
        *self
            .classifier
            .entry(FiveTuple::of(packet))
            .or_insert(next_id)
    }

    pub(crate) fn report_first_tx(&mut self, node: NodeId, now: SimTime, packet: &Packet) {
        if !self.monitored.contains(&node) {
            return;
        }

        let flow_id = self.classify(packet);
        self.in_flight.insert(
            packet.uid,
            InFlightPacket {
                flow_id,
                first_seen: now,
                last_seen: now,
            },
        );

        let stats = self.flows.entry(flow_id).or_default();
        stats.time_first_tx_packet.get_or_insert(now);
        stats.time_last_tx_packet = Some(now);
        stats.tx_packets += 1;
        stats.tx_bytes += packet.ip_size() as u64;
    }

    pub(crate) fn report_forwarding(&mut self, node: NodeId, now: SimTime, packet: &Packet) {
        if !self.monitored.contains(&node) {
            return;
        }

        let Some(tracked) = self.in_flight.get_mut(&packet.uid) else {
            return;
        };

        tracked.last_seen = now;
        if let Some(stats) = self.flows.get_mut(&tracked.flow_id) {
            stats.times_forwarded += 1;
        }
    }

    pub(crate) fn report_last_rx(&mut self, node: NodeId, now: SimTime, packet: &Packet) {
        if !self.monitored.contains(&node) {
            return;
        }

        // Packets already declared lost are not counted again
        let Some(tracked) = self.in_flight.remove(&packet.uid) else {
            return;
        };

        let Some(stats) = self.flows.get_mut(&tracked.flow_id) else {
            return;
        };

        let delay = now.saturating_duration_since(tracked.first_seen);
        stats.delay_sum += delay;
        if let Some(last_delay) = stats.last_delay {
            stats.jitter_sum += delay.abs_diff(last_delay);
        }
        stats.last_delay = Some(delay);

        stats.time_first_rx_packet.get_or_insert(now);
        stats.time_last_rx_packet = Some(now);
        stats.rx_packets += 1;
        stats.rx_bytes += packet.ip_size() as u64;
    }

    pub(crate) fn report_drop(
        &mut self,
        node: NodeId,
        now: SimTime,
        packet: &Packet,
        reason: DropReason,
    ) {
        if !self.monitored.contains(&node) {
            return;
        }

        let Some(tracked) = self.in_flight.remove(&packet.uid) else {
            return;
        };

        if let Some(stats) = self.flows.get_mut(&tracked.flow_id) {
            stats.lost_packets += 1;
            *stats.packets_dropped.entry(reason).or_default() += 1;
        }

        tracing::trace!("{now}s flow {} lost packet #{}", tracked.flow_id.0, packet.uid);
    }

    /// Declares lost every packet that has not been seen for longer than the maximum per-hop delay
    pub fn check_for_lost_packets(&mut self, now: SimTime) {
        let max_delay = self.max_per_hop_delay;
        let flows = &mut self.flows;
        self.in_flight.retain(|_, tracked| {
            let overdue = now.saturating_duration_since(tracked.last_seen) > max_delay;
            if overdue {
                if let Some(stats) = flows.get_mut(&tracked.flow_id) {
                    stats.lost_packets += 1;
                }
            }

            !overdue
        });
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::net::SocketAddrV4;

    fn packet(uid: u64, source_port: u16) -> Packet {
        Packet {
            uid,
            source: SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 2), source_port),
            destination: SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 1), 9),
            payload_size: 512,
            tag: None,
            sent_at: SimTime::ZERO,
            source_route: None,
            hop_count: 0,
        }
    }

    fn monitor() -> FlowMonitor {
        let mut monitor = FlowMonitor::new(Duration::from_secs(10));
        monitor.monitor_nodes(&[NodeId(0), NodeId(1)]);
        monitor
    }

    #[test]
    fn test_flow_ids_follow_first_appearance() {
        let mut monitor = monitor();
        monitor.report_first_tx(NodeId(1), SimTime::ZERO, &packet(0, 49153));
        monitor.report_first_tx(NodeId(1), SimTime::ZERO, &packet(1, 49154));
        monitor.report_first_tx(NodeId(1), SimTime::ZERO, &packet(2, 49153));

        let ids: Vec<_> = monitor.flow_stats().keys().copied().collect();
        assert_eq!(ids, vec![FlowId(1), FlowId(2)]);
        assert_eq!(monitor.flow_stats()[&FlowId(1)].tx_packets, 2);
        assert_eq!(
            monitor.find_flow(FlowId(2)).map(|t| t.source_port),
            Some(49154)
        );
        assert_eq!(monitor.find_flow(FlowId(3)), None);
    }

    #[test]
    fn test_delay_and_jitter_sums() {
        let mut monitor = monitor();
        for (uid, (sent, received)) in [(0.0, 0.010), (1.0, 1.030), (2.0, 2.020)]
            .into_iter()
            .enumerate()
        {
            let packet = packet(uid as u64, 49153);
            monitor.report_first_tx(NodeId(1), SimTime::from_secs_f64(sent), &packet);
            monitor.report_last_rx(NodeId(0), SimTime::from_secs_f64(received), &packet);
        }

        let stats = &monitor.flow_stats()[&FlowId(1)];
        assert_eq!(stats.rx_packets, 3);
        assert_eq!(stats.rx_bytes, 3 * 540);
        assert!((stats.delay_sum.as_secs_f64() - 0.060).abs() < 1e-6);
        // |30 - 10| + |20 - 30| milliseconds
        assert!((stats.jitter_sum.as_secs_f64() - 0.030).abs() < 1e-6);
    }

    #[test]
    fn test_drops_count_as_lost() {
        let mut monitor = monitor();
        let packet = packet(0, 49153);
        monitor.report_first_tx(NodeId(1), SimTime::ZERO, &packet);
        monitor.report_drop(NodeId(1), SimTime::ZERO, &packet, DropReason::QueueFull);

        // A late reception of a dropped packet is ignored
        monitor.report_last_rx(NodeId(0), SimTime::from_secs(1), &packet);

        let stats = &monitor.flow_stats()[&FlowId(1)];
        assert_eq!(stats.lost_packets, 1);
        assert_eq!(stats.rx_packets, 0);
        assert_eq!(stats.packets_dropped[&DropReason::QueueFull], 1);
    }

    #[test]
    fn test_overdue_packets_are_lost() {
        let mut monitor = monitor();
        monitor.report_first_tx(NodeId(1), SimTime::ZERO, &packet(0, 49153));
        monitor.report_first_tx(NodeId(1), SimTime::from_secs(5), &packet(1, 49153));

        monitor.check_for_lost_packets(SimTime::from_secs(11));
        assert_eq!(monitor.flow_stats()[&FlowId(1)].lost_packets, 1);
        assert_eq!(monitor.packets_in_flight(), 1);
    }

    #[test]
    fn test_unmonitored_nodes_are_ignored() {
        let mut monitor = monitor();
        monitor.report_first_tx(NodeId(7), SimTime::ZERO, &packet(0, 49153));
        assert!(monitor.flow_stats().is_empty());
    }
}
