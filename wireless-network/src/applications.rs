//! UDP applications: constant-rate senders and packet sinks

use crate::Sim;
use crate::network::forwarding;
use crate::network::{Network, Node, NodeId};
use crate::packet::Packet;
use event_runtime::SimTime;
use std::net::SocketAddrV4;
use std::time::Duration;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct AppId(pub usize);

/// A constant bit rate sender: always on, one `payload_size` datagram every `interval`
#[derive(Clone, Debug)]
pub struct OnOffSpec {
    pub remote: SocketAddrV4,
    pub payload_size: usize,
    pub interval: Duration,
    /// Copied onto every packet
    pub tag: Option<u8>,
}

impl OnOffSpec {
    pub fn data_rate_bps(&self) -> f64 {
        self.payload_size as f64 * 8.0 / self.interval.as_secs_f64()
    }
}

pub struct OnOffApplication {
    node: NodeId,
    local_port: u16,
    spec: OnOffSpec,
    start: SimTime,
    stop: SimTime,
    packets_sent: u64,
}

impl OnOffApplication {
    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    pub fn packets_sent(&self) -> u64 {
        self.packets_sent
    }
}

pub type RxTrace = Box<dyn FnMut(SimTime, &Packet, SocketAddrV4)>;

pub struct PacketSink {
    port: u16,
    start: SimTime,
    stop: SimTime,
    total_rx_bytes: u64,
    received_packets: u64,
    rx_traces: Vec<RxTrace>,
}

impl PacketSink {
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Payload bytes received so far
    pub fn total_rx_bytes(&self) -> u64 {
        self.total_rx_bytes
    }

    pub fn received_packets(&self) -> u64 {
        self.received_packets
    }

    fn is_active(&self, now: SimTime) -> bool {
        self.start <= now && now < self.stop
    }
}

pub enum Application {
    OnOff(OnOffApplication),
    PacketSink(PacketSink),
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ApplicationError {
    #[error("node {0} does not exist")]
    UnknownNode(NodeId),
    #[error("node {0} has no internet stack")]
    NoInternetStack(NodeId),
    #[error("port {port} is already bound on node {node}")]
    PortInUse { node: NodeId, port: u16 },
    #[error("application {0:?} is not a packet sink")]
    NotAPacketSink(AppId),
}

impl Network {
    /// Installs a sender on `node`, bound to the next free ephemeral port
    pub fn install_on_off(
        &mut self,
        node: NodeId,
        spec: OnOffSpec,
        start: SimTime,
        stop: SimTime,
    ) -> Result<AppId, ApplicationError> {
        let app_id = AppId(self.applications.len());
        let host = self.bound_node(node)?;
        let local_port = host.allocate_ephemeral_port();
        host.sockets.insert(local_port, app_id);

        self.applications.push(Application::OnOff(OnOffApplication {
            node,
            local_port,
            spec,
            start,
            stop,
            packets_sent: 0,
        }));
        Ok(app_id)
    }

    /// Installs a sink listening on `port`, active in `[start, stop)`
    pub fn install_packet_sink(
        &mut self,
        node: NodeId,
        port: u16,
        start: SimTime,
        stop: SimTime,
    ) -> Result<AppId, ApplicationError> {
        let app_id = AppId(self.applications.len());
        let host = self.bound_node(node)?;
        if host.sockets.contains_key(&port) {
            return Err(ApplicationError::PortInUse { node, port });
        }
        host.sockets.insert(port, app_id);

        self.applications.push(Application::PacketSink(PacketSink {
            port,
            start,
            stop,
            total_rx_bytes: 0,
            received_packets: 0,
            rx_traces: Vec::new(),
        }));
        Ok(app_id)
    }

    /// Registers a callback fired for every packet the sink receives
    pub fn connect_rx_trace(
        &mut self,
        app: AppId,
        trace: impl FnMut(SimTime, &Packet, SocketAddrV4) + 'static,
    ) -> Result<(), ApplicationError> {
        match self.applications.get_mut(app.0) {
            Some(Application::PacketSink(sink)) => {
                sink.rx_traces.push(Box::new(trace));
                Ok(())
            }
            _ => Err(ApplicationError::NotAPacketSink(app)),
        }
    }

    pub fn application(&self, app: AppId) -> Option<&Application> {
        self.applications.get(app.0)
    }

    pub fn packet_sink(&self, app: AppId) -> Option<&PacketSink> {
        match self.application(app)? {
            Application::PacketSink(sink) => Some(sink),
            Application::OnOff(_) => None,
        }
    }

    fn bound_node(&mut self, node: NodeId) -> Result<&mut Node, ApplicationError> {
        let host = self
            .node_mut(node)
            .ok_or(ApplicationError::UnknownNode(node))?;
        if !host.has_internet_stack() {
            return Err(ApplicationError::NoInternetStack(node));
        }

        Ok(host)
    }
}

/// Schedules the first packet of every sender, one interval after its start time
pub(crate) fn start(sim: &mut Sim) {
    let first_sends: Vec<_> = sim
        .world()
        .applications
        .iter()
        .enumerate()
        .filter_map(|(index, app)| match app {
            Application::OnOff(on_off) => {
                Some((AppId(index), on_off.start + on_off.spec.interval))
            }
            Application::PacketSink(_) => None,
        })
        .collect();

    for (app, at) in first_sends {
        sim.schedule_at(at, move |sim| send_next(sim, app));
    }
}

fn send_next(sim: &mut Sim, app: AppId) {
    let now = sim.now();
    let network = sim.world_mut();
    let uid = network.next_packet_uid();
    let Some(Application::OnOff(on_off)) = network.applications.get_mut(app.0) else {
        return;
    };

    if now >= on_off.stop {
        return;
    }

    let Some(source_ip) = network
        .nodes
        .get(on_off.node.0 as usize)
        .and_then(|n| n.address)
    else {
        tracing::warn!("sender on node {} has no address, stopping it", on_off.node);
        return;
    };

    on_off.packets_sent += 1;
    let node = on_off.node;
    let interval = on_off.spec.interval;
    let packet = Packet::new(
        uid,
        SocketAddrV4::new(source_ip, on_off.local_port),
        on_off.spec.remote,
        on_off.spec.payload_size,
        on_off.spec.tag,
        now,
    );

    forwarding::send(sim, node, packet);
    sim.schedule(interval, move |sim| send_next(sim, app));
}

/// Hands a packet addressed to `node` to the socket bound to its destination port
pub(crate) fn deliver(network: &mut Network, now: SimTime, node: NodeId, packet: Packet) {
    let port = packet.destination.port();
    let Some(app) = network
        .node(node)
        .and_then(|n| n.sockets.get(&port))
        .copied()
    else {
        tracing::debug!("{now}s node {node} has no socket bound to port {port}");
        return;
    };

    let Some(Application::PacketSink(sink)) = network.applications.get_mut(app.0) else {
        return;
    };

    if !sink.is_active(now) {
        return;
    }

    sink.total_rx_bytes += packet.payload_size as u64;
    sink.received_packets += 1;
    let from = packet.source;
    for trace in &mut sink.rx_traces {
        trace(now, &packet, from);
    }
}
