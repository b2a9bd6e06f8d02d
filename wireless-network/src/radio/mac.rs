//! CSMA/CA medium access with unicast retransmissions
//!
//! Each device owns a FIFO queue of frames. A device with queued frames waits until the medium it
//! senses is idle, then for DIFS plus a random backoff, and transmits the head of the queue. Every
//! node that hears the transmission senses the medium busy until it ends. The addressed receiver
//! gets the frame unless another audible frame overlapped it or the frame is lost to noise; failed
//! frames are retried until the retry limit, after which the link is reported broken.

use crate::Sim;
use crate::flow_monitor::DropReason;
use crate::network::NodeId;
use crate::network::forwarding;
use crate::packet::Packet;
use crate::pcap_exporter::PcapExporter;
use crate::radio::{self, DataRate, MAC_OVERHEAD_BYTES};
use crate::routing;
use event_runtime::SimTime;
use std::collections::VecDeque;
use std::time::Duration;

const MAX_CONTENTION_WINDOW: u32 = 1023;

pub struct WifiDevice {
    queue: VecDeque<QueuedFrame>,
    state: TxState,
    /// The medium is sensed busy until this instant
    busy_until: SimTime,
    reception: Option<Reception>,
    pub(crate) pcap: Option<PcapExporter>,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
enum TxState {
    Idle,
    /// An access attempt is scheduled
    Contending,
    Transmitting,
}

struct QueuedFrame {
    packet: Packet,
    next_hop: NodeId,
    retries: u32,
}

struct Reception {
    frame_id: u64,
    until: SimTime,
    corrupted: bool,
    snr_db: f64,
    rate: &'static DataRate,
}

impl WifiDevice {
    pub(crate) fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            state: TxState::Idle,
            busy_until: SimTime::ZERO,
            reception: None,
            pcap: None,
        }
    }

    pub fn queued_frames(&self) -> usize {
        self.queue.len()
    }

    fn track_frame(&mut self, now: SimTime, packet: &Packet) {
        if let Some(pcap) = &mut self.pcap {
            pcap.track_packet(now, packet);
        }
    }
}

/// Queues `packet` for transmission to the neighbor `next_hop`
pub(crate) fn enqueue(sim: &mut Sim, node: NodeId, packet: Packet, next_hop: NodeId) {
    let now = sim.now();
    let network = sim.world_mut();
    if !network.is_alive(node, now) {
        let reason = if network.device_mut(node).is_some() {
            DropReason::NodeDepleted
        } else {
            DropReason::NoDevice
        };
        network.drop_packet(node, now, &packet, reason);
        return;
    }

    let capacity = network.spec.mac.queue_capacity_packets;
    let Some(device) = network.device_mut(node) else {
        return;
    };

    if device.queue.len() >= capacity {
        network.drop_packet(node, now, &packet, DropReason::QueueFull);
        return;
    }

    device.queue.push_back(QueuedFrame {
        packet,
        next_hop,
        retries: 0,
    });

    if device.state == TxState::Idle {
        device.state = TxState::Contending;
        let delay = backoff(sim, 0);
        sim.schedule(delay, move |sim| try_access(sim, node));
    }
}

/// DIFS plus a random number of slots from the contention window for the given retry count
fn backoff(sim: &mut Sim, retries: u32) -> Duration {
    let mac = sim.world().spec.mac.clone();
    let window = ((mac.min_contention_window + 1) << retries.min(6)).saturating_sub(1);
    let slots = sim
        .world_mut()
        .rng
        .u32(0..=window.min(MAX_CONTENTION_WINDOW));
    mac.difs() + mac.slot_time * slots
}

fn try_access(sim: &mut Sim, node: NodeId) {
    let now = sim.now();
    let network = sim.world_mut();
    if !network.is_alive(node, now) {
        flush_queue(sim, node, DropReason::NodeDepleted);
        return;
    }

    let Some(device) = network.device_mut(node) else {
        return;
    };

    let Some(retries) = device.queue.front().map(|f| f.retries) else {
        device.state = TxState::Idle;
        return;
    };

    let medium_free_at = match &device.reception {
        Some(reception) => device.busy_until.max(reception.until),
        None => device.busy_until,
    };

    if medium_free_at > now {
        // Defer until the medium is idle again, then contend anew
        let wait = medium_free_at - now;
        let delay = wait + backoff(sim, retries);
        sim.schedule(delay, move |sim| try_access(sim, node));
        return;
    }

    transmit_head(sim, node);
}

fn transmit_head(sim: &mut Sim, node: NodeId) {
    let now = sim.now();
    let network = sim.world_mut();
    let frame_id = network.next_frame_id();
    let radio_spec = network.spec.radio.clone();
    let sender_position = network.position(node, now);

    let Some((packet, next_hop)) = network
        .device_mut(node)
        .and_then(|d| d.queue.front())
        .map(|f| (f.packet.clone(), f.next_hop))
    else {
        return;
    };

    let receiver_distance = sender_position.distance(&network.position(next_hop, now));
    let receiver_snr = radio::snr_db(
        &radio_spec,
        radio::rx_power_dbm(&radio_spec, receiver_distance),
    );
    let rate = radio::select_rate(receiver_snr);
    let airtime = radio::airtime(rate, packet.ip_size() + MAC_OVERHEAD_BYTES);
    let end = now + airtime;

    if let Some(device) = network.device_mut(node) {
        device.state = TxState::Transmitting;
        device.busy_until = device.busy_until.max(end);
        device.track_frame(now, &packet);
    }

    if let Some(energy) = network.energy_mut(node) {
        energy.record_tx(airtime);
    }

    for index in 0..network.nodes.len() {
        let listener = NodeId(index as u32);
        if listener == node || !network.is_alive(listener, now) {
            continue;
        }

        let distance = sender_position.distance(&network.position(listener, now));
        if !radio::can_hear(&radio_spec, distance) {
            continue;
        }

        if let Some(energy) = network.energy_mut(listener) {
            energy.record_rx(airtime);
        }

        let Some(device) = network.device_mut(listener) else {
            continue;
        };

        let medium_was_busy = device.busy_until > now;
        device.busy_until = device.busy_until.max(end);

        // Whatever the listener was receiving is now garbled by this frame
        if let Some(reception) = &mut device.reception {
            if reception.until > now {
                reception.corrupted = true;
            }
        }

        if listener == next_hop {
            let collided = medium_was_busy || device.state == TxState::Transmitting;
            device.reception = Some(Reception {
                frame_id,
                until: end,
                corrupted: collided,
                snr_db: receiver_snr,
                rate,
            });
        }
    }

    sim.schedule_at(end, move |sim| finish_transmission(sim, node, frame_id));
}

fn finish_transmission(sim: &mut Sim, node: NodeId, frame_id: u64) {
    let now = sim.now();
    let network = sim.world_mut();
    let retry_limit = network.spec.mac.retry_limit;

    let Some(mut frame) = network.device_mut(node).and_then(|d| d.queue.pop_front()) else {
        return;
    };

    let next_hop = frame.next_hop;
    let receiver_alive = network.is_alive(next_hop, now);
    let reception = network
        .device_mut(next_hop)
        .and_then(|d| d.reception.take_if(|r| r.frame_id == frame_id));

    let delivered = match reception {
        Some(reception) if receiver_alive && !reception.corrupted => {
            let error_probability =
                radio::frame_error_probability(reception.rate, reception.snr_db);
            network.rng.f64() >= error_probability
        }
        _ => false,
    };

    let retries = if delivered {
        let mut packet = frame.packet;
        packet.hop_count += 1;
        if let Some(device) = network.device_mut(next_hop) {
            device.track_frame(now, &packet);
        }

        sim.schedule_now(move |sim| forwarding::receive(sim, next_hop, packet));
        0
    } else {
        frame.retries += 1;
        if frame.retries > retry_limit {
            tracing::debug!("{now}s node {node} gave up on the link to node {next_hop}");
            network.drop_packet(node, now, &frame.packet, DropReason::RetryLimit);
            routing::handle_link_failure(sim, node, next_hop, &frame.packet);
            0
        } else {
            let retries = frame.retries;
            if let Some(device) = network.device_mut(node) {
                device.queue.push_front(frame);
            }
            retries
        }
    };

    let network = sim.world_mut();
    let sifs = network.spec.mac.sifs;
    let Some(device) = network.device_mut(node) else {
        return;
    };

    if device.queue.is_empty() {
        device.state = TxState::Idle;
        return;
    }

    device.state = TxState::Contending;
    let delay = sifs + radio::ack_airtime() + backoff(sim, retries);
    sim.schedule(delay, move |sim| try_access(sim, node));
}

fn flush_queue(sim: &mut Sim, node: NodeId, reason: DropReason) {
    let now = sim.now();
    let network = sim.world_mut();
    let Some(device) = network.device_mut(node) else {
        return;
    };

    device.state = TxState::Idle;
    let frames: Vec<_> = device.queue.drain(..).collect();
    for frame in frames {
        network.drop_packet(node, now, &frame.packet, reason);
    }
}
