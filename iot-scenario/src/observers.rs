//! Periodic samplers of the running simulation
//!
//! Each observer does its work and then reschedules itself. They only stop when the simulation
//! does, except for the routing table snapshotter which stops one second before the end.

use crate::run_context::{NodeMetricSample, RunContext, SharedRunContext};
use crate::topology::Topology;
use event_runtime::SimTime;
use std::sync::Arc;
use std::time::Duration;
use wireless_network::flow_monitor::FlowStats;
use wireless_network::routing::RoutingProtocolKind;
use wireless_network::{NodeId, Sim};

const PERIOD: Duration = Duration::from_secs(1);

/// Schedules every observer, starting one period after the beginning of the simulation
pub fn schedule(sim: &mut Sim, ctx: &SharedRunContext, topology: &Topology) {
    let first = SimTime::ZERO + PERIOD;
    let mobile: Arc<[NodeId]> = topology.mobile.clone().into();
    let all: Arc<[NodeId]> = topology.all_nodes().into();
    let sampling_interval = Duration::from_secs_f64(ctx.lock().config.sampling_interval);
    let protocol = topology.protocol;

    let (ctx1, nodes) = (ctx.clone(), mobile);
    sim.schedule_at(first, move |sim| log_mobile_positions(sim, ctx1, nodes));
    let (ctx2, nodes) = (ctx.clone(), all.clone());
    sim.schedule_at(first, move |sim| log_energy_consumption(sim, ctx2, nodes));
    let (ctx3, nodes) = (ctx.clone(), all.clone());
    sim.schedule_at(first, move |sim| {
        record_node_metrics(sim, ctx3, nodes, sampling_interval)
    });
    let (ctx4, nodes) = (ctx.clone(), all);
    sim.schedule_at(first, move |sim| {
        log_routing_table_changes(sim, ctx4, nodes, protocol)
    });
}

fn log_mobile_positions(sim: &mut Sim, ctx: SharedRunContext, nodes: Arc<[NodeId]>) {
    let now = sim.now();
    tracing::debug!("{now}s sampling mobile positions");

    let network = sim.world();
    let mut rows = Vec::with_capacity(nodes.len());
    for &id in nodes.iter() {
        let Some(node) = network.node(id) else {
            tracing::error!("mobile node {id} does not exist");
            continue;
        };

        if node.mobility().is_none() {
            continue;
        }

        let p = node.position(now);
        rows.push(format!("{now},{id},{},{},{}", p.x, p.y, p.z));
    }

    if let Err(e) = ctx.lock().files.mobile_positions.append(rows) {
        tracing::error!("failed to log mobile positions: {e:#}");
    }

    sim.schedule(PERIOD, move |sim| log_mobile_positions(sim, ctx, nodes));
}

fn log_energy_consumption(sim: &mut Sim, ctx: SharedRunContext, nodes: Arc<[NodeId]>) {
    let now = sim.now();
    tracing::debug!("{now}s sampling remaining energy");

    let rows: Vec<_> = remaining_energy(sim, &nodes)
        .map(|(id, energy)| format!("{now},{id},{energy}"))
        .collect();
    if let Err(e) = ctx.lock().files.energy_consumption.append(rows) {
        tracing::error!("failed to log energy consumption: {e:#}");
    }

    sim.schedule(PERIOD, move |sim| log_energy_consumption(sim, ctx, nodes));
}

/// Stores the remaining energy of every node, for the end-of-run aggregator
pub fn record_energy(sim: &mut Sim, ctx: &SharedRunContext, nodes: &[NodeId]) {
    tracing::debug!("{}s recording energy snapshot", sim.now());
    let snapshot: Vec<_> = remaining_energy(sim, nodes).collect();
    ctx.lock().energy.extend(snapshot);
}

fn remaining_energy<'a>(
    sim: &'a Sim,
    nodes: &'a [NodeId],
) -> impl Iterator<Item = (NodeId, f64)> + 'a {
    let now = sim.now();
    nodes.iter().filter_map(move |&id| {
        let Some(node) = sim.world().node(id) else {
            tracing::error!("node {id} does not exist");
            return None;
        };

        Some((id, node.remaining_energy_j(now)?))
    })
}

fn record_node_metrics(
    sim: &mut Sim,
    ctx: SharedRunContext,
    nodes: Arc<[NodeId]>,
    interval: Duration,
) {
    let now = sim.now();
    tracing::debug!("{now}s recording temporal metrics");

    match sim.world_mut().flow_monitor_mut() {
        Some(monitor) => {
            monitor.check_for_lost_packets(now);
            let sample = mean_over_flows(monitor.flow_stats().values(), interval.as_secs_f64());
            assign_to_every_node(&mut ctx.lock(), &nodes, sample);
        }
        None => tracing::error!("no flow monitor installed, skipping temporal metrics"),
    }

    sim.schedule(interval, move |sim| {
        record_node_metrics(sim, ctx, nodes, interval)
    });
}

/// Averages throughput, delay and jitter over all flows
///
/// Throughput is computed as if every byte received so far had arrived within the last
/// `interval_secs`.
pub fn mean_over_flows<'a>(
    flows: impl Iterator<Item = &'a FlowStats>,
    interval_secs: f64,
) -> NodeMetricSample {
    let mut sum = NodeMetricSample::default();
    let mut count = 0u32;
    for flow in flows {
        sum.throughput_kbps += flow.rx_bytes as f64 * 8.0 / interval_secs / 1000.0;
        sum.delay_s += flow.delay_sum.as_secs_f64();
        sum.jitter_s += flow.jitter_sum.as_secs_f64();
        count += 1;
    }

    let count = count.max(1) as f64;
    NodeMetricSample {
        throughput_kbps: sum.throughput_kbps / count,
        delay_s: sum.delay_s / count,
        jitter_s: sum.jitter_s / count,
    }
}

/// Every node gets the same network-wide sample, flows are not attributed to the nodes that
/// sent or received them
fn assign_to_every_node(ctx: &mut RunContext, nodes: &[NodeId], sample: NodeMetricSample) {
    for &id in nodes {
        ctx.node_metrics.insert(id, sample);
    }
}

fn log_routing_table_changes(
    sim: &mut Sim,
    ctx: SharedRunContext,
    nodes: Arc<[NodeId]>,
    protocol: RoutingProtocolKind,
) {
    let now = sim.now();
    tracing::debug!("{now}s snapshotting routing tables");

    let network = sim.world();
    let mut rows = Vec::new();
    for &id in nodes.iter() {
        let Some(node) = network.node(id) else {
            tracing::error!("node {id} does not exist");
            continue;
        };

        match node.routing_protocol() {
            Some(installed) if installed == protocol => {
                rows.extend(routing_snapshot(now, id, installed));
            }
            Some(_) => {}
            None => tracing::warn!("node {id} has no routing protocol installed"),
        }
    }

    let sim_time = {
        let mut ctx = ctx.lock();
        tracing::debug!("routing snapshot covers {} nodes", rows.len());
        if let Err(e) = ctx.files.routing_table_changes.append(rows) {
            tracing::error!("failed to log routing tables: {e:#}");
        }
        ctx.config.sim_time
    };

    if now.as_secs_f64() < sim_time - PERIOD.as_secs_f64() {
        sim.schedule(PERIOD, move |sim| {
            log_routing_table_changes(sim, ctx, nodes, protocol)
        });
    }
}

/// Rows describing the routing table of `node`
///
/// Tables are not traversed yet: each protocol reports a single placeholder entry, marking that
/// it is installed on the node.
fn routing_snapshot(now: SimTime, node: NodeId, protocol: RoutingProtocolKind) -> Vec<String> {
    match protocol {
        RoutingProtocolKind::Aodv
        | RoutingProtocolKind::Olsr
        | RoutingProtocolKind::Dsdv
        | RoutingProtocolKind::Dsr => vec![format!("{now},{node},{protocol},0.0.0.0,0.0.0.0,0")],
    }
}
