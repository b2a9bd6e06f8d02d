//! End-of-run reduction of the flow statistics into a single metric row

use crate::config::PopulationCounts;
use crate::file_sink::{wall_clock_timestamp, write_table};
use crate::run_context::{RunContext, SharedRunContext};
use wireless_network::Sim;
use wireless_network::flow_monitor::FlowStats;

pub const METRICS_HEADER: &str = "timestamp,protocolo,nodos_fijos,nodos_moviles,\
nodos_maliciosos,nodos_interferentes,throughput_promedio,throughput_maximo,delay_promedio,\
delay_maximo,delay_minimo,jitter_promedio,perdida_paquetes,pdr,paquetes_totales,\
paquetes_perdidos,numero_flujos,tiempo_simulacion";

pub const NODE_METRICS_HEADER: &str = "node_id,throughput_avg,delay_avg,jitter_avg,energy_consumed";

/// Network-wide statistics over all flows
///
/// Delays are per-flow delay sums: the average is the mean of the sums and the maximum is the
/// largest sum, while the minimum is the smallest per-packet mean delay of a flow.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FlowAggregate {
    pub avg_throughput_kbps: f64,
    /// Sum of the throughput of every flow
    pub total_throughput_kbps: f64,
    pub avg_delay_s: f64,
    pub max_delay_s: f64,
    pub min_delay_s: f64,
    pub avg_jitter_s: f64,
    /// Lost packets as a percentage of transmitted ones
    pub packet_loss_pct: f64,
    /// Packet delivery ratio, as a percentage
    pub pdr_pct: f64,
    pub total_packets: u64,
    pub lost_packets: u64,
    pub flow_count: u32,
}

pub fn aggregate<'a>(flows: impl Iterator<Item = &'a FlowStats>, sim_time: f64) -> FlowAggregate {
    let mut total_throughput = 0.0;
    let mut total_delay = 0.0;
    let mut total_jitter = 0.0;
    let mut max_delay: f64 = 0.0;
    let mut min_delay: Option<f64> = None;
    let mut total_packets = 0;
    let mut lost_packets = 0;
    let mut flow_count = 0;

    for flow in flows {
        total_throughput += flow.rx_bytes as f64 * 8.0 / sim_time / 1000.0;

        let delay = flow.delay_sum.as_secs_f64();
        total_delay += delay;
        max_delay = max_delay.max(delay);
        if flow.rx_packets > 0 {
            let mean_delay = delay / flow.rx_packets as f64;
            min_delay = Some(min_delay.map_or(mean_delay, |m| m.min(mean_delay)));
        }

        total_jitter += flow.jitter_sum.as_secs_f64();
        total_packets += flow.tx_packets;
        lost_packets += flow.lost_packets;
        flow_count += 1;
    }

    let per_flow = |total: f64| {
        if flow_count > 0 {
            total / flow_count as f64
        } else {
            0.0
        }
    };
    let percentage_of_sent = |packets: u64| {
        if total_packets > 0 {
            packets as f64 / total_packets as f64 * 100.0
        } else {
            0.0
        }
    };

    FlowAggregate {
        avg_throughput_kbps: per_flow(total_throughput),
        total_throughput_kbps: total_throughput,
        avg_delay_s: per_flow(total_delay),
        max_delay_s: max_delay,
        min_delay_s: min_delay.unwrap_or(0.0),
        avg_jitter_s: per_flow(total_jitter),
        packet_loss_pct: percentage_of_sent(lost_packets),
        pdr_pct: percentage_of_sent(total_packets.saturating_sub(lost_packets)),
        total_packets,
        lost_packets,
        flow_count,
    }
}

/// The single data row of `metrics/metrics.csv`
#[derive(Clone, Debug)]
pub struct MetricsRow {
    pub timestamp: String,
    pub protocol: String,
    pub populations: PopulationCounts,
    pub flows: FlowAggregate,
    pub sim_time: f64,
}

impl MetricsRow {
    pub fn to_csv(&self) -> String {
        let p = &self.populations;
        let f = &self.flows;
        format!(
            "{},{},{},{},{},{},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{},{},{},{:.6}",
            self.timestamp,
            self.protocol,
            p.fixed,
            p.mobile,
            p.malicious,
            p.interfering,
            f.avg_throughput_kbps,
            f.total_throughput_kbps,
            f.avg_delay_s,
            f.max_delay_s,
            f.min_delay_s,
            f.avg_jitter_s,
            f.packet_loss_pct,
            f.pdr_pct,
            f.total_packets,
            f.lost_packets,
            f.flow_count,
            self.sim_time
        )
    }
}

/// One row per sampled node, in ascending node id order
fn node_metric_rows(ctx: &RunContext) -> Vec<String> {
    ctx.node_metrics
        .iter()
        .map(|(id, sample)| {
            let energy = ctx.energy.get(id).copied().unwrap_or(0.0);
            format!(
                "{id},{},{},{},{energy}",
                sample.throughput_kbps, sample.delay_s, sample.jitter_s
            )
        })
        .collect()
}

/// Computes the final metrics and writes `metrics/metrics.csv` and `metrics/node_metrics.csv`
pub fn run(sim: &mut Sim, ctx: &SharedRunContext) {
    tracing::info!("Computing metrics...");
    let now = sim.now();
    let mut ctx = ctx.lock();

    let Some(monitor) = sim.world_mut().flow_monitor_mut() else {
        tracing::error!("the flow monitor is not installed");
        return;
    };

    monitor.check_for_lost_packets(now);
    let flows = aggregate(monitor.flow_stats().values(), ctx.config.sim_time);
    tracing::info!("Number of flows detected: {}", flows.flow_count);

    let row = MetricsRow {
        timestamp: wall_clock_timestamp(),
        protocol: ctx.config.routing_protocol.clone(),
        populations: ctx.config.populations,
        flows,
        sim_time: ctx.config.sim_time,
    };

    let metrics_dir = ctx.files.metrics_dir();
    let metrics_file = metrics_dir.join("metrics.csv");
    if let Err(e) = write_table(&metrics_file, METRICS_HEADER, [row.to_csv()]) {
        tracing::error!("failed to write metrics: {e:#}");
        return;
    }
    tracing::info!("Metrics written to {}", metrics_file.display());
    ctx.metrics = Some(row);

    let node_metrics_file = metrics_dir.join("node_metrics.csv");
    if let Err(e) = write_table(&node_metrics_file, NODE_METRICS_HEADER, node_metric_rows(&ctx)) {
        tracing::error!("failed to write node metrics: {e:#}");
        return;
    }
    tracing::info!("Node metrics written to {}", node_metrics_file.display());
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::RunConfig;
    use crate::config::cli::CliOpt;
    use crate::run_context::NodeMetricSample;
    use clap::Parser;
    use std::time::Duration;
    use wireless_network::NodeId;

    fn flow(tx: u64, rx: u64, lost: u64, rx_bytes: u64, delay_ms: u64) -> FlowStats {
        FlowStats {
            tx_packets: tx,
            rx_packets: rx,
            lost_packets: lost,
            rx_bytes,
            delay_sum: Duration::from_millis(delay_ms),
            jitter_sum: Duration::from_millis(delay_ms / 10),
            ..FlowStats::default()
        }
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn test_aggregate_two_flows() {
        let flows = [flow(10, 8, 2, 8000, 400), flow(10, 10, 0, 2000, 100)];
        let aggregate = aggregate(flows.iter(), 10.0);

        // 6.4 kbps + 1.6 kbps
        assert_close(aggregate.total_throughput_kbps, 8.0);
        assert_close(aggregate.avg_throughput_kbps, 4.0);
        assert_close(aggregate.avg_delay_s, 0.25);
        assert_close(aggregate.max_delay_s, 0.4);
        // min(0.4 / 8, 0.1 / 10)
        assert_close(aggregate.min_delay_s, 0.01);
        assert_close(aggregate.avg_jitter_s, 0.025);
        assert_close(aggregate.packet_loss_pct, 10.0);
        assert_close(aggregate.pdr_pct, 90.0);
        assert_eq!(aggregate.total_packets, 20);
        assert_eq!(aggregate.lost_packets, 2);
        assert_eq!(aggregate.flow_count, 2);
    }

    #[test]
    fn test_aggregate_without_flows() {
        let aggregate = aggregate(std::iter::empty(), 60.0);
        assert_eq!(aggregate, FlowAggregate::default());
    }

    #[test]
    fn test_min_delay_is_zero_without_receptions() {
        let flows = [flow(5, 0, 5, 0, 0)];
        let aggregate = aggregate(flows.iter(), 60.0);

        assert_eq!(aggregate.min_delay_s, 0.0);
        assert_eq!(aggregate.pdr_pct, 0.0);
        assert_eq!(aggregate.packet_loss_pct, 100.0);
    }

    #[test]
    fn test_min_delay_ignores_flows_without_receptions() {
        let flows = [flow(5, 0, 5, 0, 0), flow(4, 4, 0, 100, 200)];
        let aggregate = aggregate(flows.iter(), 60.0);
        assert_close(aggregate.min_delay_s, 0.05);
    }

    #[test]
    fn test_metrics_row_formatting() {
        let row = MetricsRow {
            timestamp: "2024-01-01 12:00:00".to_string(),
            protocol: "AODV".to_string(),
            populations: PopulationCounts {
                fixed: 20,
                mobile: 10,
                malicious: 0,
                interfering: 0,
            },
            flows: aggregate([flow(10, 8, 2, 8000, 400)].iter(), 60.0),
            sim_time: 60.0,
        };

        let csv = row.to_csv();
        assert_eq!(csv.split(',').count(), METRICS_HEADER.split(',').count());
        assert_eq!(
            csv,
            "2024-01-01 12:00:00,AODV,20,10,0,0,1.066667,1.066667,0.400000,0.400000,0.050000,\
             0.040000,20.000000,80.000000,10,2,1,60.000000"
        );
    }

    #[test]
    fn test_node_metric_rows_default_missing_energy_to_zero() {
        let options = CliOpt::parse_from(["iot-scenario"]);
        let mut ctx = RunContext::new(RunConfig::from_cli(&options).unwrap());
        let sample = NodeMetricSample {
            throughput_kbps: 1.5,
            delay_s: 0.25,
            jitter_s: 0.0,
        };
        ctx.node_metrics.insert(NodeId(1), sample);
        ctx.node_metrics.insert(NodeId(0), sample);
        ctx.energy.insert(NodeId(0), 99.5);

        assert_eq!(
            node_metric_rows(&ctx),
            vec!["0,1.5,0.25,0,99.5".to_string(), "1,1.5,0.25,0,0".to_string()]
        );
    }
}
