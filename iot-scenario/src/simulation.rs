use crate::aggregator::{self, MetricsRow};
use crate::config::RunConfig;
use crate::file_sink::ensure_dir;
use crate::run_context::RunContext;
use crate::traffic::{MALICIOUS_PORT, NORMAL_PORT};
use crate::{metadata, observers, packet_logger, topology, traffic};
use anyhow::Context;
use event_runtime::{Rt, SimTime};
use fastrand::Rng;
use std::time::Duration;
use wireless_network::{Network, NodeId};
use wireless_network::pcap_exporter::FileBasedPcapExporterFactory;

/// How long before the end of the simulation the final metrics are computed
const AGGREGATOR_LEAD: Duration = Duration::from_millis(100);

/// What a finished run reports back, besides the files it wrote
#[derive(Clone, Debug)]
pub struct RunSummary {
    pub metrics: Option<MetricsRow>,
    pub packets_received_normal: u64,
    pub packets_received_malicious: u64,
    pub packets_logged_normal: u64,
    pub packets_logged_malicious: u64,
    pub executed_events: u64,
    pub nodes: usize,
}

/// Builds the scenario described by `config`, simulates it and writes every output file
pub fn run(config: RunConfig) -> anyhow::Result<RunSummary> {
    log_banner(&config);

    let mut rng = Rng::with_seed(config.seed);
    let mut network = Network::new(config.radio.network.clone(), rng.fork());

    // Build
    let topology = topology::build(&mut network, &config, &mut rng)?;
    if let Err(e) = metadata::write_node_metadata(&topology, &config.output_dir) {
        tracing::error!("failed to write node metadata: {e:#}");
    }
    if let Err(e) = metadata::write_simulation_metadata(&config) {
        tracing::error!("failed to write simulation metadata: {e:#}");
    }

    let sinks = traffic::install(&mut network, &topology, &config)?;
    let all_nodes = topology.all_nodes();

    tracing::info!("Configuring PCAP capture");
    if let Err(e) = enable_pcap(&mut network, &config, &all_nodes) {
        tracing::error!("pcap capture disabled: {e:#}");
    }

    network.install_flow_monitor(&all_nodes);
    tracing::info!("Flow monitor installed on {} nodes", all_nodes.len());

    let sim_time = config.sim_time;
    let log_control_messages = config.log_control_messages;
    let ctx = RunContext::shared(config);
    packet_logger::connect_packet_loggers(&mut network, &sinks, &ctx)?;
    if log_control_messages {
        packet_logger::connect_control_message_logger(&mut network, &ctx);
    }

    // Schedule
    tracing::info!("Scheduling simulation events");
    let mut sim = Rt::new(network);
    observers::schedule(&mut sim, &ctx, &topology);

    let end = SimTime::from_secs_f64(sim_time);
    let aggregate_at = end.saturating_sub(AGGREGATOR_LEAD);
    let energy_ctx = ctx.clone();
    sim.schedule_at(aggregate_at, move |sim| {
        observers::record_energy(sim, &energy_ctx, &all_nodes)
    });
    let aggregator_ctx = ctx.clone();
    sim.schedule_at(aggregate_at, move |sim| aggregator::run(sim, &aggregator_ctx));

    wireless_network::network::initialize(&mut sim);
    sim.stop(end.since_start());

    // Simulate
    tracing::info!("Starting simulation...");
    sim.run();
    tracing::info!(
        "Simulation completed at {}s ({} events)",
        sim.now(),
        sim.executed_events()
    );

    let executed_events = sim.executed_events();
    let mut network = sim.destroy();
    if let Err(e) = network.flush_pcap_exporters() {
        tracing::error!("failed to flush pcap captures: {e:#}");
    }

    let ctx = ctx.lock();
    let received = |app| {
        network
            .packet_sink(app)
            .map_or(0, |sink| sink.received_packets())
    };
    let logged = |port: u16| ctx.packets_logged.get(&port).copied().unwrap_or(0);

    Ok(RunSummary {
        metrics: ctx.metrics.clone(),
        packets_received_normal: received(sinks.normal),
        packets_received_malicious: received(sinks.malicious),
        packets_logged_normal: logged(NORMAL_PORT),
        packets_logged_malicious: logged(MALICIOUS_PORT),
        executed_events,
        nodes: network.node_count(),
    })
}

fn enable_pcap(
    network: &mut Network,
    config: &RunConfig,
    nodes: &[NodeId],
) -> anyhow::Result<()> {
    let pcap_dir = config.output_dir.join("pcap");
    ensure_dir(&pcap_dir)?;
    network
        .enable_pcap(
            &FileBasedPcapExporterFactory {
                directory: pcap_dir,
            },
            &config.pcap_file_prefix(),
            nodes,
        )
        .context("failed to create pcap files")
}

fn log_banner(config: &RunConfig) {
    let p = &config.populations;
    tracing::info!("=== Starting simulation ===");
    tracing::info!("Protocol: {}", config.routing_protocol);
    tracing::info!("Configuration: {}", config.config_name);
    tracing::info!("Fixed nodes: {}", p.fixed);
    tracing::info!("Mobile nodes: {}", p.mobile);
    tracing::info!("Malicious nodes: {}", p.malicious);
    tracing::info!("Interfering nodes: {}", p.interfering);
    tracing::info!("Output directory: {}", config.output_dir.display());
    tracing::info!("Seed: {}", config.seed);
    tracing::info!("===========================");
}
