use clap::{ArgAction, Parser};
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(name = "iot-scenario", version)]
pub struct CliOpt {
    /// Number of stationary IoT nodes, laid out on a grid (node 0 hosts the packet sinks)
    #[arg(long = "nFixedNodes", default_value_t = 20)]
    pub n_fixed_nodes: u32,

    /// Number of IoT nodes doing a random walk over the deployment area
    #[arg(long = "nMobileNodes", default_value_t = 10)]
    pub n_mobile_nodes: u32,

    /// Number of nodes flooding the sink with attack traffic
    #[arg(long = "nMaliciousNodes", default_value_t = 0)]
    pub n_malicious_nodes: u32,

    /// Number of nodes generating background traffic from outside the deployment area
    #[arg(long = "nInterferingNodes", default_value_t = 0)]
    pub n_interfering_nodes: u32,

    /// Simulated duration of the run, in seconds
    #[arg(long = "simTime", default_value_t = 60.0)]
    pub sim_time: f64,

    /// The routing protocol installed on every node (AODV, OLSR, DSDV or DSR)
    ///
    /// Validated when the topology is built, so an unknown protocol is a build failure rather than
    /// a usage error
    #[arg(long = "routingProtocol", default_value = "AODV")]
    pub routing_protocol: String,

    /// Name of the configuration, embedded in the pcap file names
    #[arg(long = "configName", default_value = "mal_int")]
    pub config_name: String,

    /// Root directory for all the files produced by the run
    #[arg(long = "outputDir", default_value = "simulation_results")]
    pub output_dir: PathBuf,

    /// The random seed, which you can control to generate deterministic results
    #[arg(long, default_value_t = 1)]
    pub seed: u64,

    /// Size of the UDP payload sent by every application, in bytes
    #[arg(long = "packetSize", default_value_t = 512)]
    pub packet_size: usize,

    /// Seconds between two packets of a normal or interfering sender
    #[arg(long = "normalInterval", default_value_t = 2.0)]
    pub normal_interval: f64,

    /// Seconds between two packets of a malicious sender
    #[arg(long = "maliciousInterval", default_value_t = 0.01)]
    pub malicious_interval: f64,

    /// Period of the per-node metric sampler, in seconds
    #[arg(long = "samplingInterval", default_value_t = 1.0)]
    pub sampling_interval: f64,

    /// Prefix of the pcap file names
    #[arg(long = "pcapPrefix", default_value = "iot_simulation")]
    pub pcap_prefix: String,

    /// Whether routing control messages should be logged to `routing_logs/control_messages.csv`
    #[arg(
        long = "logControlMessages",
        default_value_t = false,
        num_args = 0..=1,
        default_missing_value = "true",
        action = ArgAction::Set
    )]
    pub log_control_messages: bool,

    /// Path to a JSON file overriding radio, energy and MAC parameters
    #[arg(long = "radioConfig")]
    pub radio_config: Option<PathBuf>,
}
