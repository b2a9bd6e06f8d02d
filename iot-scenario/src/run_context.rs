//! State shared by the callbacks of a single run
//!
//! Observers, packet loggers and the aggregator all run as simulation callbacks. They share one
//! [`RunContext`], created before the simulation starts and dropped with it.

use crate::aggregator::MetricsRow;
use crate::config::RunConfig;
use crate::file_sink::CsvFile;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use wireless_network::NodeId;

pub type SharedRunContext = Arc<Mutex<RunContext>>;

pub const PACKETS_HEADER: &str = "timestamp,source_ip,port,traffic_type,packet_size,sim_time";

/// The latest flow-derived metrics attributed to a node
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct NodeMetricSample {
    pub throughput_kbps: f64,
    pub delay_s: f64,
    pub jitter_s: f64,
}

/// Files appended to while the simulation runs
pub struct OutputFiles {
    pub root: PathBuf,
    pub mobile_positions: CsvFile,
    pub energy_consumption: CsvFile,
    pub packets_normal: CsvFile,
    pub packets_malicious: CsvFile,
    pub control_messages: CsvFile,
    pub routing_table_changes: CsvFile,
}

impl OutputFiles {
    pub fn new(root: &Path) -> Self {
        let packet_logs = root.join("packet_logs");
        let routing_logs = root.join("routing_logs");
        Self {
            root: root.to_path_buf(),
            mobile_positions: CsvFile::new(root.join("mobile_positions.csv"), "time,node_id,x,y,z"),
            energy_consumption: CsvFile::new(
                root.join("energy_consumption.csv"),
                "time,node_id,energy_remaining",
            ),
            packets_normal: CsvFile::new(packet_logs.join("packets_normal.csv"), PACKETS_HEADER),
            packets_malicious: CsvFile::new(
                packet_logs.join("packets_malicious.csv"),
                PACKETS_HEADER,
            ),
            control_messages: CsvFile::new(
                routing_logs.join("control_messages.csv"),
                "timestamp,protocolo,nodo_id,tipo_mensaje,tamaño",
            ),
            routing_table_changes: CsvFile::new(
                routing_logs.join("routing_table_changes.csv"),
                "timestamp,node_id,protocol,destination,next_hop,metric",
            ),
        }
    }

    pub fn metrics_dir(&self) -> PathBuf {
        self.root.join("metrics")
    }
}

pub struct RunContext {
    pub config: RunConfig,
    pub files: OutputFiles,
    /// Overwritten by every sample of the per-node metric sampler
    pub node_metrics: BTreeMap<NodeId, NodeMetricSample>,
    /// Remaining energy of each node, as of the last energy snapshot
    pub energy: BTreeMap<NodeId, f64>,
    pub packets_logged: BTreeMap<u16, u64>,
    pub metrics: Option<MetricsRow>,
}

impl RunContext {
    pub fn new(config: RunConfig) -> Self {
        Self {
            files: OutputFiles::new(&config.output_dir),
            config,
            node_metrics: BTreeMap::new(),
            energy: BTreeMap::new(),
            packets_logged: BTreeMap::new(),
            metrics: None,
        }
    }

    pub fn shared(config: RunConfig) -> SharedRunContext {
        Arc::new(Mutex::new(Self::new(config)))
    }
}
