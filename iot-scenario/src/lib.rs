//! IoT wireless scenario driver
//!
//! Builds a mixed population of fixed, mobile, malicious and interfering nodes on a simulated
//! 802.11g ad-hoc network, drives tagged UDP traffic towards a single sink and records
//! measurements of the run as CSV files, along with pcap captures of every device.

pub mod aggregator;
pub mod config;
pub mod error;
pub mod file_sink;
pub mod metadata;
pub mod observers;
pub mod packet_logger;
pub mod report;
pub mod run_context;
pub mod simulation;
pub mod topology;
pub mod traffic;
pub mod traffic_class;

pub use config::RunConfig;
pub use error::BuildError;
pub use simulation::{RunSummary, run};
