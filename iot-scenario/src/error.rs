/// Problems that prevent a scenario from being assembled
///
/// Any of these aborts the run before the simulation starts.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum BuildError {
    #[error("no nodes were created, aborting simulation")]
    NoNodes,
    #[error("no network devices were created, aborting simulation")]
    NoDevices,
    #[error("unsupported routing protocol: {0} (expected one of AODV, OLSR, DSDV, DSR)")]
    UnsupportedRoutingProtocol(String),
    #[error("failed to install the packet sink for port {0}")]
    MissingSink(u16),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
