use crate::network::NodeId;
use event_runtime::SimTime;
use std::net::SocketAddrV4;

pub const IPV4_HEADER_SIZE: usize = 20;
pub const UDP_HEADER_SIZE: usize = 8;

/// A UDP datagram travelling through the network
#[derive(Clone, Debug)]
pub struct Packet {
    /// Unique across the whole simulation, used to correlate traces of the same datagram
    pub uid: u64,
    pub source: SocketAddrV4,
    pub destination: SocketAddrV4,
    pub payload_size: usize,
    /// Optional one-octet metadata carried along with the payload
    pub tag: Option<u8>,
    pub(crate) sent_at: SimTime,
    /// Full path chosen by the source, for source-routed protocols
    pub(crate) source_route: Option<Vec<NodeId>>,
    pub(crate) hop_count: u32,
}

impl Packet {
    /// A freshly emitted datagram, stamped with its send time
    pub fn new(
        uid: u64,
        source: SocketAddrV4,
        destination: SocketAddrV4,
        payload_size: usize,
        tag: Option<u8>,
        sent_at: SimTime,
    ) -> Self {
        Self {
            uid,
            source,
            destination,
            payload_size,
            tag,
            sent_at,
            source_route: None,
            hop_count: 0,
        }
    }

    /// The size of the packet at the IP layer, including IPv4 and UDP headers
    pub fn ip_size(&self) -> usize {
        self.payload_size + UDP_HEADER_SIZE + IPV4_HEADER_SIZE
    }

    pub fn sent_at(&self) -> SimTime {
        self.sent_at
    }

    pub fn hop_count(&self) -> u32 {
        self.hop_count
    }
}
