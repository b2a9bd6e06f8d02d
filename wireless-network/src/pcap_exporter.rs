use crate::packet::{IPV4_HEADER_SIZE, Packet, UDP_HEADER_SIZE};
use anyhow::Context;
use event_runtime::SimTime;
use pcap_file::pcapng::PcapNgWriter;
use pcap_file::pcapng::blocks::enhanced_packet::EnhancedPacketBlock;
use pcap_file::pcapng::blocks::interface_description::InterfaceDescriptionBlock;
use pcap_file::pcapng::blocks::section_header::SectionHeaderBlock;
use pcap_file::{DataLink, Endianness};
use pnet_packet::ip::IpNextHeaderProtocols;
use pnet_packet::ipv4::MutableIpv4Packet;
use pnet_packet::udp::MutableUdpPacket;
use pnet_packet::{ipv4, udp};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::time::Duration;

pub trait PcapExporterFactory {
    fn create_pcap_exporter(&self, name: &str) -> anyhow::Result<PcapExporter>;
}

pub struct NoOpPcapExporterFactory;
impl PcapExporterFactory for NoOpPcapExporterFactory {
    fn create_pcap_exporter(&self, _: &str) -> anyhow::Result<PcapExporter> {
        PcapExporter::noop()
    }
}

/// Writes `<directory>/<name>.pcap` files
pub struct FileBasedPcapExporterFactory {
    pub directory: PathBuf,
}

impl PcapExporterFactory for FileBasedPcapExporterFactory {
    fn create_pcap_exporter(&self, name: &str) -> anyhow::Result<PcapExporter> {
        let path = self.directory.join(format!("{name}.pcap"));
        let pcap_file = fs::File::create(&path)
            .with_context(|| format!("failed to open {} for writing", path.display()))?;
        PcapExporter::new(pcap_file)
    }
}

pub struct PcapExporter {
    total_tracked_packets: u64,
    writer: PcapNgWriter<BufWriter<Box<dyn Write>>>,
}

impl PcapExporter {
    pub fn new(writer: impl Write + 'static) -> anyhow::Result<Self> {
        let writer: Box<dyn Write> = Box::new(writer);
        let mut writer = PcapNgWriter::with_section_header(
            BufWriter::new(writer),
            SectionHeaderBlock {
                endianness: Endianness::Big,
                major_version: 1,
                minor_version: 0,
                section_length: 0,
                options: vec![],
            },
        )
        .context("failed to write pcapng section header")?;

        writer
            .write_pcapng_block(InterfaceDescriptionBlock {
                linktype: DataLink::IPV4,
                snaplen: 65535,
                options: vec![],
            })
            .context("failed to write pcapng interface description")?;

        Ok(Self {
            total_tracked_packets: 0,
            writer,
        })
    }

    pub fn noop() -> anyhow::Result<Self> {
        Self::new(std::io::sink())
    }

    pub fn flush(&mut self) -> anyhow::Result<()> {
        self.writer
            .get_mut()
            .flush()
            .context("failed to flush pcap writer")
    }

    pub fn total_tracked_packets(&self) -> u64 {
        self.total_tracked_packets
    }

    /// Records the packet as an IPv4/UDP datagram with a zeroed payload
    pub fn track_packet(&mut self, now: SimTime, packet: &Packet) {
        let Some(ip_packet) = encode_ipv4_udp(packet) else {
            tracing::warn!("failed to encode packet #{} for pcap export", packet.uid);
            return;
        };

        self.total_tracked_packets += 1;
        let result = self.writer.write_pcapng_block(EnhancedPacketBlock {
            interface_id: 0,
            timestamp: correct_timestamp(now.since_start()),
            original_len: ip_packet.len() as u32,
            data: ip_packet.into(),
            options: Vec::new(),
        });

        if let Err(e) = result {
            tracing::warn!("failed to write packet #{} to pcap: {e}", packet.uid);
        }
    }
}

fn encode_ipv4_udp(packet: &Packet) -> Option<Vec<u8>> {
    let source = *packet.source.ip();
    let destination = *packet.destination.ip();
    let udp_packet_length = UDP_HEADER_SIZE + packet.payload_size;
    let ip_packet_length = IPV4_HEADER_SIZE + udp_packet_length;

    // Wrap the payload in a UDP packet
    let mut udp_buffer = vec![0; udp_packet_length];
    let mut udp_writer = MutableUdpPacket::new(&mut udp_buffer)?;
    udp_writer.set_source(packet.source.port());
    udp_writer.set_destination(packet.destination.port());
    udp_writer.set_length(udp_packet_length as u16);
    let checksum = udp::ipv4_checksum(&udp_writer.to_immutable(), &source, &destination);
    udp_writer.set_checksum(checksum);
    drop(udp_writer);

    // Wrap the UDP packet in an IP packet
    let mut buffer = vec![0; ip_packet_length];
    let mut ip_writer = MutableIpv4Packet::new(&mut buffer)?;
    ip_writer.set_version(4);
    ip_writer.set_header_length(5); // We don't use options
    ip_writer.set_dscp(0);
    ip_writer.set_identification(packet.uid as u16);
    ip_writer.set_flags(0b010); // We never fragment
    ip_writer.set_fragment_offset(0);
    ip_writer.set_ttl(64u8.saturating_sub(packet.hop_count as u8));
    ip_writer.set_next_level_protocol(IpNextHeaderProtocols::Udp);
    ip_writer.set_source(source);
    ip_writer.set_destination(destination);
    ip_writer.set_total_length(ip_packet_length as u16);
    ip_writer.set_payload(&udp_buffer);
    let checksum = ipv4::checksum(&ip_writer.to_immutable());
    ip_writer.set_checksum(checksum);
    drop(ip_writer);

    Some(buffer)
}

fn correct_timestamp(d: Duration) -> Duration {
    // Round to the microsecond resolution of the interface, then scale down by 1000 (the library
    // writes nanoseconds where readers expect microseconds)
    let micros = d.as_nanos() / 1000;
    Duration::from_nanos(micros as u64)
}
