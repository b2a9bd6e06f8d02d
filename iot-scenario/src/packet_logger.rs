//! Trace-driven loggers: one row per packet received by a sink, or per routing control message

use crate::error::BuildError;
use crate::file_sink::{CsvFile, wall_clock_timestamp};
use crate::run_context::{OutputFiles, RunContext, SharedRunContext};
use crate::traffic::{MALICIOUS_PORT, NORMAL_PORT, Sinks};
use crate::traffic_class::TrafficClass;
use event_runtime::SimTime;
use std::net::SocketAddrV4;
use wireless_network::routing::ControlMessage;
use wireless_network::{Network, Packet};

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum SinkKind {
    Normal,
    Malicious,
}

impl SinkKind {
    pub fn port(&self) -> u16 {
        match self {
            SinkKind::Normal => NORMAL_PORT,
            SinkKind::Malicious => MALICIOUS_PORT,
        }
    }

    fn log_file<'a>(&self, files: &'a mut OutputFiles) -> &'a mut CsvFile {
        match self {
            SinkKind::Normal => &mut files.packets_normal,
            SinkKind::Malicious => &mut files.packets_malicious,
        }
    }
}

/// Logs every packet received by the sinks to `packet_logs/packets_{normal,malicious}.csv`
pub fn connect_packet_loggers(
    network: &mut Network,
    sinks: &Sinks,
    ctx: &SharedRunContext,
) -> Result<(), BuildError> {
    for (kind, app) in [
        (SinkKind::Normal, sinks.normal),
        (SinkKind::Malicious, sinks.malicious),
    ] {
        let ctx = ctx.clone();
        network
            .connect_rx_trace(app, move |now, packet, from| {
                log_packet(&mut ctx.lock(), kind, now, packet, from)
            })
            .map_err(|e| {
                tracing::error!("failed to connect the packet logger: {e}");
                BuildError::MissingSink(kind.port())
            })?;
    }

    Ok(())
}

pub(crate) fn log_packet(
    ctx: &mut RunContext,
    kind: SinkKind,
    now: SimTime,
    packet: &Packet,
    from: SocketAddrV4,
) {
    let class = TrafficClass::from_tag(packet.tag);
    let row = format!(
        "{},{},{},{},{},{}",
        wall_clock_timestamp(),
        from.ip(),
        kind.port(),
        class.label(),
        packet.payload_size,
        now
    );

    if let Err(e) = kind.log_file(&mut ctx.files).append([row]) {
        tracing::error!("failed to log received packet: {e:#}");
        return;
    }

    *ctx.packets_logged.entry(kind.port()).or_default() += 1;
}

/// Logs every routing control message to `routing_logs/control_messages.csv`
pub fn connect_control_message_logger(network: &mut Network, ctx: &SharedRunContext) {
    let ctx = ctx.clone();
    network.set_control_message_trace(move |_, message| {
        log_control_message(&mut ctx.lock(), message)
    });
}

fn log_control_message(ctx: &mut RunContext, message: &ControlMessage) {
    let row = format!(
        "{},{},{},{},{}",
        wall_clock_timestamp(),
        message.protocol,
        message.node,
        message.message_type,
        message.size_bytes
    );

    if let Err(e) = ctx.files.control_messages.append([row]) {
        tracing::error!("failed to log control message: {e:#}");
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::RunConfig;
    use crate::config::cli::CliOpt;
    use clap::Parser;
    use std::net::Ipv4Addr;
    use wireless_network::NodeId;
    use wireless_network::routing::RoutingProtocolKind;

    fn context(dir: &std::path::Path) -> RunContext {
        let options = CliOpt::parse_from([
            "iot-scenario".to_string(),
            format!("--outputDir={}", dir.display()),
        ]);
        RunContext::new(RunConfig::from_cli(&options).unwrap())
    }

    fn packet(tag: Option<u8>) -> Packet {
        Packet::new(
            0,
            SocketAddrV4::new(Ipv4Addr::new(192, 168, 1, 7), 49153),
            SocketAddrV4::new(Ipv4Addr::new(192, 168, 1, 1), 9),
            512,
            tag,
            SimTime::ZERO,
        )
    }

    fn rows(path: &std::path::Path) -> Vec<Vec<String>> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| l.split(',').map(|s| s.to_string()).collect())
            .collect()
    }

    #[test]
    fn test_packet_rows() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = context(dir.path());
        let from = SocketAddrV4::new(Ipv4Addr::new(192, 168, 1, 7), 49153);

        log_packet(&mut ctx, SinkKind::Normal, SimTime::from_secs(3), &packet(Some(2)), from);
        log_packet(&mut ctx, SinkKind::Normal, SimTime::from_secs_f64(3.5), &packet(None), from);
        log_packet(&mut ctx, SinkKind::Malicious, SimTime::from_secs(11), &packet(Some(1)), from);

        let normal = rows(&dir.path().join("packet_logs").join("packets_normal.csv"));
        assert_eq!(normal.len(), 3);
        assert_eq!(
            normal[0].join(","),
            "timestamp,source_ip,port,traffic_type,packet_size,sim_time"
        );
        assert_eq!(normal[1][1..], ["192.168.1.7", "9", "Interferente", "512", "3"]);
        assert_eq!(normal[2][1..], ["192.168.1.7", "9", "Normal", "512", "3.5"]);

        let malicious = rows(&dir.path().join("packet_logs").join("packets_malicious.csv"));
        assert_eq!(malicious.len(), 2);
        assert_eq!(malicious[1][1..], ["192.168.1.7", "10", "Malicioso", "512", "11"]);

        assert_eq!(ctx.packets_logged[&NORMAL_PORT], 2);
        assert_eq!(ctx.packets_logged[&MALICIOUS_PORT], 1);
    }

    #[test]
    fn test_control_message_rows() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = context(dir.path());
        let message = ControlMessage {
            protocol: RoutingProtocolKind::Olsr,
            node: NodeId(4),
            message_type: "HELLO",
            size_bytes: 48,
        };

        log_control_message(&mut ctx, &message);
        log_control_message(&mut ctx, &message);

        let rows = rows(&dir.path().join("routing_logs").join("control_messages.csv"));
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].join(","), "timestamp,protocolo,nodo_id,tipo_mensaje,tamaño");
        assert_eq!(rows[2][1..], ["OLSR", "4", "HELLO", "48"]);
    }
}
