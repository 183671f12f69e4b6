//! Payload inspection of plain HTTP traffic.
//!
//! On connect, two rules copy every IPv4/TCP packet to or from port 80 to
//! the controller. Each such PacketIn with a non-empty payload is scanned
//! with the configured pattern and produces exactly one [`Intel`], handed to
//! the [`ReportSink`] as a single-record [`Report`].

use crate::connection::Session;
use crate::event::PacketIn;
use crate::message::OutgoingMessage;
use crate::mux::HandlerError;
use crate::packet::{self, TransportHeader};
use crate::program::FlowProgram;
use crate::report::{Intel, Ports, Report, ReportSink};
use crate::rules::{self, HTTP_PORT, HttpSide};
use chrono::{DateTime, Utc};
use regex::bytes::Regex;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, info};

pub struct DeepPacketInspection {
    pattern: Regex,
    sink: Arc<dyn ReportSink>,
}

impl DeepPacketInspection {
    pub fn new(pattern: Regex, sink: Arc<dyn ReportSink>) -> Self {
        Self { pattern, sink }
    }

    /// All non-overlapping matches in `payload`, in order of occurrence.
    /// Invalid UTF-8 inside a match is replaced.
    pub fn extract(&self, payload: &[u8]) -> Vec<String> {
        self.pattern
            .find_iter(payload)
            .map(|m| String::from_utf8_lossy(m.as_bytes()).into_owned())
            .collect()
    }
}

impl FlowProgram for DeepPacketInspection {
    fn name(&self) -> &'static str {
        "dpi"
    }

    fn on_connected(&self, session: &Session) -> Result<(), HandlerError> {
        info!(remote = %session.remote(), pattern = %self.pattern, "Installing HTTP inspection");
        session.send(OutgoingMessage::FlowMod(rules::http_inspect(HttpSide::Destination)));
        session.send(OutgoingMessage::FlowMod(rules::http_inspect(HttpSide::Source)));
        Ok(())
    }

    fn on_packet_in(
        &self,
        session: &Session,
        packet_in: &PacketIn,
        received_at: DateTime<Utc>,
    ) -> Result<(), HandlerError> {
        let frame = match packet::decode(&packet_in.data) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(remote = %session.remote(), error = %e, "Skipping undecodable packet");
                return Ok(());
            }
        };

        if !frame.is_tcp_port(HTTP_PORT) {
            return Ok(());
        }
        let (Some(ip), Some(TransportHeader::Tcp { src_port, dst_port }), Some(payload)) =
            (frame.network, frame.transport, frame.application_payload())
        else {
            return Ok(());
        };

        let detail = self.extract(payload);
        debug!(
            remote = %session.remote(),
            src = %ip.src,
            dst = %ip.dst,
            payload_len = payload.len(),
            matches = detail.len(),
            "Inspected HTTP payload"
        );

        let intel = Intel {
            src_mac: frame.src_mac,
            dst_mac: frame.dst_mac,
            src_ip: IpAddr::V4(ip.src),
            dst_ip: IpAddr::V4(ip.dst),
            ports: Ports::Tcp {
                src: src_port,
                dst: dst_port,
            },
            size: frame.len,
            timestamp: received_at,
            detail,
        };
        self.sink.add(Report::from(intel));
        Ok(())
    }
}
