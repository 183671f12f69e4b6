//! Test utilities for controller unit and integration tests.
//!
//! Provides a recording control channel, an in-memory report sink, event
//! constructors and PacketIn frame builders, so handlers can be driven
//! without a switch.

pub mod packets;

pub use packets::*;

use crate::channel::{ControlChannel, TransportError};
use crate::connection::Session;
use crate::event::{ConnectionEvent, DatapathId, EventBody, PacketIn, PacketInReason, SwitchFeatures};
use crate::message::{NO_BUFFER, OutgoingMessage};
use crate::report::{Report, ReportSink};
use crate::rules::FlowRule;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};

/// Remote endpoint used by single-connection tests
pub const TEST_REMOTE: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 6653);

/// Control channel that records every message it is asked to send.
#[derive(Default)]
pub struct RecordingChannel {
    sent: Mutex<Vec<OutgoingMessage>>,
}

impl RecordingChannel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Everything sent so far, in order.
    pub fn sent(&self) -> Vec<OutgoingMessage> {
        self.sent.lock().unwrap().clone()
    }

    /// Only the FlowMod payloads, in order.
    pub fn flow_mods(&self) -> Vec<FlowRule> {
        self.sent()
            .iter()
            .filter_map(OutgoingMessage::as_flow_mod)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }
}

impl ControlChannel for RecordingChannel {
    fn send(&self, msg: OutgoingMessage) -> Result<(), TransportError> {
        self.sent.lock().unwrap().push(msg);
        Ok(())
    }
}

/// Report sink that keeps reports in memory.
#[derive(Default)]
pub struct MemoryReportSink {
    reports: Mutex<Vec<Report>>,
}

impl MemoryReportSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reports(&self) -> Vec<Report> {
        self.reports.lock().unwrap().clone()
    }
}

impl ReportSink for MemoryReportSink {
    fn add(&self, report: Report) {
        self.reports.lock().unwrap().push(report);
    }
}

/// Fresh session on [`TEST_REMOTE`] writing into `channel`.
pub fn test_session(channel: Arc<RecordingChannel>) -> (Session, Arc<RecordingChannel>) {
    let session = Session::new(TEST_REMOTE, channel.clone());
    (session, channel)
}

pub fn hello(remote: SocketAddr) -> ConnectionEvent {
    ConnectionEvent::new(remote, EventBody::Hello)
}

pub fn echo_request(remote: SocketAddr, data: &[u8]) -> ConnectionEvent {
    ConnectionEvent::new(
        remote,
        EventBody::EchoRequest {
            data: data.to_vec(),
        },
    )
}

pub fn features_reply(remote: SocketAddr, datapath_id: DatapathId) -> ConnectionEvent {
    ConnectionEvent::new(
        remote,
        EventBody::FeaturesReply(SwitchFeatures {
            datapath_id,
            n_buffers: 256,
            n_tables: 254,
            auxiliary_id: 0,
            capabilities: 0,
        }),
    )
}

pub fn packet_in(remote: SocketAddr, in_port: u32, data: Vec<u8>) -> ConnectionEvent {
    ConnectionEvent::new(
        remote,
        EventBody::PacketIn(PacketIn {
            buffer_id: NO_BUFFER,
            reason: PacketInReason::NoMatch,
            table_id: 0,
            cookie: 0,
            in_port: Some(in_port),
            data,
        }),
    )
}

/// Format MAC address bytes as string
pub fn format_mac(mac: &[u8; 6]) -> String {
    format!(
        "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
        mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
    )
}
