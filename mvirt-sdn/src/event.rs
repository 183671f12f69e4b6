//! Decoded control-channel events.
//!
//! The transport hands the core fully decoded events. Every handler in a
//! chain receives its own clone, so nothing a handler does to its copy is
//! visible to the next one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smoltcp::wire::EthernetAddress;
use std::fmt;
use std::net::SocketAddr;

/// Event kinds a handler can be registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    Hello,
    EchoRequest,
    FeaturesReply,
    PacketIn,
    Error,
}

impl EventKind {
    pub const ALL: [EventKind; 5] = [
        EventKind::Hello,
        EventKind::EchoRequest,
        EventKind::FeaturesReply,
        EventKind::PacketIn,
        EventKind::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Hello => "hello",
            EventKind::EchoRequest => "echo_request",
            EventKind::FeaturesReply => "features_reply",
            EventKind::PacketIn => "packet_in",
            EventKind::Error => "error",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Datapath identity reported by a switch in its FeaturesReply.
///
/// The low 48 bits carry the switch's link-layer address, the high 16 bits
/// are implementer-defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatapathId(pub u64);

impl DatapathId {
    /// Build a datapath id from a link-layer address (high bits zero).
    pub fn from_mac(mac: EthernetAddress) -> Self {
        let b = mac.0;
        DatapathId(u64::from_be_bytes([0, 0, b[0], b[1], b[2], b[3], b[4], b[5]]))
    }

    /// Link-layer address carried in the low 48 bits.
    pub fn mac(&self) -> EthernetAddress {
        let b = self.0.to_be_bytes();
        EthernetAddress([b[2], b[3], b[4], b[5], b[6], b[7]])
    }
}

impl fmt::Display for DatapathId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Switch capabilities from a FeaturesReply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchFeatures {
    pub datapath_id: DatapathId,
    #[serde(default)]
    pub n_buffers: u32,
    #[serde(default)]
    pub n_tables: u8,
    #[serde(default)]
    pub auxiliary_id: u8,
    #[serde(default)]
    pub capabilities: u32,
}

/// Why the switch sent a packet to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PacketInReason {
    #[default]
    NoMatch,
    Action,
    InvalidTtl,
}

/// A packet forwarded to the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketIn {
    #[serde(default = "no_buffer")]
    pub buffer_id: u32,
    #[serde(default)]
    pub reason: PacketInReason,
    #[serde(default)]
    pub table_id: u8,
    #[serde(default)]
    pub cookie: u64,
    /// Ingress port from the packet's OXM match, if the switch supplied one.
    pub in_port: Option<u32>,
    /// Raw frame starting with the Ethernet header.
    pub data: Vec<u8>,
}

fn no_buffer() -> u32 {
    crate::message::NO_BUFFER
}

/// An OFPT_ERROR reported by the switch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMsg {
    pub err_type: u16,
    pub code: u16,
    #[serde(default)]
    pub data: Vec<u8>,
}

/// Decoded event body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventBody {
    Hello,
    EchoRequest { data: Vec<u8> },
    FeaturesReply(SwitchFeatures),
    PacketIn(PacketIn),
    Error(ErrorMsg),
}

impl EventBody {
    pub fn kind(&self) -> EventKind {
        match self {
            EventBody::Hello => EventKind::Hello,
            EventBody::EchoRequest { .. } => EventKind::EchoRequest,
            EventBody::FeaturesReply(_) => EventKind::FeaturesReply,
            EventBody::PacketIn(_) => EventKind::PacketIn,
            EventBody::Error(_) => EventKind::Error,
        }
    }
}

/// One inbound event from a switch connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionEvent {
    pub remote: SocketAddr,
    #[serde(default = "Utc::now")]
    pub received_at: DateTime<Utc>,
    pub body: EventBody,
}

impl ConnectionEvent {
    /// Create an event stamped with the current time.
    pub fn new(remote: SocketAddr, body: EventBody) -> Self {
        Self {
            remote,
            received_at: Utc::now(),
            body,
        }
    }

    pub fn kind(&self) -> EventKind {
        self.body.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_datapath_id_mac() {
        let dpid = DatapathId(0xabcd_0000_0000_0002);
        assert_eq!(dpid.mac(), EthernetAddress([0, 0, 0, 0, 0, 2]));

        let mac = EthernetAddress([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);
        assert_eq!(DatapathId::from_mac(mac).mac(), mac);
        assert_eq!(DatapathId::from_mac(mac).to_string(), "0000aabbccddeeff");
    }

    #[test]
    fn test_kind_follows_body() {
        let remote: SocketAddr = "127.0.0.1:6633".parse().unwrap();
        let event = ConnectionEvent::new(remote, EventBody::EchoRequest { data: vec![1] });
        assert_eq!(event.kind(), EventKind::EchoRequest);
        assert_eq!(EventBody::Hello.kind(), EventKind::Hello);
    }

    #[test]
    fn test_event_json() {
        let line = r#"{"remote":"10.0.0.1:40000","body":{"type":"packet_in","in_port":3,"data":[1,2,3]}}"#;
        let event: ConnectionEvent = serde_json::from_str(line).unwrap();
        assert_eq!(event.kind(), EventKind::PacketIn);
        match event.body {
            EventBody::PacketIn(p) => {
                assert_eq!(p.in_port, Some(3));
                assert_eq!(p.buffer_id, crate::message::NO_BUFFER);
                assert_eq!(p.data, vec![1, 2, 3]);
            }
            other => panic!("unexpected body {other:?}"),
        }
    }
}
