//! Typed outgoing controller messages (OpenFlow 1.3 semantics).
//!
//! Encoding to wire format is the transport's job; the core only builds
//! these values and hands them to a [`ControlChannel`](crate::channel::ControlChannel).

use crate::rules::FlowRule;
use smoltcp::wire::EthernetAddress;
use std::fmt;

/// Buffer id meaning "no buffered packet".
pub const NO_BUFFER: u32 = 0xffff_ffff;

/// Output max_len asking the switch to send the whole packet unbuffered.
pub const CONTENT_LEN_NO_BUFFER: u16 = 0xffff;

/// OpenFlow 1.3 message type codes the core deals with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Hello = 0,
    Error = 1,
    EchoRequest = 2,
    EchoReply = 3,
    FeaturesRequest = 5,
    FeaturesReply = 6,
    PacketIn = 10,
    FlowMod = 14,
}

/// Flow table id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableId(pub u8);

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Switch port number, including the reserved virtual ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortNo(pub u32);

impl PortNo {
    pub const FLOOD: PortNo = PortNo(0xffff_fffb);
    pub const ALL: PortNo = PortNo(0xffff_fffc);
    pub const CONTROLLER: PortNo = PortNo(0xffff_fffd);
}

impl fmt::Display for PortNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            PortNo::FLOOD => f.write_str("flood"),
            PortNo::ALL => f.write_str("all"),
            PortNo::CONTROLLER => f.write_str("controller"),
            PortNo(n) => write!(f, "{}", n),
        }
    }
}

/// OXM match field. An empty match set matches every packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchField {
    InPort(u32),
    EthDst(EthernetAddress),
    EthSrc(EthernetAddress),
    EthType(u16),
    IpProto(u8),
    TcpSrc(u16),
    TcpDst(u16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Output { port: PortNo, max_len: u16 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    GotoTable(TableId),
    /// An empty action list drops the packet.
    ApplyActions(Vec<Action>),
}

impl Instruction {
    /// Send an unbuffered copy of the packet to the controller.
    pub fn send_to_controller() -> Self {
        Instruction::ApplyActions(vec![Action::Output {
            port: PortNo::CONTROLLER,
            max_len: CONTENT_LEN_NO_BUFFER,
        }])
    }

    pub fn flood() -> Self {
        Instruction::ApplyActions(vec![Action::Output {
            port: PortNo::FLOOD,
            max_len: 0,
        }])
    }

    pub fn output(port: u32) -> Self {
        Instruction::ApplyActions(vec![Action::Output {
            port: PortNo(port),
            max_len: 0,
        }])
    }

    pub fn goto(table: TableId) -> Self {
        Instruction::GotoTable(table)
    }
}

/// A message the controller sends to a switch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutgoingMessage {
    Hello,
    FeaturesRequest,
    EchoReply { data: Vec<u8> },
    FlowMod(FlowRule),
}

impl OutgoingMessage {
    pub fn message_type(&self) -> MessageType {
        match self {
            OutgoingMessage::Hello => MessageType::Hello,
            OutgoingMessage::FeaturesRequest => MessageType::FeaturesRequest,
            OutgoingMessage::EchoReply { .. } => MessageType::EchoReply,
            OutgoingMessage::FlowMod(_) => MessageType::FlowMod,
        }
    }

    pub fn as_flow_mod(&self) -> Option<&FlowRule> {
        match self {
            OutgoingMessage::FlowMod(rule) => Some(rule),
            _ => None,
        }
    }
}
