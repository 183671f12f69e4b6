//! Layered decoding of frames carried in PacketIn messages, using smoltcp.

use smoltcp::wire::{
    EthernetAddress, EthernetFrame, EthernetProtocol, IpProtocol, Ipv4Packet, TcpPacket,
    UdpPacket,
};
use std::net::Ipv4Addr;
use thiserror::Error;

/// Ethernet II header size
pub const ETHERNET_HDR_SIZE: usize = 14;

/// UDP header size
pub const UDP_HDR_SIZE: usize = 8;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Truncated Ethernet frame ({0} bytes)")]
    Ethernet(usize),

    #[error("Malformed IPv4 header")]
    Ipv4,

    #[error("Malformed TCP header")]
    Tcp,

    #[error("Malformed UDP header")]
    Udp,
}

/// IPv4 network layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Header {
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub protocol: IpProtocol,
}

/// Transport layer ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportHeader {
    Tcp { src_port: u16, dst_port: u16 },
    Udp { src_port: u16, dst_port: u16 },
}

impl TransportHeader {
    pub fn ports(&self) -> (u16, u16) {
        match *self {
            TransportHeader::Tcp { src_port, dst_port }
            | TransportHeader::Udp { src_port, dst_port } => (src_port, dst_port),
        }
    }
}

/// A decoded frame. Layers that are not present (non-IPv4 ethertype, other
/// IP protocols, non-first fragments) are `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame<'a> {
    pub src_mac: EthernetAddress,
    pub dst_mac: EthernetAddress,
    pub ethertype: EthernetProtocol,
    pub network: Option<Ipv4Header>,
    pub transport: Option<TransportHeader>,
    payload: &'a [u8],
    /// Length of the whole frame in bytes.
    pub len: usize,
}

impl<'a> Frame<'a> {
    /// Transport payload, if there is one and it is non-empty.
    pub fn application_payload(&self) -> Option<&'a [u8]> {
        if self.transport.is_some() && !self.payload.is_empty() {
            Some(self.payload)
        } else {
            None
        }
    }

    /// IPv4/TCP with port `port` on either side.
    pub fn is_tcp_port(&self, port: u16) -> bool {
        match self.transport {
            Some(TransportHeader::Tcp { src_port, dst_port }) => {
                src_port == port || dst_port == port
            }
            _ => false,
        }
    }
}

/// Decode Ethernet, IPv4 and TCP/UDP headers.
///
/// A frame whose ethertype or protocol promises a layer that then fails to
/// parse is an error; unknown ethertypes and protocols are not.
pub fn decode(data: &[u8]) -> Result<Frame<'_>, DecodeError> {
    let eth = EthernetFrame::new_checked(data).map_err(|_| DecodeError::Ethernet(data.len()))?;

    let mut frame = Frame {
        src_mac: eth.src_addr(),
        dst_mac: eth.dst_addr(),
        ethertype: eth.ethertype(),
        network: None,
        transport: None,
        payload: &[],
        len: data.len(),
    };

    if frame.ethertype != EthernetProtocol::Ipv4 {
        return Ok(frame);
    }

    let ip_data = &data[ETHERNET_HDR_SIZE..];
    let ipv4 = Ipv4Packet::new_checked(ip_data).map_err(|_| DecodeError::Ipv4)?;
    if ipv4.version() != 4 {
        return Err(DecodeError::Ipv4);
    }

    frame.network = Some(Ipv4Header {
        src: Ipv4Addr::from(ipv4.src_addr()),
        dst: Ipv4Addr::from(ipv4.dst_addr()),
        protocol: ipv4.next_header(),
    });

    // Only the first fragment carries the transport header.
    if ipv4.frag_offset() != 0 {
        return Ok(frame);
    }

    let header_len = usize::from(ipv4.header_len());
    let total_len = usize::from(ipv4.total_len());
    let l4 = &ip_data[header_len..total_len];

    match ipv4.next_header() {
        IpProtocol::Tcp => {
            let tcp = TcpPacket::new_checked(l4).map_err(|_| DecodeError::Tcp)?;
            frame.transport = Some(TransportHeader::Tcp {
                src_port: tcp.src_port(),
                dst_port: tcp.dst_port(),
            });
            frame.payload = &l4[usize::from(tcp.header_len())..];
        }
        IpProtocol::Udp => {
            let udp = UdpPacket::new_checked(l4).map_err(|_| DecodeError::Udp)?;
            frame.transport = Some(TransportHeader::Udp {
                src_port: udp.src_port(),
                dst_port: udp.dst_port(),
            });
            frame.payload = &l4[UDP_HDR_SIZE..usize::from(udp.len())];
        }
        _ => {}
    }

    Ok(frame)
}
