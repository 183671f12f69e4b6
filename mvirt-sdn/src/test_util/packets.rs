//! Frame builders for PacketIn payloads.
//!
//! Frames start directly with the Ethernet header, as carried in a PacketIn.

use crate::packet::ETHERNET_HDR_SIZE;
use smoltcp::wire::{
    EthernetAddress, EthernetFrame, EthernetProtocol, EthernetRepr, IpProtocol, Ipv4Packet,
    Ipv4Repr, TcpPacket,
};
use std::net::Ipv4Addr;

/// IP header size (without options)
pub const IP_HDR_SIZE: usize = 20;

/// TCP header size (without options)
pub const TCP_HDR_SIZE: usize = 20;

/// Broadcast MAC address
pub const BROADCAST_MAC: [u8; 6] = [0xff, 0xff, 0xff, 0xff, 0xff, 0xff];

/// Ethernet frame with an arbitrary payload.
pub fn build_ethernet_frame(
    dst_mac: [u8; 6],
    src_mac: [u8; 6],
    ethertype: EthernetProtocol,
    payload: &[u8],
) -> Vec<u8> {
    let mut packet = vec![0u8; ETHERNET_HDR_SIZE + payload.len()];

    let eth_repr = EthernetRepr {
        src_addr: EthernetAddress(src_mac),
        dst_addr: EthernetAddress(dst_mac),
        ethertype,
    };
    let mut eth_frame = EthernetFrame::new_unchecked(&mut packet[..]);
    eth_repr.emit(&mut eth_frame);
    eth_frame.payload_mut().copy_from_slice(payload);

    packet
}

/// Ethernet/IPv4/TCP frame carrying `payload`. Checksums are not filled in.
#[allow(clippy::too_many_arguments)]
pub fn build_tcp_frame(
    src_mac: [u8; 6],
    dst_mac: [u8; 6],
    src_ip: Ipv4Addr,
    dst_ip: Ipv4Addr,
    src_port: u16,
    dst_port: u16,
    payload: &[u8],
) -> Vec<u8> {
    let tcp_len = TCP_HDR_SIZE + payload.len();
    let total_len = ETHERNET_HDR_SIZE + IP_HDR_SIZE + tcp_len;
    let mut packet = vec![0u8; total_len];

    // Ethernet frame
    let eth_repr = EthernetRepr {
        src_addr: EthernetAddress(src_mac),
        dst_addr: EthernetAddress(dst_mac),
        ethertype: EthernetProtocol::Ipv4,
    };
    let mut eth_frame = EthernetFrame::new_unchecked(&mut packet[..]);
    eth_repr.emit(&mut eth_frame);

    // IPv4 packet
    let ip_repr = Ipv4Repr {
        src_addr: src_ip.into(),
        dst_addr: dst_ip.into(),
        next_header: IpProtocol::Tcp,
        payload_len: tcp_len,
        hop_limit: 64,
    };
    let mut ip_packet = Ipv4Packet::new_unchecked(eth_frame.payload_mut());
    ip_repr.emit(
        &mut ip_packet,
        &smoltcp::phy::ChecksumCapabilities::default(),
    );

    // TCP segment
    let mut tcp = TcpPacket::new_unchecked(ip_packet.payload_mut());
    tcp.set_src_port(src_port);
    tcp.set_dst_port(dst_port);
    tcp.set_header_len(TCP_HDR_SIZE as u8);
    tcp.set_ack(true);
    tcp.set_psh(!payload.is_empty());
    tcp.set_window_len(65535);
    tcp.payload_mut().copy_from_slice(payload);

    packet
}

/// HTTP response segment from `server` port 80 to `client`.
pub fn build_http_response(
    server: ([u8; 6], Ipv4Addr),
    client: ([u8; 6], Ipv4Addr),
    client_port: u16,
    body: &str,
) -> Vec<u8> {
    let payload = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: {}\r\n\r\n{}",
        body.len(),
        body
    );
    build_tcp_frame(
        server.0,
        client.0,
        server.1,
        client.1,
        80,
        client_port,
        payload.as_bytes(),
    )
}
