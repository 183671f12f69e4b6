//! Learning switch tests over the full handler chain.

use mvirt_sdn::config::Config;
use mvirt_sdn::connection::Session;
use mvirt_sdn::controller::Controller;
use mvirt_sdn::event::DatapathId;
use mvirt_sdn::mux::Multiplexer;
use mvirt_sdn::message::{Instruction, MatchField};
use mvirt_sdn::rules::{CONTROL_TABLE, FORWARDING_TABLE, LEARNED_IDLE_TIMEOUT, LEARNED_PRIORITY};
use mvirt_sdn::test_util::{
    BROADCAST_MAC, MemoryReportSink, RecordingChannel, build_ethernet_frame, build_tcp_frame,
    features_reply, hello, packet_in, test_session,
};
use smoltcp::wire::{EthernetAddress, EthernetProtocol};
use std::net::Ipv4Addr;
use std::sync::Arc;

const SWITCH_MAC: EthernetAddress = EthernetAddress([0x00, 0x16, 0x3e, 0x00, 0x00, 0x01]);

/// Host whose location is learned
const HOST_MAC: [u8; 6] = [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF];

/// Admitted, programmed session with an empty recording channel.
fn connected() -> (Arc<Multiplexer>, Session, Arc<RecordingChannel>) {
    let controller =
        Controller::new(Config::default().allow(SWITCH_MAC), MemoryReportSink::new()).unwrap();
    let mux = controller.multiplexer();
    let (mut session, channel) = test_session(RecordingChannel::new());
    let remote = session.remote();

    mux.dispatch(&mut session, hello(remote));
    mux.dispatch(
        &mut session,
        features_reply(remote, DatapathId::from_mac(SWITCH_MAC)),
    );
    assert!(session.is_programmed());
    channel.clear();
    (mux, session, channel)
}

/// A frame from AA:BB:CC:DD:EE:FF on port 3 installs exactly two rules.
#[test]
fn test_learn_host_location() {
    let (mux, mut session, channel) = connected();
    let remote = session.remote();
    let frame = build_ethernet_frame(BROADCAST_MAC, HOST_MAC, EthernetProtocol::Arp, &[0u8; 28]);

    let outcome = mux.dispatch(&mut session, packet_in(remote, 3, frame));
    assert_eq!(outcome.failures, 0);

    let rules = channel.flow_mods();
    assert_eq!(channel.sent().len(), 2);

    let forward = &rules[0];
    assert_eq!(forward.table, FORWARDING_TABLE);
    assert_eq!(forward.priority, LEARNED_PRIORITY);
    assert_eq!(forward.idle_timeout, LEARNED_IDLE_TIMEOUT);
    assert_eq!(forward.hard_timeout, 0);
    assert_eq!(
        forward.matches,
        vec![MatchField::EthDst(EthernetAddress(HOST_MAC))]
    );
    assert_eq!(forward.instructions, vec![Instruction::output(3)]);

    let source = &rules[1];
    assert_eq!(source.table, CONTROL_TABLE);
    assert_eq!(source.priority, LEARNED_PRIORITY);
    assert_eq!(source.idle_timeout, LEARNED_IDLE_TIMEOUT);
    assert_eq!(
        source.matches,
        vec![MatchField::EthSrc(EthernetAddress(HOST_MAC))]
    );
    assert_eq!(source.instructions, vec![Instruction::goto(FORWARDING_TABLE)]);
}

/// IPv4/TCP frames are learned the same way.
#[test]
fn test_learn_from_ip_traffic() {
    let (mux, mut session, channel) = connected();
    let remote = session.remote();
    let frame = build_tcp_frame(
        HOST_MAC,
        [0x52, 0x54, 0, 0, 0, 9],
        Ipv4Addr::new(10, 0, 0, 5),
        Ipv4Addr::new(10, 0, 0, 9),
        51000,
        22,
        b"SSH-2.0-OpenSSH_9.6\r\n",
    );

    mux.dispatch(&mut session, packet_in(remote, 12, frame));
    let rules = channel.flow_mods();
    assert_eq!(rules.len(), 2);
    assert_eq!(rules[0].instructions, vec![Instruction::output(12)]);
}

/// Frames that fail to decode install nothing.
#[test]
fn test_malformed_frame_installs_nothing() {
    let (mux, mut session, channel) = connected();
    let remote = session.remote();

    let truncated = vec![0xAA, 0xBB, 0xCC];
    let bad_ipv4 = build_ethernet_frame(
        BROADCAST_MAC,
        HOST_MAC,
        EthernetProtocol::Ipv4,
        &[0x45, 0x00],
    );

    for frame in [truncated, bad_ipv4] {
        let outcome = mux.dispatch(&mut session, packet_in(remote, 3, frame));
        assert_eq!(outcome.failures, 0);
    }
    assert!(channel.sent().is_empty());
}

/// PacketIn before admission is ignored.
#[test]
fn test_unprogrammed_session_ignores_packet_in() {
    let controller = Controller::new(Config::default(), MemoryReportSink::new()).unwrap();
    let mux = controller.multiplexer();
    let (mut session, channel) = test_session(RecordingChannel::new());
    let remote = session.remote();
    let frame = build_ethernet_frame(BROADCAST_MAC, HOST_MAC, EthernetProtocol::Arp, &[0u8; 28]);

    mux.dispatch(&mut session, packet_in(remote, 3, frame));
    assert!(channel.sent().is_empty());
}
