//! Handshake and admission tests.
//!
//! Drives full Hello / Features exchanges through the controller's handler
//! chains and checks what each datapath ends up with.

use mvirt_sdn::config::Config;
use mvirt_sdn::controller::Controller;
use mvirt_sdn::event::{DatapathId, EventKind};
use mvirt_sdn::handshake::HandshakeState;
use mvirt_sdn::message::OutgoingMessage;
use mvirt_sdn::rules::{self, HttpSide};
use mvirt_sdn::test_util::{
    MemoryReportSink, RecordingChannel, echo_request, features_reply, hello, test_session,
};
use smoltcp::wire::EthernetAddress;

/// Bridge MAC of the admitted switch
const SWITCH_MAC: EthernetAddress = EthernetAddress([0x00, 0x16, 0x3e, 0x00, 0x00, 0x01]);

fn controller(config: Config) -> Controller {
    Controller::new(config.allow(SWITCH_MAC), MemoryReportSink::new()).unwrap()
}

/// Admitted switch with layer 2 switching only gets the two baseline rules.
#[test]
fn test_admitted_switch_gets_baseline() {
    let controller = controller(Config::default());
    let mux = controller.multiplexer();
    let (mut session, channel) = test_session(RecordingChannel::new());
    let remote = session.remote();

    mux.dispatch(&mut session, hello(remote));
    assert_eq!(
        channel.sent(),
        vec![OutgoingMessage::Hello, OutgoingMessage::FeaturesRequest]
    );
    channel.clear();

    let outcome = mux.dispatch(
        &mut session,
        features_reply(remote, DatapathId::from_mac(SWITCH_MAC)),
    );
    assert_eq!(outcome.failures, 0);
    assert_eq!(session.state(), HandshakeState::Connected);
    assert_eq!(
        channel.flow_mods(),
        vec![rules::controller_redirect(), rules::flood_miss()]
    );
    assert_eq!(channel.sent().len(), 2);
}

/// With inspection enabled the baseline is followed by the two HTTP rules.
#[test]
fn test_admitted_switch_with_dpi() {
    let controller = controller(Config::default().with_dpi(true));
    let mux = controller.multiplexer();
    let (mut session, channel) = test_session(RecordingChannel::new());
    let remote = session.remote();

    mux.dispatch(&mut session, hello(remote));
    channel.clear();
    mux.dispatch(
        &mut session,
        features_reply(remote, DatapathId::from_mac(SWITCH_MAC)),
    );

    let flow_mods = channel.flow_mods();
    let priorities: Vec<u16> = flow_mods.iter().map(|r| r.priority).collect();
    assert_eq!(priorities, vec![100, 100, 1000, 1000]);
    assert_eq!(flow_mods[2], rules::http_inspect(HttpSide::Destination));
    assert_eq!(flow_mods[3], rules::http_inspect(HttpSide::Source));
}

/// Datapath id bits above the MAC do not affect admission.
#[test]
fn test_admission_uses_low_48_bits() {
    let controller = controller(Config::default());
    let mux = controller.multiplexer();
    let (mut session, _channel) = test_session(RecordingChannel::new());
    let remote = session.remote();
    let dpid = DatapathId(0xabcd_0000_0000_0000 | DatapathId::from_mac(SWITCH_MAC).0);

    mux.dispatch(&mut session, hello(remote));
    mux.dispatch(&mut session, features_reply(remote, dpid));

    assert_eq!(session.state(), HandshakeState::Connected);
    assert_eq!(session.datapath_id(), Some(dpid));
}

/// Unknown datapaths complete the exchange but get no rules.
#[test]
fn test_unknown_switch_unprogrammed() {
    let controller = controller(Config::default().with_dpi(true));
    let mux = controller.multiplexer();
    let (mut session, channel) = test_session(RecordingChannel::new());
    let remote = session.remote();

    mux.dispatch(&mut session, hello(remote));
    channel.clear();
    mux.dispatch(
        &mut session,
        features_reply(remote, DatapathId(0x0000_0016_3e00_00ff)),
    );

    assert_eq!(session.state(), HandshakeState::Unprogrammed);
    assert!(channel.sent().is_empty());
}

/// Echo requests are answered with the same payload in every state.
#[test]
fn test_echo_roundtrip() {
    let controller = controller(Config::default());
    let mux = controller.multiplexer();
    let (mut session, channel) = test_session(RecordingChannel::new());
    let remote = session.remote();
    let payload = 0xDEADBEEFu32.to_be_bytes();

    mux.dispatch(&mut session, echo_request(remote, &payload));
    assert_eq!(
        channel.sent(),
        vec![OutgoingMessage::EchoReply {
            data: payload.to_vec()
        }]
    );

    mux.dispatch(&mut session, hello(remote));
    mux.dispatch(
        &mut session,
        features_reply(remote, DatapathId::from_mac(SWITCH_MAC)),
    );
    channel.clear();

    let outcome = mux.dispatch(&mut session, echo_request(remote, &payload));
    assert_eq!(outcome.handlers, 1);
    assert_eq!(
        channel.sent(),
        vec![OutgoingMessage::EchoReply {
            data: payload.to_vec()
        }]
    );
}

/// Every handshake event kind has a handler.
#[test]
fn test_handshake_kinds_registered() {
    let controller = controller(Config::default());
    let mux = controller.multiplexer();
    for kind in [
        EventKind::Hello,
        EventKind::EchoRequest,
        EventKind::FeaturesReply,
        EventKind::Error,
    ] {
        assert_eq!(mux.chain_len(kind), 1, "{kind}");
    }
}
