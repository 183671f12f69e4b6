//! Per-connection state and event loop.

use crate::channel::ControlChannel;
use crate::event::{ConnectionEvent, DatapathId};
use crate::handshake::HandshakeState;
use crate::message::OutgoingMessage;
use crate::mux::Multiplexer;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// State of one switch connection, owned by its event loop.
pub struct Session {
    remote: SocketAddr,
    state: HandshakeState,
    datapath_id: Option<DatapathId>,
    channel: Arc<dyn ControlChannel>,
}

impl Session {
    pub fn new(remote: SocketAddr, channel: Arc<dyn ControlChannel>) -> Self {
        Self {
            remote,
            state: HandshakeState::Init,
            datapath_id: None,
            channel,
        }
    }

    pub fn remote(&self) -> SocketAddr {
        self.remote
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: HandshakeState) {
        if self.state != state {
            debug!(remote = %self.remote, from = ?self.state, to = ?state, "Handshake transition");
        }
        self.state = state;
    }

    /// Datapath id, known once a FeaturesReply has been seen.
    pub fn datapath_id(&self) -> Option<DatapathId> {
        self.datapath_id
    }

    pub(crate) fn set_datapath_id(&mut self, dpid: DatapathId) {
        self.datapath_id = Some(dpid);
    }

    /// Flow programs only act on connections that completed admission.
    pub fn is_programmed(&self) -> bool {
        self.state == HandshakeState::Connected
    }

    /// Fire-and-forget send. Failures are logged and the message dropped.
    pub fn send(&self, msg: OutgoingMessage) {
        let msg_type = msg.message_type();
        if let Err(e) = self.channel.send(msg) {
            warn!(
                remote = %self.remote,
                msg_type = ?msg_type,
                error = %e,
                "Dropping outgoing message"
            );
        }
    }
}

/// Sequential event loop for one switch connection.
pub struct Connection {
    session: Session,
    mux: Arc<Multiplexer>,
}

impl Connection {
    pub fn new(session: Session, mux: Arc<Multiplexer>) -> Self {
        Self { session, mux }
    }

    /// Dispatch events one at a time, in arrival order, until the transport
    /// closes the event stream. Returns the final session state.
    pub async fn run(mut self, mut events: mpsc::Receiver<ConnectionEvent>) -> Session {
        info!(remote = %self.session.remote, "Connection loop started");

        let mut count = 0usize;
        while let Some(event) = events.recv().await {
            if event.remote != self.session.remote {
                warn!(
                    remote = %self.session.remote,
                    event_remote = %event.remote,
                    "Event remote does not match connection"
                );
            }
            self.mux.dispatch(&mut self.session, event);
            count += 1;
        }

        info!(
            remote = %self.session.remote,
            events = count,
            state = ?self.session.state,
            "Control channel closed"
        );
        self.session
    }
}
