//! Connection bring-up (Hello / Features) and keep-alive (Echo).

use crate::config::Config;
use crate::connection::Session;
use crate::event::{ConnectionEvent, EventBody, EventKind, SwitchFeatures};
use crate::message::OutgoingMessage;
use crate::mux::{EventHandler, HandlerError};
use crate::program::FlowProgram;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Handshake state of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Waiting for the switch's Hello.
    Init,
    /// Hello exchanged, FeaturesRequest sent.
    AwaitFeatures,
    /// Datapath not admitted. The connection stays open without rules.
    Unprogrammed,
    /// Flow programs installed.
    Connected,
}

/// Drives the handshake state machine and installs flow programs on
/// admitted datapaths.
pub struct HandshakeController {
    config: Arc<Config>,
    programs: Vec<Arc<dyn FlowProgram>>,
}

impl HandshakeController {
    pub fn new(config: Arc<Config>, programs: Vec<Arc<dyn FlowProgram>>) -> Self {
        Self { config, programs }
    }

    fn on_hello(&self, session: &mut Session) -> Result<(), HandlerError> {
        if session.state() != HandshakeState::Init {
            return Err(HandlerError::Protocol(format!(
                "unexpected Hello in state {:?}",
                session.state()
            )));
        }

        session.send(OutgoingMessage::Hello);
        info!(remote = %session.remote(), "Responded to Hello, requesting features");
        session.send(OutgoingMessage::FeaturesRequest);
        session.set_state(HandshakeState::AwaitFeatures);
        Ok(())
    }

    fn on_features_reply(
        &self,
        session: &mut Session,
        features: SwitchFeatures,
    ) -> Result<(), HandlerError> {
        if session.state() != HandshakeState::AwaitFeatures {
            return Err(HandlerError::Protocol(format!(
                "unexpected FeaturesReply in state {:?}",
                session.state()
            )));
        }

        let dpid = features.datapath_id;
        session.set_datapath_id(dpid);
        info!(
            remote = %session.remote(),
            dpid = %dpid,
            n_tables = features.n_tables,
            n_buffers = features.n_buffers,
            "Features reply"
        );

        if !self.config.can_handshake(dpid) {
            warn!(
                remote = %session.remote(),
                dpid = %dpid,
                "Datapath not in allow-list, leaving connection unprogrammed"
            );
            session.set_state(HandshakeState::Unprogrammed);
            return Ok(());
        }

        for program in &self.programs {
            if let Err(e) = program.on_connected(session) {
                warn!(
                    remote = %session.remote(),
                    program = program.name(),
                    error = %e,
                    "Flow program setup failed"
                );
            }
        }

        session.set_state(HandshakeState::Connected);
        info!(
            remote = %session.remote(),
            dpid = %dpid,
            programs = self.programs.len(),
            "Datapath connected"
        );
        Ok(())
    }
}

impl EventHandler for HandshakeController {
    fn handle(&self, session: &mut Session, event: ConnectionEvent) -> Result<(), HandlerError> {
        match event.body {
            EventBody::Hello => self.on_hello(session),
            EventBody::FeaturesReply(features) => self.on_features_reply(session, features),
            EventBody::EchoRequest { data } => {
                session.send(OutgoingMessage::EchoReply { data });
                Ok(())
            }
            EventBody::Error(err) => {
                error!(
                    remote = %session.remote(),
                    err_type = err.err_type,
                    code = err.code,
                    data_len = err.data.len(),
                    "Switch reported error"
                );
                Ok(())
            }
            EventBody::PacketIn(_) => Err(HandlerError::UnexpectedEvent(EventKind::PacketIn)),
        }
    }

    fn name(&self) -> &str {
        "handshake"
    }
}
