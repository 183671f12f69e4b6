//! Flow programs: the pieces of controller logic that decide which rules a
//! switch gets.

use crate::connection::Session;
use crate::event::{ConnectionEvent, EventBody, PacketIn};
use crate::mux::{EventHandler, HandlerError};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

/// A flow program installed on admitted switches.
pub trait FlowProgram: Send + Sync {
    fn name(&self) -> &'static str;

    /// Called once when a switch passes admission.
    fn on_connected(&self, session: &Session) -> Result<(), HandlerError>;

    /// Called for every PacketIn on a programmed connection.
    fn on_packet_in(
        &self,
        session: &Session,
        packet_in: &PacketIn,
        received_at: DateTime<Utc>,
    ) -> Result<(), HandlerError>;
}

/// Adapts a [`FlowProgram`] to the PacketIn handler chain.
pub struct PacketInHandler {
    program: Arc<dyn FlowProgram>,
}

impl PacketInHandler {
    pub fn new(program: Arc<dyn FlowProgram>) -> Self {
        Self { program }
    }
}

impl EventHandler for PacketInHandler {
    fn handle(&self, session: &mut Session, event: ConnectionEvent) -> Result<(), HandlerError> {
        let kind = event.kind();
        let EventBody::PacketIn(packet_in) = event.body else {
            return Err(HandlerError::UnexpectedEvent(kind));
        };

        if !session.is_programmed() {
            debug!(
                remote = %session.remote(),
                state = ?session.state(),
                program = self.program.name(),
                "Ignoring PacketIn on unprogrammed connection"
            );
            return Ok(());
        }

        self.program
            .on_packet_in(session, &packet_in, event.received_at)
    }

    fn name(&self) -> &str {
        self.program.name()
    }
}
