//! Controller wiring: builds the flow programs selected by configuration,
//! registers them with the multiplexer and starts connection loops.

use crate::channel::ControlChannel;
use crate::config::Config;
use crate::connection::{Connection, Session};
use crate::dpi::DeepPacketInspection;
use crate::event::{ConnectionEvent, EventKind};
use crate::handshake::HandshakeController;
use crate::learning::LearningSwitch;
use crate::mux::Multiplexer;
use crate::program::{FlowProgram, PacketInHandler};
use crate::report::ReportSink;
use regex::bytes::Regex;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

/// Errors that prevent the controller from starting.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("No handler registered for {0} events")]
    MissingHandler(EventKind),

    #[error("Invalid inspection pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}

pub struct Controller {
    config: Arc<Config>,
    mux: Arc<Multiplexer>,
}

impl Controller {
    /// Build the handler chains.
    ///
    /// The handshake handler answers Hello, EchoRequest, FeaturesReply and
    /// Error. Each enabled flow program gets a PacketIn handler; layer 2
    /// switching runs before inspection.
    pub fn new(config: Config, sink: Arc<dyn ReportSink>) -> Result<Self, SetupError> {
        let config = Arc::new(config);

        let mut programs: Vec<Arc<dyn FlowProgram>> = Vec::new();
        if config.l2_switching {
            programs.push(Arc::new(LearningSwitch::new()));
        }
        if config.dpi_enabled {
            let pattern = Regex::new(&config.dpi_pattern)?;
            programs.push(Arc::new(DeepPacketInspection::new(pattern, sink)));
        }

        let handshake = Arc::new(HandshakeController::new(config.clone(), programs.clone()));
        let mut builder = Multiplexer::builder();
        for kind in [
            EventKind::Hello,
            EventKind::EchoRequest,
            EventKind::FeaturesReply,
            EventKind::Error,
        ] {
            builder.register(kind, handshake.clone());
        }
        for program in &programs {
            builder.register(
                EventKind::PacketIn,
                Arc::new(PacketInHandler::new(program.clone())),
            );
        }
        let mux = builder.build()?;

        info!(
            allowed = config.allow_list.len(),
            l2_switching = config.l2_switching,
            dpi = config.dpi_enabled,
            packet_in_handlers = mux.chain_len(EventKind::PacketIn),
            "Controller ready"
        );

        Ok(Self {
            config,
            mux: Arc::new(mux),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn multiplexer(&self) -> Arc<Multiplexer> {
        self.mux.clone()
    }

    /// Create the event loop for a new switch connection.
    pub fn connect(&self, remote: SocketAddr, channel: Arc<dyn ControlChannel>) -> Connection {
        Connection::new(Session::new(remote, channel), self.mux.clone())
    }

    /// Run a connection loop on its own task. The task ends when the sender
    /// side of `events` is dropped.
    pub fn spawn_connection(
        &self,
        remote: SocketAddr,
        channel: Arc<dyn ControlChannel>,
        events: mpsc::Receiver<ConnectionEvent>,
    ) -> JoinHandle<Session> {
        let connection = self.connect(remote, channel);
        tokio::spawn(connection.run(events))
    }
}
