//! mvirt-sdn: OpenFlow 1.3 controller core for mvirt switches.
//!
//! The transport decodes switch messages into [`ConnectionEvent`]s and feeds
//! one connection loop per switch. Each loop dispatches events through the
//! [`Multiplexer`] to the handshake handler and to the enabled flow programs,
//! which answer with typed [`OutgoingMessage`]s on the connection's
//! [`ControlChannel`].
//!
//! # Architecture
//!
//! ```text
//! switch --> transport --> ConnectionEvent --> Connection loop --> Multiplexer
//!                                                                      |
//!                  +---------------------------------------------------+
//!                  |                    |                       |
//!             handshake          learning switch              DPI --> ReportSink
//!                  |                    |                       |
//!                  +------> ControlChannel (Hello, FlowMod, ...) <+
//! ```

pub mod channel;
pub mod config;
pub mod connection;
pub mod controller;
pub mod dpi;
pub mod event;
pub mod handshake;
pub mod learning;
pub mod message;
pub mod mux;
pub mod packet;
pub mod program;
pub mod report;
pub mod rules;

#[cfg(any(test, feature = "test-util"))]
pub mod test_util;

// Re-export commonly used types
pub use channel::{ControlChannel, QueueChannel, TransportError};
pub use config::Config;
pub use connection::{Connection, Session};
pub use controller::{Controller, SetupError};
pub use event::{ConnectionEvent, DatapathId, EventBody, EventKind};
pub use handshake::HandshakeState;
pub use message::OutgoingMessage;
pub use mux::{EventHandler, HandlerError, Multiplexer};
pub use report::{CsvReportSink, Intel, Report, ReportSink};
pub use rules::FlowRule;
