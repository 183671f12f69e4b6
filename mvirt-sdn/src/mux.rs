//! Event multiplexer.
//!
//! Handler chains are assembled on a [`MultiplexerBuilder`] during setup and
//! frozen into a [`Multiplexer`], which is then shared read-only by every
//! connection loop. Dispatch runs each handler of a chain in registration
//! order with its own copy of the event; a failing or panicking handler is
//! logged and the rest of the chain still runs.

use crate::connection::Session;
use crate::controller::SetupError;
use crate::event::{ConnectionEvent, EventKind};
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, warn};

/// Kinds that must have at least one handler before the channel starts.
const REQUIRED_KINDS: [EventKind; 3] = [
    EventKind::Hello,
    EventKind::FeaturesReply,
    EventKind::EchoRequest,
];

/// Errors a handler reports back to the multiplexer.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Handler does not accept {0} events")]
    UnexpectedEvent(EventKind),
}

/// A handler registered against one or more event kinds.
pub trait EventHandler: Send + Sync {
    fn handle(&self, session: &mut Session, event: ConnectionEvent) -> Result<(), HandlerError>;

    /// Name used in logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

impl<F> EventHandler for F
where
    F: Fn(&mut Session, ConnectionEvent) -> Result<(), HandlerError> + Send + Sync,
{
    fn handle(&self, session: &mut Session, event: ConnectionEvent) -> Result<(), HandlerError> {
        self(session, event)
    }
}

/// Outcome of dispatching one event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Dispatch {
    /// Handlers invoked.
    pub handlers: usize,
    /// Handlers that returned an error or panicked.
    pub failures: usize,
}

/// Collects handler registrations during setup.
#[derive(Default)]
pub struct MultiplexerBuilder {
    chains: HashMap<EventKind, Vec<Arc<dyn EventHandler>>>,
}

impl MultiplexerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `handler` to the tail of the chain for `kind`.
    pub fn register(&mut self, kind: EventKind, handler: Arc<dyn EventHandler>) -> &mut Self {
        debug!(kind = %kind, handler = handler.name(), "Registering handler");
        self.chains.entry(kind).or_default().push(handler);
        self
    }

    /// Freeze the registrations.
    ///
    /// Fails if a handshake event kind has no handler, since no connection
    /// could ever come up.
    pub fn build(self) -> Result<Multiplexer, SetupError> {
        for kind in REQUIRED_KINDS {
            if self.chains.get(&kind).is_none_or(|chain| chain.is_empty()) {
                return Err(SetupError::MissingHandler(kind));
            }
        }
        Ok(Multiplexer {
            chains: self.chains,
        })
    }
}

/// Immutable per-kind handler chains.
pub struct Multiplexer {
    chains: HashMap<EventKind, Vec<Arc<dyn EventHandler>>>,
}

impl Multiplexer {
    pub fn builder() -> MultiplexerBuilder {
        MultiplexerBuilder::new()
    }

    /// Number of handlers registered for `kind`.
    pub fn chain_len(&self, kind: EventKind) -> usize {
        self.chains.get(&kind).map_or(0, Vec::len)
    }

    /// Run every handler registered for the event's kind, in order.
    pub fn dispatch(&self, session: &mut Session, event: ConnectionEvent) -> Dispatch {
        let kind = event.kind();
        let Some(chain) = self.chains.get(&kind) else {
            debug!(remote = %event.remote, kind = %kind, "No handlers registered, dropping event");
            return Dispatch::default();
        };

        let mut outcome = Dispatch {
            handlers: chain.len(),
            failures: 0,
        };

        for handler in chain {
            let copy = event.clone();
            let result = panic::catch_unwind(AssertUnwindSafe(|| handler.handle(session, copy)));
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    outcome.failures += 1;
                    warn!(
                        remote = %event.remote,
                        kind = %kind,
                        handler = handler.name(),
                        error = %e,
                        "Handler failed"
                    );
                }
                Err(payload) => {
                    outcome.failures += 1;
                    let msg = if let Some(s) = payload.downcast_ref::<&str>() {
                        s.to_string()
                    } else if let Some(s) = payload.downcast_ref::<String>() {
                        s.clone()
                    } else {
                        "unknown panic".to_string()
                    };
                    error!(
                        remote = %event.remote,
                        kind = %kind,
                        handler = handler.name(),
                        panic = %msg,
                        "Handler panicked"
                    );
                }
            }
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventBody;
    use crate::test_util::{RecordingChannel, test_session};
    use std::sync::Mutex;

    fn noop() -> Arc<dyn EventHandler> {
        Arc::new(|_: &mut Session, _: ConnectionEvent| -> Result<(), HandlerError> { Ok(()) })
    }

    fn builder_with_handshake_kinds() -> MultiplexerBuilder {
        let mut builder = Multiplexer::builder();
        builder
            .register(EventKind::Hello, noop())
            .register(EventKind::FeaturesReply, noop())
            .register(EventKind::EchoRequest, noop());
        builder
    }

    #[test]
    fn test_build_requires_handshake_kinds() {
        let mut builder = Multiplexer::builder();
        builder.register(EventKind::Hello, noop());
        assert!(matches!(
            builder.build(),
            Err(SetupError::MissingHandler(EventKind::FeaturesReply))
        ));
        assert!(builder_with_handshake_kinds().build().is_ok());
    }

    #[test]
    fn test_dispatch_in_registration_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut builder = builder_with_handshake_kinds();
        for id in 0..3 {
            let seen = Arc::clone(&seen);
            builder.register(
                EventKind::Error,
                Arc::new(move |_: &mut Session, _: ConnectionEvent| -> Result<(), HandlerError> {
                    seen.lock().unwrap().push(id);
                    Ok(())
                }),
            );
        }
        let mux = builder.build().unwrap();

        let (mut session, _channel) = test_session(RecordingChannel::new());
        let event = ConnectionEvent::new(
            session.remote(),
            EventBody::Error(crate::event::ErrorMsg {
                err_type: 1,
                code: 2,
                data: vec![],
            }),
        );
        let outcome = mux.dispatch(&mut session, event);

        assert_eq!(outcome, Dispatch { handlers: 3, failures: 0 });
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_dispatch_survives_failures_and_panics() {
        let reached = Arc::new(Mutex::new(false));
        let mut builder = builder_with_handshake_kinds();
        builder.register(
            EventKind::Hello,
            Arc::new(|_: &mut Session, _: ConnectionEvent| -> Result<(), HandlerError> {
                Err(HandlerError::Protocol("bad hello".into()))
            }),
        );
        builder.register(
            EventKind::Hello,
            Arc::new(|_: &mut Session, _: ConnectionEvent| -> Result<(), HandlerError> {
                panic!("handler blew up")
            }),
        );
        let flag = Arc::clone(&reached);
        builder.register(
            EventKind::Hello,
            Arc::new(move |_: &mut Session, _: ConnectionEvent| -> Result<(), HandlerError> {
                *flag.lock().unwrap() = true;
                Ok(())
            }),
        );
        let mux = builder.build().unwrap();

        let (mut session, _channel) = test_session(RecordingChannel::new());
        let event = ConnectionEvent::new(session.remote(), EventBody::Hello);
        let outcome = mux.dispatch(&mut session, event);

        assert_eq!(outcome.handlers, 4);
        assert_eq!(outcome.failures, 2);
        assert!(*reached.lock().unwrap());
    }

    #[test]
    fn test_unregistered_kind_is_dropped() {
        let mux = builder_with_handshake_kinds().build().unwrap();
        assert_eq!(mux.chain_len(EventKind::PacketIn), 0);

        let (mut session, _channel) = test_session(RecordingChannel::new());
        let event = ConnectionEvent::new(
            session.remote(),
            EventBody::PacketIn(crate::event::PacketIn {
                buffer_id: 0,
                reason: Default::default(),
                table_id: 0,
                cookie: 0,
                in_port: Some(1),
                data: vec![],
            }),
        );
        assert_eq!(mux.dispatch(&mut session, event), Dispatch::default());
    }
}
