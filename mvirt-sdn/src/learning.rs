//! MAC-learning switch over a two-table pipeline.
//!
//! Table 0 copies unknown traffic to the controller and continues in table 1,
//! which floods by default. Each PacketIn teaches the switch where its source
//! host lives: table 1 forwards to that host directly and table 0 stops
//! copying the host's traffic to the controller. Learned rules idle out on
//! the switch, after which traffic falls back to the baseline rules.

use crate::connection::Session;
use crate::event::PacketIn;
use crate::message::OutgoingMessage;
use crate::mux::HandlerError;
use crate::packet;
use crate::program::FlowProgram;
use crate::rules;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

#[derive(Debug, Default)]
pub struct LearningSwitch;

impl LearningSwitch {
    pub fn new() -> Self {
        Self
    }
}

impl FlowProgram for LearningSwitch {
    fn name(&self) -> &'static str {
        "learning-switch"
    }

    fn on_connected(&self, session: &Session) -> Result<(), HandlerError> {
        info!(remote = %session.remote(), "Installing layer 2 switching baseline");
        session.send(OutgoingMessage::FlowMod(rules::controller_redirect()));
        session.send(OutgoingMessage::FlowMod(rules::flood_miss()));
        Ok(())
    }

    fn on_packet_in(
        &self,
        session: &Session,
        packet_in: &PacketIn,
        _received_at: DateTime<Utc>,
    ) -> Result<(), HandlerError> {
        let in_port = packet_in
            .in_port
            .ok_or_else(|| HandlerError::Protocol("PacketIn without ingress port".into()))?;
        let frame = match packet::decode(&packet_in.data) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(remote = %session.remote(), in_port, error = %e, "Skipping undecodable packet");
                return Ok(());
            }
        };

        if !frame.src_mac.is_unicast() {
            debug!(src_mac = %frame.src_mac, "Not learning non-unicast source");
            return Ok(());
        }

        info!(
            remote = %session.remote(),
            src_mac = %frame.src_mac,
            dst_mac = %frame.dst_mac,
            in_port,
            "Learning"
        );

        session.send(OutgoingMessage::FlowMod(rules::learned_destination(
            frame.src_mac,
            in_port,
        )));
        session.send(OutgoingMessage::FlowMod(rules::learned_source(frame.src_mac)));
        Ok(())
    }
}
