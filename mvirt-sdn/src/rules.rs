//! Flow rules and the named rule templates shared by the flow programs.
//!
//! Every rule the controller installs is produced by one of the template
//! functions below. Each template stamps its rule with a cookie carrying the
//! owning program and [`TEMPLATE_VERSION`], so rules installed by an older
//! controller build can be told apart on the switch.

use crate::message::{Instruction, MatchField, TableId};
use smoltcp::wire::{EthernetAddress, EthernetProtocol, IpProtocol};

/// Table 0: classification, always evaluated first.
pub const CONTROL_TABLE: TableId = TableId(0);

/// Table 1: forwarding.
pub const FORWARDING_TABLE: TableId = TableId(1);

pub const BASELINE_PRIORITY: u16 = 100;
pub const LEARNED_PRIORITY: u16 = 200;
pub const INSPECT_PRIORITY: u16 = 1000;

/// Idle timeout (seconds) of learned rules.
pub const LEARNED_IDLE_TIMEOUT: u16 = 300;

pub const HTTP_PORT: u16 = 80;

/// Bumped whenever a template's match or instructions change.
pub const TEMPLATE_VERSION: u16 = 1;

/// Program that owns a rule, encoded in the rule cookie.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum RuleOwner {
    Learning = 1,
    Inspection = 2,
}

/// Cookie layout: `owner << 16 | version`.
pub fn cookie(owner: RuleOwner) -> u64 {
    ((owner as u64) << 16) | TEMPLATE_VERSION as u64
}

/// A flow-mod add for one rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowRule {
    pub table: TableId,
    /// Higher wins.
    pub priority: u16,
    pub idle_timeout: u16,
    pub hard_timeout: u16,
    pub cookie: u64,
    pub matches: Vec<MatchField>,
    pub instructions: Vec<Instruction>,
}

impl FlowRule {
    pub fn builder(table: TableId) -> FlowRuleBuilder {
        FlowRuleBuilder {
            rule: FlowRule {
                table,
                priority: 0,
                idle_timeout: 0,
                hard_timeout: 0,
                cookie: 0,
                matches: Vec::new(),
                instructions: Vec::new(),
            },
        }
    }

    /// True if the rule has no match fields.
    pub fn matches_everything(&self) -> bool {
        self.matches.is_empty()
    }
}

/// Builder for [`FlowRule`].
pub struct FlowRuleBuilder {
    rule: FlowRule,
}

impl FlowRuleBuilder {
    pub fn priority(mut self, priority: u16) -> Self {
        self.rule.priority = priority;
        self
    }

    pub fn idle_timeout(mut self, secs: u16) -> Self {
        self.rule.idle_timeout = secs;
        self
    }

    pub fn hard_timeout(mut self, secs: u16) -> Self {
        self.rule.hard_timeout = secs;
        self
    }

    pub fn owner(mut self, owner: RuleOwner) -> Self {
        self.rule.cookie = cookie(owner);
        self
    }

    pub fn matching(mut self, field: MatchField) -> Self {
        self.rule.matches.push(field);
        self
    }

    pub fn instruction(mut self, instruction: Instruction) -> Self {
        self.rule.instructions.push(instruction);
        self
    }

    pub fn build(self) -> FlowRule {
        self.rule
    }
}

/// Table 0 baseline: copy everything to the controller, continue in table 1.
pub fn controller_redirect() -> FlowRule {
    FlowRule::builder(CONTROL_TABLE)
        .priority(BASELINE_PRIORITY)
        .hard_timeout(0)
        .owner(RuleOwner::Learning)
        .instruction(Instruction::send_to_controller())
        .instruction(Instruction::goto(FORWARDING_TABLE))
        .build()
}

/// Table 1 miss fallback: flood.
pub fn flood_miss() -> FlowRule {
    FlowRule::builder(FORWARDING_TABLE)
        .priority(BASELINE_PRIORITY)
        .hard_timeout(0)
        .owner(RuleOwner::Learning)
        .instruction(Instruction::flood())
        .build()
}

/// Table 1: frames addressed to a learned host leave through its port.
pub fn learned_destination(mac: EthernetAddress, port: u32) -> FlowRule {
    FlowRule::builder(FORWARDING_TABLE)
        .priority(LEARNED_PRIORITY)
        .idle_timeout(LEARNED_IDLE_TIMEOUT)
        .owner(RuleOwner::Learning)
        .matching(MatchField::EthDst(mac))
        .instruction(Instruction::output(port))
        .build()
}

/// Table 0: frames from a learned host skip the controller.
pub fn learned_source(mac: EthernetAddress) -> FlowRule {
    FlowRule::builder(CONTROL_TABLE)
        .priority(LEARNED_PRIORITY)
        .idle_timeout(LEARNED_IDLE_TIMEOUT)
        .owner(RuleOwner::Learning)
        .matching(MatchField::EthSrc(mac))
        .instruction(Instruction::goto(FORWARDING_TABLE))
        .build()
}

/// Which side of the TCP connection the HTTP port is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpSide {
    /// Requests towards a server on port 80.
    Destination,
    /// Responses from a server on port 80.
    Source,
}

/// Table 0: send full copies of HTTP traffic to the controller.
pub fn http_inspect(side: HttpSide) -> FlowRule {
    let port = match side {
        HttpSide::Destination => MatchField::TcpDst(HTTP_PORT),
        HttpSide::Source => MatchField::TcpSrc(HTTP_PORT),
    };
    FlowRule::builder(CONTROL_TABLE)
        .priority(INSPECT_PRIORITY)
        .owner(RuleOwner::Inspection)
        .matching(MatchField::EthType(u16::from(EthernetProtocol::Ipv4)))
        .matching(MatchField::IpProto(u8::from(IpProtocol::Tcp)))
        .matching(port)
        .instruction(Instruction::send_to_controller())
        .instruction(Instruction::goto(FORWARDING_TABLE))
        .build()
}
