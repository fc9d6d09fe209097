//! Core events emitted by the engine

use chrono::{DateTime, Local};
use deskline_api::TicketPriority;
use deskline_util::{AgentId, TicketId};

/// Events emitted by the core engine
#[derive(Debug, Clone, PartialEq)]
pub enum CoreEvent {
    /// A ticket went past its resolution due date
    SlaBreached {
        ticket_id: TicketId,
        due_at: DateTime<Local>,
    },

    /// A ticket climbed one escalation level
    TicketEscalated {
        ticket_id: TicketId,
        level: u8,
        priority: TicketPriority,
        assignee: Option<AgentId>,
    },

    /// Policy was reloaded
    PolicyReloaded {
        rule_count: usize,
        sla_policy_count: usize,
    },
}
