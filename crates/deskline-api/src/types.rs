//! Ticket types

use chrono::{DateTime, Local};
use deskline_util::{AgentId, CategoryId, SlaPolicyId, TicketId};
use serde::{Deserialize, Serialize};

use crate::named_enum;

/// Ticket lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Open,
    InProgress,
    Pending,
    Resolved,
    Closed,
}

named_enum!(TicketStatus, "status" {
    Open => "open",
    InProgress => "in_progress",
    Pending => "pending",
    Resolved => "resolved",
    Closed => "closed",
});

impl TicketStatus {
    /// Resolved or closed: the SLA clock has stopped
    pub fn is_settled(&self) -> bool {
        matches!(self, TicketStatus::Resolved | TicketStatus::Closed)
    }
}

/// Ticket priority, ordered from least to most urgent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TicketPriority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

named_enum!(TicketPriority, "priority" {
    Low => "low",
    Medium => "medium",
    High => "high",
    Urgent => "urgent",
});

impl TicketPriority {
    /// 0 for low up to 3 for urgent
    pub fn rank(&self) -> u8 {
        *self as u8
    }

    /// One step more urgent, saturating at urgent
    pub fn raised(&self) -> Self {
        match self {
            TicketPriority::Low => TicketPriority::Medium,
            TicketPriority::Medium => TicketPriority::High,
            TicketPriority::High | TicketPriority::Urgent => TicketPriority::Urgent,
        }
    }
}

/// Who opened the ticket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequesterKind {
    Client,
    Lead,
    User,
}

named_enum!(RequesterKind, "requester type" {
    Client => "client",
    Lead => "lead",
    User => "user",
});

/// Polymorphic reference to the person a ticket is for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Requester {
    pub kind: RequesterKind,
    pub id: i64,
}

impl Requester {
    pub fn new(kind: RequesterKind, id: i64) -> Self {
        Self { kind, id }
    }
}

/// Channel the ticket came in through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TicketSource {
    #[default]
    Staff,
    Chatbot,
    Email,
    Portal,
}

named_enum!(TicketSource, "source" {
    Staff => "staff",
    Chatbot => "chatbot",
    Email => "email",
    Portal => "portal",
});

/// A support ticket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    /// Row id, 0 until stored
    pub id: TicketId,
    pub subject: String,
    pub description: String,
    pub status: TicketStatus,
    pub priority: TicketPriority,
    pub category: Option<CategoryId>,
    pub assignee: Option<AgentId>,
    pub requester: Requester,
    pub source: TicketSource,
    pub tags: Vec<String>,

    /// SLA policy in effect; every ticket has exactly one
    pub sla_policy: SlaPolicyId,
    pub response_due_at: DateTime<Local>,
    pub resolution_due_at: DateTime<Local>,

    pub first_response_at: Option<DateTime<Local>>,
    pub resolved_at: Option<DateTime<Local>>,
    pub closed_at: Option<DateTime<Local>>,

    pub escalation_level: u8,
    pub reopen_count: u32,
    /// Set once the resolution breach has been dispatched
    pub breach_notified: bool,

    pub created_at: DateTime<Local>,
    pub updated_at: DateTime<Local>,
}

impl Ticket {
    /// Still inside the SLA clock
    pub fn is_open(&self) -> bool {
        !self.status.is_settled()
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        let tag = normalize_tag(tag);
        self.tags.iter().any(|t| *t == tag)
    }

    /// Add a tag; returns false if it was already present or blank
    pub fn add_tag(&mut self, tag: &str) -> bool {
        let tag = normalize_tag(tag);
        if tag.is_empty() || self.tags.contains(&tag) {
            return false;
        }
        self.tags.push(tag);
        true
    }

    /// Remove a tag; returns false if it was not present
    pub fn remove_tag(&mut self, tag: &str) -> bool {
        let tag = normalize_tag(tag);
        let before = self.tags.len();
        self.tags.retain(|t| *t != tag);
        self.tags.len() != before
    }
}

/// Tags are stored trimmed and lowercase
pub fn normalize_tag(tag: &str) -> String {
    tag.trim().to_lowercase()
}

/// Input for opening a ticket
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTicket {
    pub subject: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: TicketPriority,
    pub category: Option<CategoryId>,
    pub assignee: Option<AgentId>,
    pub requester: Requester,
    #[serde(default)]
    pub source: TicketSource,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Explicit policy; otherwise the category's, otherwise the default
    pub sla_policy: Option<SlaPolicyId>,
}

impl NewTicket {
    pub fn new(subject: impl Into<String>, requester: Requester) -> Self {
        Self {
            subject: subject.into(),
            description: String::new(),
            priority: TicketPriority::default(),
            category: None,
            assignee: None,
            requester,
            source: TicketSource::default(),
            tags: Vec::new(),
            sla_policy: None,
        }
    }
}

/// An agent reply on a ticket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketReply {
    /// Row id, 0 until stored
    pub id: i64,
    pub ticket_id: TicketId,
    pub author: AgentId,
    pub body: String,
    pub created_at: DateTime<Local>,
}

/// Where a ticket stands against one SLA target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlaState {
    OnTrack,
    AtRisk,
    Breached,
    Met,
}

named_enum!(SlaState, "SLA state" {
    OnTrack => "on_track",
    AtRisk => "at_risk",
    Breached => "breached",
    Met => "met",
});

/// SLA standing of a ticket at a given instant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlaReport {
    pub ticket_id: TicketId,
    pub policy: SlaPolicyId,
    pub response: SlaState,
    pub resolution: SlaState,
    pub response_due_at: DateTime<Local>,
    pub resolution_due_at: DateTime<Local>,
    /// Seconds until resolution is due; negative once overdue
    pub resolution_remaining_secs: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_ordering_and_raise() {
        assert!(TicketPriority::Urgent > TicketPriority::High);
        assert!(TicketPriority::Low < TicketPriority::Medium);
        assert_eq!(TicketPriority::Low.raised(), TicketPriority::Medium);
        assert_eq!(TicketPriority::Urgent.raised(), TicketPriority::Urgent);
        assert_eq!(TicketPriority::High.rank(), 2);
    }

    #[test]
    fn status_parse_and_display() {
        assert_eq!("in_progress".parse::<TicketStatus>().unwrap(), TicketStatus::InProgress);
        assert_eq!(" Closed ".parse::<TicketStatus>().unwrap(), TicketStatus::Closed);
        assert!("archived".parse::<TicketStatus>().is_err());
        assert_eq!(TicketStatus::Pending.to_string(), "pending");
        assert_eq!(TicketStatus::ALL.len(), 5);
    }

    #[test]
    fn serde_names_match_as_str() {
        for status in TicketStatus::ALL {
            let json = serde_json::to_string(status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
        }
        for priority in TicketPriority::ALL {
            let json = serde_json::to_string(priority).unwrap();
            assert_eq!(json, format!("\"{}\"", priority.as_str()));
        }
    }
}
