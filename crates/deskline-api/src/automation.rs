//! Automation rule types

use deskline_util::{AgentId, CategoryId, RuleId, RunId, TicketId};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{named_enum, ParseEnumError, TicketPriority, TicketStatus};

/// Ticket events a rule can listen for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerEvent {
    TicketCreated,
    TicketUpdated,
    StatusChanged,
    PriorityChanged,
    TicketAssigned,
    ReplyAdded,
    TicketReopened,
    SlaBreached,
    TicketEscalated,
}

named_enum!(TriggerEvent, "trigger" {
    TicketCreated => "ticket_created",
    TicketUpdated => "ticket_updated",
    StatusChanged => "status_changed",
    PriorityChanged => "priority_changed",
    TicketAssigned => "ticket_assigned",
    ReplyAdded => "reply_added",
    TicketReopened => "ticket_reopened",
    SlaBreached => "sla_breached",
    TicketEscalated => "ticket_escalated",
});

/// Ticket fields a condition may test
pub const TICKET_FIELDS: &[&str] = &[
    "status",
    "priority",
    "category",
    "assignee",
    "subject",
    "description",
    "source",
    "tags",
    "requester_type",
    "sla_policy",
    "escalation_level",
    "reopen_count",
    "hours_open",
];

/// Comparison applied by a condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    GreaterThan,
    LessThan,
    GreaterOrEqual,
    LessOrEqual,
    In,
    NotIn,
    IsEmpty,
    IsNotEmpty,
}

named_enum!(ConditionOperator, "operator" {
    Equals => "equals",
    NotEquals => "not_equals",
    Contains => "contains",
    NotContains => "not_contains",
    StartsWith => "starts_with",
    EndsWith => "ends_with",
    GreaterThan => "greater_than",
    LessThan => "less_than",
    GreaterOrEqual => "greater_or_equal",
    LessOrEqual => "less_or_equal",
    In => "in",
    NotIn => "not_in",
    IsEmpty => "is_empty",
    IsNotEmpty => "is_not_empty",
});

impl ConditionOperator {
    /// Operators that ignore the condition value
    pub fn is_unary(&self) -> bool {
        matches!(self, ConditionOperator::IsEmpty | ConditionOperator::IsNotEmpty)
    }

    /// Operators that expect a list value
    pub fn expects_list(&self) -> bool {
        matches!(self, ConditionOperator::In | ConditionOperator::NotIn)
    }

    pub fn is_ordering(&self) -> bool {
        matches!(
            self,
            ConditionOperator::GreaterThan
                | ConditionOperator::LessThan
                | ConditionOperator::GreaterOrEqual
                | ConditionOperator::LessOrEqual
        )
    }
}

/// One `field operator value` test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub operator: ConditionOperator,
    #[serde(default)]
    pub value: serde_json::Value,
}

impl Condition {
    pub fn new(field: impl Into<String>, operator: ConditionOperator, value: impl Into<serde_json::Value>) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }
}

/// Recipient of a notify action.
///
/// Written as `assignee`, `requester`, `webhook` or `agent:<id>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum NotifyTarget {
    Assignee,
    Requester,
    Webhook,
    Agent(AgentId),
}

impl TryFrom<String> for NotifyTarget {
    type Error = ParseEnumError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl std::str::FromStr for NotifyTarget {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s {
            "assignee" => Ok(NotifyTarget::Assignee),
            "requester" => Ok(NotifyTarget::Requester),
            "webhook" => Ok(NotifyTarget::Webhook),
            _ => match s.strip_prefix("agent:") {
                Some(agent) if !agent.trim().is_empty() => {
                    Ok(NotifyTarget::Agent(AgentId::new(agent.trim())))
                }
                _ => Err(ParseEnumError {
                    kind: "notify target",
                    value: s.to_string(),
                }),
            },
        }
    }
}

impl fmt::Display for NotifyTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotifyTarget::Assignee => f.write_str("assignee"),
            NotifyTarget::Requester => f.write_str("requester"),
            NotifyTarget::Webhook => f.write_str("webhook"),
            NotifyTarget::Agent(id) => write!(f, "agent:{}", id),
        }
    }
}

impl From<NotifyTarget> for String {
    fn from(target: NotifyTarget) -> Self {
        target.to_string()
    }
}

/// Something a matched rule does to the ticket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleAction {
    Assign { agent: AgentId },
    ChangePriority { priority: TicketPriority },
    ChangeStatus { status: TicketStatus },
    ChangeCategory { category: CategoryId },
    AddTag { tag: String },
    RemoveTag { tag: String },
    Notify { target: NotifyTarget, message: String },
}

impl RuleAction {
    pub fn kind(&self) -> &'static str {
        match self {
            RuleAction::Assign { .. } => "assign",
            RuleAction::ChangePriority { .. } => "change_priority",
            RuleAction::ChangeStatus { .. } => "change_status",
            RuleAction::ChangeCategory { .. } => "change_category",
            RuleAction::AddTag { .. } => "add_tag",
            RuleAction::RemoveTag { .. } => "remove_tag",
            RuleAction::Notify { .. } => "notify",
        }
    }
}

/// A validated automation rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationRule {
    pub id: RuleId,
    pub name: String,
    pub trigger: TriggerEvent,
    /// Higher runs first
    pub priority: i32,
    pub active: bool,
    /// Skip lower-priority rules once this one matches
    pub stop_processing: bool,
    pub conditions: Vec<Condition>,
    pub actions: Vec<RuleAction>,
}

/// What happened to one matched rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleOutcome {
    pub rule_id: RuleId,
    /// Kinds of the actions that ran, in order
    pub executed_actions: Vec<String>,
    /// Set when an action failed and the rest of the rule was skipped
    pub error: Option<String>,
}

impl RuleOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Result of dispatching one trigger for one ticket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationReport {
    pub run_id: RunId,
    pub ticket_id: TicketId,
    pub trigger: TriggerEvent,
    /// Active rules listening for the trigger
    pub evaluated: usize,
    /// One entry per rule whose conditions all held
    pub outcomes: Vec<RuleOutcome>,
}

impl AutomationReport {
    pub fn matched(&self) -> usize {
        self.outcomes.len()
    }

    pub fn failures(&self) -> impl Iterator<Item = &RuleOutcome> {
        self.outcomes.iter().filter(|o| !o.succeeded())
    }
}
