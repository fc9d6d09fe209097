//! Bulk action, import and statistics reports

use chrono::{DateTime, Local};
use deskline_util::{AgentId, NotificationId, TicketId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{NotifyTarget, TicketPriority, TicketStatus};

/// An action applied to many tickets at once
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum BulkAction {
    Close,
    Assign { agent: AgentId },
    SetPriority { priority: TicketPriority },
    SetStatus { status: TicketStatus },
    AddTag { tag: String },
    Delete,
}

impl BulkAction {
    pub fn name(&self) -> &'static str {
        match self {
            BulkAction::Close => "close",
            BulkAction::Assign { .. } => "assign",
            BulkAction::SetPriority { .. } => "set_priority",
            BulkAction::SetStatus { .. } => "set_status",
            BulkAction::AddTag { .. } => "add_tag",
            BulkAction::Delete => "delete",
        }
    }
}

/// Per-item failure inside a bulk operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkItemError {
    /// Ticket id or import row number
    pub item: String,
    pub message: String,
}

/// Tally of a bulk operation or import.
///
/// `processed + skipped + failed == requested` always holds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkOutcome {
    pub requested: usize,
    /// Items acted upon
    pub processed: usize,
    /// Unknown ids, duplicates, or items already in the target state
    pub skipped: usize,
    pub failed: usize,
    pub errors: Vec<BulkItemError>,
}

impl BulkOutcome {
    pub fn record_processed(&mut self) {
        self.requested += 1;
        self.processed += 1;
    }

    pub fn record_skipped(&mut self) {
        self.requested += 1;
        self.skipped += 1;
    }

    pub fn record_failed(&mut self, item: impl ToString, message: impl Into<String>) {
        self.requested += 1;
        self.failed += 1;
        self.errors.push(BulkItemError {
            item: item.to_string(),
            message: message.into(),
        });
    }
}

/// Aggregate ticket figures at a point in time
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TicketStats {
    pub total: usize,
    pub by_status: BTreeMap<String, usize>,
    pub by_priority: BTreeMap<String, usize>,
    /// Unresolved tickets already past their resolution due date
    pub open_breached: usize,
    pub resolved_total: usize,
    pub resolved_within_sla: usize,
    /// Share of resolved tickets that met their resolution SLA, 0.0 to 1.0
    pub compliance_rate: Option<f64>,
    pub avg_first_response_minutes: Option<f64>,
    pub avg_resolution_minutes: Option<f64>,
}

/// A queued notification waiting for delivery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub ticket_id: Option<TicketId>,
    pub target: NotifyTarget,
    /// Resolved recipient (agent id, requester reference), if any
    pub recipient: Option<String>,
    pub message: String,
    pub created_at: DateTime<Local>,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub delivered_at: Option<DateTime<Local>>,
}
