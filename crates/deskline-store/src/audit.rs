//! Audit event types

use chrono::{DateTime, Local};
use deskline_api::{TicketPriority, TicketStatus, TriggerEvent};
use deskline_util::{AgentId, FolderId, MenuId, MenuItemId, NotificationId, PageId, RuleId, RunId, SlaPolicyId, TemplateId, TicketId};
use serde::{Deserialize, Serialize};

/// Types of audit events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEventType {
    /// Service started
    ServiceStarted,

    /// Service stopped
    ServiceStopped,

    /// Policy loaded/reloaded
    PolicyLoaded {
        rule_count: usize,
        sla_policy_count: usize,
    },

    TicketCreated {
        ticket_id: TicketId,
        sla_policy: SlaPolicyId,
        resolution_due_at: DateTime<Local>,
    },

    TicketStatusChanged {
        ticket_id: TicketId,
        from: TicketStatus,
        to: TicketStatus,
    },

    TicketReopened {
        ticket_id: TicketId,
        reopen_count: u32,
    },

    TicketAssigned {
        ticket_id: TicketId,
        agent: Option<AgentId>,
    },

    TicketDeleted { ticket_id: TicketId },

    /// A matched rule ran all its actions
    RuleExecuted {
        run_id: RunId,
        rule_id: RuleId,
        ticket_id: TicketId,
        trigger: TriggerEvent,
        actions: Vec<String>,
    },

    /// A matched rule stopped at a failing action
    RuleFailed {
        run_id: RunId,
        rule_id: RuleId,
        ticket_id: TicketId,
        trigger: TriggerEvent,
        error: String,
    },

    SlaBreached {
        ticket_id: TicketId,
        due_at: DateTime<Local>,
    },

    TicketEscalated {
        ticket_id: TicketId,
        level: u8,
        priority: TicketPriority,
        assignee: Option<AgentId>,
    },

    MenuItemMoved {
        item_id: MenuItemId,
        parent_id: Option<MenuItemId>,
        position: usize,
    },

    MenuItemDeleted {
        item_id: MenuItemId,
        promoted_children: usize,
    },

    MenuImported { menu_id: MenuId, item_count: usize },

    FolderMoved {
        folder_id: FolderId,
        parent_id: Option<FolderId>,
    },

    PageParentChanged {
        page_id: PageId,
        parent_id: Option<PageId>,
    },

    TemplateDeleted { template_id: TemplateId },

    RedirectSaved {
        source: String,
        target: String,
        status_code: u16,
    },

    RedirectsImported {
        processed: usize,
        skipped: usize,
        failed: usize,
    },

    /// Bulk ticket action finished
    BulkAction {
        action: String,
        processed: usize,
        skipped: usize,
        failed: usize,
    },

    /// Delivery gave up on a notification
    NotificationAbandoned {
        notification_id: NotificationId,
        attempts: u32,
        error: String,
    },
}

/// Full audit event with metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event ID
    pub id: i64,

    /// Event timestamp
    pub timestamp: DateTime<Local>,

    /// Event type and details
    pub event: AuditEventType,
}

impl AuditEvent {
    pub fn new(event: AuditEventType) -> Self {
        Self {
            id: 0, // Will be set by store
            timestamp: deskline_util::now(),
            event,
        }
    }
}
