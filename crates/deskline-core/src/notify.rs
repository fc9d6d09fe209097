//! Notification hand-off

use deskline_api::{Notification, Ticket};
use deskline_store::Store;
use deskline_util::{NotificationId, Result};
use std::sync::Arc;
use tracing::debug;

/// Accepts notifications produced by rule actions and the SLA sweep
pub trait Notifier: Send + Sync {
    fn send(&self, notification: Notification) -> Result<NotificationId>;
}

/// Queues notifications in the store outbox for the service to deliver
pub struct OutboxNotifier {
    store: Arc<dyn Store>,
}

impl OutboxNotifier {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

impl Notifier for OutboxNotifier {
    fn send(&self, notification: Notification) -> Result<NotificationId> {
        let id = self.store.enqueue_notification(&notification)?;
        debug!(
            notification_id = %id,
            target = %notification.target,
            recipient = ?notification.recipient,
            "Notification queued"
        );
        Ok(id)
    }
}

/// Fill `{ticket_id}`, `{subject}`, `{priority}` and `{status}` from the ticket
pub fn render_message(template: &str, ticket: &Ticket) -> String {
    template
        .replace("{ticket_id}", &ticket.id.to_string())
        .replace("{subject}", &ticket.subject)
        .replace("{priority}", ticket.priority.as_str())
        .replace("{status}", ticket.status.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use deskline_api::{NotifyTarget, Requester, RequesterKind, TicketPriority, TicketSource, TicketStatus};
    use deskline_store::SqliteStore;
    use deskline_util::{SlaPolicyId, TicketId};

    fn ticket() -> Ticket {
        let now = deskline_util::now();
        Ticket {
            id: TicketId::new(17),
            subject: "VPN down".into(),
            description: String::new(),
            status: TicketStatus::InProgress,
            priority: TicketPriority::Urgent,
            category: None,
            assignee: None,
            requester: Requester::new(RequesterKind::User, 1),
            source: TicketSource::Portal,
            tags: vec![],
            sla_policy: SlaPolicyId::new("standard"),
            response_due_at: now + Duration::hours(1),
            resolution_due_at: now + Duration::hours(8),
            first_response_at: None,
            resolved_at: None,
            closed_at: None,
            escalation_level: 0,
            reopen_count: 0,
            breach_notified: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn placeholders_are_filled() {
        let message = render_message("#{ticket_id} {subject} is {priority}/{status}", &ticket());
        assert_eq!(message, "#17 VPN down is urgent/in_progress");
    }

    #[test]
    fn outbox_notifier_enqueues() {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().unwrap());
        let notifier = OutboxNotifier::new(store.clone());

        notifier
            .send(Notification {
                id: NotificationId::new(0),
                ticket_id: Some(TicketId::new(17)),
                target: NotifyTarget::Webhook,
                recipient: None,
                message: "hello".into(),
                created_at: deskline_util::now(),
                attempts: 0,
                last_error: None,
                delivered_at: None,
            })
            .unwrap();

        let pending = store.pending_notifications(5, 10).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].message, "hello");
    }
}
