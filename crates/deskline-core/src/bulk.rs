//! Bulk ticket actions

use chrono::{DateTime, Local};
use deskline_api::{BulkAction, BulkOutcome, Ticket, TicketStatus};
use deskline_store::{AuditEvent, AuditEventType, TicketStore};
use deskline_util::{DeskError, Result, TicketId};
use std::collections::HashSet;
use tracing::{debug, info};

use crate::HelpDesk;

impl HelpDesk {
    /// Apply `action` to every ticket in `ids`.
    ///
    /// Unknown and repeated ids, and tickets already in the target state, are
    /// skipped. A failure on one ticket is recorded and the rest still run.
    /// Each change goes through the same path as a single-ticket mutation, so
    /// rules fire per ticket.
    pub fn bulk_update(&self, ids: &[TicketId], action: &BulkAction, now: DateTime<Local>) -> Result<BulkOutcome> {
        match action {
            BulkAction::Assign { agent } if self.policy().get_agent(agent).is_none() => {
                return Err(DeskError::UnknownAgent(agent.clone()));
            }
            BulkAction::AddTag { tag } if tag.trim().is_empty() => {
                return Err(DeskError::field("tag", "must not be empty"));
            }
            _ => {}
        }

        let mut outcome = BulkOutcome::default();
        let mut seen = HashSet::new();

        for &id in ids {
            if !seen.insert(id) {
                outcome.record_skipped();
                continue;
            }
            let ticket = match self.store().get_ticket(id) {
                Ok(Some(ticket)) => ticket,
                Ok(None) => {
                    debug!(ticket_id = %id, "Bulk action skipping unknown ticket");
                    outcome.record_skipped();
                    continue;
                }
                Err(e) => {
                    outcome.record_failed(id, e.to_string());
                    continue;
                }
            };

            match self.apply_bulk(ticket, action, now) {
                Ok(true) => outcome.record_processed(),
                Ok(false) => outcome.record_skipped(),
                Err(e) => {
                    debug!(ticket_id = %id, error = %e, "Bulk action failed for ticket");
                    outcome.record_failed(id, e.to_string());
                }
            }
        }

        info!(
            action = action.name(),
            processed = outcome.processed,
            skipped = outcome.skipped,
            failed = outcome.failed,
            "Bulk action finished"
        );
        let _ = self.store().append_audit(AuditEvent::new(AuditEventType::BulkAction {
            action: action.name().to_string(),
            processed: outcome.processed,
            skipped: outcome.skipped,
            failed: outcome.failed,
        }));

        Ok(outcome)
    }

    /// Ok(false) when the ticket already satisfies the action
    fn apply_bulk(&self, mut ticket: Ticket, action: &BulkAction, now: DateTime<Local>) -> Result<bool> {
        let id = ticket.id;
        match action {
            BulkAction::Close => self.bulk_status(&ticket, TicketStatus::Closed, now),
            BulkAction::SetStatus { status } => self.bulk_status(&ticket, *status, now),
            BulkAction::Assign { agent } => {
                if ticket.assignee.as_ref() == Some(agent) {
                    return Ok(false);
                }
                self.assign(id, Some(agent.clone()), now)?;
                Ok(true)
            }
            BulkAction::SetPriority { priority } => {
                if ticket.priority == *priority {
                    return Ok(false);
                }
                self.change_priority(id, *priority, now)?;
                Ok(true)
            }
            BulkAction::AddTag { tag } => {
                if !ticket.add_tag(tag) {
                    return Ok(false);
                }
                self.commit(ticket, &[], now)?;
                Ok(true)
            }
            BulkAction::Delete => {
                if !self.store().delete_ticket(id)? {
                    return Ok(false);
                }
                info!(ticket_id = %id, "Ticket deleted");
                let _ = self
                    .store()
                    .append_audit(AuditEvent::new(AuditEventType::TicketDeleted { ticket_id: id }));
                Ok(true)
            }
        }
    }

    fn bulk_status(&self, ticket: &Ticket, status: TicketStatus, now: DateTime<Local>) -> Result<bool> {
        if ticket.status == status {
            return Ok(false);
        }
        if status == TicketStatus::Open && ticket.status.is_settled() {
            self.reopen(ticket.id, now)?;
        } else {
            self.change_status(ticket.id, status, now)?;
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::desk::tests::{desk, new_ticket, t0};
    use deskline_api::TicketPriority;
    use deskline_util::AgentId;

    fn seed(desk: &HelpDesk, n: usize) -> Vec<TicketId> {
        (0..n)
            .map(|i| desk.create_ticket(new_ticket(&format!("Ticket {}", i)), t0()).unwrap().ticket.id)
            .collect()
    }

    #[test]
    fn processed_counts_only_acted_on_tickets() {
        let desk = desk();
        let ids = seed(&desk, 3);
        desk.change_status(ids[0], TicketStatus::Closed, t0()).unwrap();

        let mut request = ids.clone();
        request.push(TicketId::new(999));
        request.push(ids[1]);

        let outcome = desk.bulk_update(&request, &BulkAction::Close, t0()).unwrap();
        assert_eq!(outcome.requested, 5);
        assert_eq!(outcome.processed, 2);
        // already closed, unknown, duplicate
        assert_eq!(outcome.skipped, 3);
        assert_eq!(outcome.failed, 0);

        for id in &ids {
            assert_eq!(desk.get_ticket(*id).unwrap().status, TicketStatus::Closed);
        }
    }

    #[test]
    fn invalid_transitions_are_counted_as_failures() {
        let desk = desk();
        let ids = seed(&desk, 2);
        desk.change_status(ids[0], TicketStatus::Closed, t0()).unwrap();

        let outcome = desk
            .bulk_update(&ids, &BulkAction::SetStatus { status: TicketStatus::Pending }, t0())
            .unwrap();
        assert_eq!(outcome.processed, 1);
        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.errors[0].item, ids[0].to_string());
        assert_eq!(desk.get_ticket(ids[1]).unwrap().status, TicketStatus::Pending);
    }

    #[test]
    fn set_status_open_reopens_settled_tickets() {
        let desk = desk();
        let ids = seed(&desk, 1);
        desk.change_status(ids[0], TicketStatus::Resolved, t0()).unwrap();

        let outcome = desk
            .bulk_update(&ids, &BulkAction::SetStatus { status: TicketStatus::Open }, t0())
            .unwrap();
        assert_eq!(outcome.processed, 1);
        assert_eq!(desk.get_ticket(ids[0]).unwrap().reopen_count, 1);
    }

    #[test]
    fn unknown_agent_rejects_whole_request() {
        let desk = desk();
        let ids = seed(&desk, 2);
        let err = desk
            .bulk_update(&ids, &BulkAction::Assign { agent: AgentId::new("ghost") }, t0())
            .unwrap_err();
        assert!(matches!(err, DeskError::UnknownAgent(_)));
        assert!(desk.get_ticket(ids[0]).unwrap().assignee.is_none());
    }

    #[test]
    fn assign_priority_and_tag() {
        let desk = desk();
        let ids = seed(&desk, 2);
        desk.assign(ids[0], Some(AgentId::new("alice")), t0()).unwrap();

        let outcome = desk
            .bulk_update(&ids, &BulkAction::Assign { agent: AgentId::new("alice") }, t0())
            .unwrap();
        assert_eq!((outcome.processed, outcome.skipped), (1, 1));

        let outcome = desk
            .bulk_update(&ids, &BulkAction::SetPriority { priority: TicketPriority::High }, t0())
            .unwrap();
        assert_eq!(outcome.processed, 2);

        let outcome = desk
            .bulk_update(&ids, &BulkAction::AddTag { tag: " Outage ".into() }, t0())
            .unwrap();
        assert_eq!(outcome.processed, 2);
        assert!(desk.get_ticket(ids[1]).unwrap().has_tag("outage"));

        let outcome = desk
            .bulk_update(&ids, &BulkAction::AddTag { tag: "outage".into() }, t0())
            .unwrap();
        assert_eq!(outcome.skipped, 2);
    }

    #[test]
    fn delete_removes_tickets_and_audits() {
        let desk = desk();
        let ids = seed(&desk, 2);

        let outcome = desk.bulk_update(&ids, &BulkAction::Delete, t0()).unwrap();
        assert_eq!(outcome.processed, 2);
        assert!(desk.store().list_tickets(false).unwrap().is_empty());

        let audits = desk.store().get_recent_audits(100).unwrap();
        assert!(audits.iter().any(|a| matches!(
            a.event,
            AuditEventType::BulkAction { ref action, processed: 2, .. } if action == "delete"
        )));
    }
}
