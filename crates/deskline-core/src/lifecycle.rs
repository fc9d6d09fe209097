//! Ticket status transitions

use chrono::{DateTime, Local};
use deskline_api::{Ticket, TicketStatus};
use deskline_util::{DeskError, Result};

/// Move `ticket` to `to`, stamping lifecycle timestamps.
///
/// Settled tickets (resolved, closed) only leave that state through
/// [`reopen`]; resolved may still be closed. Moving to the current status
/// is a no-op.
pub(crate) fn transition(ticket: &mut Ticket, to: TicketStatus, now: DateTime<Local>) -> Result<()> {
    let from = ticket.status;
    if from == to {
        return Ok(());
    }

    match (from, to) {
        (TicketStatus::Resolved, TicketStatus::Closed) => {}
        (from, _) if from.is_settled() => {
            return Err(DeskError::InvalidTransition(format!(
                "ticket {} is {}; reopen it before moving to {}",
                ticket.id, from, to
            )));
        }
        _ => {}
    }

    if from == TicketStatus::Open && ticket.first_response_at.is_none() {
        ticket.first_response_at = Some(now);
    }

    match to {
        TicketStatus::Resolved => ticket.resolved_at = Some(now),
        TicketStatus::Closed => {
            ticket.closed_at = Some(now);
            ticket.resolved_at.get_or_insert(now);
        }
        _ => {}
    }

    ticket.status = to;
    Ok(())
}

/// Put a settled ticket back to open.
///
/// Clears the resolution stamps and the breach flag; due dates stay as they
/// were.
pub(crate) fn reopen(ticket: &mut Ticket) -> Result<()> {
    if !ticket.status.is_settled() {
        return Err(DeskError::InvalidTransition(format!(
            "ticket {} is {} and cannot be reopened",
            ticket.id, ticket.status
        )));
    }

    ticket.status = TicketStatus::Open;
    ticket.resolved_at = None;
    ticket.closed_at = None;
    ticket.breach_notified = false;
    ticket.reopen_count += 1;
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::Duration;
    use deskline_api::{Requester, RequesterKind, TicketPriority, TicketSource};
    use deskline_util::{SlaPolicyId, TicketId};

    pub(crate) fn open_ticket(now: DateTime<Local>) -> Ticket {
        Ticket {
            id: TicketId::new(5),
            subject: "Printer on fire".into(),
            description: String::new(),
            status: TicketStatus::Open,
            priority: TicketPriority::Medium,
            category: None,
            assignee: None,
            requester: Requester::new(RequesterKind::Client, 2),
            source: TicketSource::Email,
            tags: vec![],
            sla_policy: SlaPolicyId::new("standard"),
            response_due_at: now + Duration::hours(4),
            resolution_due_at: now + Duration::hours(24),
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
    fn first_move_out_of_open_stamps_response() {
        let now = deskline_util::now();
        let mut ticket = open_ticket(now);

        transition(&mut ticket, TicketStatus::InProgress, now).unwrap();
        assert_eq!(ticket.first_response_at, Some(now));

        let later = now + Duration::hours(1);
        transition(&mut ticket, TicketStatus::Pending, later).unwrap();
        assert_eq!(ticket.first_response_at, Some(now));
    }

    #[test]
    fn closing_stamps_resolution_too() {
        let now = deskline_util::now();
        let mut ticket = open_ticket(now);
        transition(&mut ticket, TicketStatus::Closed, now).unwrap();
        assert_eq!(ticket.closed_at, Some(now));
        assert_eq!(ticket.resolved_at, Some(now));
    }

    #[test]
    fn resolved_can_close_but_not_reopen_directly() {
        let now = deskline_util::now();
        let mut ticket = open_ticket(now);
        transition(&mut ticket, TicketStatus::Resolved, now).unwrap();

        let err = transition(&mut ticket, TicketStatus::Open, now).unwrap_err();
        assert!(matches!(err, DeskError::InvalidTransition(_)));

        let later = now + Duration::minutes(30);
        transition(&mut ticket, TicketStatus::Closed, later).unwrap();
        assert_eq!(ticket.resolved_at, Some(now));
        assert_eq!(ticket.closed_at, Some(later));

        assert!(transition(&mut ticket, TicketStatus::Resolved, later).is_err());
    }

    #[test]
    fn same_status_is_noop() {
        let now = deskline_util::now();
        let mut ticket = open_ticket(now);
        transition(&mut ticket, TicketStatus::Open, now).unwrap();
        assert_eq!(ticket.first_response_at, None);
    }

    #[test]
    fn reopen_clears_stamps() {
        let now = deskline_util::now();
        let mut ticket = open_ticket(now);
        assert!(reopen(&mut ticket).is_err());

        transition(&mut ticket, TicketStatus::Closed, now).unwrap();
        ticket.breach_notified = true;
        reopen(&mut ticket).unwrap();

        assert_eq!(ticket.status, TicketStatus::Open);
        assert_eq!(ticket.resolved_at, None);
        assert_eq!(ticket.closed_at, None);
        assert!(!ticket.breach_notified);
        assert_eq!(ticket.reopen_count, 1);
        assert!(ticket.first_response_at.is_some());
    }
}
