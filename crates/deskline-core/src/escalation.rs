//! SLA monitor: breach detection and escalation

use chrono::{DateTime, Local};
use deskline_api::{Ticket, TriggerEvent};
use deskline_store::{AuditEvent, AuditEventType, TicketStore};
use deskline_util::Result;
use tracing::{debug, info, warn};

use crate::sla::{escalation_due, is_breached};
use crate::{CoreEvent, HelpDesk};

/// What one sweep over the open tickets did
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    pub checked: usize,
    pub breached: usize,
    pub escalated: usize,
    pub events: Vec<CoreEvent>,
}

impl HelpDesk {
    /// Check every unresolved ticket against its SLA.
    ///
    /// A ticket climbs at most one escalation level per sweep. Failures on one
    /// ticket are logged and the sweep moves on.
    pub fn sweep_sla(&self, now: DateTime<Local>) -> Result<SweepReport> {
        let tickets = self.store().list_tickets(true)?;
        let mut report = SweepReport::default();

        for ticket in tickets {
            report.checked += 1;
            let id = ticket.id;
            if let Err(e) = self.sweep_ticket(ticket, now, &mut report) {
                warn!(ticket_id = %id, error = %e, "SLA sweep failed for ticket");
            }
        }

        if report.breached > 0 || report.escalated > 0 {
            info!(
                checked = report.checked,
                breached = report.breached,
                escalated = report.escalated,
                "SLA sweep complete"
            );
        } else {
            debug!(checked = report.checked, "SLA sweep complete");
        }

        Ok(report)
    }

    fn sweep_ticket(&self, mut ticket: Ticket, now: DateTime<Local>, report: &mut SweepReport) -> Result<()> {
        if is_breached(&ticket, now) && !ticket.breach_notified {
            self.mark_breached(&mut ticket, now, report)?;
        }

        // Rules run on the breach may have settled the ticket
        if ticket.is_open() {
            self.maybe_escalate(ticket, now, report)?;
        }
        Ok(())
    }

    fn mark_breached(&self, ticket: &mut Ticket, now: DateTime<Local>, report: &mut SweepReport) -> Result<()> {
        ticket.breach_notified = true;
        ticket.updated_at = now;
        self.store().update_ticket(ticket)?;

        warn!(
            ticket_id = %ticket.id,
            due_at = %ticket.resolution_due_at,
            "Ticket breached its resolution SLA"
        );
        let _ = self.store().append_audit(AuditEvent::new(AuditEventType::SlaBreached {
            ticket_id: ticket.id,
            due_at: ticket.resolution_due_at,
        }));

        report.breached += 1;
        report.events.push(CoreEvent::SlaBreached {
            ticket_id: ticket.id,
            due_at: ticket.resolution_due_at,
        });

        self.dispatch(ticket, &[TriggerEvent::SlaBreached], now)?;
        Ok(())
    }

    fn maybe_escalate(&self, mut ticket: Ticket, now: DateTime<Local>, report: &mut SweepReport) -> Result<()> {
        let policy = self.policy();
        if ticket.escalation_level >= policy.escalation.max_level {
            return Ok(());
        }
        let Some(sla) = policy.get_sla_policy(&ticket.sla_policy) else {
            debug!(ticket_id = %ticket.id, sla_policy = %ticket.sla_policy, "SLA policy no longer configured");
            return Ok(());
        };

        let level = ticket.escalation_level + 1;
        match escalation_due(&policy.calendar, sla, ticket.created_at, level) {
            Some(due) if now >= due => {}
            _ => return Ok(()),
        }

        ticket.escalation_level = level;
        if policy.escalation.raise_priority {
            ticket.priority = ticket.priority.raised();
        }
        if let Some(agent) = sla.escalation_assignee(level) {
            if policy.get_agent(agent).is_some() {
                ticket.assignee = Some(agent.clone());
            } else {
                warn!(ticket_id = %ticket.id, agent = %agent, "Escalation assignee is not a known agent");
            }
        }
        ticket.updated_at = now;
        self.store().update_ticket(&ticket)?;

        info!(
            ticket_id = %ticket.id,
            level,
            priority = %ticket.priority,
            assignee = ?ticket.assignee,
            "Ticket escalated"
        );
        let _ = self.store().append_audit(AuditEvent::new(AuditEventType::TicketEscalated {
            ticket_id: ticket.id,
            level,
            priority: ticket.priority,
            assignee: ticket.assignee.clone(),
        }));

        report.escalated += 1;
        report.events.push(CoreEvent::TicketEscalated {
            ticket_id: ticket.id,
            level,
            priority: ticket.priority,
            assignee: ticket.assignee.clone(),
        });

        self.dispatch(&mut ticket, &[TriggerEvent::TicketEscalated], now)?;
        Ok(())
    }
}
