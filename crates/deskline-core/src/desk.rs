//! Help desk engine: ticket lifecycle and automation dispatch

use chrono::{DateTime, Local};
use deskline_api::{
    AutomationReport, NewTicket, SlaReport, Ticket, TicketPriority, TicketReply, TicketStatus, TriggerEvent,
};
use deskline_config::Policy;
use deskline_store::{AuditEvent, AuditEventType, Store, TicketStore};
use deskline_util::{AgentId, DeskError, FieldError, Result, TicketId};
use std::sync::Arc;
use tracing::{debug, info};

use crate::automation::run_rules;
use crate::lifecycle;
use crate::notify::{Notifier, OutboxNotifier};
use crate::sla::{due_dates, sla_report};
use crate::CoreEvent;

const MAX_SUBJECT_CHARS: usize = 255;

/// A ticket after a mutation, with the automation runs it triggered
#[derive(Debug, Clone)]
pub struct TicketOutcome {
    pub ticket: Ticket,
    /// One report per dispatched trigger, in dispatch order
    pub reports: Vec<AutomationReport>,
}

impl TicketOutcome {
    fn unchanged(ticket: Ticket) -> Self {
        Self {
            ticket,
            reports: Vec::new(),
        }
    }
}

/// The help desk engine
pub struct HelpDesk {
    policy: Policy,
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
}

impl HelpDesk {
    /// Create a new engine
    pub fn new(policy: Policy, store: Arc<dyn Store>, notifier: Arc<dyn Notifier>) -> Self {
        info!(
            rule_count = policy.rules.len(),
            sla_policy_count = policy.sla_policies.len(),
            "Help desk initialized"
        );

        let _ = store.append_audit(AuditEvent::new(AuditEventType::PolicyLoaded {
            rule_count: policy.rules.len(),
            sla_policy_count: policy.sla_policies.len(),
        }));

        Self {
            policy,
            store,
            notifier,
        }
    }

    /// Engine whose notifications go to the store outbox
    pub fn with_outbox(policy: Policy, store: Arc<dyn Store>) -> Self {
        let notifier = Arc::new(OutboxNotifier::new(store.clone()));
        Self::new(policy, store, notifier)
    }

    /// Get current policy
    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Reload policy. Existing tickets keep the due dates they were created with.
    pub fn reload_policy(&mut self, policy: Policy) -> CoreEvent {
        let rule_count = policy.rules.len();
        let sla_policy_count = policy.sla_policies.len();
        self.policy = policy;

        let _ = self.store.append_audit(AuditEvent::new(AuditEventType::PolicyLoaded {
            rule_count,
            sla_policy_count,
        }));

        info!(rule_count, sla_policy_count, "Policy reloaded");

        CoreEvent::PolicyReloaded {
            rule_count,
            sla_policy_count,
        }
    }

    /// Open a new ticket and dispatch `ticket_created`
    pub fn create_ticket(&self, new: NewTicket, now: DateTime<Local>) -> Result<TicketOutcome> {
        self.validate_new_ticket(&new)?;

        let sla = self
            .policy
            .resolve_sla_policy(new.sla_policy.as_ref(), new.category.as_ref())
            .ok_or_else(|| DeskError::config("no SLA policy configured"))?;
        let (response_due_at, resolution_due_at) = due_dates(&self.policy.calendar, sla, now);

        let assignee = new.assignee.or_else(|| {
            new.category
                .as_ref()
                .and_then(|c| self.policy.get_category(c))
                .and_then(|c| c.default_assignee.clone())
        });

        let mut ticket = Ticket {
            id: TicketId::new(0),
            subject: new.subject.trim().to_string(),
            description: new.description,
            status: TicketStatus::Open,
            priority: new.priority,
            category: new.category,
            assignee,
            requester: new.requester,
            source: new.source,
            tags: Vec::new(),
            sla_policy: sla.id.clone(),
            response_due_at,
            resolution_due_at,
            first_response_at: None,
            resolved_at: None,
            closed_at: None,
            escalation_level: 0,
            reopen_count: 0,
            breach_notified: false,
            created_at: now,
            updated_at: now,
        };
        for tag in &new.tags {
            ticket.add_tag(tag);
        }

        ticket.id = self.store.insert_ticket(&ticket)?;

        info!(
            ticket_id = %ticket.id,
            sla_policy = %ticket.sla_policy,
            resolution_due_at = %ticket.resolution_due_at,
            "Ticket created"
        );
        let _ = self.store.append_audit(AuditEvent::new(AuditEventType::TicketCreated {
            ticket_id: ticket.id,
            sla_policy: ticket.sla_policy.clone(),
            resolution_due_at: ticket.resolution_due_at,
        }));

        let reports = self.dispatch(&mut ticket, &[TriggerEvent::TicketCreated], now)?;
        Ok(TicketOutcome { ticket, reports })
    }

    fn validate_new_ticket(&self, new: &NewTicket) -> Result<()> {
        let mut errors = Vec::new();

        let subject = new.subject.trim();
        if subject.is_empty() {
            errors.push(FieldError::new("subject", "must not be empty"));
        } else if subject.chars().count() > MAX_SUBJECT_CHARS {
            errors.push(FieldError::new(
                "subject",
                format!("must be at most {} characters", MAX_SUBJECT_CHARS),
            ));
        }
        if let Some(category) = &new.category {
            if self.policy.get_category(category).is_none() {
                errors.push(FieldError::new("category", format!("unknown category '{}'", category)));
            }
        }
        if let Some(agent) = &new.assignee {
            if self.policy.get_agent(agent).is_none() {
                errors.push(FieldError::new("assignee", format!("unknown agent '{}'", agent)));
            }
        }
        if let Some(sla) = &new.sla_policy {
            if self.policy.get_sla_policy(sla).is_none() {
                errors.push(FieldError::new("sla_policy", format!("unknown SLA policy '{}'", sla)));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(DeskError::Validation(errors))
        }
    }

    pub fn get_ticket(&self, id: TicketId) -> Result<Ticket> {
        self.store.get_ticket(id)?.ok_or(DeskError::TicketNotFound(id))
    }

    /// Move a ticket to another status
    pub fn change_status(&self, id: TicketId, status: TicketStatus, now: DateTime<Local>) -> Result<TicketOutcome> {
        let mut ticket = self.get_ticket(id)?;
        let from = ticket.status;
        if from == status {
            return Ok(TicketOutcome::unchanged(ticket));
        }

        lifecycle::transition(&mut ticket, status, now)?;
        self.persist(&mut ticket, now)?;

        info!(ticket_id = %id, from = %from, to = %status, "Ticket status changed");
        let _ = self.store.append_audit(AuditEvent::new(AuditEventType::TicketStatusChanged {
            ticket_id: id,
            from,
            to: status,
        }));

        self.settle(ticket, &[TriggerEvent::StatusChanged], now)
    }

    /// Return a resolved or closed ticket to open
    pub fn reopen(&self, id: TicketId, now: DateTime<Local>) -> Result<TicketOutcome> {
        let mut ticket = self.get_ticket(id)?;
        lifecycle::reopen(&mut ticket)?;
        self.persist(&mut ticket, now)?;

        info!(ticket_id = %id, reopen_count = ticket.reopen_count, "Ticket reopened");
        let _ = self.store.append_audit(AuditEvent::new(AuditEventType::TicketReopened {
            ticket_id: id,
            reopen_count: ticket.reopen_count,
        }));

        self.settle(ticket, &[TriggerEvent::TicketReopened], now)
    }

    pub fn change_priority(&self, id: TicketId, priority: TicketPriority, now: DateTime<Local>) -> Result<TicketOutcome> {
        let mut ticket = self.get_ticket(id)?;
        if ticket.priority == priority {
            return Ok(TicketOutcome::unchanged(ticket));
        }

        debug!(ticket_id = %id, from = %ticket.priority, to = %priority, "Ticket priority changed");
        ticket.priority = priority;
        self.commit(ticket, &[TriggerEvent::PriorityChanged], now)
    }

    /// Assign a ticket to an agent, or unassign it with `None`
    pub fn assign(&self, id: TicketId, agent: Option<AgentId>, now: DateTime<Local>) -> Result<TicketOutcome> {
        if let Some(agent) = &agent {
            if self.policy.get_agent(agent).is_none() {
                return Err(DeskError::UnknownAgent(agent.clone()));
            }
        }

        let mut ticket = self.get_ticket(id)?;
        if ticket.assignee == agent {
            return Ok(TicketOutcome::unchanged(ticket));
        }

        ticket.assignee = agent.clone();
        self.persist(&mut ticket, now)?;

        info!(ticket_id = %id, agent = ?agent, "Ticket assigned");
        let _ = self.store.append_audit(AuditEvent::new(AuditEventType::TicketAssigned {
            ticket_id: id,
            agent,
        }));

        self.settle(ticket, &[TriggerEvent::TicketAssigned], now)
    }

    /// Record an agent reply; the first one counts as the first response
    pub fn record_reply(
        &self,
        id: TicketId,
        author: AgentId,
        body: &str,
        now: DateTime<Local>,
    ) -> Result<TicketOutcome> {
        if self.policy.get_agent(&author).is_none() {
            return Err(DeskError::UnknownAgent(author));
        }
        if body.trim().is_empty() {
            return Err(DeskError::field("body", "must not be empty"));
        }

        let mut ticket = self.get_ticket(id)?;
        ticket.first_response_at.get_or_insert(now);
        ticket.updated_at = now;

        // Reply row and ticket stamp land together or not at all
        let reply = TicketReply {
            id: 0,
            ticket_id: id,
            author,
            body: body.to_string(),
            created_at: now,
        };
        let reply_id = self.store.add_reply(&reply, &ticket)?;

        debug!(ticket_id = %id, reply_id, "Reply recorded");
        self.settle(ticket, &[TriggerEvent::ReplyAdded], now)
    }

    /// SLA standing of a ticket at `now`
    pub fn sla_status(&self, id: TicketId, now: DateTime<Local>) -> Result<SlaReport> {
        let ticket = self.get_ticket(id)?;
        Ok(sla_report(&ticket, self.policy.get_sla_policy(&ticket.sla_policy), now))
    }

    /// Persist a mutated ticket, then dispatch `trigger` followed by `ticket_updated`
    pub(crate) fn commit(
        &self,
        mut ticket: Ticket,
        triggers: &[TriggerEvent],
        now: DateTime<Local>,
    ) -> Result<TicketOutcome> {
        self.persist(&mut ticket, now)?;
        self.settle(ticket, triggers, now)
    }

    fn persist(&self, ticket: &mut Ticket, now: DateTime<Local>) -> Result<()> {
        ticket.updated_at = now;
        self.store.update_ticket(ticket)?;
        Ok(())
    }

    /// Dispatch for an already persisted ticket
    fn settle(&self, mut ticket: Ticket, triggers: &[TriggerEvent], now: DateTime<Local>) -> Result<TicketOutcome> {
        let mut all = triggers.to_vec();
        all.push(TriggerEvent::TicketUpdated);
        let reports = self.dispatch(&mut ticket, &all, now)?;
        Ok(TicketOutcome { ticket, reports })
    }

    /// Run rules for each trigger in turn and persist what they changed
    pub(crate) fn dispatch(
        &self,
        ticket: &mut Ticket,
        triggers: &[TriggerEvent],
        now: DateTime<Local>,
    ) -> Result<Vec<AutomationReport>> {
        let before = ticket.clone();
        let mut reports = Vec::with_capacity(triggers.len());

        for &trigger in triggers {
            let report = run_rules(&self.policy, self.notifier.as_ref(), ticket, trigger, now);
            self.audit_report(&report);
            reports.push(report);
        }

        if *ticket != before {
            ticket.updated_at = now;
            self.store.update_ticket(ticket)?;
        }
        Ok(reports)
    }

    fn audit_report(&self, report: &AutomationReport) {
        for outcome in &report.outcomes {
            let event = match &outcome.error {
                None => AuditEventType::RuleExecuted {
                    run_id: report.run_id.clone(),
                    rule_id: outcome.rule_id.clone(),
                    ticket_id: report.ticket_id,
                    trigger: report.trigger,
                    actions: outcome.executed_actions.clone(),
                },
                Some(error) => AuditEventType::RuleFailed {
                    run_id: report.run_id.clone(),
                    rule_id: outcome.rule_id.clone(),
                    ticket_id: report.ticket_id,
                    trigger: report.trigger,
                    error: error.clone(),
                },
            };
            let _ = self.store.append_audit(AuditEvent::new(event));
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::automation::tests::RecordingNotifier;
    use chrono::{Duration, TimeZone};
    use deskline_api::{Requester, RequesterKind, SlaState};
    use deskline_config::parse_config;
    use deskline_store::SqliteStore;
    use deskline_util::{CategoryId, SlaPolicyId};

    pub(crate) const CONFIG: &str = r#"
        config_version = 1

        [escalation]
        max_level = 2

        [[agents]]
        id = "alice"
        name = "Alice"

        [[agents]]
        id = "bob"
        name = "Bob"

        [[agents]]
        id = "lead"
        name = "Team Lead"

        [[sla_policies]]
        id = "standard"
        name = "Standard"
        response_hours = 4
        resolution_hours = 24
        escalation_hours = 8
        default = true
        escalation_assignees = ["lead"]

        [[sla_policies]]
        id = "premium"
        name = "Premium"
        response_hours = 1
        resolution_hours = 4

        [[categories]]
        id = "billing"
        label = "Billing"
        sla_policy = "premium"
        default_assignee = "bob"

        [[categories]]
        id = "general"
        label = "General"

        [[rules]]
        id = "tag-refunds"
        trigger = "ticket_created"
        conditions = [{ field = "subject", operator = "contains", value = "refund" }]
        actions = [{ type = "add_tag", tag = "refund" }]

        [[rules]]
        id = "urgent-on-reopen"
        trigger = "ticket_reopened"
        conditions = [{ field = "reopen_count", operator = "greater_or_equal", value = 2 }]
        actions = [{ type = "change_priority", priority = "urgent" }]

        [[rules]]
        id = "count-updates"
        trigger = "ticket_updated"
        actions = [{ type = "add_tag", tag = "touched" }]
    "#;

    pub(crate) fn desk() -> HelpDesk {
        desk_with(CONFIG)
    }

    pub(crate) fn desk_with(config: &str) -> HelpDesk {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().unwrap());
        HelpDesk::new(parse_config(config).unwrap(), store, Arc::new(RecordingNotifier::default()))
    }

    pub(crate) fn t0() -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 3, 3, 9, 0, 0).unwrap()
    }

    pub(crate) fn new_ticket(subject: &str) -> NewTicket {
        NewTicket::new(subject, Requester::new(RequesterKind::User, 11))
    }

    #[test]
    fn create_resolves_default_policy_and_runs_rules() {
        let desk = desk();
        let outcome = desk.create_ticket(new_ticket("Refund please"), t0()).unwrap();
        let ticket = outcome.ticket;

        assert!(ticket.id.get() > 0);
        assert_eq!(ticket.sla_policy, SlaPolicyId::new("standard"));
        assert_eq!(ticket.response_due_at, t0() + Duration::hours(4));
        assert_eq!(ticket.resolution_due_at, t0() + Duration::hours(24));
        assert!(ticket.has_tag("refund"));
        assert_eq!(outcome.reports.len(), 1);
        assert_eq!(outcome.reports[0].trigger, TriggerEvent::TicketCreated);

        // Creation dispatches only ticket_created
        assert!(!ticket.has_tag("touched"));
        assert_eq!(desk.get_ticket(ticket.id).unwrap(), ticket);
    }

    #[test]
    fn create_uses_category_policy_and_default_assignee() {
        let desk = desk();
        let mut new = new_ticket("Invoice wrong");
        new.category = Some(CategoryId::new("billing"));
        let ticket = desk.create_ticket(new, t0()).unwrap().ticket;

        assert_eq!(ticket.sla_policy, SlaPolicyId::new("premium"));
        assert_eq!(ticket.assignee, Some(AgentId::new("bob")));
        assert_eq!(ticket.resolution_due_at, t0() + Duration::hours(4));
    }

    #[test]
    fn explicit_policy_wins_over_category() {
        let desk = desk();
        let mut new = new_ticket("Invoice wrong");
        new.category = Some(CategoryId::new("billing"));
        new.sla_policy = Some(SlaPolicyId::new("standard"));
        new.assignee = Some(AgentId::new("alice"));
        let ticket = desk.create_ticket(new, t0()).unwrap().ticket;

        assert_eq!(ticket.sla_policy, SlaPolicyId::new("standard"));
        assert_eq!(ticket.assignee, Some(AgentId::new("alice")));
    }

    #[test]
    fn create_collects_field_errors() {
        let desk = desk();
        let mut new = new_ticket("   ");
        new.category = Some(CategoryId::new("nope"));
        new.assignee = Some(AgentId::new("ghost"));

        let err = desk.create_ticket(new, t0()).unwrap_err();
        let fields: Vec<&str> = err.field_errors().iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["subject", "category", "assignee"]);
        assert!(desk.store().list_tickets(false).unwrap().is_empty());
    }

    #[test]
    fn status_changes_dispatch_specific_then_updated() {
        let desk = desk();
        let id = desk.create_ticket(new_ticket("Broken"), t0()).unwrap().ticket.id;

        let later = t0() + Duration::hours(1);
        let outcome = desk.change_status(id, TicketStatus::InProgress, later).unwrap();
        let triggers: Vec<TriggerEvent> = outcome.reports.iter().map(|r| r.trigger).collect();
        assert_eq!(triggers, vec![TriggerEvent::StatusChanged, TriggerEvent::TicketUpdated]);
        assert_eq!(outcome.ticket.first_response_at, Some(later));
        assert!(outcome.ticket.has_tag("touched"));

        // Same status is a no-op without dispatch
        let again = desk.change_status(id, TicketStatus::InProgress, later).unwrap();
        assert!(again.reports.is_empty());
    }

    #[test]
    fn closed_ticket_only_reopens() {
        let desk = desk();
        let id = desk.create_ticket(new_ticket("Broken"), t0()).unwrap().ticket.id;
        desk.change_status(id, TicketStatus::Closed, t0()).unwrap();

        let err = desk.change_status(id, TicketStatus::Pending, t0()).unwrap_err();
        assert!(matches!(err, DeskError::InvalidTransition(_)));

        desk.reopen(id, t0()).unwrap();
        desk.change_status(id, TicketStatus::Resolved, t0()).unwrap();
        let outcome = desk.reopen(id, t0()).unwrap();

        assert_eq!(outcome.ticket.status, TicketStatus::Open);
        assert_eq!(outcome.ticket.reopen_count, 2);
        assert_eq!(outcome.ticket.resolved_at, None);
        // Second reopen trips the urgent-on-reopen rule
        assert_eq!(outcome.ticket.priority, TicketPriority::Urgent);
        assert_eq!(desk.get_ticket(id).unwrap().priority, TicketPriority::Urgent);

        assert!(matches!(desk.reopen(id, t0()), Err(DeskError::InvalidTransition(_))));
    }

    #[test]
    fn status_changes_are_audited_only_when_stored() {
        let desk = desk();
        let id = desk.create_ticket(new_ticket("Broken"), t0()).unwrap().ticket.id;
        desk.change_status(id, TicketStatus::Closed, t0()).unwrap();
        assert!(desk.change_status(id, TicketStatus::Pending, t0()).is_err());

        let changes: Vec<(TicketStatus, TicketStatus)> = desk
            .store()
            .get_recent_audits(20)
            .unwrap()
            .into_iter()
            .filter_map(|a| match a.event {
                AuditEventType::TicketStatusChanged { from, to, .. } => Some((from, to)),
                _ => None,
            })
            .collect();
        assert_eq!(changes, vec![(TicketStatus::Open, TicketStatus::Closed)]);
        assert_eq!(desk.get_ticket(id).unwrap().status, TicketStatus::Closed);
    }

    #[test]
    fn assign_validates_agent() {
        let desk = desk();
        let id = desk.create_ticket(new_ticket("Broken"), t0()).unwrap().ticket.id;

        let err = desk.assign(id, Some(AgentId::new("ghost")), t0()).unwrap_err();
        assert!(matches!(err, DeskError::UnknownAgent(_)));

        let outcome = desk.assign(id, Some(AgentId::new("alice")), t0()).unwrap();
        assert_eq!(outcome.reports[0].trigger, TriggerEvent::TicketAssigned);
        assert_eq!(desk.get_ticket(id).unwrap().assignee, Some(AgentId::new("alice")));

        let outcome = desk.assign(id, None, t0()).unwrap();
        assert_eq!(outcome.ticket.assignee, None);
    }

    #[test]
    fn reply_stamps_first_response_once() {
        let desk = desk();
        let id = desk.create_ticket(new_ticket("Broken"), t0()).unwrap().ticket.id;

        let first = t0() + Duration::minutes(30);
        desk.record_reply(id, AgentId::new("alice"), "Looking into it", first).unwrap();
        let outcome = desk
            .record_reply(id, AgentId::new("bob"), "Fixed", first + Duration::hours(2))
            .unwrap();

        assert_eq!(outcome.ticket.first_response_at, Some(first));
        assert_eq!(outcome.reports[0].trigger, TriggerEvent::ReplyAdded);
        assert_eq!(desk.store().list_replies(id).unwrap().len(), 2);
        assert_eq!(desk.get_ticket(id).unwrap().first_response_at, Some(first));

        assert!(desk.record_reply(id, AgentId::new("alice"), "  ", first).is_err());
    }

    #[test]
    fn sla_status_reports_targets() {
        let desk = desk();
        let id = desk.create_ticket(new_ticket("Broken"), t0()).unwrap().ticket.id;

        let report = desk.sla_status(id, t0() + Duration::hours(1)).unwrap();
        assert_eq!(report.response, SlaState::OnTrack);

        let report = desk.sla_status(id, t0() + Duration::hours(5)).unwrap();
        assert_eq!(report.response, SlaState::Breached);
        assert_eq!(report.resolution, SlaState::OnTrack);
        assert_eq!(report.resolution_remaining_secs, 19 * 3600);
    }

    #[test]
    fn missing_ticket_is_not_found() {
        let desk = desk();
        let err = desk.change_priority(TicketId::new(99), TicketPriority::High, t0()).unwrap_err();
        assert!(matches!(err, DeskError::TicketNotFound(_)));
    }

    #[test]
    fn rule_failures_are_audited() {
        let desk = desk_with(&format!(
            "{}\n{}",
            CONFIG,
            r#"
            [[rules]]
            id = "notify-assignee"
            trigger = "ticket_created"
            actions = [{ type = "notify", target = "assignee", message = "New ticket" }]
            "#
        ));
        let outcome = desk.create_ticket(new_ticket("Broken"), t0()).unwrap();
        assert_eq!(outcome.reports[0].failures().count(), 1);

        let audits = desk.store().get_recent_audits(20).unwrap();
        assert!(audits
            .iter()
            .any(|a| matches!(a.event, AuditEventType::RuleFailed { ref rule_id, .. } if rule_id.as_str() == "notify-assignee")));
    }
}
