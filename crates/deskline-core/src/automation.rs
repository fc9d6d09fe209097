//! Automation rule evaluation
//!
//! Rules listening for a trigger run in priority order against the ticket as
//! left by the rules before them. Actions only touch the in-memory ticket and
//! the notifier; persisting the result and auditing is up to the caller, and
//! nothing here re-dispatches triggers.

use chrono::{DateTime, Local};
use deskline_api::{
    AutomationReport, AutomationRule, Notification, NotifyTarget, RuleAction, RuleOutcome, Ticket, TriggerEvent,
};
use deskline_config::Policy;
use deskline_util::{DeskError, NotificationId, Result, RunId};
use tracing::{debug, warn};

use crate::lifecycle::transition;
use crate::notify::{render_message, Notifier};
use crate::fields::conditions_match;

/// Run every active rule for `trigger` against `ticket`
pub fn run_rules(
    policy: &Policy,
    notifier: &dyn Notifier,
    ticket: &mut Ticket,
    trigger: TriggerEvent,
    now: DateTime<Local>,
) -> AutomationReport {
    let run_id = RunId::new();
    let mut evaluated = 0;
    let mut outcomes = Vec::new();

    for rule in policy.rules_for(trigger) {
        evaluated += 1;
        if !conditions_match(&rule.conditions, ticket, now) {
            continue;
        }

        let outcome = execute_rule(policy, notifier, rule, ticket, now);
        match &outcome.error {
            None => debug!(
                run_id = %run_id,
                rule_id = %rule.id,
                ticket_id = %ticket.id,
                actions = outcome.executed_actions.len(),
                "Rule executed"
            ),
            Some(error) => warn!(
                run_id = %run_id,
                rule_id = %rule.id,
                ticket_id = %ticket.id,
                error = %error,
                "Rule action failed, skipping the rest of the rule"
            ),
        }
        outcomes.push(outcome);

        if rule.stop_processing {
            debug!(rule_id = %rule.id, "Rule stops further processing");
            break;
        }
    }

    AutomationReport {
        run_id,
        ticket_id: ticket.id,
        trigger,
        evaluated,
        outcomes,
    }
}

fn execute_rule(
    policy: &Policy,
    notifier: &dyn Notifier,
    rule: &AutomationRule,
    ticket: &mut Ticket,
    now: DateTime<Local>,
) -> RuleOutcome {
    let mut executed_actions = Vec::new();

    for action in &rule.actions {
        if let Err(e) = apply_action(policy, notifier, action, ticket, now) {
            return RuleOutcome {
                rule_id: rule.id.clone(),
                executed_actions,
                error: Some(format!("{}: {}", action.kind(), e)),
            };
        }
        executed_actions.push(action.kind().to_string());
    }

    RuleOutcome {
        rule_id: rule.id.clone(),
        executed_actions,
        error: None,
    }
}

/// Apply one action to the ticket
pub fn apply_action(
    policy: &Policy,
    notifier: &dyn Notifier,
    action: &RuleAction,
    ticket: &mut Ticket,
    now: DateTime<Local>,
) -> Result<()> {
    match action {
        RuleAction::Assign { agent } => {
            if policy.get_agent(agent).is_none() {
                return Err(DeskError::UnknownAgent(agent.clone()));
            }
            ticket.assignee = Some(agent.clone());
        }
        RuleAction::ChangePriority { priority } => ticket.priority = *priority,
        RuleAction::ChangeStatus { status } => transition(ticket, *status, now)?,
        RuleAction::ChangeCategory { category } => {
            if policy.get_category(category).is_none() {
                return Err(DeskError::UnknownCategory(category.clone()));
            }
            // The SLA policy chosen at creation stays in effect
            ticket.category = Some(category.clone());
        }
        RuleAction::AddTag { tag } => {
            ticket.add_tag(tag);
        }
        RuleAction::RemoveTag { tag } => {
            ticket.remove_tag(tag);
        }
        RuleAction::Notify { target, message } => {
            let recipient = recipient_for(policy, target, ticket)?;
            notifier.send(Notification {
                id: NotificationId::new(0),
                ticket_id: Some(ticket.id),
                target: target.clone(),
                recipient,
                message: render_message(message, ticket),
                created_at: now,
                attempts: 0,
                last_error: None,
                delivered_at: None,
            })?;
        }
    }
    Ok(())
}

fn recipient_for(policy: &Policy, target: &NotifyTarget, ticket: &Ticket) -> Result<Option<String>> {
    match target {
        NotifyTarget::Assignee => match &ticket.assignee {
            Some(agent) => Ok(Some(agent.to_string())),
            None => Err(DeskError::notify(format!("ticket {} has no assignee", ticket.id))),
        },
        NotifyTarget::Requester => Ok(Some(format!(
            "{}:{}",
            ticket.requester.kind, ticket.requester.id
        ))),
        NotifyTarget::Webhook => Ok(None),
        NotifyTarget::Agent(agent) => {
            if policy.get_agent(agent).is_none() {
                return Err(DeskError::UnknownAgent(agent.clone()));
            }
            Ok(Some(agent.to_string()))
        }
    }
}
