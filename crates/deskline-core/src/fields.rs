//! Ticket field lookup and condition evaluation

use chrono::{DateTime, Local};
use deskline_api::{Condition, ConditionOperator, Ticket, TicketPriority};
use serde_json::Value;
use tracing::warn;

/// A ticket field as seen by a condition
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Number(f64),
    Priority(TicketPriority),
    List(Vec<String>),
    /// Optional field with no value
    Missing,
}

/// Look up `field` on `ticket`; None for names that are not ticket fields
pub fn field_value(ticket: &Ticket, field: &str, now: DateTime<Local>) -> Option<FieldValue> {
    let text = |s: &str| FieldValue::Text(s.to_string());
    let optional = |s: Option<&str>| s.map(text).unwrap_or(FieldValue::Missing);

    let value = match field {
        "status" => text(ticket.status.as_str()),
        "priority" => FieldValue::Priority(ticket.priority),
        "category" => optional(ticket.category.as_ref().map(|c| c.as_str())),
        "assignee" => optional(ticket.assignee.as_ref().map(|a| a.as_str())),
        "subject" => text(&ticket.subject),
        "description" => text(&ticket.description),
        "source" => text(ticket.source.as_str()),
        "tags" => FieldValue::List(ticket.tags.clone()),
        "requester_type" => text(ticket.requester.kind.as_str()),
        "sla_policy" => text(ticket.sla_policy.as_str()),
        "escalation_level" => FieldValue::Number(f64::from(ticket.escalation_level)),
        "reopen_count" => FieldValue::Number(f64::from(ticket.reopen_count)),
        "hours_open" => {
            let secs = (now - ticket.created_at).num_seconds().max(0);
            FieldValue::Number(secs as f64 / 3600.0)
        }
        _ => return None,
    };
    Some(value)
}

/// Whether every condition holds; an empty list always holds
pub fn conditions_match(conditions: &[Condition], ticket: &Ticket, now: DateTime<Local>) -> bool {
    conditions.iter().all(|c| condition_matches(c, ticket, now))
}

/// Evaluate a single condition against the ticket
pub fn condition_matches(condition: &Condition, ticket: &Ticket, now: DateTime<Local>) -> bool {
    let Some(field) = field_value(ticket, &condition.field, now) else {
        warn!(field = %condition.field, "Condition names an unknown ticket field");
        return false;
    };
    let value = &condition.value;

    use ConditionOperator as Op;
    match condition.operator {
        Op::IsEmpty => is_empty(&field),
        Op::IsNotEmpty => !is_empty(&field),
        Op::Equals => equals(&field, value),
        Op::NotEquals => !equals(&field, value),
        Op::Contains => text_test(&field, value, |f, v| f.contains(v), true),
        Op::NotContains => !text_test(&field, value, |f, v| f.contains(v), true),
        Op::StartsWith => text_test(&field, value, |f, v| f.starts_with(v), false),
        Op::EndsWith => text_test(&field, value, |f, v| f.ends_with(v), false),
        Op::GreaterThan => compare(&field, value).is_some_and(|o| o.is_gt()),
        Op::LessThan => compare(&field, value).is_some_and(|o| o.is_lt()),
        Op::GreaterOrEqual => compare(&field, value).is_some_and(|o| o.is_ge()),
        Op::LessOrEqual => compare(&field, value).is_some_and(|o| o.is_le()),
        Op::In => in_list(&field, value),
        Op::NotIn => !in_list(&field, value),
    }
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.to_lowercase()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn is_empty(field: &FieldValue) -> bool {
    match field {
        FieldValue::Missing => true,
        FieldValue::Text(s) => s.trim().is_empty(),
        FieldValue::List(items) => items.is_empty(),
        FieldValue::Number(_) | FieldValue::Priority(_) => false,
    }
}

fn equals(field: &FieldValue, value: &Value) -> bool {
    match field {
        FieldValue::Missing => value.is_null(),
        FieldValue::Text(s) => value_text(value).is_some_and(|v| s.to_lowercase() == v),
        FieldValue::List(items) => {
            value_text(value).is_some_and(|v| items.iter().any(|i| i.to_lowercase() == v))
        }
        FieldValue::Number(n) => value.as_f64().is_some_and(|v| *n == v),
        FieldValue::Priority(p) => priority_of(value).is_some_and(|v| *p == v),
    }
}

/// Case-insensitive text test; list fields pass when any element does.
/// `element_equality` makes list elements compare by equality instead.
fn text_test(field: &FieldValue, value: &Value, test: fn(&str, &str) -> bool, element_equality: bool) -> bool {
    let Some(needle) = value_text(value) else {
        return false;
    };
    match field {
        FieldValue::Text(s) => test(&s.to_lowercase(), &needle),
        FieldValue::List(items) => items.iter().any(|item| {
            let item = item.to_lowercase();
            if element_equality {
                item == needle
            } else {
                test(&item, &needle)
            }
        }),
        _ => false,
    }
}

fn priority_of(value: &Value) -> Option<TicketPriority> {
    match value {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => {
            let rank = n.as_u64()?;
            TicketPriority::ALL.iter().copied().find(|p| u64::from(p.rank()) == rank)
        }
        _ => None,
    }
}

fn compare(field: &FieldValue, value: &Value) -> Option<std::cmp::Ordering> {
    match field {
        FieldValue::Number(n) => n.partial_cmp(&value.as_f64()?),
        FieldValue::Priority(p) => Some(p.rank().cmp(&priority_of(value)?.rank())),
        _ => None,
    }
}

fn in_list(field: &FieldValue, value: &Value) -> bool {
    let Some(candidates) = value.as_array() else {
        return false;
    };
    match field {
        FieldValue::List(items) => items
            .iter()
            .any(|item| candidates.iter().any(|c| equals(&FieldValue::Text(item.clone()), c))),
        other => candidates.iter().any(|c| equals(other, c)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use deskline_api::{Requester, RequesterKind, TicketSource, TicketStatus};
    use deskline_util::{AgentId, SlaPolicyId, TicketId};
    use serde_json::json;

    fn ticket() -> Ticket {
        let created = deskline_util::now() - Duration::hours(5);
        Ticket {
            id: TicketId::new(1),
            subject: "Refund for invoice 42".into(),
            description: "I was charged twice".into(),
            status: TicketStatus::Open,
            priority: TicketPriority::High,
            category: None,
            assignee: Some(AgentId::new("alice")),
            requester: Requester::new(RequesterKind::Client, 3),
            source: TicketSource::Email,
            tags: vec!["billing".into(), "vip".into()],
            sla_policy: SlaPolicyId::new("standard"),
            response_due_at: created + Duration::hours(4),
            resolution_due_at: created + Duration::hours(24),
            first_response_at: None,
            resolved_at: None,
            closed_at: None,
            escalation_level: 1,
            reopen_count: 0,
            breach_notified: false,
            created_at: created,
            updated_at: created,
        }
    }

    fn check(field: &str, operator: ConditionOperator, value: Value) -> bool {
        condition_matches(&Condition::new(field, operator, value), &ticket(), deskline_util::now())
    }

    #[test]
    fn text_operators_ignore_case() {
        use ConditionOperator::*;
        assert!(check("subject", Contains, json!("REFUND")));
        assert!(check("subject", StartsWith, json!("refund")));
        assert!(check("subject", EndsWith, json!("42")));
        assert!(!check("subject", NotContains, json!("invoice")));
        assert!(check("status", Equals, json!("Open")));
        assert!(check("source", NotEquals, json!("portal")));
    }

    #[test]
    fn priority_compares_by_rank() {
        use ConditionOperator::*;
        assert!(check("priority", GreaterThan, json!("medium")));
        assert!(check("priority", GreaterOrEqual, json!("high")));
        assert!(!check("priority", GreaterThan, json!("high")));
        assert!(check("priority", LessThan, json!("urgent")));
        assert!(check("priority", Equals, json!(2)));
    }

    #[test]
    fn list_fields_match_any_element() {
        use ConditionOperator::*;
        assert!(check("tags", Contains, json!("vip")));
        assert!(!check("tags", Contains, json!("vi")));
        assert!(check("tags", Equals, json!("billing")));
        assert!(check("tags", StartsWith, json!("bil")));
        assert!(check("tags", In, json!(["enterprise", "VIP"])));
        assert!(check("tags", NotIn, json!(["enterprise"])));
    }

    #[test]
    fn empty_checks_and_missing_fields() {
        use ConditionOperator::*;
        assert!(check("category", IsEmpty, Value::Null));
        assert!(check("assignee", IsNotEmpty, Value::Null));
        assert!(!check("category", Equals, json!("billing")));
        assert!(check("category", NotEquals, json!("billing")));
        assert!(!check("mood", Equals, json!("angry")));
    }

    #[test]
    fn numeric_fields() {
        use ConditionOperator::*;
        assert!(check("hours_open", GreaterOrEqual, json!(4.5)));
        assert!(check("hours_open", LessThan, json!(6)));
        assert!(check("escalation_level", Equals, json!(1)));
        assert!(check("reopen_count", In, json!([0, 1])));
        assert!(!check("subject", GreaterThan, json!(1)));
    }

    #[test]
    fn empty_condition_list_matches() {
        assert!(conditions_match(&[], &ticket(), deskline_util::now()));
    }
}
