//! Configuration validation

use crate::schema::{RawAction, RawCondition, RawConfig, RawDays, RawRule, RawSlaPolicy, RawTimeWindow};
use chrono::NaiveDate;
use deskline_api::{ConditionOperator, NotifyTarget, TicketPriority, TicketStatus, TriggerEvent, TICKET_FIELDS};
use std::collections::HashSet;
use thiserror::Error;

/// Upper bound on any SLA budget (ten years)
pub const MAX_BUDGET_HOURS: u32 = 87_600;

/// Validation error
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("Duplicate {kind} ID: {id}")]
    DuplicateId { kind: &'static str, id: String },

    #[error("SLA policy '{policy_id}': {message}")]
    SlaPolicyError { policy_id: String, message: String },

    #[error("Category '{category_id}': {message}")]
    CategoryError { category_id: String, message: String },

    #[error("Rule '{rule_id}': {message}")]
    RuleError { rule_id: String, message: String },

    #[error("Invalid time format '{value}': {message}")]
    InvalidTimeFormat { value: String, message: String },

    #[error("Invalid day specification: {0}")]
    InvalidDaySpec(String),

    #[error("Invalid holiday '{value}': expected YYYY-MM-DD")]
    InvalidHoliday { value: String },

    #[error("Global config error: {0}")]
    GlobalError(String),
}

/// Validate a raw configuration
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    check_duplicates("agent", config.agents.iter().map(|a| a.id.as_str()), &mut errors);
    check_duplicates("SLA policy", config.sla_policies.iter().map(|p| p.id.as_str()), &mut errors);
    check_duplicates("category", config.categories.iter().map(|c| c.id.as_str()), &mut errors);
    check_duplicates("rule", config.rules.iter().map(|r| r.id.as_str()), &mut errors);

    let agents: HashSet<&str> = config.agents.iter().map(|a| a.id.as_str()).collect();
    let policies: HashSet<&str> = config.sla_policies.iter().map(|p| p.id.as_str()).collect();
    let categories: HashSet<&str> = config.categories.iter().map(|c| c.id.as_str()).collect();

    errors.extend(validate_service(config));

    // Every ticket needs a policy to fall back on
    if config.sla_policies.is_empty() {
        errors.push(ValidationError::GlobalError(
            "at least one SLA policy is required".into(),
        ));
    }
    let defaults = config.sla_policies.iter().filter(|p| p.default).count();
    if defaults > 1 {
        errors.push(ValidationError::GlobalError(format!(
            "{} SLA policies are marked default, at most one allowed",
            defaults
        )));
    }

    for policy in &config.sla_policies {
        errors.extend(validate_sla_policy(policy, &agents));
    }

    for window in &config.business_hours.windows {
        errors.extend(validate_time_window(window));
    }
    for holiday in &config.business_hours.holidays {
        if parse_date(holiday).is_err() {
            errors.push(ValidationError::InvalidHoliday {
                value: holiday.clone(),
            });
        }
    }

    for category in &config.categories {
        if let Some(policy) = &category.sla_policy {
            if !policies.contains(policy.as_str()) {
                errors.push(ValidationError::CategoryError {
                    category_id: category.id.clone(),
                    message: format!("unknown SLA policy '{}'", policy),
                });
            }
        }
        if let Some(agent) = &category.default_assignee {
            if !agents.contains(agent.as_str()) {
                errors.push(ValidationError::CategoryError {
                    category_id: category.id.clone(),
                    message: format!("unknown default assignee '{}'", agent),
                });
            }
        }
    }

    for rule in &config.rules {
        errors.extend(validate_rule(rule, &agents, &categories));
    }

    errors
}

fn check_duplicates<'a>(
    kind: &'static str,
    ids: impl Iterator<Item = &'a str>,
    errors: &mut Vec<ValidationError>,
) {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            errors.push(ValidationError::DuplicateId {
                kind,
                id: id.to_string(),
            });
        }
    }
}

fn validate_service(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if config.service.tick_interval_seconds == Some(0) {
        errors.push(ValidationError::GlobalError(
            "service.tick_interval_seconds must be greater than 0".into(),
        ));
    }
    if config.service.notification_max_attempts == Some(0) {
        errors.push(ValidationError::GlobalError(
            "service.notification_max_attempts must be greater than 0".into(),
        ));
    }
    if let Some(url) = &config.service.webhook_url {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            errors.push(ValidationError::GlobalError(format!(
                "service.webhook_url must be an http(s) URL, got '{}'",
                url
            )));
        }
    }

    let limits = [
        ("max_menu_depth", config.limits.max_menu_depth),
        ("max_folder_depth", config.limits.max_folder_depth),
        ("max_page_depth", config.limits.max_page_depth),
        ("max_redirect_hops", config.limits.max_redirect_hops),
    ];
    for (name, value) in limits {
        if value == Some(0) {
            errors.push(ValidationError::GlobalError(format!(
                "limits.{} must be greater than 0",
                name
            )));
        }
    }

    errors
}

fn validate_sla_policy(policy: &RawSlaPolicy, agents: &HashSet<&str>) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let mut fail = |message: String| {
        errors.push(ValidationError::SlaPolicyError {
            policy_id: policy.id.clone(),
            message,
        })
    };

    if policy.resolution_hours == 0 {
        fail("resolution_hours must be greater than 0".into());
    }
    if policy.response_hours > policy.resolution_hours {
        fail(format!(
            "response_hours ({}) exceeds resolution_hours ({})",
            policy.response_hours, policy.resolution_hours
        ));
    }
    if policy.escalation_hours == Some(0) {
        fail("escalation_hours must be greater than 0".into());
    }
    let budgets = [
        ("response_hours", Some(policy.response_hours)),
        ("resolution_hours", Some(policy.resolution_hours)),
        ("escalation_hours", policy.escalation_hours),
    ];
    for (name, value) in budgets {
        if value.is_some_and(|h| h > MAX_BUDGET_HOURS) {
            fail(format!("{} must be at most {}", name, MAX_BUDGET_HOURS));
        }
    }
    if let Some(percent) = policy.at_risk_percent {
        if percent > 100 {
            fail(format!("at_risk_percent must be 0-100, got {}", percent));
        }
    }
    for agent in &policy.escalation_assignees {
        if !agents.contains(agent.as_str()) {
            fail(format!("unknown escalation assignee '{}'", agent));
        }
    }

    errors
}

fn validate_time_window(window: &RawTimeWindow) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if let Err(e) = parse_days(&window.days) {
        errors.push(ValidationError::InvalidDaySpec(e));
    }

    let start = parse_time(&window.start);
    if let Err(e) = &start {
        errors.push(ValidationError::InvalidTimeFormat {
            value: window.start.clone(),
            message: e.clone(),
        });
    }

    let end = parse_time(&window.end);
    if let Err(e) = &end {
        errors.push(ValidationError::InvalidTimeFormat {
            value: window.end.clone(),
            message: e.clone(),
        });
    }

    // 00:00 as the end means midnight
    if let (Ok(start), Ok(end)) = (start, end) {
        if start == end {
            errors.push(ValidationError::InvalidTimeFormat {
                value: format!("{}-{}", window.start, window.end),
                message: "window start and end must differ".into(),
            });
        } else if start > end && end != (0, 0) {
            errors.push(ValidationError::InvalidTimeFormat {
                value: format!("{}-{}", window.start, window.end),
                message: "window must end on the day it starts (use 00:00 for midnight)".into(),
            });
        }
    }

    errors
}

fn validate_rule(
    rule: &RawRule,
    agents: &HashSet<&str>,
    categories: &HashSet<&str>,
) -> Vec<ValidationError> {
    let mut messages = Vec::new();

    if rule.trigger.parse::<TriggerEvent>().is_err() {
        messages.push(format!("unknown trigger '{}'", rule.trigger));
    }

    if rule.actions.is_empty() {
        messages.push("rule has no actions".to_string());
    }

    for (index, condition) in rule.conditions.iter().enumerate() {
        if let Err(message) = validate_condition(condition) {
            messages.push(format!("condition {}: {}", index + 1, message));
        }
    }

    for (index, action) in rule.actions.iter().enumerate() {
        if let Err(message) = validate_action(action, agents, categories) {
            messages.push(format!("action {}: {}", index + 1, message));
        }
    }

    messages
        .into_iter()
        .map(|message| ValidationError::RuleError {
            rule_id: rule.id.clone(),
            message,
        })
        .collect()
}

fn validate_condition(condition: &RawCondition) -> Result<(), String> {
    if !TICKET_FIELDS.contains(&condition.field.as_str()) {
        return Err(format!("unknown field '{}'", condition.field));
    }

    let operator: ConditionOperator = condition
        .operator
        .parse()
        .map_err(|_| format!("unknown operator '{}'", condition.operator))?;

    let value = &condition.value;
    if operator.is_unary() {
        return Ok(());
    }
    if value.is_null() {
        return Err(format!("operator '{}' needs a value", operator));
    }
    if operator.expects_list() && !value.is_array() {
        return Err(format!("operator '{}' needs a list value", operator));
    }
    if operator.is_ordering() {
        let comparable = value.is_number()
            || (condition.field == "priority"
                && value.as_str().is_some_and(|s| s.parse::<TicketPriority>().is_ok()));
        if !comparable {
            return Err(format!(
                "operator '{}' needs a number (or a priority for the priority field)",
                operator
            ));
        }
    }

    // Enumerated fields must name real values
    let candidates: Vec<&serde_json::Value> = match value {
        serde_json::Value::Array(items) => items.iter().collect(),
        other => vec![other],
    };
    for candidate in candidates {
        let Some(text) = candidate.as_str() else {
            continue;
        };
        let known = match condition.field.as_str() {
            "status" => text.parse::<TicketStatus>().is_ok(),
            "priority" => text.parse::<TicketPriority>().is_ok(),
            _ => true,
        };
        if !known {
            return Err(format!("'{}' is not a valid {}", text, condition.field));
        }
    }

    Ok(())
}

fn validate_action(
    action: &RawAction,
    agents: &HashSet<&str>,
    categories: &HashSet<&str>,
) -> Result<(), String> {
    match action {
        RawAction::Assign { agent } => {
            if !agents.contains(agent.as_str()) {
                return Err(format!("unknown agent '{}'", agent));
            }
        }
        RawAction::ChangePriority { priority } => {
            priority.parse::<TicketPriority>().map_err(|e| e.to_string())?;
        }
        RawAction::ChangeStatus { status } => {
            status.parse::<TicketStatus>().map_err(|e| e.to_string())?;
        }
        RawAction::ChangeCategory { category } => {
            if !categories.contains(category.as_str()) {
                return Err(format!("unknown category '{}'", category));
            }
        }
        RawAction::AddTag { tag } | RawAction::RemoveTag { tag } => {
            if tag.trim().is_empty() {
                return Err("tag cannot be empty".into());
            }
        }
        RawAction::Notify { target, message } => {
            let target: NotifyTarget = target.parse().map_err(|e: deskline_api::ParseEnumError| e.to_string())?;
            if let NotifyTarget::Agent(agent) = &target {
                if !agents.contains(agent.as_str()) {
                    return Err(format!("unknown agent '{}'", agent));
                }
            }
            if message.trim().is_empty() {
                return Err("notify message cannot be empty".into());
            }
        }
    }
    Ok(())
}

/// Parse HH:MM time format
pub fn parse_time(s: &str) -> Result<(u8, u8), String> {
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() != 2 {
        return Err("Expected HH:MM format".into());
    }

    let hour: u8 = parts[0]
        .parse()
        .map_err(|_| "Invalid hour".to_string())?;
    let minute: u8 = parts[1]
        .parse()
        .map_err(|_| "Invalid minute".to_string())?;

    if hour >= 24 {
        return Err("Hour must be 0-23".into());
    }
    if minute >= 60 {
        return Err("Minute must be 0-59".into());
    }

    Ok((hour, minute))
}

/// Parse days specification
pub fn parse_days(days: &RawDays) -> Result<u8, String> {
    match days {
        RawDays::Preset(preset) => match preset.to_lowercase().as_str() {
            "all" | "every" | "daily" => Ok(0x7F),
            "weekdays" => Ok(0x1F), // Mon-Fri
            "weekends" => Ok(0x60), // Sat-Sun
            other => Err(format!("Unknown day preset: {}", other)),
        },
        RawDays::List(list) => {
            let mut mask = 0u8;
            for day in list {
                let bit = match day.to_lowercase().as_str() {
                    "mon" | "monday" => 1 << 0,
                    "tue" | "tuesday" => 1 << 1,
                    "wed" | "wednesday" => 1 << 2,
                    "thu" | "thursday" => 1 << 3,
                    "fri" | "friday" => 1 << 4,
                    "sat" | "saturday" => 1 << 5,
                    "sun" | "sunday" => 1 << 6,
                    other => return Err(format!("Unknown day: {}", other)),
                };
                mask |= bit;
            }
            Ok(mask)
        }
    }
}

/// Parse a YYYY-MM-DD date
pub fn parse_date(s: &str) -> Result<NaiveDate, chrono::ParseError> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
}
