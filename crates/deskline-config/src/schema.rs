//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    /// Service settings
    #[serde(default)]
    pub service: RawServiceConfig,

    /// Depth and hop bounds for content hierarchies
    #[serde(default)]
    pub limits: RawLimits,

    /// Weekly business windows and holidays
    #[serde(default)]
    pub business_hours: RawBusinessHours,

    #[serde(default)]
    pub escalation: RawEscalation,

    #[serde(default)]
    pub agents: Vec<RawAgent>,

    #[serde(default)]
    pub sla_policies: Vec<RawSlaPolicy>,

    #[serde(default)]
    pub categories: Vec<RawCategory>,

    /// Automation rules
    #[serde(default)]
    pub rules: Vec<RawRule>,
}

/// Service-level settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawServiceConfig {
    /// Data directory for the store
    pub data_dir: Option<PathBuf>,

    /// Seconds between SLA sweeps
    pub tick_interval_seconds: Option<u64>,

    /// Notifications are POSTed here when set
    pub webhook_url: Option<String>,

    pub webhook_timeout_seconds: Option<u64>,

    /// Delivery attempts before a notification is abandoned
    pub notification_max_attempts: Option<u32>,
}

/// Hierarchy bounds
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawLimits {
    pub max_menu_depth: Option<usize>,
    pub max_folder_depth: Option<usize>,
    pub max_page_depth: Option<usize>,
    pub max_redirect_hops: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawBusinessHours {
    #[serde(default)]
    pub windows: Vec<RawTimeWindow>,

    /// Dates in YYYY-MM-DD format
    #[serde(default)]
    pub holidays: Vec<String>,
}

/// Time window
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawTimeWindow {
    /// Days of week: "weekdays", "weekends", "all", or list like ["mon", "tue", "wed"]
    pub days: RawDays,

    /// Start time (HH:MM format)
    pub start: String,

    /// End time (HH:MM format)
    pub end: String,
}

/// Days specification
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum RawDays {
    Preset(String),
    List(Vec<String>),
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawEscalation {
    /// Highest escalation level a ticket can reach
    pub max_level: Option<u8>,

    /// Raise priority one step per escalation
    pub raise_priority: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawAgent {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawSlaPolicy {
    pub id: String,
    pub name: String,
    pub response_hours: u32,
    pub resolution_hours: u32,
    pub escalation_hours: Option<u32>,

    /// Only count business hours towards the budgets
    #[serde(default)]
    pub business_hours_only: bool,

    /// Policy for tickets with no category policy
    #[serde(default)]
    pub default: bool,

    /// Remaining share of the budget at which a ticket counts as at risk
    pub at_risk_percent: Option<u8>,

    /// Agent to assign at escalation level 1, 2, ...
    #[serde(default)]
    pub escalation_assignees: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawCategory {
    pub id: String,
    pub label: String,
    pub sla_policy: Option<String>,
    pub default_assignee: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawRule {
    pub id: String,
    pub name: Option<String>,
    pub trigger: String,

    #[serde(default)]
    pub priority: i32,

    #[serde(default = "default_true")]
    pub active: bool,

    #[serde(default)]
    pub stop_processing: bool,

    #[serde(default)]
    pub conditions: Vec<RawCondition>,

    #[serde(default)]
    pub actions: Vec<RawAction>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawCondition {
    pub field: String,
    pub operator: String,
    #[serde(default)]
    pub value: serde_json::Value,
}

/// Raw rule action
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RawAction {
    Assign { agent: String },
    ChangePriority { priority: String },
    ChangeStatus { status: String },
    ChangeCategory { category: String },
    AddTag { tag: String },
    RemoveTag { tag: String },
    Notify { target: String, message: String },
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_sla_policies() {
        let toml_str = r#"
            config_version = 1

            [[sla_policies]]
            id = "standard"
            name = "Standard"
            response_hours = 4
            resolution_hours = 24
            escalation_hours = 8
            business_hours_only = true
            default = true
        "#;

        let config: RawConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.sla_policies.len(), 1);
        assert_eq!(config.sla_policies[0].escalation_hours, Some(8));
        assert!(config.sla_policies[0].default);
    }

    #[test]
    fn parse_business_hours() {
        let toml_str = r#"
            config_version = 1

            [business_hours]
            holidays = ["2025-12-25"]

            [[business_hours.windows]]
            days = "weekdays"
            start = "09:00"
            end = "17:00"

            [[business_hours.windows]]
            days = ["sat"]
            start = "10:00"
            end = "14:00"
        "#;

        let config: RawConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.business_hours.windows.len(), 2);
        assert_eq!(config.business_hours.holidays, vec!["2025-12-25"]);
    }

    #[test]
    fn parse_rule_with_conditions_and_actions() {
        let toml_str = r#"
            config_version = 1

            [[rules]]
            id = "urgent-billing"
            trigger = "ticket_created"
            priority = 10
            conditions = [
                { field = "priority", operator = "equals", value = "urgent" },
                { field = "tags", operator = "in", value = ["vip", "enterprise"] },
                { field = "assignee", operator = "is_empty" },
            ]
            actions = [
                { type = "assign", agent = "alice" },
                { type = "notify", target = "assignee", message = "Urgent ticket {ticket_id}" },
            ]
        "#;

        let config: RawConfig = toml::from_str(toml_str).unwrap();
        let rule = &config.rules[0];
        assert!(rule.active);
        assert_eq!(rule.conditions.len(), 3);
        assert!(rule.conditions[1].value.is_array());
        assert!(rule.conditions[2].value.is_null());
        assert!(matches!(rule.actions[0], RawAction::Assign { .. }));
    }
}
