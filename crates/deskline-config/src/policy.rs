//! Validated policy structures

use crate::schema::{
    RawAction, RawAgent, RawCategory, RawCondition, RawConfig, RawEscalation, RawLimits, RawRule,
    RawServiceConfig, RawSlaPolicy, RawTimeWindow,
};
use crate::validation::{parse_date, parse_days, parse_time};
use deskline_api::{AutomationRule, Condition, ConditionOperator, NotifyTarget, RuleAction, TriggerEvent};
use deskline_util::{
    default_data_dir, hours, AgentId, BusinessCalendar, CategoryId, DaysOfWeek,
    RuleId, SlaPolicyId, TimeWindow, WallClock,
};
use std::path::PathBuf;
use std::time::Duration;

/// Validated policy ready for use by the core engine
#[derive(Debug, Clone)]
pub struct Policy {
    /// Service configuration
    pub service: ServiceConfig,

    /// Hierarchy bounds
    pub limits: LimitsConfig,

    /// Business windows and holidays for SLA deadlines
    pub calendar: BusinessCalendar,

    pub escalation: EscalationConfig,

    pub agents: Vec<Agent>,

    pub sla_policies: Vec<SlaPolicy>,

    pub categories: Vec<Category>,

    /// Rules ordered by priority, highest first; ties keep file order
    pub rules: Vec<AutomationRule>,
}

impl Policy {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        let calendar = convert_calendar(raw.business_hours.windows, &raw.business_hours.holidays);

        let mut rules: Vec<AutomationRule> = raw.rules.into_iter().filter_map(convert_rule).collect();
        // sort_by_key is stable, so equal priorities stay in declaration order
        rules.sort_by_key(|r| std::cmp::Reverse(r.priority));

        Self {
            service: ServiceConfig::from_raw(raw.service),
            limits: LimitsConfig::from_raw(raw.limits),
            calendar,
            escalation: EscalationConfig::from_raw(raw.escalation),
            agents: raw.agents.into_iter().map(Agent::from_raw).collect(),
            sla_policies: raw.sla_policies.into_iter().map(SlaPolicy::from_raw).collect(),
            categories: raw.categories.into_iter().map(Category::from_raw).collect(),
            rules,
        }
    }

    pub fn get_agent(&self, id: &AgentId) -> Option<&Agent> {
        self.agents.iter().find(|a| &a.id == id)
    }

    pub fn get_sla_policy(&self, id: &SlaPolicyId) -> Option<&SlaPolicy> {
        self.sla_policies.iter().find(|p| &p.id == id)
    }

    pub fn get_category(&self, id: &CategoryId) -> Option<&Category> {
        self.categories.iter().find(|c| &c.id == id)
    }

    /// The policy marked default, else the first one declared
    pub fn default_sla_policy(&self) -> Option<&SlaPolicy> {
        self.sla_policies
            .iter()
            .find(|p| p.is_default)
            .or_else(|| self.sla_policies.first())
    }

    /// Policy for a new ticket: explicit, then the category's, then the default
    pub fn resolve_sla_policy(
        &self,
        explicit: Option<&SlaPolicyId>,
        category: Option<&CategoryId>,
    ) -> Option<&SlaPolicy> {
        if let Some(id) = explicit {
            return self.get_sla_policy(id);
        }
        let from_category = category
            .and_then(|c| self.get_category(c))
            .and_then(|c| c.sla_policy.as_ref())
            .and_then(|id| self.get_sla_policy(id));
        from_category.or_else(|| self.default_sla_policy())
    }

    /// Active rules listening for `trigger`, in evaluation order
    pub fn rules_for(&self, trigger: TriggerEvent) -> impl Iterator<Item = &AutomationRule> {
        self.rules
            .iter()
            .filter(move |r| r.active && r.trigger == trigger)
    }
}

/// Service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub data_dir: PathBuf,
    pub tick_interval: Duration,
    pub webhook_url: Option<String>,
    pub webhook_timeout: Duration,
    pub notification_max_attempts: u32,
}

impl ServiceConfig {
    fn from_raw(raw: RawServiceConfig) -> Self {
        let defaults = Self::default();
        Self {
            data_dir: raw.data_dir.unwrap_or(defaults.data_dir),
            tick_interval: raw
                .tick_interval_seconds
                .map(Duration::from_secs)
                .unwrap_or(defaults.tick_interval),
            webhook_url: raw.webhook_url,
            webhook_timeout: raw
                .webhook_timeout_seconds
                .map(Duration::from_secs)
                .unwrap_or(defaults.webhook_timeout),
            notification_max_attempts: raw
                .notification_max_attempts
                .unwrap_or(defaults.notification_max_attempts),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            tick_interval: Duration::from_secs(60),
            webhook_url: None,
            webhook_timeout: Duration::from_secs(10),
            notification_max_attempts: 5,
        }
    }
}

/// Depth and hop bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitsConfig {
    pub max_menu_depth: usize,
    pub max_folder_depth: usize,
    pub max_page_depth: usize,
    pub max_redirect_hops: usize,
}

impl LimitsConfig {
    fn from_raw(raw: RawLimits) -> Self {
        let defaults = Self::default();
        Self {
            max_menu_depth: raw.max_menu_depth.unwrap_or(defaults.max_menu_depth),
            max_folder_depth: raw.max_folder_depth.unwrap_or(defaults.max_folder_depth),
            max_page_depth: raw.max_page_depth.unwrap_or(defaults.max_page_depth),
            max_redirect_hops: raw.max_redirect_hops.unwrap_or(defaults.max_redirect_hops),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_menu_depth: 10,
            max_folder_depth: 16,
            max_page_depth: 10,
            max_redirect_hops: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscalationConfig {
    pub max_level: u8,
    pub raise_priority: bool,
}

impl EscalationConfig {
    fn from_raw(raw: RawEscalation) -> Self {
        let defaults = Self::default();
        Self {
            max_level: raw.max_level.unwrap_or(defaults.max_level),
            raise_priority: raw.raise_priority.unwrap_or(defaults.raise_priority),
        }
    }
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            max_level: 3,
            raise_priority: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Agent {
    pub id: AgentId,
    pub name: String,
    pub email: Option<String>,
}

impl Agent {
    fn from_raw(raw: RawAgent) -> Self {
        Self {
            id: AgentId::new(raw.id),
            name: raw.name,
            email: raw.email,
        }
    }
}

/// Validated SLA policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlaPolicy {
    pub id: SlaPolicyId,
    pub name: String,
    pub response_time: Duration,
    pub resolution_time: Duration,
    /// Interval between escalation levels; None disables escalation
    pub escalation_time: Option<Duration>,
    pub business_hours_only: bool,
    pub is_default: bool,
    pub at_risk_percent: u8,
    /// Agent to assign on reaching level 1, 2, ...
    pub escalation_assignees: Vec<AgentId>,
}

impl SlaPolicy {
    fn from_raw(raw: RawSlaPolicy) -> Self {
        Self {
            id: SlaPolicyId::new(raw.id),
            name: raw.name,
            response_time: hours(raw.response_hours),
            resolution_time: hours(raw.resolution_hours),
            escalation_time: raw.escalation_hours.map(hours),
            business_hours_only: raw.business_hours_only,
            is_default: raw.default,
            at_risk_percent: raw.at_risk_percent.unwrap_or(20),
            escalation_assignees: raw.escalation_assignees.into_iter().map(AgentId::new).collect(),
        }
    }

    /// Escalation assignee for `level` (1-based)
    pub fn escalation_assignee(&self, level: u8) -> Option<&AgentId> {
        let index = usize::from(level).checked_sub(1)?;
        self.escalation_assignees.get(index)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub id: CategoryId,
    pub label: String,
    pub sla_policy: Option<SlaPolicyId>,
    pub default_assignee: Option<AgentId>,
}

impl Category {
    fn from_raw(raw: RawCategory) -> Self {
        Self {
            id: CategoryId::new(raw.id),
            label: raw.label,
            sla_policy: raw.sla_policy.map(SlaPolicyId::new),
            default_assignee: raw.default_assignee.map(AgentId::new),
        }
    }
}

// Conversion helpers

fn convert_calendar(windows: Vec<RawTimeWindow>, holidays: &[String]) -> BusinessCalendar {
    BusinessCalendar::new(
        windows.into_iter().filter_map(convert_time_window).collect(),
        holidays.iter().filter_map(|h| parse_date(h).ok()),
    )
}

fn convert_time_window(raw: RawTimeWindow) -> Option<TimeWindow> {
    let days_mask = parse_days(&raw.days).ok()?;
    let (start_h, start_m) = parse_time(&raw.start).ok()?;
    let (end_h, end_m) = parse_time(&raw.end).ok()?;

    Some(TimeWindow::new(
        DaysOfWeek::new(days_mask),
        WallClock::new(start_h, start_m)?,
        WallClock::new(end_h, end_m)?,
    ))
}

fn convert_rule(raw: RawRule) -> Option<AutomationRule> {
    let trigger = raw.trigger.parse().ok()?;
    let conditions = raw
        .conditions
        .into_iter()
        .map(convert_condition)
        .collect::<Option<Vec<_>>>()?;
    let actions = raw
        .actions
        .into_iter()
        .map(convert_action)
        .collect::<Option<Vec<_>>>()?;

    Some(AutomationRule {
        name: raw.name.unwrap_or_else(|| raw.id.clone()),
        id: RuleId::new(raw.id),
        trigger,
        priority: raw.priority,
        active: raw.active,
        stop_processing: raw.stop_processing,
        conditions,
        actions,
    })
}

fn convert_condition(raw: RawCondition) -> Option<Condition> {
    let operator: ConditionOperator = raw.operator.parse().ok()?;
    Some(Condition {
        field: raw.field,
        operator,
        value: raw.value,
    })
}

fn convert_action(raw: RawAction) -> Option<RuleAction> {
    let action = match raw {
        RawAction::Assign { agent } => RuleAction::Assign {
            agent: AgentId::new(agent),
        },
        RawAction::ChangePriority { priority } => RuleAction::ChangePriority {
            priority: priority.parse().ok()?,
        },
        RawAction::ChangeStatus { status } => RuleAction::ChangeStatus {
            status: status.parse().ok()?,
        },
        RawAction::ChangeCategory { category } => RuleAction::ChangeCategory {
            category: CategoryId::new(category),
        },
        RawAction::AddTag { tag } => RuleAction::AddTag { tag },
        RawAction::RemoveTag { tag } => RuleAction::RemoveTag { tag },
        RawAction::Notify { target, message } => RuleAction::Notify {
            target: target.parse::<NotifyTarget>().ok()?,
            message,
        },
    };
    Some(action)
}
