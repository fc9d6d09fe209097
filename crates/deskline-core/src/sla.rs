//! SLA due dates and status
//!
//! Budgets are added either as plain wall-clock time or, for policies marked
//! `business_hours_only`, by walking the business calendar. Due dates are
//! computed once when the ticket is created.

use chrono::{DateTime, Local};
use deskline_api::{SlaReport, SlaState, Ticket};
use deskline_config::SlaPolicy;
use deskline_util::{format_duration, BusinessCalendar};
use std::time::Duration;
use tracing::warn;

/// Default at-risk threshold when a ticket's policy is no longer configured
const FALLBACK_AT_RISK_PERCENT: u8 = 20;

fn to_chrono(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or(chrono::Duration::MAX)
}

/// Add `budget` to `start`, counting only business time when asked to.
///
/// Falls back to wall-clock arithmetic when no weekday of the calendar has
/// any business time.
pub fn add_budget(
    calendar: &BusinessCalendar,
    business_hours_only: bool,
    start: DateTime<Local>,
    budget: Duration,
) -> DateTime<Local> {
    if business_hours_only {
        if let Some(due) = calendar.add_business_duration(start, budget) {
            return due;
        }
        warn!(
            start = %start,
            budget = %format_duration(budget),
            "Business calendar has no usable time, using wall-clock due date"
        );
    }
    start + to_chrono(budget)
}

/// Response and resolution due dates for a ticket created at `created_at`
pub fn due_dates(
    calendar: &BusinessCalendar,
    sla: &SlaPolicy,
    created_at: DateTime<Local>,
) -> (DateTime<Local>, DateTime<Local>) {
    let response = add_budget(calendar, sla.business_hours_only, created_at, sla.response_time);
    let resolution = add_budget(calendar, sla.business_hours_only, created_at, sla.resolution_time);
    (response, resolution)
}

/// When escalation `level` (1-based) becomes due, if the policy escalates at all
pub fn escalation_due(
    calendar: &BusinessCalendar,
    sla: &SlaPolicy,
    created_at: DateTime<Local>,
    level: u8,
) -> Option<DateTime<Local>> {
    let interval = sla.escalation_time?;
    if level == 0 {
        return None;
    }
    let budget = interval.checked_mul(u32::from(level))?;
    Some(add_budget(calendar, sla.business_hours_only, created_at, budget))
}

/// Standing of one SLA target.
///
/// `done_at` is when the target was satisfied (first response, resolution).
pub fn target_state(
    start: DateTime<Local>,
    due: DateTime<Local>,
    done_at: Option<DateTime<Local>>,
    now: DateTime<Local>,
    at_risk_percent: u8,
) -> SlaState {
    if let Some(done) = done_at {
        return if done <= due { SlaState::Met } else { SlaState::Breached };
    }
    if now > due {
        return SlaState::Breached;
    }

    let total = (due - start).num_seconds();
    let remaining = (due - now).num_seconds();
    if total <= 0 || remaining * 100 <= total * i64::from(at_risk_percent) {
        SlaState::AtRisk
    } else {
        SlaState::OnTrack
    }
}

/// SLA standing of a ticket at `now`
pub fn sla_report(ticket: &Ticket, sla: Option<&SlaPolicy>, now: DateTime<Local>) -> SlaReport {
    let at_risk_percent = sla.map_or(FALLBACK_AT_RISK_PERCENT, |s| s.at_risk_percent);
    let resolved_at = ticket.resolved_at.or(ticket.closed_at);

    SlaReport {
        ticket_id: ticket.id,
        policy: ticket.sla_policy.clone(),
        response: target_state(
            ticket.created_at,
            ticket.response_due_at,
            ticket.first_response_at,
            now,
            at_risk_percent,
        ),
        resolution: target_state(
            ticket.created_at,
            ticket.resolution_due_at,
            resolved_at,
            now,
            at_risk_percent,
        ),
        response_due_at: ticket.response_due_at,
        resolution_due_at: ticket.resolution_due_at,
        resolution_remaining_secs: (ticket.resolution_due_at - now).num_seconds(),
    }
}

/// Resolution due date has passed and the ticket is still open
pub fn is_breached(ticket: &Ticket, now: DateTime<Local>) -> bool {
    ticket.is_open() && now > ticket.resolution_due_at
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};
    use deskline_config::MAX_BUDGET_HOURS;
    use deskline_util::{hours, SlaPolicyId};

    fn policy(response: u32, resolution: u32, business_hours_only: bool) -> SlaPolicy {
        SlaPolicy {
            id: SlaPolicyId::new("standard"),
            name: "Standard".into(),
            response_time: hours(response),
            resolution_time: hours(resolution),
            escalation_time: Some(hours(2)),
            business_hours_only,
            is_default: true,
            at_risk_percent: 20,
            escalation_assignees: vec![],
        }
    }

    fn at(d: u32, h: u32, m: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 12, d, h, m, 0).unwrap()
    }

    #[test]
    fn wall_clock_due_dates() {
        let calendar = BusinessCalendar::office_hours();
        let (response, resolution) = due_dates(&calendar, &policy(4, 24, false), at(26, 16, 0));
        assert_eq!(response, at(26, 20, 0));
        assert_eq!(resolution, at(27, 16, 0));
    }

    #[test]
    fn business_hours_skip_evenings_and_weekends() {
        let calendar = BusinessCalendar::office_hours();
        // Friday 2025-12-26 16:00, 4 business hours: 1h Friday + 3h Monday
        let (response, resolution) = due_dates(&calendar, &policy(4, 8, true), at(26, 16, 0));
        assert_eq!(response, at(29, 12, 0));
        // 8h: 1h Friday + 7h Monday
        assert_eq!(resolution, at(29, 16, 0));
    }

    #[test]
    fn business_hours_skip_holidays() {
        let mut calendar = BusinessCalendar::office_hours();
        calendar.holidays.insert(NaiveDate::from_ymd_opt(2025, 12, 29).unwrap());
        let (response, _) = due_dates(&calendar, &policy(4, 8, true), at(26, 16, 0));
        assert_eq!(response, at(30, 12, 0));
    }

    #[test]
    fn calendar_without_time_falls_back_to_wall_clock() {
        // A window that applies to no day leaves no business time at all
        let calendar = BusinessCalendar::new(
            vec![deskline_util::TimeWindow::new(
                deskline_util::DaysOfWeek::NONE,
                deskline_util::WallClock::new(9, 0).unwrap(),
                deskline_util::WallClock::new(17, 0).unwrap(),
            )],
            [],
        );
        let due = add_budget(&calendar, true, at(26, 9, 0), hours(3));
        assert_eq!(due, at(26, 12, 0));
    }

    #[test]
    fn zero_budget_returns_start() {
        let calendar = BusinessCalendar::office_hours();
        let start = at(27, 3, 0);
        assert_eq!(add_budget(&calendar, true, start, Duration::ZERO), start);
    }

    #[test]
    fn due_date_monotonic_in_budget() {
        let calendar = BusinessCalendar::office_hours();
        let start = at(24, 13, 30);

        // Short budgets hour by hour, then the whole configurable range
        let budgets = (0..60).chain((60..=MAX_BUDGET_HOURS).step_by(97)).chain([MAX_BUDGET_HOURS]);
        for business in [false, true] {
            let mut previous = start;
            for h in budgets.clone() {
                let due = add_budget(&calendar, business, start, hours(h));
                assert!(due >= previous, "{}h went backwards (business: {})", h, business);
                previous = due;
            }
        }
    }

    #[test]
    fn long_business_budgets_stay_on_the_calendar() {
        let calendar = BusinessCalendar::office_hours();
        let start = Local.with_ymd_and_hms(2025, 12, 1, 9, 0, 0).unwrap();

        // Around ten years of office hours, where a day-by-day search would run out
        let mut previous = start;
        for h in (19_000..=22_000).step_by(7) {
            let due = add_budget(&calendar, true, start, hours(h));
            assert!(due >= previous, "{}h due {} is before {}", h, due, previous);
            assert!(calendar.is_business_time(&(due - chrono::Duration::minutes(1))));
            previous = due;
        }

        let shorter = add_budget(&calendar, true, start, hours(20_000));
        let longer = add_budget(&calendar, true, start, hours(21_000));
        assert!(longer > shorter);
        // 1000 business hours are 25 working weeks
        assert_eq!(longer.date_naive() - shorter.date_naive(), chrono::Duration::weeks(25));
    }

    #[test]
    fn escalation_levels_are_multiples() {
        let calendar = BusinessCalendar::default();
        let sla = policy(1, 8, false);
        let start = at(26, 8, 0);
        assert_eq!(escalation_due(&calendar, &sla, start, 0), None);
        assert_eq!(escalation_due(&calendar, &sla, start, 1), Some(at(26, 10, 0)));
        assert_eq!(escalation_due(&calendar, &sla, start, 3), Some(at(26, 14, 0)));

        let mut no_escalation = sla.clone();
        no_escalation.escalation_time = None;
        assert_eq!(escalation_due(&calendar, &no_escalation, start, 1), None);
    }

    #[test]
    fn target_states() {
        let start = at(26, 8, 0);
        let due = at(26, 18, 0);

        assert_eq!(target_state(start, due, None, at(26, 9, 0), 20), SlaState::OnTrack);
        // 2h of 10h remaining is exactly the 20% threshold
        assert_eq!(target_state(start, due, None, at(26, 16, 0), 20), SlaState::AtRisk);
        assert_eq!(target_state(start, due, None, at(26, 18, 1), 20), SlaState::Breached);
        assert_eq!(target_state(start, due, Some(at(26, 17, 0)), at(27, 9, 0), 20), SlaState::Met);
        assert_eq!(target_state(start, due, Some(at(26, 19, 0)), at(27, 9, 0), 20), SlaState::Breached);
    }
}
