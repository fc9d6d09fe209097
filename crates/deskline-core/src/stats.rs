//! Ticket statistics

use chrono::{DateTime, Local};
use deskline_api::{Ticket, TicketPriority, TicketStats, TicketStatus};
use deskline_store::TicketStore;
use deskline_util::Result;

use crate::sla::is_breached;
use crate::HelpDesk;

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

fn minutes_between(from: DateTime<Local>, to: DateTime<Local>) -> f64 {
    (to - from).num_seconds() as f64 / 60.0
}

/// Aggregate figures over `tickets` at `now`.
///
/// Every status and priority appears in the maps, with zero counts where
/// nothing matches.
pub fn compute_stats(tickets: &[Ticket], now: DateTime<Local>) -> TicketStats {
    let mut stats = TicketStats {
        total: tickets.len(),
        ..Default::default()
    };
    for status in TicketStatus::ALL {
        stats.by_status.insert(status.as_str().to_string(), 0);
    }
    for priority in TicketPriority::ALL {
        stats.by_priority.insert(priority.as_str().to_string(), 0);
    }

    let mut response_minutes = Vec::new();
    let mut resolution_minutes = Vec::new();

    for ticket in tickets {
        *stats.by_status.entry(ticket.status.as_str().to_string()).or_default() += 1;
        *stats.by_priority.entry(ticket.priority.as_str().to_string()).or_default() += 1;

        if is_breached(ticket, now) {
            stats.open_breached += 1;
        }
        if let Some(responded) = ticket.first_response_at {
            response_minutes.push(minutes_between(ticket.created_at, responded));
        }
        if let Some(resolved) = ticket.resolved_at.or(ticket.closed_at) {
            stats.resolved_total += 1;
            if resolved <= ticket.resolution_due_at {
                stats.resolved_within_sla += 1;
            }
            resolution_minutes.push(minutes_between(ticket.created_at, resolved));
        }
    }

    if stats.resolved_total > 0 {
        stats.compliance_rate = Some(stats.resolved_within_sla as f64 / stats.resolved_total as f64);
    }
    stats.avg_first_response_minutes = mean(&response_minutes);
    stats.avg_resolution_minutes = mean(&resolution_minutes);
    stats
}

impl HelpDesk {
    /// Statistics over every stored ticket
    pub fn stats(&self, now: DateTime<Local>) -> Result<TicketStats> {
        let tickets = self.store().list_tickets(false)?;
        Ok(compute_stats(&tickets, now))
    }
}
