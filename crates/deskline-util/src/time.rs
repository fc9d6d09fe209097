//! Time utilities for deskline
//!
//! Provides wall-clock windows and the business calendar used for SLA
//! deadlines.
//!
//! # Mock Time for Development
//!
//! In debug builds, the `DESKLINE_MOCK_TIME` environment variable can be set
//! to override the system time for all time-sensitive operations. This is useful
//! for exercising SLA deadlines and escalations without waiting for them.
//!
//! Format: `YYYY-MM-DD HH:MM:SS` (e.g., `2025-12-25 14:30:00`)
//!
//! Example:
//! ```bash
//! DESKLINE_MOCK_TIME="2025-12-25 14:30:00" desklined sla-sweep
//! ```

use chrono::{DateTime, Datelike, Days, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::OnceLock;
use std::time::Duration;

/// Environment variable name for mock time (debug builds only)
pub const MOCK_TIME_ENV_VAR: &str = "DESKLINE_MOCK_TIME";

/// Cached mock time offset from the real time when the process started.
/// This allows mock time to advance naturally.
static MOCK_TIME_OFFSET: OnceLock<Option<chrono::Duration>> = OnceLock::new();

#[allow(clippy::disallowed_methods)] // This is the internal implementation that wraps Local::now()
fn get_mock_time_offset() -> Option<chrono::Duration> {
    *MOCK_TIME_OFFSET.get_or_init(|| {
        #[cfg(debug_assertions)]
        {
            if let Ok(mock_time_str) = std::env::var(MOCK_TIME_ENV_VAR) {
                if let Ok(naive_dt) = NaiveDateTime::parse_from_str(&mock_time_str, "%Y-%m-%d %H:%M:%S") {
                    if let Some(mock_dt) = Local.from_local_datetime(&naive_dt).single() {
                        let offset = mock_dt.signed_duration_since(chrono::Local::now());
                        tracing::info!(
                            mock_time = %mock_time_str,
                            offset_secs = offset.num_seconds(),
                            "Mock time enabled"
                        );
                        return Some(offset);
                    }
                    tracing::warn!(
                        mock_time = %mock_time_str,
                        "Failed to convert mock time to local timezone"
                    );
                } else {
                    tracing::warn!(
                        mock_time = %mock_time_str,
                        expected_format = "%Y-%m-%d %H:%M:%S",
                        "Invalid mock time format"
                    );
                }
            }
            None
        }
        #[cfg(not(debug_assertions))]
        {
            None
        }
    })
}

/// Get the current local time, respecting mock time settings in debug builds.
#[allow(clippy::disallowed_methods)] // This is the wrapper that provides mock time support
pub fn now() -> DateTime<Local> {
    let real_now = chrono::Local::now();

    match get_mock_time_offset() {
        Some(offset) => real_now + offset,
        None => real_now,
    }
}

/// Convert whole hours to a Duration
pub fn hours(h: u32) -> Duration {
    Duration::from_secs(u64::from(h) * 3600)
}

/// Wall-clock time of day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WallClock {
    pub hour: u8,
    pub minute: u8,
}

impl WallClock {
    pub fn new(hour: u8, minute: u8) -> Option<Self> {
        if hour < 24 && minute < 60 {
            Some(Self { hour, minute })
        } else {
            None
        }
    }

    pub fn from_naive_time(time: NaiveTime) -> Self {
        Self {
            hour: time.hour() as u8,
            minute: time.minute() as u8,
        }
    }

    /// Returns seconds since midnight
    pub fn as_seconds_from_midnight(&self) -> u32 {
        (self.hour as u32) * 3600 + (self.minute as u32) * 60
    }
}

impl PartialOrd for WallClock {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for WallClock {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.as_seconds_from_midnight()
            .cmp(&other.as_seconds_from_midnight())
    }
}

/// Days of the week mask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DaysOfWeek(u8);

impl DaysOfWeek {
    pub const MONDAY: u8 = 1 << 0;
    pub const TUESDAY: u8 = 1 << 1;
    pub const WEDNESDAY: u8 = 1 << 2;
    pub const THURSDAY: u8 = 1 << 3;
    pub const FRIDAY: u8 = 1 << 4;
    pub const SATURDAY: u8 = 1 << 5;
    pub const SUNDAY: u8 = 1 << 6;

    pub const WEEKDAYS: DaysOfWeek = DaysOfWeek(
        Self::MONDAY | Self::TUESDAY | Self::WEDNESDAY | Self::THURSDAY | Self::FRIDAY,
    );
    pub const WEEKENDS: DaysOfWeek = DaysOfWeek(Self::SATURDAY | Self::SUNDAY);
    pub const ALL_DAYS: DaysOfWeek = DaysOfWeek(0x7F);
    pub const NONE: DaysOfWeek = DaysOfWeek(0);

    pub fn new(mask: u8) -> Self {
        Self(mask & 0x7F)
    }

    pub fn contains(&self, weekday: Weekday) -> bool {
        let bit = match weekday {
            Weekday::Mon => Self::MONDAY,
            Weekday::Tue => Self::TUESDAY,
            Weekday::Wed => Self::WEDNESDAY,
            Weekday::Thu => Self::THURSDAY,
            Weekday::Fri => Self::FRIDAY,
            Weekday::Sat => Self::SATURDAY,
            Weekday::Sun => Self::SUNDAY,
        };
        (self.0 & bit) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for DaysOfWeek {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

/// A recurring weekly window of business time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub days: DaysOfWeek,
    pub start: WallClock,
    pub end: WallClock,
}

impl TimeWindow {
    pub fn new(days: DaysOfWeek, start: WallClock, end: WallClock) -> Self {
        Self { days, start, end }
    }

    /// Check if the given local datetime falls within this window
    pub fn contains(&self, dt: &DateTime<Local>) -> bool {
        if !self.days.contains(dt.weekday()) {
            return false;
        }

        let time = WallClock::from_naive_time(dt.time()).as_seconds_from_midnight();
        self.spans().iter().any(|&(start, end)| time >= start && time < end)
    }

    /// Seconds-from-midnight spans this window covers on a day it applies to.
    ///
    /// An end of 00:00 runs to midnight. Windows that would wrap into the
    /// next day cover nothing; configuration validation rejects them.
    fn spans(&self) -> Vec<(u32, u32)> {
        let start = self.start.as_seconds_from_midnight();
        let end = match self.end.as_seconds_from_midnight() {
            0 => 86_400,
            end => end,
        };

        if start < end {
            vec![(start, end)]
        } else {
            Vec::new()
        }
    }
}

/// Weekly business windows plus holiday dates.
///
/// A calendar with no windows counts every non-holiday instant as
/// business time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BusinessCalendar {
    pub windows: Vec<TimeWindow>,
    pub holidays: BTreeSet<NaiveDate>,
}

impl BusinessCalendar {
    pub fn new(windows: Vec<TimeWindow>, holidays: impl IntoIterator<Item = NaiveDate>) -> Self {
        Self {
            windows,
            holidays: holidays.into_iter().collect(),
        }
    }

    /// Monday to Friday, 09:00 to 17:00, no holidays
    pub fn office_hours() -> Self {
        Self::new(
            vec![TimeWindow::new(
                DaysOfWeek::WEEKDAYS,
                WallClock { hour: 9, minute: 0 },
                WallClock { hour: 17, minute: 0 },
            )],
            [],
        )
    }

    pub fn is_holiday(&self, day: NaiveDate) -> bool {
        self.holidays.contains(&day)
    }

    /// Check if the given instant is business time
    pub fn is_business_time(&self, dt: &DateTime<Local>) -> bool {
        if self.is_holiday(dt.date_naive()) {
            return false;
        }
        self.windows.is_empty() || self.windows.iter().any(|w| w.contains(dt))
    }

    /// Add `budget` worth of business time to `start`.
    ///
    /// Returns None only when no weekday has any business time. Once the
    /// walk is past the start day and the last holiday, whole weeks are
    /// skipped in one step.
    pub fn add_business_duration(
        &self,
        start: DateTime<Local>,
        budget: Duration,
    ) -> Option<DateTime<Local>> {
        if budget.is_zero() {
            return Some(start);
        }

        let weekly = self.weekly_seconds();
        if weekly == 0 {
            return None;
        }

        let mut remaining = chrono::Duration::from_std(budget).ok()?;
        let start_day = start.date_naive();
        let last_holiday = self.holidays.last().copied();
        let mut day = start_day;

        loop {
            if day > start_day && last_holiday.is_none_or(|h| day > h) {
                let weeks = remaining.num_seconds() / weekly - 1;
                if weeks > 0 {
                    day = day.checked_add_days(Days::new(7 * weeks.unsigned_abs()))?;
                    remaining = remaining - chrono::Duration::seconds(weeks * weekly);
                }
            }

            if !self.is_holiday(day) {
                for (seg_start, seg_end) in self.segments_on(day) {
                    let from = seg_start.max(start);
                    if seg_end <= from {
                        continue;
                    }

                    let available = seg_end - from;
                    if remaining <= available {
                        return Some(from + remaining);
                    }
                    remaining = remaining - available;
                }
            }
            day = day.succ_opt()?;
        }
    }

    /// Business seconds in a week without holidays
    fn weekly_seconds(&self) -> i64 {
        [
            Weekday::Mon,
            Weekday::Tue,
            Weekday::Wed,
            Weekday::Thu,
            Weekday::Fri,
            Weekday::Sat,
            Weekday::Sun,
        ]
        .into_iter()
        .flat_map(|weekday| self.spans_on(weekday))
        .map(|(start, end)| i64::from(end - start))
        .sum()
    }

    /// Merged business spans (seconds after midnight) on a weekday, in order
    fn spans_on(&self, weekday: Weekday) -> Vec<(u32, u32)> {
        let mut spans: Vec<(u32, u32)> = if self.windows.is_empty() {
            vec![(0, 86_400)]
        } else {
            self.windows
                .iter()
                .filter(|w| w.days.contains(weekday))
                .flat_map(|w| w.spans())
                .collect()
        };
        spans.sort_unstable();

        let mut merged: Vec<(u32, u32)> = Vec::with_capacity(spans.len());
        for (start, end) in spans {
            match merged.last_mut() {
                Some(last) if start <= last.1 => last.1 = last.1.max(end),
                _ => merged.push((start, end)),
            }
        }
        merged
    }

    /// Business segments on a given day as local instants
    fn segments_on(&self, day: NaiveDate) -> Vec<(DateTime<Local>, DateTime<Local>)> {
        self.spans_on(day.weekday())
            .into_iter()
            .filter_map(|(start, end)| Some((local_at(day, start)?, local_at(day, end)?)))
            .collect()
    }
}

/// Local instant `secs` seconds after midnight of `day` (86400 means next midnight)
fn local_at(day: NaiveDate, secs: u32) -> Option<DateTime<Local>> {
    let naive = day.and_time(NaiveTime::MIN) + chrono::Duration::seconds(i64::from(secs));
    Local.from_local_datetime(&naive).earliest()
}

/// Helper to format durations in human-readable form
pub fn format_duration(d: Duration) -> String {
    let total_secs = d.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}
