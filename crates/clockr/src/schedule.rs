//! Work-day slots for batch logging.

use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Weekday};
use thiserror::Error;

use crate::model::DaySlot;

/// Upper bound on work days in one batch.
pub const MAX_BATCH_DAYS: usize = 10;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("invalid {field} {value:?} (expected HH:MM)")]
    InvalidTime { field: &'static str, value: String },

    #[error("cannot parse date {0:?} (use YYYY-MM-DD, today, yesterday or a weekday name)")]
    InvalidDate(String),

    #[error("work_end {end} must be after work_start {start}")]
    EmptyWorkday { start: String, end: String },

    #[error("--to date must be on or after --from date")]
    ReversedRange,

    #[error("no work days in the range {from} to {to} (check work_days config)")]
    NoWorkDays { from: NaiveDate, to: NaiveDate },

    #[error("batch limited to {max} work days, got {count} (narrow the date range)")]
    TooManyDays { count: usize, max: usize },
}

/// Daily work hours and ISO work days (Monday = 1 .. Sunday = 7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkSchedule {
    pub work_start: NaiveTime,
    pub work_end: NaiveTime,
    pub work_days: Vec<u32>,
}

impl WorkSchedule {
    /// Parse `HH:MM` bounds as found in the config file.
    pub fn parse(work_start: &str, work_end: &str, work_days: &[u32]) -> Result<Self, ScheduleError> {
        let start = parse_clock("work_start", work_start)?;
        let end = parse_clock("work_end", work_end)?;
        if end <= start {
            return Err(ScheduleError::EmptyWorkday {
                start: work_start.to_string(),
                end: work_end.to_string(),
            });
        }
        Ok(Self {
            work_start: start,
            work_end: end,
            work_days: work_days.to_vec(),
        })
    }

    pub fn minutes_per_day(&self) -> u32 {
        (self.work_end - self.work_start).num_minutes().max(0) as u32
    }

    pub fn is_work_day(&self, date: NaiveDate) -> bool {
        self.work_days
            .contains(&date.weekday().number_from_monday())
    }

    /// One slot per work day in `from..=to`.
    pub fn day_slots(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<DaySlot>, ScheduleError> {
        if to < from {
            return Err(ScheduleError::ReversedRange);
        }
        let minutes = self.minutes_per_day();
        let slots: Vec<DaySlot> = from
            .iter_days()
            .take_while(|d| *d <= to)
            .filter(|d| self.is_work_day(*d))
            .map(|date| DaySlot {
                date,
                weekday: weekday_name(date.weekday()).to_string(),
                work_start: self.work_start,
                work_end: self.work_end,
                total_minutes: minutes,
                calendar_events: Vec::new(),
                commit_context: Vec::new(),
            })
            .collect();

        if slots.is_empty() {
            return Err(ScheduleError::NoWorkDays { from, to });
        }
        if slots.len() > MAX_BATCH_DAYS {
            return Err(ScheduleError::TooManyDays {
                count: slots.len(),
                max: MAX_BATCH_DAYS,
            });
        }
        Ok(slots)
    }
}

/// Parse a `HH:MM` wall-clock value.
pub fn parse_clock(field: &'static str, value: &str) -> Result<NaiveTime, ScheduleError> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M").map_err(|_| ScheduleError::InvalidTime {
        field,
        value: value.to_string(),
    })
}

/// Parse `YYYY-MM-DD`, `today`, `yesterday`, or a weekday name.
///
/// A weekday name (optionally prefixed with "last") means its most recent
/// occurrence strictly before `today`.
pub fn parse_date(input: &str, today: NaiveDate) -> Result<NaiveDate, ScheduleError> {
    let text = input.trim().to_lowercase();
    if let Ok(date) = NaiveDate::parse_from_str(&text, "%Y-%m-%d") {
        return Ok(date);
    }
    match text.as_str() {
        "today" => return Ok(today),
        "yesterday" => return Ok(today - Duration::days(1)),
        _ => {}
    }

    let name = text.strip_prefix("last ").unwrap_or(&text);
    let weekday: Weekday = name
        .parse()
        .map_err(|_| ScheduleError::InvalidDate(input.to_string()))?;
    let mut date = today - Duration::days(1);
    while date.weekday() != weekday {
        date -= Duration::days(1);
    }
    Ok(date)
}

/// "Batch: 2025-03-03 to 2025-03-07 (5 days, 2400 min total)"
pub fn batch_label(days: &[DaySlot]) -> String {
    let (Some(first), Some(last)) = (days.first(), days.last()) else {
        return "Batch: no work days".to_string();
    };
    let total: u32 = days.iter().map(|d| d.total_minutes).sum();
    format!(
        "Batch: {} to {} ({} days, {} min total)",
        first.date_string(),
        last.date_string(),
        days.len(),
        total
    )
}

pub fn weekday_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}
