//! Lightweight cron expression evaluator for automation schedules.
//! Supports: "MIN HOUR DOM MON DOW" (5-field, no seconds)
//! Syntax per field: *, */N, N, A-B, A-B/N, and comma lists of those.
//! Example: "0 8 * * 1-5" = weekdays at 8:00 UTC
//!
//! When both day-of-month and day-of-week are restricted, a day matches if
//! either does (classic cron semantics).

use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use scout_core::{Result, ScoutError};

/// One parsed field.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Field {
    values: Vec<u32>,
    /// Written as a bare `*`.
    wildcard: bool,
}

impl Field {
    fn matches(&self, value: u32) -> bool {
        self.values.binary_search(&value).is_ok()
    }
}

/// A parsed 5-field cron schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    minutes: Field,
    hours: Field,
    days_of_month: Field,
    months: Field,
    days_of_week: Field,
}

impl CronSchedule {
    pub fn parse(expression: &str) -> Result<Self> {
        let parts: Vec<&str> = expression.split_whitespace().collect();
        if parts.len() != 5 {
            return Err(ScoutError::Cron(format!(
                "'{expression}' needs 5 fields: MIN HOUR DOM MON DOW"
            )));
        }

        let mut days_of_week = parse_field(parts[4], 0, 7)?;
        // 7 is an alias for Sunday.
        if days_of_week.matches(7) {
            days_of_week.values.retain(|d| *d != 7);
            if !days_of_week.matches(0) {
                days_of_week.values.insert(0, 0);
            }
        }

        Ok(Self {
            minutes: parse_field(parts[0], 0, 59)?,
            hours: parse_field(parts[1], 0, 23)?,
            days_of_month: parse_field(parts[2], 1, 31)?,
            months: parse_field(parts[3], 1, 12)?,
            days_of_week,
        })
    }

    fn day_matches(&self, t: &DateTime<Utc>) -> bool {
        if !self.months.matches(t.month()) {
            return false;
        }
        let dom = self.days_of_month.matches(t.day());
        let dow = self.days_of_week.matches(t.weekday().num_days_from_sunday());
        match (self.days_of_month.wildcard, self.days_of_week.wildcard) {
            (false, false) => dom || dow,
            _ => dom && dow,
        }
    }

    /// Next matching minute strictly after `after`, searching up to a year ahead.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let start = after.with_second(0)?.with_nanosecond(0)? + Duration::minutes(1);
        let horizon = start + Duration::days(366);
        let mut candidate = start;

        while candidate <= horizon {
            if !self.day_matches(&candidate) {
                let next_day = candidate.date_naive().succ_opt()?.and_hms_opt(0, 0, 0)?;
                candidate = next_day.and_utc();
                continue;
            }
            if !self.hours.matches(candidate.hour()) {
                candidate = candidate.with_minute(0)? + Duration::hours(1);
                continue;
            }
            if !self.minutes.matches(candidate.minute()) {
                candidate += Duration::minutes(1);
                continue;
            }
            return Some(candidate);
        }
        None
    }
}

/// Parse an expression and compute the next run time after `after`.
pub fn next_run_from_cron(expression: &str, after: DateTime<Utc>) -> Result<DateTime<Utc>> {
    CronSchedule::parse(expression)?
        .next_after(after)
        .ok_or_else(|| ScoutError::Cron(format!("'{expression}' never fires within a year")))
}

/// Parse a cron field into the sorted list of matching values.
fn parse_field(field: &str, min: u32, max: u32) -> Result<Field> {
    let invalid = || ScoutError::Cron(format!("invalid field '{field}' (range {min}-{max})"));
    let mut values = Vec::new();

    for part in field.split(',') {
        let (range, step) = match part.split_once('/') {
            Some((range, step)) => {
                let step: u32 = step.trim().parse().map_err(|_| invalid())?;
                if step == 0 {
                    return Err(invalid());
                }
                (range.trim(), step)
            }
            None => (part.trim(), 1),
        };

        let (lo, hi) = if range == "*" {
            (min, max)
        } else if let Some((a, b)) = range.split_once('-') {
            let a: u32 = a.trim().parse().map_err(|_| invalid())?;
            let b: u32 = b.trim().parse().map_err(|_| invalid())?;
            (a, b)
        } else {
            let n: u32 = range.parse().map_err(|_| invalid())?;
            // "N/step" runs from N to the end of the range.
            if part.contains('/') { (n, max) } else { (n, n) }
        };

        if lo < min || hi > max || lo > hi {
            return Err(invalid());
        }
        values.extend((lo..=hi).step_by(step as usize));
    }

    values.sort_unstable();
    values.dedup();
    Ok(Field {
        values,
        wildcard: field == "*",
    })
}
