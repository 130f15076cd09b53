//! Five-field cron expressions evaluated in UTC.
//!
//! `minute hour day-of-month month day-of-week`, with `*`, lists, ranges,
//! steps, month/day names and the usual `@daily`-style macros. When both
//! day fields are restricted a day matches if either one does.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Timelike, Utc};
use thiserror::Error;

/// Upper bound on the forward search; expressions that cannot fire within it
/// (e.g. `0 0 30 2 *`) are treated as never firing. The longest gap a real
/// expression can have is eight years (Feb 29 across 2100).
pub const SEARCH_HORIZON_DAYS: i64 = 366 * 9;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CronError {
    #[error("cron expression must have 5 fields, found {0}")]
    FieldCount(usize),
    #[error("invalid {field} field `{value}`")]
    InvalidField { field: &'static str, value: String },
    #[error("{field} value {value} is outside {min}..={max}")]
    OutOfRange { field: &'static str, value: u32, min: u32, max: u32 },
    #[error("unknown cron macro `{0}`")]
    UnknownMacro(String),
}

#[derive(Clone, Copy)]
struct FieldRule {
    name: &'static str,
    min: u32,
    max: u32,
    names: &'static [&'static str],
}

const MINUTE: FieldRule = FieldRule { name: "minute", min: 0, max: 59, names: &[] };
const HOUR: FieldRule = FieldRule { name: "hour", min: 0, max: 23, names: &[] };
const DAY_OF_MONTH: FieldRule = FieldRule { name: "day-of-month", min: 1, max: 31, names: &[] };
const MONTH: FieldRule = FieldRule {
    name: "month",
    min: 1,
    max: 12,
    names: &["jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec"],
};
// 7 is accepted as an alias for Sunday and folded onto 0 after parsing.
const DAY_OF_WEEK: FieldRule =
    FieldRule { name: "day-of-week", min: 0, max: 7, names: &["sun", "mon", "tue", "wed", "thu", "fri", "sat"] };

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CronExpression {
    source: String,
    minutes: u64,
    hours: u64,
    days_of_month: u64,
    months: u64,
    days_of_week: u64,
    day_of_month_restricted: bool,
    day_of_week_restricted: bool,
}

impl CronExpression {
    pub fn parse(expression: &str) -> Result<Self, CronError> {
        let trimmed = expression.trim();
        let expanded = if trimmed.starts_with('@') { expand_macro(trimmed)? } else { trimmed };

        let fields: Vec<&str> = expanded.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(CronError::FieldCount(fields.len()));
        }

        let mut days_of_week = parse_field(fields[4], DAY_OF_WEEK)?;
        if days_of_week & (1 << 7) != 0 {
            days_of_week = (days_of_week & !(1 << 7)) | 1;
        }

        Ok(Self {
            source: trimmed.to_string(),
            minutes: parse_field(fields[0], MINUTE)?,
            hours: parse_field(fields[1], HOUR)?,
            days_of_month: parse_field(fields[2], DAY_OF_MONTH)?,
            months: parse_field(fields[3], MONTH)?,
            days_of_week,
            day_of_month_restricted: !fields[2].starts_with('*'),
            day_of_week_restricted: !fields[4].starts_with('*'),
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// First matching minute strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let start = after.with_second(0)?.with_nanosecond(0)? + Duration::minutes(1);
        let horizon = start + Duration::days(SEARCH_HORIZON_DAYS);
        let mut cursor = start;

        while cursor <= horizon {
            if !has_bit(self.months, cursor.month()) {
                cursor = first_of_next_month(cursor)?;
                continue;
            }
            if !self.day_matches(cursor) {
                cursor = start_of_day(cursor.date_naive().succ_opt()?)?;
                continue;
            }
            if !has_bit(self.hours, cursor.hour()) {
                cursor = cursor.with_minute(0)? + Duration::hours(1);
                continue;
            }
            if !has_bit(self.minutes, cursor.minute()) {
                cursor += Duration::minutes(1);
                continue;
            }
            return Some(cursor);
        }

        None
    }

    pub fn matches(&self, instant: DateTime<Utc>) -> bool {
        has_bit(self.months, instant.month())
            && self.day_matches(instant)
            && has_bit(self.hours, instant.hour())
            && has_bit(self.minutes, instant.minute())
    }

    fn day_matches(&self, instant: DateTime<Utc>) -> bool {
        let dom = has_bit(self.days_of_month, instant.day());
        let dow = has_bit(self.days_of_week, instant.weekday().num_days_from_sunday());
        match (self.day_of_month_restricted, self.day_of_week_restricted) {
            (true, true) => dom || dow,
            (true, false) => dom,
            (false, true) => dow,
            (false, false) => true,
        }
    }
}

impl FromStr for CronExpression {
    type Err = CronError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl fmt::Display for CronExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn expand_macro(value: &str) -> Result<&'static str, CronError> {
    match value.to_ascii_lowercase().as_str() {
        "@yearly" | "@annually" => Ok("0 0 1 1 *"),
        "@monthly" => Ok("0 0 1 * *"),
        "@weekly" => Ok("0 0 * * 0"),
        "@daily" | "@midnight" => Ok("0 0 * * *"),
        "@hourly" => Ok("0 * * * *"),
        _ => Err(CronError::UnknownMacro(value.to_string())),
    }
}

fn parse_field(field: &str, rule: FieldRule) -> Result<u64, CronError> {
    let invalid = || CronError::InvalidField { field: rule.name, value: field.to_string() };
    let mut bits = 0u64;

    for part in field.split(',') {
        let (range, step) = match part.split_once('/') {
            Some((range, step)) => {
                let step = step.parse::<u32>().map_err(|_| invalid())?;
                if step == 0 {
                    return Err(invalid());
                }
                (range, Some(step))
            }
            None => (part, None),
        };

        let (low, high) = if range == "*" {
            (rule.min, rule.max)
        } else if let Some((low, high)) = range.split_once('-') {
            (parse_value(low, rule)?, parse_value(high, rule)?)
        } else {
            let value = parse_value(range, rule)?;
            // `5/15` means "from 5 to the end of the range every 15".
            (value, if step.is_some() { rule.max } else { value })
        };

        if low > high {
            return Err(invalid());
        }

        let step = step.unwrap_or(1) as usize;
        for value in (low..=high).step_by(step) {
            bits |= 1 << value;
        }
    }

    if bits == 0 {
        return Err(invalid());
    }
    Ok(bits)
}

fn parse_value(token: &str, rule: FieldRule) -> Result<u32, CronError> {
    let lowered = token.trim().to_ascii_lowercase();
    let value = match rule.names.iter().position(|name| *name == lowered) {
        // Month names start at 1, weekday names at 0.
        Some(index) => index as u32 + rule.min,
        None => lowered
            .parse::<u32>()
            .map_err(|_| CronError::InvalidField { field: rule.name, value: token.to_string() })?,
    };

    if value < rule.min || value > rule.max {
        return Err(CronError::OutOfRange { field: rule.name, value, min: rule.min, max: rule.max });
    }
    Ok(value)
}

fn has_bit(bits: u64, value: u32) -> bool {
    bits & (1 << value) != 0
}

fn start_of_day(date: NaiveDate) -> Option<DateTime<Utc>> {
    Utc.from_local_datetime(&date.and_hms_opt(0, 0, 0)?).single()
}

fn first_of_next_month(instant: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let (year, month) =
        if instant.month() == 12 { (instant.year() + 1, 1) } else { (instant.year(), instant.month() + 1) };
    start_of_day(NaiveDate::from_ymd_opt(year, month, 1)?)
}
