//! Cron expressions with second precision
//!
//! Six space-separated fields:
//!
//! ```text
//! ┌──────── second (0-59)
//! │ ┌────── minute (0-59)
//! │ │ ┌──── hour (0-23)
//! │ │ │ ┌── day of month (1-31)
//! │ │ │ │ ┌ month (1-12 or JAN-DEC)
//! │ │ │ │ │ ┌ day of week (0-6 or SUN-SAT, 7 is also Sunday)
//! 0 0 2 * * 0,3
//! ```
//!
//! Each field accepts `*`, `?`, `N`, `N-M`, `*/S`, `N-M/S`, `N/S` and comma
//! lists of those. When both day fields are restricted a day matches if
//! either matches. Descriptors `@yearly`, `@annually`, `@monthly`, `@weekly`,
//! `@daily`, `@midnight`, `@hourly` and `@every <duration>` are also
//! accepted.

use crate::duration::parse_duration;
use crate::error::{Error, Result};
use chrono::{
    DateTime, Datelike, Duration as ChronoDuration, NaiveDate, NaiveDateTime, TimeZone, Timelike,
};
use std::fmt;
use std::time::Duration;

/// Years searched ahead before giving up on an expression that never fires
const SEARCH_YEARS: i32 = 5;

const MONTH_NAMES: [&str; 12] = [
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];
const DAY_NAMES: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

/// A parsed cron schedule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    expression: String,
    kind: Kind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Kind {
    Fields(Fields),
    Every(Duration),
}

/// Bit sets of allowed values per field
#[derive(Debug, Clone, PartialEq, Eq)]
struct Fields {
    seconds: u64,
    minutes: u64,
    hours: u64,
    days_of_month: u64,
    months: u64,
    days_of_week: u64,
    dom_restricted: bool,
    dow_restricted: bool,
}

struct FieldSpec {
    name: &'static str,
    min: u32,
    max: u32,
    names: &'static [&'static str],
    names_offset: u32,
}

const SECOND: FieldSpec = FieldSpec {
    name: "second",
    min: 0,
    max: 59,
    names: &[],
    names_offset: 0,
};
const MINUTE: FieldSpec = FieldSpec {
    name: "minute",
    min: 0,
    max: 59,
    names: &[],
    names_offset: 0,
};
const HOUR: FieldSpec = FieldSpec {
    name: "hour",
    min: 0,
    max: 23,
    names: &[],
    names_offset: 0,
};
const DAY_OF_MONTH: FieldSpec = FieldSpec {
    name: "day of month",
    min: 1,
    max: 31,
    names: &[],
    names_offset: 0,
};
const MONTH: FieldSpec = FieldSpec {
    name: "month",
    min: 1,
    max: 12,
    names: &MONTH_NAMES,
    names_offset: 1,
};
const DAY_OF_WEEK: FieldSpec = FieldSpec {
    name: "day of week",
    min: 0,
    max: 7,
    names: &DAY_NAMES,
    names_offset: 0,
};

impl CronSchedule {
    /// Parse a cron expression
    ///
    /// Errors are [`Error::Setup`]: a bad expression prevents the scheduler
    /// from starting.
    pub fn parse(expression: &str) -> Result<Self> {
        let expr = expression.trim();
        let kind = match expr {
            "@yearly" | "@annually" => Kind::Fields(parse_fields("0 0 0 1 1 *")?),
            "@monthly" => Kind::Fields(parse_fields("0 0 0 1 * *")?),
            "@weekly" => Kind::Fields(parse_fields("0 0 0 * * 0")?),
            "@daily" | "@midnight" => Kind::Fields(parse_fields("0 0 0 * * *")?),
            "@hourly" => Kind::Fields(parse_fields("0 0 * * * *")?),
            _ => match expr.strip_prefix("@every") {
                Some(rest) => {
                    let every = parse_duration(rest.trim())
                        .map_err(|e| Error::setup(format!("invalid @every in '{expr}': {e}")))?;
                    if every < Duration::from_secs(1) {
                        return Err(Error::setup(format!(
                            "@every interval must be at least 1s: '{expr}'"
                        )));
                    }
                    Kind::Every(every)
                }
                None if expr.starts_with('@') => {
                    return Err(Error::setup(format!("unknown cron descriptor '{expr}'")));
                }
                None => Kind::Fields(parse_fields(expr)?),
            },
        };

        Ok(Self {
            expression: expr.to_string(),
            kind,
        })
    }

    /// The expression as written
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// First fire time strictly after `after`, in the same time zone
    ///
    /// Returns `None` if the expression never fires within the next few
    /// years (for example `0 0 0 30 2 *`).
    pub fn next_after<Tz: TimeZone>(&self, after: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        match &self.kind {
            Kind::Every(every) => {
                let step = ChronoDuration::from_std(*every).ok()?;
                after.clone().checked_add_signed(step)
            }
            Kind::Fields(fields) => fields.next_after(after),
        }
    }
}

impl fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}

fn parse_fields(expr: &str) -> Result<Fields> {
    let parts: Vec<&str> = expr.split_whitespace().collect();
    if parts.len() != 6 {
        return Err(Error::setup(format!(
            "cron expression '{expr}' must have 6 fields (sec min hour dom month dow), found {}",
            parts.len()
        )));
    }

    let (days_of_month, dom_restricted) = parse_field(parts[3], &DAY_OF_MONTH)?;
    let (mut days_of_week, dow_restricted) = parse_field(parts[5], &DAY_OF_WEEK)?;
    // 7 is an alias for Sunday
    if days_of_week & (1 << 7) != 0 {
        days_of_week = (days_of_week & !(1 << 7)) | 1;
    }

    Ok(Fields {
        seconds: parse_field(parts[0], &SECOND)?.0,
        minutes: parse_field(parts[1], &MINUTE)?.0,
        hours: parse_field(parts[2], &HOUR)?.0,
        days_of_month,
        months: parse_field(parts[4], &MONTH)?.0,
        days_of_week,
        dom_restricted,
        dow_restricted,
    })
}

/// Parse one field into a bit set; the flag is false for a bare `*` or `?`
fn parse_field(field: &str, spec: &FieldSpec) -> Result<(u64, bool)> {
    if field == "*" || field == "?" {
        return Ok((range_bits(spec.min, spec.max, 1), false));
    }

    let mut bits = 0u64;
    for part in field.split(',') {
        bits |= parse_part(part, spec)?;
    }
    Ok((bits, true))
}

fn parse_part(part: &str, spec: &FieldSpec) -> Result<u64> {
    let invalid = |why: &str| {
        Error::setup(format!("invalid {} field '{}': {}", spec.name, part, why))
    };

    let (range, step) = match part.split_once('/') {
        Some((range, step)) => {
            let step: u32 = step.parse().map_err(|_| invalid("step is not a number"))?;
            if step == 0 {
                return Err(invalid("step must be positive"));
            }
            (range, Some(step))
        }
        None => (part, None),
    };

    let (start, end) = if range == "*" || range == "?" {
        (spec.min, spec.max)
    } else if let Some((lo, hi)) = range.split_once('-') {
        (parse_value(lo, spec)?, parse_value(hi, spec)?)
    } else {
        let value = parse_value(range, spec)?;
        // `N/S` runs from N to the end of the field
        (value, if step.is_some() { spec.max } else { value })
    };

    if start < spec.min || end > spec.max {
        return Err(invalid(&format!(
            "values must be within {}-{}",
            spec.min, spec.max
        )));
    }
    if start > end {
        return Err(invalid("range start is after range end"));
    }

    Ok(range_bits(start, end, step.unwrap_or(1)))
}

fn parse_value(token: &str, spec: &FieldSpec) -> Result<u32> {
    if let Some(index) = spec
        .names
        .iter()
        .position(|name| name.eq_ignore_ascii_case(token))
    {
        return Ok(index as u32 + spec.names_offset);
    }
    token.parse().map_err(|_| {
        Error::setup(format!("invalid {} value '{}'", spec.name, token))
    })
}

fn range_bits(start: u32, end: u32, step: u32) -> u64 {
    (start..=end)
        .step_by(step as usize)
        .fold(0u64, |bits, v| bits | (1 << v))
}

fn has(bits: u64, value: u32) -> bool {
    bits & (1 << value) != 0
}

impl Fields {
    fn day_matches(&self, t: &NaiveDateTime) -> bool {
        let dom = has(self.days_of_month, t.day());
        let dow = has(self.days_of_week, t.weekday().num_days_from_sunday());
        if self.dom_restricted && self.dow_restricted {
            dom || dow
        } else {
            dom && dow
        }
    }

    fn next_after<Tz: TimeZone>(&self, after: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        let tz = after.timezone();
        let mut t = after.naive_local().with_nanosecond(0)? + ChronoDuration::seconds(1);
        let year_limit = t.year() + SEARCH_YEARS;

        loop {
            if t.year() > year_limit {
                return None;
            }

            if !has(self.months, t.month()) {
                let (year, month) = if t.month() == 12 {
                    (t.year() + 1, 1)
                } else {
                    (t.year(), t.month() + 1)
                };
                t = NaiveDate::from_ymd_opt(year, month, 1)?.and_hms_opt(0, 0, 0)?;
                continue;
            }

            if !self.day_matches(&t) {
                t = t.date().succ_opt()?.and_hms_opt(0, 0, 0)?;
                continue;
            }

            if !has(self.hours, t.hour()) {
                t = t.date().and_hms_opt(t.hour(), 0, 0)? + ChronoDuration::hours(1);
                continue;
            }

            if !has(self.minutes, t.minute()) {
                t = t.date().and_hms_opt(t.hour(), t.minute(), 0)? + ChronoDuration::minutes(1);
                continue;
            }

            if !has(self.seconds, t.second()) {
                t += ChronoDuration::seconds(1);
                continue;
            }

            // skipped local times (DST gaps) fall through to the next candidate
            match tz.from_local_datetime(&t).earliest() {
                Some(fire) => return Some(fire),
                None => t += ChronoDuration::seconds(1),
            }
        }
    }
}
