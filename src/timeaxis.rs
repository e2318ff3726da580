//! Conversion between netCDF time offsets and calendar dates.
//!
//! Model output commonly stores time as numeric offsets from an anchor date
//! ("days since 1950-01-01") in a 365-day calendar that has no February 29th.
//! Decoding those offsets to real dates means adding back the leap days that
//! the model calendar skipped, which is what [`noleap_offset_to_date`] does.
//! [`encode_timevec`] is the inverse used when writing grids back out.
//!
//! Only daily, gap-free time axes are supported: [`build_timevec`] returns every
//! day between the first and last offset that exists in the 365-day calendar.
use std::{fmt::Display, str::FromStr, sync::OnceLock};

use chrono::{Datelike, NaiveDate, TimeDelta};

use crate::error::ClimGridError;

static UNITS_DATE_REGEX: OnceLock<regex::Regex> = OnceLock::new();

/// The step named before "since" in a time units string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeStep {
    Days,
    Hours,
    Minutes,
    Seconds,
}

impl TimeStep {
    fn per_day(&self) -> f64 {
        match self {
            TimeStep::Days => 1.0,
            TimeStep::Hours => 24.0,
            TimeStep::Minutes => 1440.0,
            TimeStep::Seconds => 86400.0,
        }
    }
}

impl FromStr for TimeStep {
    type Err = ClimGridError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "days" | "day" | "d" => Ok(Self::Days),
            "hours" | "hour" | "h" => Ok(Self::Hours),
            "minutes" | "minute" | "min" => Ok(Self::Minutes),
            "seconds" | "second" | "s" => Ok(Self::Seconds),
            _ => Err(ClimGridError::format(s, "unknown time step")),
        }
    }
}

impl Display for TimeStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TimeStep::Days => "days",
            TimeStep::Hours => "hours",
            TimeStep::Minutes => "minutes",
            TimeStep::Seconds => "seconds",
        };
        write!(f, "{s}")
    }
}

/// A parsed "<step> since YYYY-MM-DD[...]" units attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeUnits {
    pub step: TimeStep,
    pub anchor: NaiveDate,
}

impl FromStr for TimeUnits {
    type Err = ClimGridError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let re = UNITS_DATE_REGEX.get_or_init(|| {
            regex::Regex::new(r"(?<year>\d{1,4})[-./](?<month>\d{1,2})[-./](?<day>\d{1,2})").unwrap()
        });

        let caps = re
            .captures(s)
            .ok_or_else(|| ClimGridError::format(s, "no YYYY-MM-DD date found"))?;

        // The regex guarantees digits, but the values may still be out of range
        let year: i32 = caps["year"]
            .parse()
            .map_err(|_| ClimGridError::format(s, "invalid year"))?;
        let month: u32 = caps["month"]
            .parse()
            .map_err(|_| ClimGridError::format(s, "invalid month"))?;
        let day: u32 = caps["day"]
            .parse()
            .map_err(|_| ClimGridError::format(s, "invalid day"))?;
        let anchor = NaiveDate::from_ymd_opt(year, month, day)
            .ok_or_else(|| ClimGridError::format(s, "anchor is not a valid date"))?;

        let step = match s.to_ascii_lowercase().split_once("since") {
            Some((verb, _)) => verb.parse()?,
            None => return Err(ClimGridError::format(s, "expected '<step> since <date>'")),
        };

        Ok(Self { step, anchor })
    }
}

impl Display for TimeUnits {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} since {}", self.step, self.anchor.format("%Y-%m-%d"))
    }
}

/// Calendars that can be decoded. Anything but the fixed 365-day calendar is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Calendar {
    NoLeap,
}

impl FromStr for Calendar {
    type Err = ClimGridError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "noleap" | "no_leap" | "365_day" => Ok(Self::NoLeap),
            _ => Err(ClimGridError::UnsupportedCalendar(s.to_string())),
        }
    }
}

/// Count the February 29ths in the inclusive range `start..=end`.
///
/// Returns 0 if `end` is before `start`.
pub fn leap_days_between(start: NaiveDate, end: NaiveDate) -> i64 {
    (start.year()..=end.year())
        .filter_map(|year| NaiveDate::from_ymd_opt(year, 2, 29))
        .filter(|feb29| start <= *feb29 && *feb29 <= end)
        .count() as i64
}

/// Convert an offset in 365-day-calendar days from `anchor` to a real calendar date.
///
/// The naive target (anchor plus offset) is pushed away from the anchor by the
/// number of leap days between the two, repeating until that count no longer
/// changes. The result never falls on February 29th.
///
/// Only the February 29ths actually crossed are counted, not every leap year
/// the span touches: 1999-01-01 + 365 is 2000-01-01, since 2000-02-29 lies
/// after the target.
///
/// # Errors
/// [`ClimGridError::Format`] if `anchor` is a February 29th, which has no
/// place in the 365-day calendar, or the target is out of range.
pub fn noleap_offset_to_date(anchor: NaiveDate, offset_days: i64) -> Result<NaiveDate, ClimGridError> {
    check_anchor(anchor)?;
    let sign = if offset_days < 0 { -1 } else { 1 };
    let mut nleap = 0;
    loop {
        let target = add_days(anchor, offset_days + sign * nleap)?;
        let n = if sign > 0 {
            leap_days_between(anchor, target)
        } else {
            leap_days_between(target, anchor)
        };
        if n == nleap {
            return Ok(target);
        }
        nleap = n;
    }
}

/// Inverse of [`noleap_offset_to_date`]: the number of 365-day-calendar days
/// from `anchor` to `date`.
pub fn date_to_noleap_offset(anchor: NaiveDate, date: NaiveDate) -> i64 {
    let real_days = (date - anchor).num_days();
    if real_days >= 0 {
        real_days - leap_days_between(anchor, date)
    } else {
        real_days + leap_days_between(date, anchor)
    }
}

/// Build the daily date axis spanned by raw time offsets.
///
/// `units` is the time variable's units attribute and `calendar` its calendar
/// attribute. Offsets are floored to whole days. The first and last offsets are
/// decoded and every day between them (inclusive) is returned, skipping February
/// 29th since the model calendar has no such day. Callers must check that the
/// length matches the data when the frequency might not be daily.
pub fn build_timevec(units: &str, calendar: &str, offsets: &[f64]) -> Result<Vec<NaiveDate>, ClimGridError> {
    let units: TimeUnits = units.parse()?;
    let _calendar: Calendar = calendar.parse()?;
    check_anchor(units.anchor)?;

    let (first, last) = match (offsets.first(), offsets.last()) {
        (Some(&first), Some(&last)) => (first, last),
        _ => return Ok(vec![]),
    };

    let start = noleap_offset_to_date(units.anchor, offset_to_days(first, units.step)?)?;
    let end = noleap_offset_to_date(units.anchor, offset_to_days(last, units.step)?)?;
    if end < start {
        return Err(ClimGridError::format(
            format!("{first} .. {last}"),
            "time offsets must increase",
        ));
    }

    let ndays = (end - start).num_days() as usize + 1;
    Ok(start
        .iter_days()
        .take(ndays)
        .filter(|d| !is_feb29(d))
        .collect())
}

/// Encode dates as offsets in the step and anchor of `units`, counting 365-day years.
pub fn encode_timevec(dates: &[NaiveDate], units: &str, calendar: &str) -> Result<Vec<f64>, ClimGridError> {
    let units: TimeUnits = units.parse()?;
    let _calendar: Calendar = calendar.parse()?;
    check_anchor(units.anchor)?;
    let per_day = units.step.per_day();
    Ok(dates
        .iter()
        .map(|&d| date_to_noleap_offset(units.anchor, d) as f64 * per_day)
        .collect())
}

fn is_feb29(date: &NaiveDate) -> bool {
    date.month() == 2 && date.day() == 29
}

fn check_anchor(anchor: NaiveDate) -> Result<(), ClimGridError> {
    if is_feb29(&anchor) {
        Err(ClimGridError::format(anchor, "a 365-day calendar has no February 29th to anchor on"))
    } else {
        Ok(())
    }
}

fn offset_to_days(offset: f64, step: TimeStep) -> Result<i64, ClimGridError> {
    if !offset.is_finite() {
        return Err(ClimGridError::format(offset, "time offset is not finite"));
    }
    Ok((offset / step.per_day()).floor() as i64)
}

fn add_days(date: NaiveDate, days: i64) -> Result<NaiveDate, ClimGridError> {
    TimeDelta::try_days(days)
        .and_then(|delta| date.checked_add_signed(delta))
        .ok_or_else(|| ClimGridError::format(days, format!("offset out of range from {date}")))
}
