//! Normalization of the timestamp labels shown under feed posts.
//!
//! Feeds render publication times as short human labels ("3 hrs",
//! "45 mins", "Yesterday at 9:14 PM", "March 15 at 2:30 PM"). The rules are
//! evaluated in order and the first match wins:
//!
//! 1. contains `hr` → `now - N hours`
//! 2. contains `min` → `now - N minutes`
//! 3. contains `Yesterday` → `now - 24 hours`
//! 4. parses as an absolute date/time → that instant
//! 5. otherwise → `now`
//!
//! `N` is the integer the label starts with. Rule 4 accepts RFC 3339 and
//! RFC 2822 timestamps with their UTC offset applied; other absolute dates
//! carry no zone and are read as UTC. Labels such as "2 days ago" or "1w"
//! are not understood and fall through to rule 5.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeDelta, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Result, ScrapeError};

static LEADING_INT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*([+-]?\d+)").unwrap());

const DATETIME_FORMATS: &[&str] = &[
    "%A, %B %d, %Y at %I:%M %p",
    "%B %d, %Y at %I:%M %p",
    "%B %d, %Y %I:%M %p",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

const DATE_FORMATS: &[&str] = &["%B %d, %Y", "%d %B %Y", "%Y-%m-%d", "%m/%d/%Y"];

/// Labels without a year ("March 15", "March 15 at 2:30 PM") get the current
/// year appended before matching one of these.
const YEARLESS_DATETIME_FORMATS: &[&str] = &["%B %d at %I:%M %p %Y", "%d %B at %H:%M %Y"];
const YEARLESS_DATE_FORMATS: &[&str] = &["%B %d %Y", "%d %B %Y"];

/// Turn a timestamp label into an absolute instant relative to `now`.
///
/// # Errors
///
/// Returns [`ScrapeError::Extraction`] when the label names a relative unit
/// but does not start with a count (e.g. "hr ago"), or when the count does
/// not fit in a time span.
pub fn normalize(label: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    if label.contains("hr") {
        let hours = leading_count(label)?;
        return shift(now, TimeDelta::try_hours(hours), label);
    }
    if label.contains("min") {
        let minutes = leading_count(label)?;
        return shift(now, TimeDelta::try_minutes(minutes), label);
    }
    if label.contains("Yesterday") {
        return shift(now, TimeDelta::try_hours(24), label);
    }
    Ok(parse_absolute(label, now).unwrap_or(now))
}

/// Parse an absolute date or date-time label.
///
/// Returns `None` when no known layout matches.
pub fn parse_absolute(label: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let text = label.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return Some(dt.with_timezone(&Utc));
    }

    if let Some(dt) = parse_naive(text) {
        return Some(dt);
    }

    let with_year = format!("{} {}", text, now.year());
    YEARLESS_DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(&with_year, fmt).ok())
        .or_else(|| {
            YEARLESS_DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(&with_year, fmt).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .map(|naive| naive.and_utc())
}

/// Parse text that is expected to already be an instant, such as a
/// `datetime` attribute or a stored `created_time`.
pub fn parse_instant(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| parse_naive(text))
}

fn parse_naive(text: &str) -> Option<DateTime<Utc>> {
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .map(|naive| naive.and_utc())
}

fn leading_count(label: &str) -> Result<i64> {
    LEADING_INT
        .captures(label)
        .and_then(|caps| caps[1].parse::<i64>().ok())
        .ok_or_else(|| ScrapeError::Extraction(format!("time label {label:?} has no leading count")))
}

fn shift(now: DateTime<Utc>, delta: Option<TimeDelta>, label: &str) -> Result<DateTime<Utc>> {
    delta
        .and_then(|d| now.checked_sub_signed(d))
        .ok_or_else(|| ScrapeError::Extraction(format!("time label {label:?} is out of range")))
}
