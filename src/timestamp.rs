//! Parsers for the Korean-locale timestamps Google Forms writes into the sheet
//! (`"2025. 3. 28 오후 11:24:19"`) and for plain calendar dates.
use chrono::{NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

const MERIDIEM_DELIMITER: &str = " 오";
const PM_MARKER: char = '후';
const AM_MARKER: char = '전';

static DATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{4})\s*[./-]\s*(\d{1,2})\s*[./-]\s*(\d{1,2})\.?(?:\s+.*)?$")
        .expect("date regex compiles")
});

/// A timestamp or date literal that could not be understood. Always carries
/// the offending literal so callers can log it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TimestampError {
    #[error("no meridiem marker in {0:?}")]
    MissingMeridiem(String),
    #[error("malformed date in {0:?}")]
    MalformedDate(String),
    #[error("malformed time in {0:?}")]
    MalformedTime(String),
    #[error("date/time component out of range in {0:?}")]
    OutOfRange(String),
}

impl TimestampError {
    pub fn literal(&self) -> &str {
        match self {
            TimestampError::MissingMeridiem(s)
            | TimestampError::MalformedDate(s)
            | TimestampError::MalformedTime(s)
            | TimestampError::OutOfRange(s) => s,
        }
    }
}

/// Parse `"<year>. <month>. <day> 오<전|후> <h>:<mm>:<ss>"` into a local
/// (naive) date-time, converting the 12-hour clock to 24 hours.
pub fn parse_timestamp(s: &str) -> Result<NaiveDateTime, TimestampError> {
    let (date_part, time_part) = s
        .split_once(MERIDIEM_DELIMITER)
        .ok_or_else(|| TimestampError::MissingMeridiem(s.to_string()))?;

    let [year, month, day] = split_date(date_part)
        .ok_or_else(|| TimestampError::MalformedDate(s.to_string()))?;

    let is_pm = time_part.contains(PM_MARKER);
    let clock = time_part
        .strip_prefix(PM_MARKER)
        .or_else(|| time_part.strip_prefix(AM_MARKER))
        .unwrap_or(time_part)
        .trim();
    let [hour, minute, second] =
        split_numbers::<u32>(clock, ':').ok_or_else(|| TimestampError::MalformedTime(s.to_string()))?;

    let hour = match (is_pm, hour) {
        (true, 12) => 12,
        (true, h) => h.saturating_add(12),
        (false, 12) => 0,
        (false, h) => h,
    };

    let year = i32::try_from(year).map_err(|_| TimestampError::OutOfRange(s.to_string()))?;
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(hour, minute, second))
        .ok_or_else(|| TimestampError::OutOfRange(s.to_string()))
}

/// Parse a calendar date: `"2025. 3. 28"`, `"2025. 3. 28."`, `"2025-03-28"`,
/// or the date part of a full sheet timestamp.
pub fn parse_date(s: &str) -> Result<NaiveDate, TimestampError> {
    let trimmed = s.trim();
    let caps = DATE_RE
        .captures(trimmed)
        .ok_or_else(|| TimestampError::MalformedDate(s.to_string()))?;
    let num = |i: usize| caps[i].parse::<u32>().ok();
    let (Some(year), Some(month), Some(day)) = (num(1), num(2), num(3)) else {
        return Err(TimestampError::MalformedDate(s.to_string()));
    };
    NaiveDate::from_ymd_opt(year as i32, month, day)
        .ok_or_else(|| TimestampError::OutOfRange(s.to_string()))
}

/// `"2025. 3. 28."` -> `[2025, 3, 28]`
fn split_date(segment: &str) -> Option<[u32; 3]> {
    let compact: String = segment.chars().filter(|c| *c != ' ').collect();
    let compact = compact.strip_suffix('.').unwrap_or(&compact);
    split_numbers::<u32>(compact, '.')
}

fn split_numbers<T: std::str::FromStr>(s: &str, sep: char) -> Option<[T; 3]> {
    let mut parts = s.split(sep).map(|p| p.trim().parse::<T>().ok());
    let a = parts.next()??;
    let b = parts.next()??;
    let c = parts.next()??;
    if parts.next().is_some() {
        return None;
    }
    Some([a, b, c])
}
