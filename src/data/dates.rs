//! Mixed-format date keys.
//!
//! Upstream exports have changed date style over time, so one file can hold
//! `01/02/24`, `2024-01-02` and `Jan 2, 2024` side by side. Slash dates are
//! always month-first.

use chrono::{NaiveDate, NaiveDateTime};

use crate::error::DateParseError;

/// Tried in order. Two-digit year forms must precede their `%Y` twins,
/// otherwise `01/02/24` would parse as the year 24.
const DATE_FORMATS: [&str; 9] = [
    "%Y-%m-%d",
    "%m/%d/%y",
    "%m/%d/%Y",
    "%Y/%m/%d",
    "%d-%b-%y",
    "%d-%b-%Y",
    "%b %d, %Y",
    "%B %d, %Y",
    "%Y%m%d",
];

const DATETIME_FORMATS: [&str; 6] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%m/%d/%y %H:%M",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %H:%M:%S",
];

pub fn parse_mixed_date(raw: &str) -> Result<NaiveDate, DateParseError> {
    let s = raw.trim().trim_matches('"');
    if s.is_empty() {
        return Err(DateParseError { raw: raw.to_string() });
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Ok(d);
        }
    }
    // Fractional seconds and offsets are not meaningful for daily samples.
    let trimmed = s.split(['.', '+', 'Z']).next().unwrap_or(s);
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Ok(dt.date());
        }
    }
    Err(DateParseError { raw: raw.to_string() })
}

/// Canonical `YYYY-MM-DD` form.
pub fn iso(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}
