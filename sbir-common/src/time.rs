//! Date and timestamp utilities
//!
//! Input data carries dates in several textual layouts. Parsing is lenient
//! about layout and strict about validity: a value either yields a real
//! calendar date or nothing.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Accepted calendar-date layouts, tried in order
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d", "%m-%d-%Y"];

/// US layout with a two-digit year; `%Y` would read "23" as year 23
const SHORT_YEAR_FORMAT: &str = "%m/%d/%y";

/// Accepted date-time layouts, date part is kept
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
];

/// Storage layout for dates (ISO 8601 calendar date)
pub const STORAGE_DATE_FORMAT: &str = "%Y-%m-%d";

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Parse a date in any accepted layout; blank or unparseable input yields None
pub fn parse_flexible_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if has_short_year(value) {
        return NaiveDate::parse_from_str(value, SHORT_YEAR_FORMAT).ok();
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            return Some(date);
        }
    }

    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(dt.date());
        }
    }

    // Offset-qualified timestamps ("2023-01-30T00:00:00Z", "+00:00")
    DateTime::parse_from_rfc3339(value).ok().map(|dt| dt.date_naive())
}

fn has_short_year(value: &str) -> bool {
    let parts: Vec<&str> = value.split('/').collect();
    parts.len() == 3 && parts[2].len() == 2
}

/// Format a date for storage
pub fn format_storage_date(date: NaiveDate) -> String {
    date.format(STORAGE_DATE_FORMAT).to_string()
}

/// Parse a stored date column
pub fn parse_storage_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, STORAGE_DATE_FORMAT).ok()
}
