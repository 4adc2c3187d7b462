//! Timestamp formatting for log lines.

use chrono::{DateTime, Local, Utc};

/// Current time as a medium-length local date and time, e.g. `Oct 18, 2026 14:03:27`.
pub fn format_now() -> String {
    format_datetime(&Local::now())
}

/// Current time in a lexically sortable form, e.g. `2026-10-18_14-03-27`.
pub fn format_orderable_now() -> String {
    format_orderable(&Local::now())
}

/// Current Unix timestamp in milliseconds.
pub fn unix_millis() -> i64 {
    Utc::now().timestamp_millis()
}

pub fn format_datetime<Tz: chrono::TimeZone>(dt: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    dt.format("%b %-d, %Y %H:%M:%S").to_string()
}

pub fn format_orderable<Tz: chrono::TimeZone>(dt: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    dt.format("%Y-%m-%d_%H-%M-%S").to_string()
}
