//! Leading `[...]` timestamp extraction for server log lines.
//!
//! Two shapes are recognised, each with an optional millisecond part:
//! `[2025-11-13 23:49:50.897]` and `[13Nov2025 22:32:28.180]`. Times are
//! written in host-local time.

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};

const FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%d%b%Y %H:%M:%S%.f"];

/// Parse the bracketed timestamp at the very start of `line`.
pub fn parse_log_timestamp(line: &str) -> Option<NaiveDateTime> {
    let inner = line.strip_prefix('[')?;
    let inner = &inner[..inner.find(']')?];
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(inner, fmt).ok())
}

/// Timestamp of `line` as UTC, or `now` when the line has none or it
/// does not parse.
pub fn extract_timestamp(line: &str, now: DateTime<Utc>) -> DateTime<Utc> {
    parse_log_timestamp(line)
        .and_then(|naive| Local.from_local_datetime(&naive).earliest())
        .map(|local| local.with_timezone(&Utc))
        .unwrap_or(now)
}
