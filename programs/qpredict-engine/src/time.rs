//! UTC timestamp boundary crossing. Every timestamp that crosses the
//! persistence boundary goes through here so the "naive datetime string
//! with no timezone marker" bug class described in spec.md §9 cannot
//! reappear: writers always produce an explicit `Z`, and the single
//! reader (`parse_utc`) tolerates rows that lack one (migrated/foreign
//! data) by appending it before parsing.

use chrono::{DateTime, Utc};

pub fn now() -> DateTime<Utc> {
    Utc::now()
}

pub fn format_utc(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

/// Parses a stored timestamp, appending `Z` if no timezone marker is
/// present. This is the one place that bug class is allowed to be
/// "fixed up" rather than rejected — normal writes never hit that path.
pub fn parse_utc(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    let with_marker = format!("{raw}Z");
    DateTime::parse_from_rfc3339(&with_marker)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
