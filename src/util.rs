//! Business-calendar helpers shared by the pipeline and the reminder jobs.

use chrono::{DateTime, Datelike, Months, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;

/// Local format used in API responses and stored timestamps shown to staff.
pub const LOCAL_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Convert a Unix timestamp to the business timezone.
pub fn local_time(timestamp: i64, tz: Tz) -> DateTime<Tz> {
    DateTime::<Utc>::from_timestamp(timestamp, 0)
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
        .with_timezone(&tz)
}

/// Format a Unix timestamp as `YYYY-MM-DD HH:MM:SS` in the business timezone.
pub fn format_local(timestamp: i64, tz: Tz) -> String {
    local_time(timestamp, tz).format(LOCAL_FORMAT).to_string()
}

/// Add calendar months, keeping the wall-clock time. Days past the end of the
/// target month clamp to its last day (Jan 31 + 1 month = Feb 28/29).
pub fn add_months(dt: DateTime<Tz>, months: u32) -> Option<DateTime<Tz>> {
    let tz = dt.timezone();
    let naive = dt.naive_local().checked_add_months(Months::new(months))?;
    tz.from_local_datetime(&naive).earliest().or_else(|| {
        // Wall-clock time fell into a DST gap; take the first instant after it
        tz.from_local_datetime(&(naive + TimeDelta::hours(1))).earliest()
    })
}

/// Day of month with its English ordinal suffix: 1st, 2nd, 3rd, 4th, 11th, 22nd.
pub fn ordinal_suffix(day: u32) -> &'static str {
    if (4..=20).contains(&day) {
        return "th";
    }
    match day % 10 {
        1 => "st",
        2 => "nd",
        3 => "rd",
        _ => "th",
    }
}

/// Short human date for customer messages, e.g. "12th Oct".
pub fn friendly_date(timestamp: i64, tz: Tz) -> String {
    let local = local_time(timestamp, tz);
    let day = local.day();
    format!("{}{} {}", day, ordinal_suffix(day), local.format("%b"))
}
