//! Calendar-date normalization and small date/text formatting helpers.
//!
//! Due dates are calendar dates with no time component. A picked instant
//! is normalized by reading its local year/month/day in the picker's
//! timezone, never by converting to a UTC ISO timestamp, which shifts the
//! day near midnight.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};

/// Local calendar date of `dt` in its own timezone.
pub fn local_calendar_date<Tz: TimeZone>(dt: &DateTime<Tz>) -> NaiveDate {
    dt.date_naive()
}

/// Wire format used by the `due_date` column, e.g. "2026-02-10".
pub fn to_wire_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Short display form, e.g. "Feb 10".
pub fn short_date(date: NaiveDate) -> String {
    date.format("%b %-d").to_string()
}

/// URL slug derived from an issue title: lowercase, runs of
/// non-alphanumerics collapsed to `-`, leading/trailing `-` stripped.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_dash = false;
    for ch in title.to_lowercase().chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch);
        } else {
            pending_dash = true;
        }
    }
    slug
}

/// Relative timestamp for feed rendering: "just now", "5m ago", "3h ago",
/// "2d ago".
pub fn time_ago(from: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = now.signed_duration_since(from);
    if elapsed < Duration::minutes(1) {
        return "just now".to_string();
    }
    if elapsed < Duration::hours(1) {
        return format!("{}m ago", elapsed.num_minutes());
    }
    if elapsed < Duration::days(1) {
        return format!("{}h ago", elapsed.num_hours());
    }
    format!("{}d ago", elapsed.num_days())
}
