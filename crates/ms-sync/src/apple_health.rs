// apple_health.rs — Start times for sessions auto-entered from Apple Health.
//
// Beeminder stamps these datapoints at the end of the day they belong to, so
// their `timestamp` says nothing about when the session happened. The time
// the entry was made is only available in the service-rendered text:
//
//   2025-Sep-26 entered at 07:21 by zarathustra via BeemiOS
//
// which is read in the rule's zone.

use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone};
use chrono_tz::Tz;
use regex::Regex;

/// Comment Beeminder writes on Apple Health auto-entries.
pub const APPLE_HEALTH_MARKER: &str = "Auto-entered via Apple Health";

fn entered_at_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(\d{4})-([A-Za-z]{3})-(\d{1,2}) entered at (\d{1,2}):(\d{2})")
            .expect("entered-at pattern is valid")
    })
}

/// Whether a datapoint comment marks an Apple Health auto-entry.
pub fn is_apple_health(comment: &str) -> bool {
    comment.contains(APPLE_HEALTH_MARKER)
}

/// Parse the local entry time out of `fulltext`.
///
/// Returns `None` if the text has no `entered at` clause, names an unknown
/// month, or describes an impossible date or clock time. A time that does
/// not exist locally (spring-forward gap) is also `None`; an ambiguous one
/// (fall-back) resolves to the earlier instant.
pub fn entered_at(fulltext: &str, tz: Tz) -> Option<DateTime<Tz>> {
    let caps = entered_at_pattern().captures(fulltext)?;

    let date_text = format!("{}-{}-{}", &caps[1], &caps[2], &caps[3]);
    let date = NaiveDate::parse_from_str(&date_text, "%Y-%b-%d").ok()?;

    let clock_text = format!("{}:{}", &caps[4], &caps[5]);
    let clock = NaiveTime::parse_from_str(&clock_text, "%H:%M").ok()?;

    tz.from_local_datetime(&date.and_time(clock)).earliest()
}
