// qualify.rs — The qualification filter: which raw sessions count as an
// early-morning meditation.
//
// A session qualifies when its start, read in the rule's zone, falls in the
// closed-open window [start, end) and it lasted at least the minimum number
// of minutes. Qualifying sessions become MeditationRecords whose identity is
// the start instant in UTC truncated to the minute, so re-running the
// filter over the same history always yields the same identities.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use ms_ledger::MeditationRecord;
use ms_remote::RawEvent;

use crate::apple_health;
use crate::error::QualifyError;

/// The early-morning rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualificationRule {
    tz: Tz,
    window_start: NaiveTime,
    window_end: NaiveTime,
    min_duration_minutes: u32,
}

impl Default for QualificationRule {
    /// 05:00–08:30 America/New_York, at least 35 minutes.
    fn default() -> Self {
        Self {
            tz: chrono_tz::America::New_York,
            window_start: NaiveTime::from_hms_opt(5, 0, 0).unwrap_or(NaiveTime::MIN),
            window_end: NaiveTime::from_hms_opt(8, 30, 0).unwrap_or(NaiveTime::MIN),
            min_duration_minutes: 35,
        }
    }
}

/// Deterministic identity for a session starting at `start`.
pub fn derive_identity(start: DateTime<Utc>) -> String {
    start.format("%Y-%m-%dT%H:%MZ").to_string()
}

impl QualificationRule {
    pub fn new(
        tz: Tz,
        window_start: NaiveTime,
        window_end: NaiveTime,
        min_duration_minutes: u32,
    ) -> Self {
        Self {
            tz,
            window_start,
            window_end,
            min_duration_minutes,
        }
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    /// The local calendar day an instant falls on.
    pub fn local_date(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.tz).date_naive()
    }

    /// When the session actually started, in the rule's zone.
    pub fn start_time(&self, event: &RawEvent) -> Result<DateTime<Tz>, QualifyError> {
        if apple_health::is_apple_health(&event.comment) {
            let text = event.fulltext.as_deref().unwrap_or_default();
            return apple_health::entered_at(text, self.tz).ok_or_else(|| {
                QualifyError::UnreadableAppleHealthTime {
                    source_id: event.source_id.clone(),
                    text: text.to_string(),
                }
            });
        }

        DateTime::from_timestamp(event.timestamp, 0)
            .map(|utc| utc.with_timezone(&self.tz))
            .ok_or_else(|| QualifyError::InvalidTimestamp {
                source_id: event.source_id.clone(),
                timestamp: event.timestamp,
            })
    }

    /// Whether a session starting at `start` and lasting `duration_minutes`
    /// qualifies.
    pub fn qualifies(&self, start: DateTime<Tz>, duration_minutes: f64) -> bool {
        let clock = start.time();
        clock >= self.window_start
            && clock < self.window_end
            && duration_minutes >= f64::from(self.min_duration_minutes)
    }

    /// Evaluate one event: `Ok(Some)` if it qualifies, `Ok(None)` if it
    /// does not, `Err` if it cannot be evaluated.
    pub fn evaluate(&self, event: &RawEvent) -> Result<Option<MeditationRecord>, QualifyError> {
        let duration = event.duration_minutes;
        if !duration.is_finite() || duration < 0.0 {
            return Err(QualifyError::InvalidDuration {
                source_id: event.source_id.clone(),
                value: duration,
            });
        }

        let local_start = self.start_time(event)?;
        if !self.qualifies(local_start, duration) {
            return Ok(None);
        }

        let start = truncate_to_minute(local_start.with_timezone(&Utc));
        let minutes = duration.trunc() as u32;
        let record = MeditationRecord::new(derive_identity(start), start, minutes).with_comment(
            format!(
                "Early meditation: {} minutes at {}",
                minutes,
                local_start.format("%H:%M")
            ),
        );
        Ok(Some(record))
    }

    /// Lazily qualify a batch of events.
    ///
    /// Events that cannot be evaluated are logged and skipped; they never
    /// stop the rest of the batch.
    pub fn qualify<'a, I>(&'a self, events: I) -> impl Iterator<Item = MeditationRecord> + 'a
    where
        I: IntoIterator<Item = &'a RawEvent>,
        I::IntoIter: 'a,
    {
        self.qualify_with(events, |_, _| {})
    }

    /// [`qualify`](Self::qualify), also handing each skipped event and its
    /// error to `on_skip`.
    pub fn qualify_with<'a, I, F>(
        &'a self,
        events: I,
        mut on_skip: F,
    ) -> impl Iterator<Item = MeditationRecord> + 'a
    where
        I: IntoIterator<Item = &'a RawEvent>,
        I::IntoIter: 'a,
        F: FnMut(&RawEvent, &QualifyError) + 'a,
    {
        events
            .into_iter()
            .filter_map(move |event| match self.evaluate(event) {
                Ok(candidate) => candidate,
                Err(err) => {
                    tracing::warn!(
                        source_id = %event.source_id,
                        error = %err,
                        "skipping malformed source event"
                    );
                    on_skip(event, &err);
                    None
                }
            })
    }

    /// Keep the longest candidate per local day; ties go to the earliest start.
    pub fn longest_per_day(
        &self,
        candidates: impl IntoIterator<Item = MeditationRecord>,
    ) -> Vec<MeditationRecord> {
        let mut best: BTreeMap<NaiveDate, MeditationRecord> = BTreeMap::new();
        for candidate in candidates {
            let day = self.local_date(candidate.occurred_at);
            match best.get(&day) {
                Some(current)
                    if current.duration_minutes > candidate.duration_minutes
                        || (current.duration_minutes == candidate.duration_minutes
                            && current.occurred_at <= candidate.occurred_at) => {}
                _ => {
                    best.insert(day, candidate);
                }
            }
        }
        best.into_values().collect()
    }
}

fn truncate_to_minute(at: DateTime<Utc>) -> DateTime<Utc> {
    let secs = at.timestamp();
    let truncated = secs - secs.rem_euclid(60);
    Utc.timestamp_opt(truncated, 0).single().unwrap_or(at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::America::New_York;

    fn event_at(h: u32, m: u32, s: u32, minutes: f64) -> RawEvent {
        let ts = New_York
            .with_ymd_and_hms(2025, 9, 26, h, m, s)
            .unwrap()
            .timestamp();
        RawEvent {
            source_id: format!("src-{h}{m}{s}"),
            timestamp: ts,
            duration_minutes: minutes,
            comment: "Manual entry".into(),
            fulltext: None,
        }
    }

    fn qualifies(event: &RawEvent) -> bool {
        QualificationRule::default().evaluate(event).unwrap().is_some()
    }

    #[test]
    fn window_and_duration_boundaries() {
        assert!(qualifies(&event_at(5, 0, 0, 35.0)));
        assert!(!qualifies(&event_at(4, 59, 59, 35.0)));
        assert!(!qualifies(&event_at(5, 0, 0, 34.0)));
        assert!(qualifies(&event_at(8, 29, 59, 35.0)));
        assert!(!qualifies(&event_at(8, 30, 0, 60.0)));
    }

    #[test]
    fn fractional_duration_just_below_minimum_fails() {
        assert!(!qualifies(&event_at(6, 0, 0, 34.9)));
        let record = QualificationRule::default()
            .evaluate(&event_at(6, 0, 0, 35.7))
            .unwrap()
            .unwrap();
        assert_eq!(record.duration_minutes, 35);
    }

    #[test]
    fn identity_is_deterministic_and_minute_truncated() {
        let rule = QualificationRule::default();
        let a = rule.evaluate(&event_at(7, 21, 13, 40.0)).unwrap().unwrap();
        let b = rule.evaluate(&event_at(7, 21, 13, 40.0)).unwrap().unwrap();
        let c = rule.evaluate(&event_at(7, 21, 59, 40.0)).unwrap().unwrap();
        assert_eq!(a.identity, b.identity);
        assert_eq!(a.identity, c.identity);
        // 07:21 EDT is 11:21 UTC.
        assert_eq!(a.identity, "2025-09-26T11:21Z");
        assert_eq!(a.occurred_at.timestamp() % 60, 0);
    }

    #[test]
    fn record_describes_session() {
        let record = QualificationRule::default()
            .evaluate(&event_at(6, 0, 0, 40.0))
            .unwrap()
            .unwrap();
        assert_eq!(record.value, 1.0);
        assert_eq!(record.duration_minutes, 40);
        assert_eq!(
            record.comment.as_deref(),
            Some("Early meditation: 40 minutes at 06:00")
        );
        assert!(record.remote_id.is_none());
    }

    #[test]
    fn window_uses_local_time_across_dst() {
        // 06:00 local in January is 11:00 UTC; in July it is 10:00 UTC.
        let rule = QualificationRule::default();
        for (month, utc_hour) in [(1, 11), (7, 10)] {
            let ts = Utc
                .with_ymd_and_hms(2025, month, 15, utc_hour, 0, 0)
                .unwrap()
                .timestamp();
            let event = RawEvent {
                source_id: "x".into(),
                timestamp: ts,
                duration_minutes: 40.0,
                comment: String::new(),
                fulltext: None,
            };
            assert!(rule.evaluate(&event).unwrap().is_some(), "month {month}");
        }
    }

    #[test]
    fn apple_health_entries_use_entry_text() {
        let rule = QualificationRule::default();
        let end_of_day = New_York
            .with_ymd_and_hms(2025, 9, 26, 23, 59, 59)
            .unwrap()
            .timestamp();
        let mut event = RawEvent {
            source_id: "ah".into(),
            timestamp: end_of_day,
            duration_minutes: 45.0,
            comment: "Auto-entered via Apple Health".into(),
            fulltext: Some("2025-Sep-26 entered at 07:21 by zarathustra via BeemiOS".into()),
        };
        let record = rule.evaluate(&event).unwrap().unwrap();
        assert_eq!(record.identity, "2025-09-26T11:21Z");

        event.fulltext = Some("2025-Sep-26 entered at 14:00 by zarathustra via BeemiOS".into());
        assert!(rule.evaluate(&event).unwrap().is_none());
    }

    #[test]
    fn unreadable_apple_health_entry_is_an_input_error() {
        let event = RawEvent {
            source_id: "ah".into(),
            timestamp: 0,
            duration_minutes: 45.0,
            comment: "Auto-entered via Apple Health".into(),
            fulltext: None,
        };
        assert!(matches!(
            QualificationRule::default().evaluate(&event),
            Err(QualifyError::UnreadableAppleHealthTime { .. })
        ));
    }

    #[test]
    fn malformed_events_are_skipped_not_fatal() {
        let rule = QualificationRule::default();
        let mut bad = event_at(6, 0, 0, 40.0);
        bad.duration_minutes = f64::NAN;
        let mut negative = event_at(6, 5, 0, 40.0);
        negative.duration_minutes = -3.0;
        let good = event_at(6, 30, 0, 40.0);

        assert!(matches!(
            rule.evaluate(&bad),
            Err(QualifyError::InvalidDuration { .. })
        ));
        let events = [bad, negative, good.clone()];
        let qualified: Vec<_> = rule.qualify(&events).collect();
        assert_eq!(qualified.len(), 1);
        assert_eq!(
            qualified[0].occurred_at.timestamp(),
            good.timestamp - good.timestamp.rem_euclid(60)
        );
    }

    #[test]
    fn qualify_is_restartable() {
        let rule = QualificationRule::default();
        let events = vec![event_at(5, 30, 0, 40.0), event_at(13, 0, 0, 90.0)];
        let first: Vec<_> = rule.qualify(&events).collect();
        let second: Vec<_> = rule.qualify(&events).collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 1);
    }

    #[test]
    fn longest_per_day_picks_longest_then_earliest() {
        let rule = QualificationRule::default();
        let records: Vec<_> = [
            event_at(7, 21, 0, 35.0),
            event_at(8, 0, 0, 50.0),
            event_at(5, 10, 0, 50.0),
        ]
        .iter()
        .filter_map(|e| rule.evaluate(e).unwrap())
        .collect();

        let kept = rule.longest_per_day(records);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].duration_minutes, 50);
        assert!(kept[0].comment.as_deref().unwrap().ends_with("05:10"));
    }

    #[test]
    fn longest_per_day_keeps_separate_days() {
        let rule = QualificationRule::default();
        let day = |d: u32| {
            let ts = New_York
                .with_ymd_and_hms(2025, 9, d, 6, 0, 0)
                .unwrap()
                .timestamp();
            RawEvent {
                source_id: format!("d{d}"),
                timestamp: ts,
                duration_minutes: 40.0,
                comment: String::new(),
                fulltext: None,
            }
        };
        let records: Vec<_> = rule.qualify(&[day(24), day(25), day(26)]).collect();
        assert_eq!(rule.longest_per_day(records).len(), 3);
    }

    #[test]
    fn qualify_with_reports_each_skipped_event() {
        let rule = QualificationRule::default();
        let mut bad = event_at(6, 0, 0, f64::NAN);
        bad.source_id = "bad".into();
        let events = [event_at(6, 0, 0, 40.0), bad, event_at(9, 0, 0, 40.0)];

        let mut skipped = Vec::new();
        let kept: Vec<_> = rule
            .qualify_with(&events, |event, _| skipped.push(event.source_id.clone()))
            .collect();
        assert_eq!(kept.len(), 1);
        assert_eq!(skipped, ["bad"]);
    }
}
