//! Display and form projections of provider events. Pure mapping, no I/O.

use super::google::models::{EventResource, EventTime};
use chrono::{DateTime, NaiveDateTime};
use chrono_tz::Tz;
use serde::Serialize;

/// Shown when a provider event carries no summary.
pub const UNTITLED: &str = "Untitled event";

/// Minute-precision format of `<input type="datetime-local">` values.
const FORM_MINUTE_FORMAT: &str = "%Y-%m-%dT%H:%M";

/// Display-safe projection of a provider event.
///
/// The raw payload is retained so the edit form can round-trip fields this
/// application does not model itself.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct NormalizedEvent {
    pub id: String,
    pub summary: String,
    pub start_text: String,
    pub end_text: String,
    pub location: Option<String>,
    pub status: Option<String>,
    pub raw: EventResource,
}

/// Values used to pre-populate the edit form.
#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFormValues {
    pub title: String,
    pub description: String,
    pub start_time: String,
    pub end_time: String,
    pub location: String,
}

/// Maps an API event to its display projection.
pub fn normalize(raw: EventResource) -> NormalizedEvent {
    let summary = match raw.summary.as_deref() {
        Some(summary) if !summary.trim().is_empty() => summary.to_string(),
        _ => UNTITLED.to_string(),
    };

    NormalizedEvent {
        id: raw.id.clone(),
        summary,
        start_text: time_text(raw.start.as_ref()),
        end_text: time_text(raw.end.as_ref()),
        location: raw.location.clone(),
        status: raw.status.clone(),
        raw,
    }
}

// Prefers the timed field, falls back to the all-day date.
fn time_text(time: Option<&EventTime>) -> String {
    time.map(|t| t.date_time.clone().or_else(|| t.date.clone()).unwrap_or_default())
        .unwrap_or_default()
}

/// Reverses [`normalize`] into the field values of the edit form. Start/end
/// become minute-precision local-time strings in `time_zone`; unparseable
/// timestamps degrade to an empty string.
pub fn denormalize_for_form(event: &NormalizedEvent, time_zone: Tz) -> EventFormValues {
    EventFormValues {
        title: event.raw.summary.clone().unwrap_or_default(),
        description: event.raw.description.clone().unwrap_or_default(),
        start_time: form_minute(&event.start_text, time_zone),
        end_time: form_minute(&event.end_text, time_zone),
        location: event.location.clone().unwrap_or_default(),
    }
}

/// Converts a provider timestamp (RFC3339, possibly `Z`-suffixed) into the
/// local minute string a `datetime-local` control expects.
fn form_minute(text: &str, time_zone: Tz) -> String {
    if let Ok(instant) = DateTime::parse_from_rfc3339(text) {
        return instant
            .with_timezone(&time_zone)
            .format(FORM_MINUTE_FORMAT)
            .to_string();
    }

    // Zone-less timestamps, as written on event creation, are already local.
    for format in [FORM_MINUTE_FORMAT, "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return naive.format(FORM_MINUTE_FORMAT).to_string();
        }
    }

    String::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use chrono_tz::Tz;

    const BERLIN: Tz = chrono_tz::Europe::Berlin;

    fn timed_event(start: &str, end: &str) -> EventResource {
        EventResource {
            id: "ev1".into(),
            summary: Some("Standup".into()),
            start: Some(EventTime {
                date_time: Some(start.into()),
                ..Default::default()
            }),
            end: Some(EventTime {
                date_time: Some(end.into()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn missing_summary_falls_back_to_untitled() {
        let event = normalize(EventResource {
            id: "ev1".into(),
            ..Default::default()
        });
        assert_eq!(event.summary, UNTITLED);

        let event = normalize(EventResource {
            id: "ev1".into(),
            summary: Some("  ".into()),
            ..Default::default()
        });
        assert_eq!(event.summary, UNTITLED);
    }

    #[test]
    fn all_day_event_uses_date_string() {
        let event = normalize(EventResource {
            id: "allday".into(),
            summary: Some("Holiday".into()),
            start: Some(EventTime {
                date: Some("2024-01-10".into()),
                ..Default::default()
            }),
            end: Some(EventTime {
                date: Some("2024-01-11".into()),
                ..Default::default()
            }),
            ..Default::default()
        });

        assert_eq!(event.start_text, "2024-01-10");
        assert_eq!(event.end_text, "2024-01-11");
    }

    #[test]
    fn form_values_use_local_minutes() {
        let event = normalize(timed_event(
            "2024-01-10T08:00:00Z",
            "2024-01-10T08:30:00Z",
        ));

        let form = denormalize_for_form(&event, BERLIN);
        assert_eq!(form.title, "Standup");
        // UTC+1 in January.
        assert_eq!(form.start_time, "2024-01-10T09:00");
        assert_eq!(form.end_time, "2024-01-10T09:30");
    }

    #[test]
    fn round_trip_preserves_the_calendar_minute() {
        let original = Utc.with_ymd_and_hms(2024, 6, 10, 7, 45, 0).unwrap();
        let event = normalize(timed_event(
            &original.to_rfc3339(),
            &(original + chrono::Duration::minutes(30)).to_rfc3339(),
        ));

        let form = denormalize_for_form(&event, BERLIN);

        // Interpreting the form string in the same zone yields the original
        // instant again.
        let reparsed = NaiveDateTime::parse_from_str(&form.start_time, FORM_MINUTE_FORMAT)
            .unwrap()
            .and_local_timezone(BERLIN)
            .single()
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(reparsed, original);
    }

    #[test]
    fn unparseable_timestamps_degrade_to_empty() {
        let event = normalize(timed_event("soon-ish", "later"));

        let form = denormalize_for_form(&event, BERLIN);
        assert_eq!(form.start_time, "");
        assert_eq!(form.end_time, "");
    }

    #[test]
    fn zone_less_timestamps_pass_through() {
        assert_eq!(form_minute("2024-01-10T09:00:00", BERLIN), "2024-01-10T09:00");
        assert_eq!(form_minute("2024-01-10T09:00", BERLIN), "2024-01-10T09:00");
    }
}
