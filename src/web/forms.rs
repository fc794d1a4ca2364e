//! HTML form payloads and their validation. Validation happens before any
//! network call is attempted.

use crate::calendar::google::models::EventTime;
use crate::calendar::EventPayload;
use chrono::NaiveDateTime;
use serde::Deserialize;
use thiserror::Error;

/// Accepted `datetime-local` input formats; browsers send minutes, some add
/// seconds.
const MINUTE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S"];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormError {
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("could not parse {0} as a timestamp")]
    InvalidTimestamp(&'static str),
    #[error("end time must not be before start time")]
    EndBeforeStart,
}

/// Raw create/edit form fields as submitted by the browser.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct EventForm {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub start_time: String,
    #[serde(default)]
    pub end_time: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub calendar_id: String,
}

/// Delete action fields.
#[derive(Deserialize, Debug, Clone)]
pub struct DeleteForm {
    pub event_id: String,
    #[serde(default)]
    pub calendar_id: String,
}

impl DeleteForm {
    pub fn calendar_id(&self) -> &str {
        non_empty(&self.calendar_id).unwrap_or("primary")
    }
}

/// Event fields that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedEvent {
    pub title: String,
    pub description: Option<String>,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub location: Option<String>,
    pub calendar_id: String,
}

impl EventForm {
    /// Checks required fields and parses the timestamps.
    pub fn validate(&self) -> Result<ValidatedEvent, FormError> {
        let title = non_empty(&self.title).ok_or(FormError::MissingField("title"))?;
        let start_time = non_empty(&self.start_time).ok_or(FormError::MissingField("start time"))?;
        let end_time = non_empty(&self.end_time).ok_or(FormError::MissingField("end time"))?;

        let start = parse_minute(start_time).ok_or(FormError::InvalidTimestamp("start time"))?;
        let end = parse_minute(end_time).ok_or(FormError::InvalidTimestamp("end time"))?;

        if end < start {
            return Err(FormError::EndBeforeStart);
        }

        Ok(ValidatedEvent {
            title: title.to_string(),
            description: non_empty(&self.description).map(str::to_string),
            start,
            end,
            location: non_empty(&self.location).map(str::to_string),
            calendar_id: non_empty(&self.calendar_id).unwrap_or("primary").to_string(),
        })
    }
}

impl ValidatedEvent {
    /// Builds the write payload, attaching `time_zone` to both start and
    /// end.
    pub fn to_payload(&self, time_zone: &str) -> EventPayload {
        EventPayload {
            summary: Some(self.title.clone()),
            description: self.description.clone(),
            location: self.location.clone(),
            start: Some(event_time(self.start, time_zone)),
            end: Some(event_time(self.end, time_zone)),
        }
    }
}

fn event_time(timestamp: NaiveDateTime, time_zone: &str) -> EventTime {
    EventTime {
        date_time: Some(timestamp.format("%Y-%m-%dT%H:%M:%S").to_string()),
        date: None,
        time_zone: Some(time_zone.to_string()),
    }
}

fn non_empty(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

fn parse_minute(text: &str) -> Option<NaiveDateTime> {
    MINUTE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled_form() -> EventForm {
        EventForm {
            title: "Standup".into(),
            description: "Daily sync".into(),
            start_time: "2024-01-10T09:00".into(),
            end_time: "2024-01-10T09:30".into(),
            location: "Room 2".into(),
            calendar_id: "team@example.com".into(),
        }
    }

    #[test]
    fn valid_form_passes() {
        let event = filled_form().validate().unwrap();
        assert_eq!(event.title, "Standup");
        assert_eq!(event.calendar_id, "team@example.com");
        assert_eq!(event.start.format("%H:%M").to_string(), "09:00");
    }

    #[test]
    fn required_fields_are_enforced() {
        let mut form = filled_form();
        form.title = "   ".into();
        assert_eq!(
            form.validate().unwrap_err(),
            FormError::MissingField("title")
        );

        let mut form = filled_form();
        form.start_time.clear();
        assert_eq!(
            form.validate().unwrap_err(),
            FormError::MissingField("start time")
        );

        let mut form = filled_form();
        form.end_time.clear();
        assert_eq!(
            form.validate().unwrap_err(),
            FormError::MissingField("end time")
        );
    }

    #[test]
    fn end_before_start_is_rejected() {
        let mut form = filled_form();
        form.end_time = "2024-01-10T08:00".into();
        assert_eq!(form.validate().unwrap_err(), FormError::EndBeforeStart);
    }

    #[test]
    fn seconds_in_timestamps_are_accepted() {
        let mut form = filled_form();
        form.start_time = "2024-01-10T09:00:15".into();
        assert!(form.validate().is_ok());
    }

    #[test]
    fn garbage_timestamps_are_rejected() {
        let mut form = filled_form();
        form.start_time = "tomorrow".into();
        assert_eq!(
            form.validate().unwrap_err(),
            FormError::InvalidTimestamp("start time")
        );
    }

    #[test]
    fn empty_calendar_defaults_to_primary() {
        let mut form = filled_form();
        form.calendar_id.clear();
        assert_eq!(form.validate().unwrap().calendar_id, "primary");
    }

    #[test]
    fn payload_attaches_the_time_zone_to_both_ends() {
        let payload = filled_form().validate().unwrap().to_payload("Europe/Berlin");

        let start = payload.start.unwrap();
        let end = payload.end.unwrap();
        assert_eq!(start.date_time.as_deref(), Some("2024-01-10T09:00:00"));
        assert_eq!(start.time_zone.as_deref(), Some("Europe/Berlin"));
        assert_eq!(end.date_time.as_deref(), Some("2024-01-10T09:30:00"));
        assert_eq!(end.time_zone.as_deref(), Some("Europe/Berlin"));
        assert_eq!(payload.summary.as_deref(), Some("Standup"));
    }

    #[test]
    fn blank_optional_fields_are_omitted() {
        let mut form = filled_form();
        form.description.clear();
        form.location.clear();

        let payload = form.validate().unwrap().to_payload("Europe/Berlin");
        assert_eq!(payload.description, None);
        assert_eq!(payload.location, None);
    }

    #[test]
    fn delete_form_defaults_to_primary() {
        let form = DeleteForm {
            event_id: "ev1".into(),
            calendar_id: String::new(),
        };
        assert_eq!(form.calendar_id(), "primary");
    }
}
