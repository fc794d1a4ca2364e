//! Calendar access behind a trait so handlers never depend on the live API
//! client directly.

pub mod events;
pub mod google;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use google::models::{CalendarListEntry, EventResource, EventTime};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// No usable credential for the calendar service.
    #[error("Google Calendar service is not available")]
    ServiceUnavailable,

    /// The calendar API rejected or failed a call. Surfaced verbatim, not
    /// retried.
    #[error("calendar API request failed with status {status}: {message}")]
    Api { status: u16, message: String },

    /// Error while making a http request.
    #[error("failure requesting remote resource: {0}")]
    Request(#[from] reqwest::Error),

    /// Error while parsing a JSON response.
    #[error("failed to parse response as JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Query options for listing events.
#[derive(Clone, Debug)]
pub struct EventQuery {
    /// Lower bound on event start; callers default this to the current
    /// instant.
    pub time_min: DateTime<Utc>,
    pub max_results: u32,
}

/// Body of an event write. `None` fields are omitted from the request, which
/// gives updates their partial-patch semantics.
#[derive(Serialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EventPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<EventTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<EventTime>,
}

/// Operations this application needs from a calendar provider.
#[async_trait]
pub trait CalendarGateway: Send + Sync {
    async fn list_calendars(
        &self,
        access_token: &str,
    ) -> Result<Vec<CalendarListEntry>, GatewayError>;

    /// Lists upcoming events with recurring events expanded into single
    /// instances, ordered by start time.
    async fn list_events(
        &self,
        access_token: &str,
        calendar_id: &str,
        query: &EventQuery,
    ) -> Result<Vec<EventResource>, GatewayError>;

    async fn get_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        event_id: &str,
    ) -> Result<EventResource, GatewayError>;

    async fn create_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        payload: &EventPayload,
    ) -> Result<EventResource, GatewayError>;

    /// Applies a partial patch; fields absent from `payload` keep their
    /// provider-side values.
    async fn update_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        event_id: &str,
        payload: &EventPayload,
    ) -> Result<EventResource, GatewayError>;

    async fn delete_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        event_id: &str,
    ) -> Result<(), GatewayError>;
}

#[async_trait]
impl<T> CalendarGateway for Arc<T>
where
    T: CalendarGateway + ?Sized,
{
    async fn list_calendars(
        &self,
        access_token: &str,
    ) -> Result<Vec<CalendarListEntry>, GatewayError> {
        (**self).list_calendars(access_token).await
    }

    async fn list_events(
        &self,
        access_token: &str,
        calendar_id: &str,
        query: &EventQuery,
    ) -> Result<Vec<EventResource>, GatewayError> {
        (**self).list_events(access_token, calendar_id, query).await
    }

    async fn get_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        event_id: &str,
    ) -> Result<EventResource, GatewayError> {
        (**self).get_event(access_token, calendar_id, event_id).await
    }

    async fn create_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        payload: &EventPayload,
    ) -> Result<EventResource, GatewayError> {
        (**self)
            .create_event(access_token, calendar_id, payload)
            .await
    }

    async fn update_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        event_id: &str,
        payload: &EventPayload,
    ) -> Result<EventResource, GatewayError> {
        (**self)
            .update_event(access_token, calendar_id, event_id, payload)
            .await
    }

    async fn delete_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        event_id: &str,
    ) -> Result<(), GatewayError> {
        (**self)
            .delete_event(access_token, calendar_id, event_id)
            .await
    }
}

/// Keeps calendars the account may create or edit events on, in their
/// original order. Read-only subscriptions such as public holiday calendars
/// are dropped.
pub fn writable_calendars(entries: Vec<CalendarListEntry>) -> Vec<CalendarListEntry> {
    entries
        .into_iter()
        .filter(|entry| matches!(entry.access_role.as_str(), "owner" | "writer"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, access_role: &str) -> CalendarListEntry {
        CalendarListEntry {
            id: id.to_string(),
            summary: Some(id.to_string()),
            access_role: access_role.to_string(),
            primary: None,
        }
    }

    #[test]
    fn writable_filter_keeps_owner_and_writer_in_order() {
        let filtered = writable_calendars(vec![
            entry("own", "owner"),
            entry("holidays", "reader"),
            entry("shared", "writer"),
        ]);

        let ids: Vec<_> = filtered.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["own", "shared"]);
    }

    #[test]
    fn writable_filter_drops_unknown_roles() {
        let filtered = writable_calendars(vec![
            entry("free-busy", "freeBusyReader"),
            entry("holidays", "reader"),
        ]);
        assert!(filtered.is_empty());
    }

    #[test]
    fn payload_omits_absent_fields() {
        let payload = EventPayload {
            summary: Some("Standup".into()),
            ..Default::default()
        };

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json, serde_json::json!({ "summary": "Standup" }));
    }
}
