pub mod models;

use super::{CalendarGateway, EventPayload, EventQuery, GatewayError};
use async_trait::async_trait;
use chrono::SecondsFormat;
use indexmap::IndexMap;
use models::{CalendarListEntry, CalendarListPage, EventResource, EventsPage};
use reqwest::Response;
use std::time::Duration;

const API_BASE: &str = "https://www.googleapis.com/calendar/v3";

/// Live client for the Google Calendar v3 REST API.
///
/// The bearer token is passed per call because credentials belong to the
/// requesting user, not to the client.
#[derive(Debug, Clone)]
pub struct GoogleCalendarGateway {
    client: reqwest::Client,
}

impl GoogleCalendarGateway {
    pub fn new() -> Result<GoogleCalendarGateway, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(GoogleCalendarGateway { client })
    }

    fn events_url(calendar_id: &str) -> String {
        format!(
            "{API_BASE}/calendars/{}/events",
            urlencoding::encode(calendar_id)
        )
    }

    fn event_url(calendar_id: &str, event_id: &str) -> String {
        format!(
            "{API_BASE}/calendars/{}/events/{}",
            urlencoding::encode(calendar_id),
            urlencoding::encode(event_id)
        )
    }

    /// Turns non-2xx responses into [`GatewayError::Api`] with the
    /// provider's message.
    async fn checked(response: Response) -> Result<Response, GatewayError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "unknown error".to_string());

        Err(GatewayError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl CalendarGateway for GoogleCalendarGateway {
    async fn list_calendars(
        &self,
        access_token: &str,
    ) -> Result<Vec<CalendarListEntry>, GatewayError> {
        let response = self
            .client
            .get(format!("{API_BASE}/users/me/calendarList"))
            .bearer_auth(access_token)
            .send()
            .await?;

        let page = Self::checked(response)
            .await?
            .json::<CalendarListPage>()
            .await?;

        log::debug!("fetched {} calendar list entries", page.items.len());

        Ok(page.items)
    }

    async fn list_events(
        &self,
        access_token: &str,
        calendar_id: &str,
        query: &EventQuery,
    ) -> Result<Vec<EventResource>, GatewayError> {
        let response = self
            .client
            .get(Self::events_url(calendar_id))
            .query(&build_query_parameters(query))
            .bearer_auth(access_token)
            .send()
            .await?;

        let page = Self::checked(response).await?.json::<EventsPage>().await?;

        log::debug!(
            "fetched {} events from calendar {calendar_id}",
            page.items.len()
        );

        Ok(page.items)
    }

    async fn get_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        event_id: &str,
    ) -> Result<EventResource, GatewayError> {
        let response = self
            .client
            .get(Self::event_url(calendar_id, event_id))
            .bearer_auth(access_token)
            .send()
            .await?;

        Ok(Self::checked(response).await?.json().await?)
    }

    async fn create_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        payload: &EventPayload,
    ) -> Result<EventResource, GatewayError> {
        let response = self
            .client
            .post(Self::events_url(calendar_id))
            .bearer_auth(access_token)
            .json(payload)
            .send()
            .await?;

        Ok(Self::checked(response).await?.json().await?)
    }

    async fn update_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        event_id: &str,
        payload: &EventPayload,
    ) -> Result<EventResource, GatewayError> {
        // PATCH, so omitted payload fields keep their provider-side values.
        let response = self
            .client
            .patch(Self::event_url(calendar_id, event_id))
            .bearer_auth(access_token)
            .json(payload)
            .send()
            .await?;

        Ok(Self::checked(response).await?.json().await?)
    }

    async fn delete_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        event_id: &str,
    ) -> Result<(), GatewayError> {
        let response = self
            .client
            .delete(Self::event_url(calendar_id, event_id))
            .bearer_auth(access_token)
            .send()
            .await?;

        Self::checked(response).await?;
        Ok(())
    }
}

fn build_query_parameters(query: &EventQuery) -> IndexMap<&'static str, String> {
    // Google requires rfc3339 format for the times with a fixed offset
    // see: https://developers.google.com/calendar/api/v3/reference/events/list
    IndexMap::from([
        // expand recurring events into single instances
        ("singleEvents", "true".to_owned()),
        // order ascending by start time
        ("orderBy", "startTime".to_owned()),
        (
            "timeMin",
            query.time_min.to_rfc3339_opts(SecondsFormat::Secs, true),
        ),
        ("maxResults", query.max_results.to_string()),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn build_query_parameters_formats_rfc3339_and_limits() {
        let query = EventQuery {
            time_min: Utc.with_ymd_and_hms(1996, 12, 20, 0, 39, 57).unwrap(),
            max_results: 30,
        };

        let expected = IndexMap::from([
            ("singleEvents", "true".to_owned()),
            ("orderBy", "startTime".to_owned()),
            ("timeMin", "1996-12-20T00:39:57Z".to_owned()),
            ("maxResults", "30".to_owned()),
        ]);

        assert_eq!(expected, build_query_parameters(&query));
    }

    #[test]
    fn urls_escape_calendar_and_event_ids() {
        assert_eq!(
            GoogleCalendarGateway::events_url("de.holidays#holiday@group.v.calendar.google.com"),
            format!(
                "{API_BASE}/calendars/de.holidays%23holiday%40group.v.calendar.google.com/events"
            )
        );
        assert_eq!(
            GoogleCalendarGateway::event_url("primary", "abc 123"),
            format!("{API_BASE}/calendars/primary/events/abc%20123")
        );
    }
}
