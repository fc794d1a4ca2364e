use serde::{Deserialize, Serialize};

/// Start or end of an event. Timed events carry `date_time`, all-day events
/// only `date`.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EventTime {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

/// An event as returned by the calendar API. Only the fields this
/// application reads are modeled; the rest of the payload is dropped on
/// deserialization.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EventResource {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<EventTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<EventTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html_link: Option<String>,
}

/// One page of an event listing.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct EventsPage {
    #[serde(default)]
    pub items: Vec<EventResource>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// Entry of the account's calendar list.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CalendarListEntry {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default)]
    pub access_role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary: Option<bool>,
}

/// One page of the calendar list.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CalendarListPage {
    #[serde(default)]
    pub items: Vec<CalendarListEntry>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timed_event_deserializes() {
        let event: EventResource = serde_json::from_str(
            r#"{
                "id": "abc123",
                "status": "confirmed",
                "summary": "Standup",
                "start": {"dateTime": "2024-01-10T09:00:00+01:00", "timeZone": "Europe/Berlin"},
                "end": {"dateTime": "2024-01-10T09:30:00+01:00", "timeZone": "Europe/Berlin"},
                "htmlLink": "https://www.google.com/calendar/event?eid=abc"
            }"#,
        )
        .unwrap();

        assert_eq!(event.id, "abc123");
        assert_eq!(
            event.start.unwrap().date_time.as_deref(),
            Some("2024-01-10T09:00:00+01:00")
        );
        assert!(event.description.is_none());
    }

    #[test]
    fn all_day_event_has_only_date() {
        let event: EventResource = serde_json::from_str(
            r#"{
                "id": "allday",
                "start": {"date": "2024-01-10"},
                "end": {"date": "2024-01-11"}
            }"#,
        )
        .unwrap();

        let start = event.start.unwrap();
        assert_eq!(start.date.as_deref(), Some("2024-01-10"));
        assert_eq!(start.date_time, None);
    }

    #[test]
    fn calendar_list_page_deserializes() {
        let page: CalendarListPage = serde_json::from_str(
            r#"{
                "items": [
                    {"id": "primary-cal@example.com", "summary": "Personal", "accessRole": "owner", "primary": true},
                    {"id": "de.holidays#holiday@group.v.calendar.google.com", "summary": "Holidays", "accessRole": "reader"}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].access_role, "owner");
        assert_eq!(page.items[0].primary, Some(true));
        assert_eq!(page.items[1].primary, None);
    }
}
