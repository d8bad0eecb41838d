pub mod google;

use super::Result;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use google::GoogleCalendarClient;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Format of event start and end times. The offset is given separately as a timezone name.
const DATE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// An existing calendar event, reduced to what is needed to recognise which card it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DestinationEvent {
    /// Identifier assigned by the calendar service.
    pub id: String,
    /// Free text description which may hold a card marker.
    pub description: Option<String>,
    /// Private extended properties, which may hold the card id.
    pub private_properties: BTreeMap<String, String>,
}

impl From<google::models::Event> for DestinationEvent {
    fn from(ev: google::models::Event) -> Self {
        Self {
            id: ev.id,
            description: ev.description,
            private_properties: ev.extended_properties.unwrap_or_default().private,
        }
    }
}

/// Everything written to the calendar for a single card. Updates replace all of these fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventPayload {
    /// Event title.
    pub title: String,
    /// Event description including the card marker.
    pub description: String,
    /// Local start time in `time_zone`.
    pub start: NaiveDateTime,
    /// Local end time in `time_zone`. Not guaranteed to be after `start`.
    pub end: NaiveDateTime,
    /// IANA timezone name.
    pub time_zone: &'static str,
    /// Private extended properties including the card id.
    pub private_properties: BTreeMap<String, String>,
}

impl EventPayload {
    /// Start time as sent to the calendar, e.g. `2025-03-10T18:00:00`.
    pub fn start_date_time(&self) -> String {
        self.start.format(DATE_TIME_FORMAT).to_string()
    }

    /// End time as sent to the calendar.
    pub fn end_date_time(&self) -> String {
        self.end.format(DATE_TIME_FORMAT).to_string()
    }
}

impl fmt::Display for EventPayload {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.title.fmt(f)
    }
}

impl From<&EventPayload> for google::models::EventBody {
    fn from(payload: &EventPayload) -> Self {
        let date_time = |date_time: String| google::models::EventDateTime {
            date_time,
            time_zone: payload.time_zone.to_owned(),
        };

        Self {
            summary: payload.title.clone(),
            description: payload.description.clone(),
            start: date_time(payload.start_date_time()),
            end: date_time(payload.end_date_time()),
            extended_properties: google::models::ExtendedProperties {
                private: payload.private_properties.clone(),
            },
        }
    }
}

/// One page of existing events.
#[derive(Debug, Clone, Default)]
pub struct EventPage {
    pub events: Vec<DestinationEvent>,
    /// Token for requesting the following page, `None` on the last page.
    pub next_page_token: Option<String>,
}

/// Trait that needs to be implemented by a calendar that cards are projected onto.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Lists up to `page_size` existing events, starting at `page_token`.
    async fn list_events(&self, page_size: u32, page_token: Option<String>) -> Result<EventPage>;

    /// Creates a new event.
    async fn create_event(&self, payload: &EventPayload) -> Result<DestinationEvent>;

    /// Replaces the event `event_id` with `payload`.
    async fn update_event(&self, event_id: &str, payload: &EventPayload)
        -> Result<DestinationEvent>;
}

#[async_trait]
impl EventStore for GoogleCalendarClient {
    async fn list_events(&self, page_size: u32, page_token: Option<String>) -> Result<EventPage> {
        let (events, next_page_token) = self.get_events(page_size, page_token).await?;

        Ok(EventPage {
            events: events.into_iter().map(Into::into).collect(),
            next_page_token,
        })
    }

    async fn create_event(&self, payload: &EventPayload) -> Result<DestinationEvent> {
        let event = self.insert_event(&payload.into()).await?;
        Ok(event.into())
    }

    async fn update_event(
        &self,
        event_id: &str,
        payload: &EventPayload,
    ) -> Result<DestinationEvent> {
        let event = GoogleCalendarClient::update_event(self, event_id, &payload.into()).await?;
        Ok(event.into())
    }
}

#[async_trait]
impl<T> EventStore for Box<T>
where
    T: EventStore + ?Sized,
{
    async fn list_events(&self, page_size: u32, page_token: Option<String>) -> Result<EventPage> {
        (**self).list_events(page_size, page_token).await
    }

    async fn create_event(&self, payload: &EventPayload) -> Result<DestinationEvent> {
        (**self).create_event(payload).await
    }

    async fn update_event(
        &self,
        event_id: &str,
        payload: &EventPayload,
    ) -> Result<DestinationEvent> {
        (**self).update_event(event_id, payload).await
    }
}

#[async_trait]
impl<T> EventStore for Arc<T>
where
    T: EventStore + ?Sized,
{
    async fn list_events(&self, page_size: u32, page_token: Option<String>) -> Result<EventPage> {
        (**self).list_events(page_size, page_token).await
    }

    async fn create_event(&self, payload: &EventPayload) -> Result<DestinationEvent> {
        (**self).create_event(payload).await
    }

    async fn update_event(
        &self,
        event_id: &str,
        payload: &EventPayload,
    ) -> Result<DestinationEvent> {
        (**self).update_event(event_id, payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marker;
    use chrono::NaiveDate;
    use serde_json::json;

    fn at(h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 10)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    #[test]
    fn payload_to_google_body() {
        let payload = EventPayload {
            title: "[Work] Ship report".into(),
            description: marker::encode_description("c1", None),
            start: at(9),
            end: at(18),
            time_zone: "Asia/Tokyo",
            private_properties: marker::encode_properties("c1"),
        };

        let body: google::models::EventBody = (&payload).into();

        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({
                "summary": "[Work] Ship report",
                "description": "TrelloカードID: c1",
                "start": { "dateTime": "2025-03-10T09:00:00", "timeZone": "Asia/Tokyo" },
                "end": { "dateTime": "2025-03-10T18:00:00", "timeZone": "Asia/Tokyo" },
                "extendedProperties": { "private": { "trelloCardId": "c1" } }
            })
        );
    }

    #[test]
    fn google_event_to_destination_event() {
        let event: google::models::Event = serde_json::from_value(json!({
            "id": "e1",
            "description": "TrelloカードID: c1",
        }))
        .unwrap();

        assert_eq!(
            DestinationEvent::from(event),
            DestinationEvent {
                id: "e1".into(),
                description: Some("TrelloカードID: c1".into()),
                private_properties: BTreeMap::new(),
            }
        );
    }
}
