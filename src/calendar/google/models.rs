use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Partial response requested when listing events. Only what is needed to recognise events
/// written by this crate.
pub const LIST_FIELDS: &str = "items(id,description,extendedProperties),nextPageToken";

#[derive(Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct ExtendedProperties {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub private: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all(deserialize = "camelCase"))]
pub struct Event {
    pub id: String,
    pub description: Option<String>,
    pub extended_properties: Option<ExtendedProperties>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all(deserialize = "camelCase"))]
pub struct Events {
    #[serde(default)]
    pub items: Vec<Event>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct EventDateTime {
    /// Local date and time without offset, interpreted in `time_zone`.
    pub date_time: String,
    pub time_zone: String,
}

/// Request body for inserting and updating events.
#[derive(Debug, Serialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct EventBody {
    pub summary: String,
    pub description: String,
    pub start: EventDateTime,
    pub end: EventDateTime,
    pub extended_properties: ExtendedProperties,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserialize_partial_events() {
        let events: Events = serde_json::from_value(json!({
            "items": [
                {
                    "id": "e1",
                    "description": "TrelloカードID: c1\nURL: https://x",
                    "extendedProperties": { "private": { "trelloCardId": "c1" } }
                },
                { "id": "e2" }
            ],
            "nextPageToken": "page-2"
        }))
        .unwrap();

        assert_eq!(events.items.len(), 2);
        assert_eq!(
            events.items[0].extended_properties.as_ref().unwrap().private["trelloCardId"],
            "c1"
        );
        assert_eq!(events.items[1].description, None);
        assert_eq!(events.next_page_token.as_deref(), Some("page-2"));
    }

    #[test]
    fn deserialize_empty_calendar() {
        let events: Events = serde_json::from_value(json!({})).unwrap();

        assert!(events.items.is_empty());
        assert_eq!(events.next_page_token, None);
    }

    #[test]
    fn serialize_event_body() {
        let body = EventBody {
            summary: "[Work] Ship report".into(),
            description: "TrelloカードID: c1".into(),
            start: EventDateTime {
                date_time: "2025-03-10T18:00:00".into(),
                time_zone: "Asia/Tokyo".into(),
            },
            end: EventDateTime {
                date_time: "2025-03-10T18:00:00".into(),
                time_zone: "Asia/Tokyo".into(),
            },
            extended_properties: ExtendedProperties {
                private: BTreeMap::from([("trelloCardId".into(), "c1".into())]),
            },
        };

        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({
                "summary": "[Work] Ship report",
                "description": "TrelloカードID: c1",
                "start": { "dateTime": "2025-03-10T18:00:00", "timeZone": "Asia/Tokyo" },
                "end": { "dateTime": "2025-03-10T18:00:00", "timeZone": "Asia/Tokyo" },
                "extendedProperties": { "private": { "trelloCardId": "c1" } }
            })
        );
    }
}
