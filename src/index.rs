//! Mapping from card id to the id of the event created for it.
//!
//! The index is rebuilt from the calendar at the start of every run; nothing is persisted
//! locally. If it cannot be built, the orchestrator may continue with an empty index, in which
//! case every card is created anew and previously created events are duplicated.

use crate::calendar::{DestinationEvent, EventPage, EventStore};
use crate::marker;
use crate::Result;
use std::collections::hash_map::Entry;
use std::collections::HashMap;

/// Card id to event id, built once per run and read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DestinationIndex {
    events: HashMap<String, String>,
}

impl DestinationIndex {
    /// Builds an index from already fetched events.
    pub fn from_events<'a, I>(events: I) -> DestinationIndex
    where
        I: IntoIterator<Item = &'a DestinationEvent>,
    {
        let mut index = DestinationIndex::default();
        events.into_iter().for_each(|event| index.insert(event));
        index
    }

    /// Returns the id of the event belonging to `card_id`.
    pub fn get(&self, card_id: &str) -> Option<&str> {
        self.events.get(card_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    fn insert(&mut self, event: &DestinationEvent) {
        let Some(id) = card_id(event) else {
            return;
        };

        match self.events.entry(id.to_owned()) {
            Entry::Occupied(existing) => log::warn!(
                "events {} and {} both belong to card {}; updating {} only",
                existing.get(),
                event.id,
                id,
                existing.get()
            ),
            Entry::Vacant(slot) => {
                slot.insert(event.id.clone());
            }
        }
    }
}

/// The card an event was created for, if any. The extended property takes precedence over the
/// description marker.
pub fn card_id(event: &DestinationEvent) -> Option<&str> {
    marker::decode_properties(&event.private_properties).or_else(|| {
        event
            .description
            .as_deref()
            .and_then(marker::decode_description)
    })
}

/// Fetches existing events page by page, at most `max_pages` pages of `page_size` events, and
/// indexes those that belong to a card.
pub async fn build_index<S>(store: &S, page_size: u32, max_pages: u32) -> Result<DestinationIndex>
where
    S: EventStore + ?Sized,
{
    let mut index = DestinationIndex::default();
    let mut page_token = None;
    let mut pages = 0;
    let mut seen = 0;

    loop {
        let EventPage {
            events,
            next_page_token,
        } = store.list_events(page_size, page_token.take()).await?;

        pages += 1;
        seen += events.len();
        events.iter().for_each(|event| index.insert(event));

        match next_page_token {
            None => break,
            Some(_) if pages >= max_pages => {
                log::warn!(
                    "stopped listing events after {} pages; events beyond that are not indexed \
                     and their cards will be created again",
                    pages
                );
                break;
            }
            token => page_token = token,
        }
    }

    log::debug!(
        "indexed {} of {} events in {} pages",
        index.len(),
        seen,
        pages
    );

    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::EventPayload;
    use crate::marker::{encode_description, encode_properties};
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    fn event(id: &str, description: Option<&str>) -> DestinationEvent {
        DestinationEvent {
            id: id.into(),
            description: description.map(Into::into),
            private_properties: BTreeMap::new(),
        }
    }

    /// A fake `EventStore` serving fixed pages and recording the requested page tokens.
    struct Pages {
        pages: Vec<EventPage>,
        requests: Mutex<Vec<Option<String>>>,
    }

    impl Pages {
        fn new(pages: Vec<Vec<DestinationEvent>>) -> Pages {
            let count = pages.len();
            let pages = pages
                .into_iter()
                .enumerate()
                .map(|(i, events)| EventPage {
                    events,
                    next_page_token: (i + 1 < count).then(|| format!("page-{}", i + 1)),
                })
                .collect();

            Pages {
                pages,
                requests: Mutex::default(),
            }
        }

        fn requests(&self) -> Vec<Option<String>> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EventStore for Pages {
        async fn list_events(&self, _: u32, page_token: Option<String>) -> Result<EventPage> {
            let page = match &page_token {
                None => 0,
                Some(token) => token.trim_start_matches("page-").parse().unwrap(),
            };
            self.requests.lock().unwrap().push(page_token);
            Ok(self.pages[page].clone())
        }

        async fn create_event(&self, _: &EventPayload) -> Result<DestinationEvent> {
            unimplemented!()
        }

        async fn update_event(&self, _: &str, _: &EventPayload) -> Result<DestinationEvent> {
            unimplemented!()
        }
    }

    #[test]
    fn index_from_markers() {
        let described = encode_description("c1", Some("https://trello.com/c/1"));
        let events = [
            event("e1", Some(&described)),
            event("e2", Some("Dentist")),
            event("e3", None),
        ];

        let index = DestinationIndex::from_events(&events);

        assert_eq!(index.len(), 1);
        assert_eq!(index.get("c1"), Some("e1"));
        assert_eq!(index.get("Dentist"), None);
    }

    #[test]
    fn extract_marker_with_url_line() {
        let event = event("e1", Some("TrelloカードID: ABC123\nURL: https://x"));
        assert_eq!(card_id(&event), Some("ABC123"));
    }

    #[test]
    fn property_takes_precedence() {
        let mut event = event("e1", Some(&encode_description("c2", None)));
        event.private_properties = encode_properties("c1");

        assert_eq!(card_id(&event), Some("c1"));
    }

    #[test]
    fn first_event_wins_for_duplicates() {
        let marker = encode_description("c1", None);
        let events = [event("e1", Some(&marker)), event("e2", Some(&marker))];

        let index = DestinationIndex::from_events(&events);

        assert_eq!(index.len(), 1);
        assert_eq!(index.get("c1"), Some("e1"));
    }

    #[tokio::test]
    async fn build_follows_pages() {
        let store = Pages::new(vec![
            vec![event("e1", Some(&encode_description("c1", None)))],
            vec![event("e2", Some("Lunch"))],
            vec![event("e3", Some(&encode_description("c3", None)))],
        ]);

        let index = build_index(&store, 1, 10).await.unwrap();

        assert_eq!(index.get("c1"), Some("e1"));
        assert_eq!(index.get("c3"), Some("e3"));
        assert_eq!(
            store.requests(),
            vec![None, Some("page-1".into()), Some("page-2".into())]
        );
    }

    #[tokio::test]
    async fn build_stops_at_page_cap() {
        let store = Pages::new(vec![
            vec![event("e1", Some(&encode_description("c1", None)))],
            vec![event("e2", Some(&encode_description("c2", None)))],
        ]);

        let index = build_index(&store, 1, 1).await.unwrap();

        assert_eq!(index.len(), 1);
        assert_eq!(index.get("c2"), None);
        assert_eq!(store.requests(), vec![None]);
    }

    #[tokio::test]
    async fn build_empty_calendar() {
        let store = Pages::new(vec![vec![]]);

        let index = build_index(&store, 2500, 10).await.unwrap();

        assert!(index.is_empty());
    }
}
