//! The link between a card and the event it was projected onto.
//!
//! Google Calendar has no foreign key field, so the card id is written twice: as a private
//! extended property and as a marker line in the event description. The description marker is
//! what older events carry, so it must stay readable by [`decode_description`] whenever
//! [`encode_description`] changes.

use std::collections::BTreeMap;

/// Prefix of the description line holding the card id.
pub const MARKER: &str = "TrelloカードID: ";

/// Key of the private extended property holding the card id.
pub const CARD_ID_PROPERTY: &str = "trelloCardId";

/// Builds an event description carrying `card_id`, followed by the card URL if there is one.
pub fn encode_description(card_id: &str, url: Option<&str>) -> String {
    match url {
        Some(url) if !url.is_empty() => format!("{MARKER}{card_id}\nURL: {url}"),
        _ => format!("{MARKER}{card_id}"),
    }
}

/// Extracts the card id from an event description. Returns `None` for descriptions that were
/// not written by this crate.
pub fn decode_description(description: &str) -> Option<&str> {
    let start = description.find(MARKER)? + MARKER.len();
    let card_id = description[start..]
        .lines()
        .next()
        .unwrap_or_default()
        .trim();

    (!card_id.is_empty()).then_some(card_id)
}

/// Builds the private extended properties carrying `card_id`.
pub fn encode_properties(card_id: &str) -> BTreeMap<String, String> {
    BTreeMap::from([(CARD_ID_PROPERTY.to_owned(), card_id.to_owned())])
}

/// Extracts the card id from private extended properties.
pub fn decode_properties(properties: &BTreeMap<String, String>) -> Option<&str> {
    properties
        .get(CARD_ID_PROPERTY)
        .map(|card_id| card_id.trim())
        .filter(|card_id| !card_id.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_with_url() {
        let description = format!("{MARKER}ABC123\nURL: https://x");
        assert_eq!(decode_description(&description), Some("ABC123"));
    }

    #[test]
    fn decode_without_url() {
        let description = format!("{MARKER}ABC123");
        assert_eq!(decode_description(&description), Some("ABC123"));
    }

    #[test]
    fn decode_after_user_text() {
        let description = format!("Bring slides\r\n{MARKER}5f1e2d \r\nURL: https://x");
        assert_eq!(decode_description(&description), Some("5f1e2d"));
    }

    #[test]
    fn decode_unmanaged() {
        assert_eq!(decode_description(""), None);
        assert_eq!(decode_description("Team lunch"), None);
        assert_eq!(decode_description("TrelloカードID:"), None);
        assert_eq!(decode_description(&format!("{MARKER}\nURL: https://x")), None);
    }

    #[test]
    fn encode_layout() {
        assert_eq!(
            encode_description("c1", Some("https://trello.com/c/abc")),
            "TrelloカードID: c1\nURL: https://trello.com/c/abc"
        );
        assert_eq!(encode_description("c1", None), "TrelloカードID: c1");
        assert_eq!(encode_description("c1", Some("")), "TrelloカードID: c1");
    }

    #[test]
    fn properties() {
        let properties = encode_properties("c1");
        assert_eq!(properties.get("trelloCardId").map(String::as_str), Some("c1"));
        assert_eq!(decode_properties(&properties), Some("c1"));

        assert_eq!(decode_properties(&BTreeMap::new()), None);
        let blank = BTreeMap::from([(CARD_ID_PROPERTY.to_owned(), " ".to_owned())]);
        assert_eq!(decode_properties(&blank), None);
    }

    #[test]
    fn encoded_descriptions_are_decodable() {
        for url in [None, Some("https://trello.com/c/abc/1-ship-report")] {
            let description = encode_description("60d5ecb8a1b2c3d4e5f60718", url);
            assert_eq!(
                decode_description(&description),
                Some("60d5ecb8a1b2c3d4e5f60718")
            );
        }
    }
}
