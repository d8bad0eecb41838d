use serde::Deserialize;

/// Card fields requested from the API.
pub const CARD_FIELDS: &str = "name,due,start,idBoard,url";

#[derive(Debug, Deserialize)]
#[serde(rename_all(deserialize = "camelCase"))]
pub struct Card {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub start: Option<String>,
    pub due: Option<String>,
    #[serde(default)]
    pub id_board: String,
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Board {
    pub id: String,
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserialize_cards() {
        let cards: Vec<Card> = serde_json::from_value(json!([
            {
                "id": "c1",
                "name": "Ship report",
                "due": "2025-03-10T09:00:00.000Z",
                "start": null,
                "idBoard": "b1",
                "url": "https://trello.com/c/abc/1-ship-report"
            },
            {
                "id": "c2",
                "name": "Someday",
                "due": null,
                "start": null,
                "idBoard": "b1"
            }
        ]))
        .unwrap();

        assert_eq!(cards.len(), 2);
        assert_eq!(cards[0].due.as_deref(), Some("2025-03-10T09:00:00.000Z"));
        assert_eq!(cards[0].start, None);
        assert_eq!(cards[0].id_board, "b1");
        assert_eq!(cards[1].due, None);
        assert_eq!(cards[1].url, None);
    }

    #[test]
    fn deserialize_card_with_missing_fields() {
        let card: Card = serde_json::from_value(json!({ "id": "c3" })).unwrap();

        assert_eq!(card.name, "");
        assert_eq!(card.id_board, "");
    }

    #[test]
    fn deserialize_board() {
        let board: Board =
            serde_json::from_value(json!({ "id": "b1", "name": "Work" })).unwrap();

        assert_eq!(board.name, "Work");
    }
}
