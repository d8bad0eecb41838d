pub mod trello;

use super::Result;
use async_trait::async_trait;
use std::sync::Arc;
use trello::TrelloClient;

/// A task card. Cards are fetched once per run and never modified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Card {
    /// Stable identifier, unique within the list.
    pub id: String,
    /// Display name, used as the event title.
    pub name: String,
    /// Start timestamp in UTC, e.g. `2025-06-01T10:00:00.000Z`.
    pub start: Option<String>,
    /// Due timestamp in UTC.
    pub due: Option<String>,
    /// The board the card belongs to.
    pub board_id: String,
    /// Link to the card.
    pub url: Option<String>,
}

impl From<trello::models::Card> for Card {
    fn from(card: trello::models::Card) -> Self {
        Self {
            id: card.id,
            name: card.name,
            start: card.start,
            due: card.due,
            board_id: card.id_board,
            url: card.url,
        }
    }
}

/// Trait that needs to be implemented by a source of cards.
#[async_trait]
pub trait TaskBoard: Send + Sync {
    /// Fetches the current cards of a list.
    async fn list_cards(&self, list_id: &str) -> Result<Vec<Card>>;

    /// Fetches the display name of a board.
    async fn board_name(&self, board_id: &str) -> Result<String>;
}

#[async_trait]
impl TaskBoard for TrelloClient {
    async fn list_cards(&self, list_id: &str) -> Result<Vec<Card>> {
        let cards = self.get_cards(list_id).await?;
        Ok(cards.into_iter().map(Into::into).collect())
    }

    async fn board_name(&self, board_id: &str) -> Result<String> {
        Ok(self.get_board(board_id).await?.name)
    }
}

#[async_trait]
impl<T> TaskBoard for Box<T>
where
    T: TaskBoard + ?Sized,
{
    async fn list_cards(&self, list_id: &str) -> Result<Vec<Card>> {
        (**self).list_cards(list_id).await
    }

    async fn board_name(&self, board_id: &str) -> Result<String> {
        (**self).board_name(board_id).await
    }
}

#[async_trait]
impl<T> TaskBoard for Arc<T>
where
    T: TaskBoard + ?Sized,
{
    async fn list_cards(&self, list_id: &str) -> Result<Vec<Card>> {
        (**self).list_cards(list_id).await
    }

    async fn board_name(&self, board_id: &str) -> Result<String> {
        (**self).board_name(board_id).await
    }
}
