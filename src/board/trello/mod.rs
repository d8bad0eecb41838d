pub mod models;

use crate::TrelloConfig;
use indexmap::IndexMap;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Error while making a http request.
    #[error("failure requesting remote resource: {0}")]
    Request(#[from] reqwest::Error),

    /// Error while building http headers.
    #[error("encountered invalid HTTP header value: {0}")]
    InvalidHeaderValue(#[from] reqwest::header::InvalidHeaderValue),

    /// The configured base URL cannot be used.
    #[error("invalid base URL: {0}")]
    InvalidUrl(String),

    /// Trello rejected the API key or token.
    #[error("trello rejected the API key or token")]
    Unauthorized,
}

impl ClientError {
    /// Returns `true` for credential problems.
    pub fn is_auth(&self) -> bool {
        matches!(self, ClientError::Unauthorized)
    }
}

/// Client for the parts of the Trello REST API needed to read a list.
#[derive(Debug)]
pub struct TrelloClient {
    client: reqwest::Client,
    base_url: Url,
}

impl TrelloClient {
    /// Creates a new client. The key and token are sent in an `Authorization` header rather than
    /// as query parameters so they never end up in logged URLs.
    pub fn new(config: &TrelloConfig, timeout: Duration) -> Result<TrelloClient, ClientError> {
        let base_url =
            Url::parse(&config.base_url).map_err(|err| ClientError::InvalidUrl(err.to_string()))?;

        if base_url.cannot_be_a_base() {
            return Err(ClientError::InvalidUrl(config.base_url.clone()));
        }

        let mut auth = HeaderValue::from_str(&authorization(&config.api_key, &config.token))?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(TrelloClient { client, base_url })
    }

    /// Fetches all open cards of a list.
    pub async fn get_cards(&self, list_id: &str) -> Result<Vec<models::Card>, ClientError> {
        let cards: Vec<models::Card> = self
            .get(&["1", "lists", list_id, "cards"], &build_card_query())
            .await?;

        log::debug!("fetched {} cards from Trello list {}", cards.len(), list_id);

        Ok(cards)
    }

    /// Fetches the name of a board.
    pub async fn get_board(&self, board_id: &str) -> Result<models::Board, ClientError> {
        let query = IndexMap::from([("fields", "name".to_owned())]);
        self.get(&["1", "boards", board_id], &query).await
    }

    async fn get<T>(
        &self,
        segments: &[&str],
        query: &IndexMap<&'static str, String>,
    ) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
    {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);

        let response = self.client.get(url).query(query).send().await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(ClientError::Unauthorized);
        }

        Ok(response.error_for_status()?.json::<T>().await?)
    }
}

fn authorization(api_key: &str, token: &str) -> String {
    format!(r#"OAuth oauth_consumer_key="{api_key}", oauth_token="{token}""#)
}

fn build_card_query() -> IndexMap<&'static str, String> {
    IndexMap::from([("fields", models::CARD_FIELDS.to_owned())])
}
