pub mod models;

use crate::GoogleCredentials;
use google_cloud_auth::credentials::CredentialsFile;
use google_cloud_auth::token::DefaultTokenSourceProvider;
use google_cloud_token::{TokenSource, TokenSourceProvider};
use http::Extensions;
use indexmap::IndexMap;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::{Request, Response, StatusCode, Url};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware, Middleware, Next, RequestBuilder};
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Read and write access to events.
const CALENDAR_SCOPE: &str = "https://www.googleapis.com/auth/calendar";

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Error while authenticating with google.
    #[error("failed to authenticate: {0}")]
    GCloudAuth(#[from] google_cloud_auth::error::Error),

    /// Error while making a http request.
    #[error("failure requesting remote resource: {0}")]
    Request(#[from] reqwest::Error),

    /// Error while executing some middleware code.
    #[error("request middleware failed with: {0}")]
    RequestMiddleware(String),

    /// Error while building http headers.
    #[error("encountered invalid HTTP header value: {0}")]
    InvalidHeaderValue(#[from] reqwest::header::InvalidHeaderValue),

    /// Error while obtaining an authentication token.
    #[error("failed to obtain authentication token: {0}")]
    Token(String),

    /// The configured base URL cannot be used.
    #[error("invalid base URL: {0}")]
    InvalidUrl(String),

    /// Google rejected the access token.
    #[error("google rejected the credentials")]
    Unauthorized,
}

impl ClientError {
    /// Returns `true` for credential problems.
    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            ClientError::GCloudAuth(_) | ClientError::Token(_) | ClientError::Unauthorized
        )
    }
}

impl From<ClientError> for reqwest_middleware::Error {
    fn from(err: ClientError) -> Self {
        reqwest_middleware::Error::Middleware(anyhow::Error::new(err))
    }
}

impl From<reqwest_middleware::Error> for ClientError {
    fn from(err: reqwest_middleware::Error) -> Self {
        match err {
            reqwest_middleware::Error::Reqwest(err) => ClientError::Request(err),
            // Recover errors raised by our own middleware, e.g. token failures.
            reqwest_middleware::Error::Middleware(err) => match err.downcast::<ClientError>() {
                Ok(err) => err,
                Err(err) => ClientError::RequestMiddleware(err.to_string()),
            },
        }
    }
}

struct AuthMiddleware {
    token_source: Arc<dyn TokenSource>,
}

impl AuthMiddleware {
    fn new(token_source: Arc<dyn TokenSource>) -> AuthMiddleware {
        AuthMiddleware { token_source }
    }
}

#[async_trait::async_trait]
impl Middleware for AuthMiddleware {
    async fn handle(
        &self,
        mut req: Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> reqwest_middleware::Result<Response> {
        let token = self
            .token_source
            .token()
            .await
            .map_err(|err| ClientError::Token(err.to_string()))?;

        let mut header = HeaderValue::try_from(token).map_err(ClientError::from)?;
        header.set_sensitive(true);
        req.headers_mut().insert(AUTHORIZATION, header);
        next.run(req, extensions).await
    }
}

/// Token source for an access token obtained out of band.
struct StaticTokenSource {
    authorization: String,
}

impl fmt::Debug for StaticTokenSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StaticTokenSource(..)")
    }
}

#[async_trait::async_trait]
impl TokenSource for StaticTokenSource {
    async fn token(&self) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.authorization.clone())
    }
}

async fn token_source(
    credentials: &GoogleCredentials,
) -> Result<Arc<dyn TokenSource>, ClientError> {
    let scopes = [CALENDAR_SCOPE];
    let config = google_cloud_auth::project::Config::default().with_scopes(&scopes);

    let credentials_file = match credentials {
        GoogleCredentials::AccessToken(token) => {
            return Ok(Arc::new(StaticTokenSource {
                authorization: format!("Bearer {token}"),
            }));
        }
        GoogleCredentials::ServiceAccountFile(path) => {
            CredentialsFile::new_from_file(path.to_string_lossy().into_owned()).await?
        }
        GoogleCredentials::ServiceAccountJson(json) => CredentialsFile::new_from_str(json).await?,
    };

    let provider =
        DefaultTokenSourceProvider::new_with_credentials(config, Box::new(credentials_file))
            .await?;

    Ok(provider.token_source())
}

/// Google calendar client for reading and writing the events of a single calendar.
#[derive(Debug)]
pub struct GoogleCalendarClient {
    client: ClientWithMiddleware,
    base_url: Url,
    calendar_id: String,
}

impl GoogleCalendarClient {
    /// Creates a new google calendar client for `calendar_id`. One token is requested right away
    /// so that unusable credentials are reported before any other work is done.
    pub async fn new(
        calendar_id: &str,
        base_url: &str,
        credentials: &GoogleCredentials,
        timeout: Duration,
    ) -> Result<GoogleCalendarClient, ClientError> {
        let base_url =
            Url::parse(base_url).map_err(|err| ClientError::InvalidUrl(err.to_string()))?;

        if base_url.cannot_be_a_base() {
            return Err(ClientError::InvalidUrl(base_url.to_string()));
        }

        let token_source = token_source(credentials).await?;
        token_source
            .token()
            .await
            .map_err(|err| ClientError::Token(err.to_string()))?;

        let client = ClientBuilder::new(
            reqwest::Client::builder()
                .user_agent(concat!("cardsync/", env!("CARGO_PKG_VERSION")))
                .timeout(timeout)
                .build()?,
        )
        .with(AuthMiddleware::new(token_source))
        .build();

        Ok(GoogleCalendarClient {
            client,
            base_url,
            calendar_id: calendar_id.to_owned(),
        })
    }

    /// Lists one page of events, limited to `page_size` results and to the fields in
    /// [`models::LIST_FIELDS`]. Returns the token for the next page, if there is one.
    pub async fn get_events(
        &self,
        page_size: u32,
        next_page_token: Option<String>,
    ) -> Result<(Vec<models::Event>, Option<String>), ClientError> {
        let query = build_query_parameters(page_size, &next_page_token);

        let events: models::Events =
            execute(self.client.get(self.events_url(None)?).query(&query)).await?;

        log::debug!("fetched {} events from Google Calendar", events.items.len());

        Ok((events.items, events.next_page_token))
    }

    /// Inserts a new event.
    pub async fn insert_event(&self, body: &models::EventBody) -> Result<models::Event, ClientError> {
        execute(self.client.post(self.events_url(None)?).json(body)).await
    }

    /// Replaces an existing event.
    pub async fn update_event(
        &self,
        event_id: &str,
        body: &models::EventBody,
    ) -> Result<models::Event, ClientError> {
        execute(self.client.put(self.events_url(Some(event_id))?).json(body)).await
    }

    fn events_url(&self, event_id: Option<&str>) -> Result<Url, ClientError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| ClientError::InvalidUrl(self.base_url.to_string()))?;
            segments
                .pop_if_empty()
                .extend(["calendars", self.calendar_id.as_str(), "events"]);
            if let Some(event_id) = event_id {
                segments.push(event_id);
            }
        }
        Ok(url)
    }
}

async fn execute<T>(request: RequestBuilder) -> Result<T, ClientError>
where
    T: DeserializeOwned,
{
    let response = request.send().await?;

    if response.status() == StatusCode::UNAUTHORIZED {
        return Err(ClientError::Unauthorized);
    }

    Ok(response.error_for_status()?.json::<T>().await?)
}

fn build_query_parameters(
    page_size: u32,
    next_page_token: &Option<String>,
) -> IndexMap<&'static str, String> {
    let mut query_parameters: IndexMap<&'static str, String> = IndexMap::from([
        ("maxResults", page_size.to_string()),
        // keep the payload small, we only need ids and markers
        ("fields", models::LIST_FIELDS.to_owned()),
        ("showDeleted", "false".to_owned()),
    ]);

    if let Some(token) = next_page_token {
        // page token returned by previous request to fetch the next page
        query_parameters.insert("pageToken", token.clone());
    }

    query_parameters
}
