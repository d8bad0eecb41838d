use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub mod board;
pub mod calendar;
pub mod index;
pub mod labels;
pub mod marker;
pub mod normalize;
pub mod sync;

use normalize::TargetZone;

/// Result type used throughout this crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The error type returned by all fallible operations within this crate.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("config error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("trello error: {0}")]
    Board(#[from] board::trello::ClientError),
    #[error("google calendar error: {0}")]
    Calendar(#[from] calendar::google::ClientError),
}

impl Error {
    /// Returns `true` if the error means that one of the services rejected our credentials.
    /// Such errors always abort a run, regardless of the fetch error policy.
    pub fn is_auth(&self) -> bool {
        match self {
            Error::Board(err) => err.is_auth(),
            Error::Calendar(err) => err.is_auth(),
            _ => false,
        }
    }
}

/// Environment variables understood for compatibility with older deployments, mapped to their
/// configuration keys.
const LEGACY_ENV: [(&str, &str); 5] = [
    ("TRELLO_API_KEY", "trello.api_key"),
    ("TRELLO_TOKEN", "trello.token"),
    ("TRELLO_LIST_ID", "trello.list_id"),
    ("GOOGLE_CALENDAR_ID", "google.calendar_id"),
    ("SERVICE_ACCOUNT_JSON", "google.credentials_json"),
];

/// Trello configuration.
#[derive(Deserialize, Serialize, Clone)]
pub struct TrelloConfig {
    /// Trello API key.
    #[serde(default)]
    pub api_key: String,
    /// Trello API token belonging to the key.
    #[serde(default)]
    pub token: String,
    /// The list whose cards are projected onto the calendar.
    #[serde(default)]
    pub list_id: String,
    /// Base URL of the Trello REST API.
    #[serde(default = "default_trello_base_url")]
    pub base_url: String,
}

impl fmt::Debug for TrelloConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrelloConfig")
            .field("api_key", &"<redacted>")
            .field("token", &"<redacted>")
            .field("list_id", &self.list_id)
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Google Calendar configuration.
#[derive(Deserialize, Serialize, Clone)]
pub struct GoogleConfig {
    /// Calendar receiving the events.
    #[serde(default = "default_calendar_id")]
    pub calendar_id: String,
    /// Path to a service account key file.
    pub credentials_file: Option<PathBuf>,
    /// Contents of a service account key file.
    pub credentials_json: Option<String>,
    /// A pre-issued OAuth access token, e.g. obtained through an interactive consent flow.
    pub access_token: Option<String>,
    /// Base URL of the Google Calendar REST API.
    #[serde(default = "default_google_base_url")]
    pub base_url: String,
}

impl fmt::Debug for GoogleConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GoogleConfig")
            .field("calendar_id", &self.calendar_id)
            .field("credentials_file", &self.credentials_file)
            .field("credentials_json", &self.credentials_json.as_ref().map(|_| "<redacted>"))
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// The credential material used to authenticate against Google.
#[derive(Clone, PartialEq, Eq)]
pub enum GoogleCredentials {
    /// Service account key file on disk.
    ServiceAccountFile(PathBuf),
    /// Inline service account key.
    ServiceAccountJson(String),
    /// Bearer token issued out of band.
    AccessToken(String),
}

impl fmt::Debug for GoogleCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GoogleCredentials::ServiceAccountFile(path) => {
                f.debug_tuple("ServiceAccountFile").field(path).finish()
            }
            GoogleCredentials::ServiceAccountJson(_) => f.write_str("ServiceAccountJson(..)"),
            GoogleCredentials::AccessToken(_) => f.write_str("AccessToken(..)"),
        }
    }
}

impl GoogleConfig {
    /// Returns the single configured credential source. Setting none or more than one of
    /// `credentials_file`, `credentials_json` and `access_token` is a configuration error.
    pub fn credentials(&self) -> Result<GoogleCredentials> {
        let non_empty = |value: &Option<String>| value.clone().filter(|v| !v.trim().is_empty());

        let mut sources = Vec::new();
        if let Some(path) = self.credentials_file.clone() {
            sources.push(GoogleCredentials::ServiceAccountFile(path));
        }
        if let Some(json) = non_empty(&self.credentials_json) {
            sources.push(GoogleCredentials::ServiceAccountJson(json));
        }
        if let Some(token) = non_empty(&self.access_token) {
            sources.push(GoogleCredentials::AccessToken(token));
        }

        match sources.len() {
            0 => Err(Error::InvalidConfig(
                "no google credentials configured; set google.credentials_file, \
                 google.credentials_json (SERVICE_ACCOUNT_JSON) or google.access_token"
                    .into(),
            )),
            1 => Ok(sources.remove(0)),
            _ => Err(Error::InvalidConfig(
                "google.credentials_file, google.credentials_json and google.access_token are \
                 mutually exclusive"
                    .into(),
            )),
        }
    }
}

/// What to do when fetching the cards or the existing events fails.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum FetchErrorPolicy {
    /// Continue with an empty batch or an empty index and log a warning.
    #[default]
    Degrade,
    /// Abort the run.
    Fail,
}

/// Reconciliation settings.
#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(default)]
pub struct SyncConfig {
    /// IANA name of the timezone attached to event start and end times.
    pub timezone: String,
    /// Fixed offset from UTC, in hours, used to convert card timestamps.
    pub utc_offset_hours: i32,
    /// Prefix event titles with the name of the card's board.
    pub label_prefix: bool,
    /// Maximum number of cards dispatched concurrently.
    pub concurrency: usize,
    /// Number of events requested per page when building the index.
    pub index_page_size: u32,
    /// Maximum number of pages fetched when building the index.
    pub index_max_pages: u32,
    /// Behaviour when fetching cards or events fails.
    pub on_fetch_error: FetchErrorPolicy,
    /// Compute and log all decisions without creating or updating events.
    pub dry_run: bool,
    /// Timeout applied to every HTTP request.
    pub request_timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            timezone: "Asia/Tokyo".into(),
            utc_offset_hours: 9,
            label_prefix: true,
            concurrency: 1,
            index_page_size: 2500,
            index_max_pages: 10,
            on_fetch_error: FetchErrorPolicy::Degrade,
            dry_run: false,
            request_timeout_secs: 10,
        }
    }
}

/// Global application configuration.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct AppConfig {
    /// Trello configuration section.
    pub trello: TrelloConfig,
    /// Google Calendar configuration section.
    pub google: GoogleConfig,
    /// Reconciliation configuration section.
    #[serde(default)]
    pub sync: SyncConfig,
}

impl AppConfig {
    /// Loads the application configuration and validates it.
    ///
    /// Without an explicit `path` the files `config/default.toml`, `config/{APP_ENV}.toml` and
    /// `config/local.toml` are read if they exist. Environment variables prefixed with
    /// `CARDSYNC_` and the legacy variables in `LEGACY_ENV` take precedence over files.
    pub fn load(path: Option<&Path>) -> Result<AppConfig> {
        let builder = match path {
            Some(path) => {
                log::info!("loading configuration from {}", path.display());
                Config::builder().add_source(File::from(path))
            }
            None => {
                let app_env = env::var("APP_ENV").unwrap_or_else(|_| "production".into());
                log::info!("loading configuration using {} environment", app_env);

                Config::builder()
                    .add_source(File::with_name("config/default").required(false))
                    .add_source(File::with_name(&format!("config/{}", app_env)).required(false))
                    // Optional local config overrides from `config/local.toml` (on .gitignore).
                    .add_source(File::with_name("config/local").required(false))
            }
        };

        let builder = builder.add_source(
            Environment::with_prefix("CARDSYNC")
                .prefix_separator("_")
                .separator("__"),
        );

        let config: AppConfig = with_legacy_env(builder, |var| env::var(var).ok())?
            .build()?
            .try_deserialize()?;

        log::debug!("loaded configuration: {:?}", config);

        config.validate()?;
        Ok(config)
    }

    /// Checks everything that can be checked without talking to the services.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("trello.api_key", &self.trello.api_key),
            ("trello.token", &self.trello.token),
            ("trello.list_id", &self.trello.list_id),
            ("google.calendar_id", &self.google.calendar_id),
        ];

        for (key, value) in required {
            if value.trim().is_empty() {
                return Err(Error::InvalidConfig(format!("{key} must not be empty")));
            }
        }

        self.google.credentials()?;
        TargetZone::new(&self.sync.timezone, self.sync.utc_offset_hours)?;

        if self.sync.concurrency == 0 {
            return Err(Error::InvalidConfig("sync.concurrency must be at least 1".into()));
        }

        if !(1..=2500).contains(&self.sync.index_page_size) {
            return Err(Error::InvalidConfig(
                "sync.index_page_size must be between 1 and 2500".into(),
            ));
        }

        if self.sync.index_max_pages == 0 {
            return Err(Error::InvalidConfig("sync.index_max_pages must be at least 1".into()));
        }

        if self.sync.request_timeout_secs == 0 {
            return Err(Error::InvalidConfig(
                "sync.request_timeout_secs must be at least 1".into(),
            ));
        }

        Ok(())
    }
}

/// Applies the legacy variables found by `lookup` as overrides. Variables that are set but empty
/// are ignored so they cannot blank out values from files or `CARDSYNC_` variables.
fn with_legacy_env<F>(
    builder: ConfigBuilder<DefaultState>,
    lookup: F,
) -> Result<ConfigBuilder<DefaultState>>
where
    F: Fn(&str) -> Option<String>,
{
    LEGACY_ENV
        .iter()
        .try_fold(builder, |builder, (var, key)| {
            let value = lookup(var).filter(|value| !value.trim().is_empty());
            builder.set_override_option(*key, value)
        })
        .map_err(Error::from)
}

fn default_trello_base_url() -> String {
    "https://api.trello.com".into()
}

fn default_calendar_id() -> String {
    "primary".into()
}

fn default_google_base_url() -> String {
    "https://www.googleapis.com/calendar/v3".into()
}
