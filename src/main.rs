use anyhow::Context;
use cardsync::board::trello::TrelloClient;
use cardsync::calendar::google::GoogleCalendarClient;
use cardsync::sync::Syncer;
use cardsync::AppConfig;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the config file; without it `config/*.toml` and the environment are used
    #[arg(long, value_name = "FILE", env = "CARDSYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Log what would be created or updated without changing the calendar
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref()).context("invalid configuration")?;

    if cli.dry_run {
        log::info!("dry run is enabled; the calendar will not be changed");
        config.sync.dry_run = true;
    }

    let timeout = Duration::from_secs(config.sync.request_timeout_secs);

    let board = TrelloClient::new(&config.trello, timeout)?;
    let calendar = GoogleCalendarClient::new(
        &config.google.calendar_id,
        &config.google.base_url,
        &config.google.credentials()?,
        timeout,
    )
    .await
    .context("failed to authenticate with google calendar")?;

    let syncer = Syncer::new(&config, Arc::new(board), Arc::new(calendar))?;
    let summary = syncer.run_once().await?;

    log::info!("synchronization finished: {summary}");

    Ok(())
}
