//! Reconciliation of the cards of a list with the events of a calendar.
//!
//! Every run lists the cards, rebuilds the [`DestinationIndex`] from the calendar and then
//! decides per card whether to create an event, update the existing one or skip the card. Cards
//! are independent of each other: a failing card is logged and counted, never retried within the
//! run and never aborts the batch. Rejected credentials are the exception and end the run.

use crate::board::{Card, TaskBoard};
use crate::calendar::{EventPayload, EventStore};
use crate::index::{build_index, DestinationIndex};
use crate::labels::LabelResolver;
use crate::normalize::TargetZone;
use crate::{marker, AppConfig, Error, FetchErrorPolicy, Result, SyncConfig};
use chrono::{NaiveDateTime, NaiveTime};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{Id, JoinSet};

/// Start time used when a card has a start date but no start time.
fn default_start_time() -> NaiveTime {
    NaiveTime::from_hms_opt(9, 0, 0).unwrap_or_default()
}

/// End time used when a card has a due date but no due time.
fn default_end_time() -> NaiveTime {
    NaiveTime::from_hms_opt(18, 0, 0).unwrap_or_default()
}

/// Computes the local start and end of the event for `card`, or `None` if the card must be
/// skipped because its start or due date is missing or unparsable.
///
/// Cards without a start are anchored at their due date. The end is not checked to be after
/// the start.
pub fn schedule(card: &Card, zone: &TargetZone) -> Option<(NaiveDateTime, NaiveDateTime)> {
    let start = card
        .start
        .as_deref()
        .filter(|start| !start.is_empty())
        .or(card.due.as_deref());

    let start = zone.normalize(start);
    let due = zone.normalize(card.due.as_deref());

    let (Some(start_date), Some(due_date)) = (start.date, due.date) else {
        return None;
    };

    Some((
        start_date.and_time(start.time.unwrap_or_else(default_start_time)),
        due_date.and_time(due.time.unwrap_or_else(default_end_time)),
    ))
}

/// Builds the event written for `card`, optionally prefixing the title with `label`.
pub fn event_payload(
    card: &Card,
    label: Option<&str>,
    (start, end): (NaiveDateTime, NaiveDateTime),
    zone: &TargetZone,
) -> EventPayload {
    let title = match label {
        Some(label) => format!("[{label}] {}", card.name),
        None => card.name.clone(),
    };

    EventPayload {
        title,
        description: marker::encode_description(&card.id, card.url.as_deref()),
        start,
        end,
        time_zone: zone.label(),
        private_properties: marker::encode_properties(&card.id),
    }
}

/// Plans the event for `card` without any I/O. `None` means the card is skipped.
pub fn plan_event(card: &Card, label: Option<&str>, zone: &TargetZone) -> Option<EventPayload> {
    schedule(card, zone).map(|span| event_payload(card, label, span, zone))
}

/// What happened to a single card.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    /// The card has no usable dates.
    Skipped,
    /// A new event was created.
    Created,
    /// The existing event was replaced.
    Updated,
    /// Creating or updating the event failed.
    Failed,
}

/// Counts of a single run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub fetched: usize,
    pub skipped: usize,
    pub created: usize,
    pub updated: usize,
    pub failed: usize,
    /// In a dry run, `created` and `updated` count the calls that would have been made.
    pub dry_run: bool,
}

impl SyncSummary {
    fn record(&mut self, outcome: ItemOutcome) {
        match outcome {
            ItemOutcome::Skipped => self.skipped += 1,
            ItemOutcome::Created => self.created += 1,
            ItemOutcome::Updated => self.updated += 1,
            ItemOutcome::Failed => self.failed += 1,
        }
    }
}

impl fmt::Display for SyncSummary {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} cards: {} created, {} updated, {} skipped, {} failed",
            self.fetched, self.created, self.updated, self.skipped, self.failed
        )?;

        if self.dry_run {
            f.write_str(" (dry run)")?;
        }

        Ok(())
    }
}

/// Decides and carries out create, update or skip for each card.
#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn EventStore>,
    labels: Option<Arc<LabelResolver>>,
    zone: TargetZone,
    concurrency: usize,
    dry_run: bool,
}

impl Reconciler {
    /// Creates a sequential `Reconciler` writing to `store` without title labels.
    pub fn new(store: Arc<dyn EventStore>, zone: TargetZone) -> Reconciler {
        Reconciler {
            store,
            labels: None,
            zone,
            concurrency: 1,
            dry_run: false,
        }
    }

    /// Prefix event titles with labels from `labels`.
    pub fn with_labels(mut self, labels: Arc<LabelResolver>) -> Reconciler {
        self.labels = Some(labels);
        self
    }

    /// Process up to `concurrency` cards at the same time.
    pub fn with_concurrency(mut self, concurrency: usize) -> Reconciler {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Only log what would be done.
    pub fn with_dry_run(mut self, dry_run: bool) -> Reconciler {
        self.dry_run = dry_run;
        self
    }

    /// Reconciles all `cards` against `index`. The index must have been built before and is not
    /// updated with events created during this call.
    ///
    /// Per-card failures are counted. An authentication failure aborts the remaining cards and
    /// is returned, since every other card would fail the same way.
    pub async fn reconcile(
        &self,
        cards: Vec<Card>,
        index: Arc<DestinationIndex>,
    ) -> Result<SyncSummary> {
        let mut summary = SyncSummary {
            fetched: cards.len(),
            dry_run: self.dry_run,
            ..Default::default()
        };

        let permits = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();
        let mut names = HashMap::new();

        for card in cards {
            let reconciler = self.clone();
            let index = index.clone();
            let permits = permits.clone();
            let name = card.name.clone();

            let task = tasks.spawn(async move {
                let _permit = permits.acquire_owned().await;
                reconciler.reconcile_card(&card, &index).await
            });
            names.insert(task.id(), name);
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((_, Ok(outcome))) => summary.record(outcome),
                Ok((id, Err(err))) => {
                    log::error!(
                        "aborting run, credentials were rejected while reconciling {}",
                        task_name(&names, id)
                    );
                    tasks.abort_all();
                    return Err(err);
                }
                Err(err) => {
                    log::error!(
                        "reconciling {} did not complete: {err}",
                        task_name(&names, err.id())
                    );
                    summary.record(ItemOutcome::Failed);
                }
            }
        }

        Ok(summary)
    }

    /// Reconciles a single card. Only authentication failures are returned as errors; any other
    /// failure is logged and reported as [`ItemOutcome::Failed`].
    pub async fn reconcile_card(
        &self,
        card: &Card,
        index: &DestinationIndex,
    ) -> Result<ItemOutcome> {
        let Some(span) = schedule(card, &self.zone) else {
            log::info!("skipping {}: missing or invalid dates", card.name);
            return Ok(ItemOutcome::Skipped);
        };

        let label = match &self.labels {
            Some(labels) => Some(labels.resolve(&card.board_id).await),
            None => None,
        };

        let payload = event_payload(card, label.as_deref(), span, &self.zone);
        let existing = index.get(&card.id);

        if self.dry_run {
            return Ok(match existing {
                Some(event_id) => {
                    log::info!("would update event {event_id}: {payload}");
                    ItemOutcome::Updated
                }
                None => {
                    log::info!("would create event: {payload}");
                    ItemOutcome::Created
                }
            });
        }

        let outcome = match existing {
            Some(event_id) => match self.store.update_event(event_id, &payload).await {
                Ok(_) => {
                    log::info!("updated event {event_id}: {payload}");
                    ItemOutcome::Updated
                }
                Err(err) if err.is_auth() => return Err(err),
                Err(err) => {
                    log::error!("failed to update event for {}: {err}", card.name);
                    ItemOutcome::Failed
                }
            },
            None => match self.store.create_event(&payload).await {
                Ok(event) => {
                    log::info!("created event {}: {payload}", event.id);
                    ItemOutcome::Created
                }
                Err(err) if err.is_auth() => return Err(err),
                Err(err) => {
                    log::error!("failed to create event for {}: {err}", card.name);
                    ItemOutcome::Failed
                }
            },
        };

        Ok(outcome)
    }
}

fn task_name(names: &HashMap<Id, String>, id: Id) -> &str {
    names.get(&id).map_or("a card", String::as_str)
}

/// Runs the whole job: fetch cards, build the index, reconcile.
pub struct Syncer {
    board: Arc<dyn TaskBoard>,
    store: Arc<dyn EventStore>,
    list_id: String,
    zone: TargetZone,
    settings: SyncConfig,
}

impl Syncer {
    /// Creates a new `Syncer` from configuration.
    pub fn new(
        config: &AppConfig,
        board: Arc<dyn TaskBoard>,
        store: Arc<dyn EventStore>,
    ) -> Result<Syncer> {
        Ok(Syncer {
            board,
            store,
            list_id: config.trello.list_id.clone(),
            zone: TargetZone::new(&config.sync.timezone, config.sync.utc_offset_hours)?,
            settings: config.sync.clone(),
        })
    }

    /// Synchronizes the list once. Only authentication failures, and fetch failures under
    /// [`FetchErrorPolicy::Fail`], are returned as errors.
    pub async fn run_once(&self) -> Result<SyncSummary> {
        log::info!("synchronizing cards of list {}", self.list_id);

        let cards = match self.board.list_cards(&self.list_id).await {
            Ok(cards) => cards,
            Err(err) => self.degrade(
                err,
                "continuing without cards, nothing will be synchronized in this run",
            )?,
        };

        if cards.is_empty() {
            log::info!("no cards to synchronize");
            return Ok(SyncSummary {
                dry_run: self.settings.dry_run,
                ..Default::default()
            });
        }

        let index = match build_index(
            self.store.as_ref(),
            self.settings.index_page_size,
            self.settings.index_max_pages,
        )
        .await
        {
            Ok(index) => index,
            Err(err) => self.degrade(
                err,
                "continuing with an empty index, every card will be created as a new event and \
                 may duplicate events created by earlier runs",
            )?,
        };

        log::info!(
            "fetched {} cards, {} of them already have an event",
            cards.len(),
            cards.iter().filter(|card| index.get(&card.id).is_some()).count()
        );

        self.reconciler().reconcile(cards, Arc::new(index)).await
    }

    /// A fresh reconciler per run, so board labels are cached for one run only.
    fn reconciler(&self) -> Reconciler {
        let reconciler = Reconciler::new(self.store.clone(), self.zone)
            .with_concurrency(self.settings.concurrency)
            .with_dry_run(self.settings.dry_run);

        if self.settings.label_prefix {
            reconciler.with_labels(Arc::new(LabelResolver::new(self.board.clone())))
        } else {
            reconciler
        }
    }

    fn degrade<T: Default>(&self, err: Error, consequence: &str) -> Result<T> {
        if err.is_auth() || self.settings.on_fetch_error == FetchErrorPolicy::Fail {
            return Err(err);
        }

        log::warn!("{err}; {consequence}");
        Ok(T::default())
    }
}
