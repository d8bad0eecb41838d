use crate::board::TaskBoard;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};

/// Label used when a board name cannot be looked up.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Resolves board ids to board names for prefixing event titles. Lookups are cached for the
/// lifetime of the resolver, which is a single run.
pub struct LabelResolver {
    board: Arc<dyn TaskBoard>,
    cache: Mutex<HashMap<String, Arc<OnceCell<String>>>>,
}

impl LabelResolver {
    pub fn new(board: Arc<dyn TaskBoard>) -> LabelResolver {
        LabelResolver {
            board,
            cache: Default::default(),
        }
    }

    /// Returns the name of the board `board_id`, or [`UNKNOWN_LABEL`] if it cannot be fetched.
    /// Never fails: a missing label must not keep a card off the calendar.
    pub async fn resolve(&self, board_id: &str) -> String {
        let cell = self
            .cache
            .lock()
            .await
            .entry(board_id.to_owned())
            .or_default()
            .clone();

        // Concurrent callers for the same board wait for the first lookup; other boards don't.
        cell.get_or_init(|| async {
            match self.board.board_name(board_id).await {
                Ok(label) => label,
                Err(err) => {
                    log::warn!("failed to look up name of board {board_id}: {err}");
                    UNKNOWN_LABEL.to_owned()
                }
            }
        })
        .await
        .clone()
    }
}
