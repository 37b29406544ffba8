use chrono::{DateTime, Utc};
use futures::future;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;

use super::{dedup, schedule};
use crate::feed::{
    extract_entries, render_entry, ExtractError, FeedDefinition, FeedFetcher, FetchError,
    MalformedDefinition, RawEntry,
};
use crate::store::{Block, BlockStore, StoreError};

/// Maximum number of item blocks kept under the items container.
pub const MAX_ITEMS: usize = 50;

const ITEMS_PREFIX: &str = "Items";
const FEEDS_PREFIX: &str = "Feeds";
const LOADING_LABEL: &str = "Items (loading...)";
const IDLE_LABEL: &str = "Items";

// ============================================================================
// Error Types
// ============================================================================

/// Run-fatal errors. Any of these aborts the whole refresh pass with no
/// partial item or schedule writes for that pass; the next tick starts over.
#[derive(Debug, Error)]
pub enum RefreshError {
    /// A feed block failed to parse against the definition grammar.
    #[error(transparent)]
    Definition(#[from] MalformedDefinition),

    /// A due feed's body could not be retrieved.
    #[error("Failed to fetch {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: FetchError,
    },

    /// A retrieved body is not a parseable feed document.
    #[error("Failed to parse feed body from {url}: {source}")]
    Extract {
        url: String,
        #[source]
        source: ExtractError,
    },

    /// A document store operation failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The page lacks a `Feeds` or `Items` container block.
    #[error("Page {page} has no block starting with \"{container}\"")]
    MissingContainer {
        page: String,
        container: &'static str,
    },
}

// ============================================================================
// Run Results
// ============================================================================

/// What one completed pass did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Number of feeds that were due and fetched.
    pub feeds_due: usize,
    /// Whether the item container was rewritten.
    pub items_changed: bool,
    /// Item count after cap and sort.
    pub item_count: usize,
}

/// Outcome of asking the engine to refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// A previous run was still in flight; this tick did nothing.
    SkippedBusy,
    Completed(RunSummary),
}

// ============================================================================
// Engine
// ============================================================================

/// Drives one refresh pass: load definitions, fetch due feeds concurrently,
/// merge their items, and reconcile the document.
///
/// At most one pass runs at a time. The guard is explicit: a tick that
/// fires while a pass is still fetching or writing is skipped, never
/// interleaved.
pub struct RefreshEngine<S, F> {
    store: S,
    fetcher: F,
    page: String,
    run_guard: Mutex<()>,
}

impl<S: BlockStore, F: FeedFetcher> RefreshEngine<S, F> {
    pub fn new(store: S, fetcher: F, page: impl Into<String>) -> Self {
        Self {
            store,
            fetcher,
            page: page.into(),
            run_guard: Mutex::new(()),
        }
    }

    /// The underlying store, for callers that also read the document.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Runs one refresh pass against the current wall clock.
    pub async fn refresh(&self, force: bool) -> Result<RunOutcome, RefreshError> {
        self.refresh_at(force, Utc::now()).await
    }

    /// Runs one refresh pass with an explicit `now`, for deterministic
    /// schedule handling in tests and embedders.
    pub async fn refresh_at(
        &self,
        force: bool,
        now: DateTime<Utc>,
    ) -> Result<RunOutcome, RefreshError> {
        let Ok(_running) = self.run_guard.try_lock() else {
            tracing::info!("Previous refresh still in flight, skipping");
            return Ok(RunOutcome::SkippedBusy);
        };
        let summary = self.run(force, now).await?;
        Ok(RunOutcome::Completed(summary))
    }

    /// Runs the engine on a fixed tick until dropped or cancelled.
    ///
    /// The first pass happens immediately (with `force_first` bypassing the
    /// due-time check); a zero `tick` means one-shot. Failed passes are
    /// logged and do not stop the loop; each tick is an independent
    /// attempt. Cancelling the future stops future ticks; a pass already in
    /// flight is never cancelled mid-write by this loop itself.
    pub async fn run_periodic(&self, tick: Duration, force_first: bool) {
        self.run_logged(force_first).await;
        if tick.is_zero() {
            return;
        }
        let mut ticker = tokio::time::interval(tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // Consume the interval's immediate first tick; the initial pass
        // above already covered it.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            self.run_logged(false).await;
        }
    }

    async fn run_logged(&self, force: bool) {
        match self.refresh(force).await {
            Ok(RunOutcome::SkippedBusy) => {}
            Ok(RunOutcome::Completed(summary)) => {
                tracing::info!(
                    feeds_due = summary.feeds_due,
                    items = summary.item_count,
                    changed = summary.items_changed,
                    "Refresh complete"
                );
            }
            Err(e) => {
                tracing::error!(error = %e, "Refresh failed");
            }
        }
    }

    /// One pass: Loading, then Fetching/Merging/Writing with the items
    /// container label swapped to a loading marker and restored on every
    /// exit path.
    async fn run(&self, force: bool, now: DateTime<Utc>) -> Result<RunSummary, RefreshError> {
        // Loading
        let tree = self.store.read_page_block_tree(&self.page).await?;
        let items_block = find_container(&tree, &self.page, ITEMS_PREFIX)?;
        let feeds_block = find_container(&tree, &self.page, FEEDS_PREFIX)?;
        let definitions = feeds_block
            .children
            .iter()
            .map(FeedDefinition::parse)
            .collect::<Result<Vec<_>, _>>()?;
        let previous_items = items_block.children.clone();
        let items_block_id = items_block.id.clone();

        self.store
            .update_block_text(&items_block_id, LOADING_LABEL)
            .await?;
        let result = self
            .fetch_merge_write(force, now, &definitions, &previous_items, &items_block_id)
            .await;
        let restored = self
            .store
            .update_block_text(&items_block_id, IDLE_LABEL)
            .await;

        match (result, restored) {
            (Err(e), restored) => {
                if let Err(r) = restored {
                    tracing::warn!(error = %r, "Failed to restore items label after failed run");
                }
                Err(e)
            }
            (Ok(_), Err(r)) => Err(r.into()),
            (Ok(summary), Ok(())) => Ok(summary),
        }
    }

    async fn fetch_merge_write(
        &self,
        force: bool,
        now: DateTime<Utc>,
        definitions: &[FeedDefinition],
        previous_items: &[Block],
        items_block_id: &str,
    ) -> Result<RunSummary, RefreshError> {
        // Fetching: fan out over due feeds, fan in before touching the
        // store. One failure fails the run; nothing has been written yet.
        let due: Vec<&FeedDefinition> = definitions
            .iter()
            .filter(|d| force || d.next_refresh_at <= now)
            .collect();
        tracing::debug!(due = due.len(), total = definitions.len(), force, "Fetching due feeds");

        let fetched: Vec<(&FeedDefinition, Vec<RawEntry>)> =
            future::try_join_all(due.into_iter().map(|def| async move {
                let body = self.fetcher.fetch(&def.url).await.map_err(|source| {
                    RefreshError::Fetch {
                        url: def.url.clone(),
                        source,
                    }
                })?;
                let entries =
                    extract_entries(&body).map_err(|source| RefreshError::Extract {
                        url: def.url.clone(),
                        source,
                    })?;
                Ok::<_, RefreshError>((def, entries))
            }))
            .await?;

        // Merging: previous lines seed the list; identity is the exact
        // rendered string.
        let mut items: Vec<String> = previous_items.iter().map(|b| b.text.clone()).collect();
        let mut schedule_writes: Vec<(String, String)> = Vec::new();
        for (def, entries) in &fetched {
            let mut added = 0usize;
            for entry in entries {
                if let Some(line) = render_entry(def, entry) {
                    if !items.contains(&line) {
                        items.push(line);
                        added += 1;
                    }
                }
            }
            let next = schedule::advance(def.next_refresh_at, def.interval_seconds, now);
            schedule_writes.push((def.source_block_id.clone(), def.with_next_refresh(next)));
            tracing::debug!(feed = %def.title, added, next = %next, "Merged feed");
        }

        // Writing: newest first thanks to the fixed-width date prefix.
        items.sort_unstable_by(|a, b| b.cmp(a));
        items.truncate(MAX_ITEMS);

        for (block_id, new_text) in &schedule_writes {
            self.store.update_block_text(block_id, new_text).await?;
        }

        let stored: Vec<String> = previous_items.iter().map(|b| b.text.clone()).collect();
        let changed = dedup::list_digest(&items) != dedup::list_digest(&stored);
        if changed {
            for prev in previous_items {
                self.store.remove_block(&prev.id).await?;
            }
            self.store.insert_child_blocks(items_block_id, &items).await?;
            tracing::info!(items = items.len(), "Item container rewritten");
        } else {
            tracing::debug!("Item list unchanged, skipping container writes");
        }

        Ok(RunSummary {
            feeds_due: fetched.len(),
            items_changed: changed,
            item_count: items.len(),
        })
    }
}

fn find_container<'a>(
    tree: &'a [Block],
    page: &str,
    prefix: &'static str,
) -> Result<&'a Block, RefreshError> {
    tree.iter()
        .find(|b| b.text.starts_with(prefix))
        .ok_or_else(|| RefreshError::MissingContainer {
            page: page.to_string(),
            container: prefix,
        })
}
