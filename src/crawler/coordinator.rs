//! Crawler coordinator - one crawl session of one feed
//!
//! A session:
//! - Loads the feed's checkpoint and opens a session record
//! - Walks the feed newest-first, page by page, until it reaches the
//!   checkpoint boundary, hits the session limit, or runs out of items
//! - Resolves every new item's reply tree under retry and queues the writes
//! - Flushes at item boundaries once the batch is full
//! - Always runs the finally-path: last flush, checkpoint, session record

use crate::client::FeedClient;
use crate::config::Config;
use crate::crawler::pacing::{pause, DelayRange, Shutdown};
use crate::crawler::resolver::ReplyResolver;
use crate::crawler::retry::{RetryError, RetryExecutor, RetryPolicy};
use crate::model::{Checkpoint, Item, Region, Reply, WalkSpan};
use crate::storage::{FlushReport, SessionCounts, SessionStatus, Storage};
use crate::ThreadlineError;
use tracing::Instrument;

/// Summary of a finished crawl session
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub feed: String,
    pub session_id: i64,
    pub status: SessionStatus,

    /// Items counted against the session limit (including empty ones)
    pub items_processed: usize,

    /// Items skipped for lack of a body
    pub items_empty: usize,

    /// Items given up on after retries or a fatal remote error
    pub items_failed: usize,

    /// Replies resolved for processed items, before filtering
    pub replies_processed: usize,

    /// Replies not stored because of the author or body filters
    pub replies_filtered: usize,

    /// What the flushes of this session actually wrote
    pub written: FlushReport,

    /// Checkpoint in effect after the session
    pub checkpoint: Checkpoint,
}

/// Why a walk stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WalkEnd {
    /// Reached the checkpoint boundary or the end of the feed
    Completed,
    LimitReached,
    Cancelled,
}

/// Mutable bookkeeping of a running session
#[derive(Debug, Default)]
struct WalkState {
    items_processed: usize,
    items_empty: usize,
    items_failed: usize,
    replies_processed: usize,
    replies_filtered: usize,
    written: FlushReport,

    /// Items the walk is done with, durable or not
    walked: Option<WalkSpan>,

    /// Prefix of `walked` whose writes are committed
    durable: Option<WalkSpan>,
}

impl WalkState {
    fn mark_walked(&mut self, item: &Item) {
        match self.walked.as_mut() {
            Some(span) => span.include(item.created_at),
            None => self.walked = Some(WalkSpan::new(item.created_at)),
        }
    }
}

/// Outcome of processing one item with a body
struct ItemOutcome {
    replies: usize,
    filtered: usize,
}

/// Runs crawl sessions against a feed client and a storage backend
pub struct Coordinator<'a, C: FeedClient + ?Sized, S: Storage> {
    client: &'a C,
    storage: &'a mut S,
    retry: RetryExecutor,
    item_delay: DelayRange,
    excluded_authors: Vec<String>,
    shutdown: Shutdown,
    config_hash: String,
}

impl<'a, C: FeedClient + ?Sized, S: Storage> Coordinator<'a, C, S> {
    /// Creates a coordinator
    ///
    /// # Arguments
    ///
    /// * `client` - Remote feed API
    /// * `storage` - Backend receiving content, checkpoints and session records
    /// * `config` - Crawler configuration (pacing, retry, filters)
    /// * `shutdown` - Signal that interrupts pauses and backoff
    /// * `config_hash` - Recorded with every session
    pub fn new(
        client: &'a C,
        storage: &'a mut S,
        config: &Config,
        shutdown: Shutdown,
        config_hash: &str,
    ) -> Self {
        Self {
            client,
            storage,
            retry: RetryExecutor::new(RetryPolicy::from(&config.retry), shutdown.clone()),
            item_delay: DelayRange::between_items(&config.crawler),
            excluded_authors: config.crawler.excluded_authors.clone(),
            shutdown,
            config_hash: config_hash.to_string(),
        }
    }

    /// Runs one session of `feed`, processing at most `session_limit` items
    ///
    /// # Returns
    ///
    /// * `Ok(SessionReport)` - The walk completed, hit the limit, or was cancelled
    /// * `Err(ThreadlineError)` - A page could not be fetched or storage failed;
    ///   durable progress is still checkpointed before returning
    pub async fn run(
        &mut self,
        feed: &str,
        session_limit: usize,
    ) -> Result<SessionReport, ThreadlineError> {
        let checkpoint = self.storage.get_checkpoint(feed)?;
        let session_id = self.storage.create_session(feed, &self.config_hash)?;

        let span = tracing::info_span!("session", feed = %feed, id = session_id);
        self.run_session(feed, session_limit, checkpoint, session_id)
            .instrument(span)
            .await
    }

    async fn run_session(
        &mut self,
        feed: &str,
        session_limit: usize,
        checkpoint: Checkpoint,
        session_id: i64,
    ) -> Result<SessionReport, ThreadlineError> {
        if checkpoint.is_initial() {
            tracing::info!("Starting first crawl of feed");
        } else {
            tracing::info!(
                "Resuming from {} (backlog: {:?})",
                checkpoint.newest_processed_at,
                checkpoint.backlog
            );
        }

        let mut state = WalkState::default();
        let walk = self.walk(feed, session_limit, &checkpoint, &mut state).await;

        // Finally-path: runs whatever the walk returned
        let flushed = self.flush_batch(&mut state);
        if let Err(e) = &flushed {
            tracing::error!("Final flush failed: {}", e);
        }

        let completed = matches!(walk, Ok(WalkEnd::Completed)) && flushed.is_ok();
        let next = checkpoint.advance(state.durable, completed);
        let saved = if next != checkpoint {
            tracing::debug!("Advancing checkpoint to {}", next.newest_processed_at);
            self.storage.set_checkpoint(&next)
        } else {
            Ok(())
        };

        let status = match (&walk, &flushed, &saved) {
            (Ok(WalkEnd::Cancelled), Ok(_), Ok(())) => SessionStatus::Interrupted,
            (Ok(_), Ok(_), Ok(())) => SessionStatus::Completed,
            _ => SessionStatus::Failed,
        };

        let counts = SessionCounts {
            items_processed: state.items_processed as u64,
            replies_persisted: state.written.replies_written as u64,
            items_failed: state.items_failed as u64,
        };
        if let Err(e) = self.storage.finish_session(session_id, status, &counts) {
            tracing::warn!("Failed to record session end: {}", e);
        }

        tracing::info!(
            "Session {}: {} items processed ({} empty, {} failed), {} replies stored",
            status.to_db_string(),
            state.items_processed,
            state.items_empty,
            state.items_failed,
            state.written.replies_written
        );

        walk?;
        flushed?;
        saved?;

        Ok(SessionReport {
            feed: feed.to_string(),
            session_id,
            status,
            items_processed: state.items_processed,
            items_empty: state.items_empty,
            items_failed: state.items_failed,
            replies_processed: state.replies_processed,
            replies_filtered: state.replies_filtered,
            written: state.written,
            checkpoint: next,
        })
    }

    /// Walks the feed newest-first
    async fn walk(
        &mut self,
        feed: &str,
        session_limit: usize,
        checkpoint: &Checkpoint,
        state: &mut WalkState,
    ) -> Result<WalkEnd, ThreadlineError> {
        let client = self.client;
        let mut cursor: Option<String> = None;

        loop {
            if self.shutdown.is_triggered() {
                return Ok(WalkEnd::Cancelled);
            }

            let after = cursor.as_deref();
            let page = match self
                .retry
                .run("feed page fetch", move || client.fetch_page(feed, after))
                .await
            {
                Ok(page) => page,
                Err(RetryError::Cancelled) => return Ok(WalkEnd::Cancelled),
                Err(source) => {
                    return Err(ThreadlineError::FeedPage {
                        feed: feed.to_string(),
                        source,
                    })
                }
            };
            tracing::debug!("Fetched page with {} items", page.items.len());

            for item in page.items {
                match checkpoint.classify(item.created_at) {
                    Region::Done => {
                        tracing::debug!("Reached checkpoint boundary at item {}", item.id);
                        return Ok(WalkEnd::Completed);
                    }
                    Region::Covered => {
                        tracing::trace!("Skipping already processed item {}", item.id);
                        continue;
                    }
                    Region::Backlog if checkpoint.is_at_ceiling(item.created_at) => {
                        // Items sharing the ceiling timestamp may or may not have
                        // been reached by the interrupted walk
                        if item.has_empty_body() || self.storage.has_item(&item.id)? {
                            tracing::trace!("Skipping item {} at backlog ceiling", item.id);
                            state.mark_walked(&item);
                            continue;
                        }
                    }
                    Region::Fresh | Region::Backlog => {}
                }

                if state.items_processed >= session_limit {
                    tracing::info!("Session limit of {} items reached", session_limit);
                    return Ok(WalkEnd::LimitReached);
                }
                if self.shutdown.is_triggered() {
                    return Ok(WalkEnd::Cancelled);
                }

                if item.has_empty_body() {
                    tracing::debug!("Skipping item {} without body", item.id);
                    state.items_processed += 1;
                    state.items_empty += 1;
                    state.mark_walked(&item);
                    continue;
                }

                match self.process_item(&item).await {
                    Ok(outcome) => {
                        state.replies_processed += outcome.replies;
                        state.replies_filtered += outcome.filtered;
                    }
                    Err(ThreadlineError::Cancelled) => return Ok(WalkEnd::Cancelled),
                    Err(e @ ThreadlineError::ItemFailed { .. }) => {
                        tracing::warn!("Skipping item: {}", e);
                        state.items_failed += 1;
                    }
                    Err(e) => return Err(e),
                }
                state.items_processed += 1;
                state.mark_walked(&item);

                if self.storage.needs_flush() {
                    self.flush_batch(state)?;
                }

                if pause(&self.item_delay, &self.shutdown).await.is_err() {
                    return Ok(WalkEnd::Cancelled);
                }
            }

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => {
                    tracing::debug!("Feed exhausted");
                    return Ok(WalkEnd::Completed);
                }
            }
        }
    }

    /// Resolves the reply tree of `item` and queues the item and its replies
    async fn process_item(&mut self, item: &Item) -> Result<ItemOutcome, ThreadlineError> {
        let resolver = ReplyResolver::new(self.client);
        let resolver = &resolver;
        let label = format!("reply resolution of {}", item.id);

        let replies = match self.retry.run(&label, move || resolver.resolve(item)).await {
            Ok(replies) => replies,
            Err(RetryError::Cancelled) => return Err(ThreadlineError::Cancelled),
            Err(source) => {
                return Err(ThreadlineError::ItemFailed {
                    item_id: item.id.clone(),
                    source,
                })
            }
        };

        self.storage.upsert_item(item)?;

        let mut filtered = 0;
        for reply in &replies {
            if self.is_filtered(item, reply) {
                filtered += 1;
                continue;
            }
            self.storage.upsert_reply(reply)?;
        }

        tracing::debug!(
            "Item {}: {} replies ({} filtered)",
            item.id,
            replies.len(),
            filtered
        );

        Ok(ItemOutcome {
            replies: replies.len(),
            filtered,
        })
    }

    /// Replies that are visited but never stored
    fn is_filtered(&self, item: &Item, reply: &Reply) -> bool {
        reply.body.trim().is_empty()
            || item.is_written_by(&reply.author)
            || self.excluded_authors.iter().any(|a| *a == reply.author)
    }

    /// Commits queued writes; on success everything walked so far is durable
    fn flush_batch(&mut self, state: &mut WalkState) -> Result<(), ThreadlineError> {
        let report = self.storage.flush()?;
        state.written.merge(report);
        state.durable = state.walked;
        Ok(())
    }
}
