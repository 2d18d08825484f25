//! Crawler module for incremental feed crawling
//!
//! This module contains the core crawling logic, including:
//! - The per-feed crawl session ([`Coordinator`])
//! - Reply tree resolution with stub expansion
//! - Retry with exponential backoff for remote calls
//! - Pacing and cancellation

mod coordinator;
mod pacing;
mod resolver;
mod retry;

pub use coordinator::{Coordinator, SessionReport};
pub use pacing::{pause, shutdown_channel, Cancelled, DelayRange, Shutdown, ShutdownTrigger};
pub use resolver::ReplyResolver;
pub use retry::{Classify, FailureClass, RetryError, RetryExecutor, RetryPolicy};

use crate::client::FeedClient;
use crate::config::{Config, FeedEntry};
use crate::storage::Storage;
use crate::ThreadlineError;

/// Result of crawling one feed
#[derive(Debug)]
pub struct FeedOutcome {
    pub feed: String,
    pub result: Result<SessionReport, ThreadlineError>,
}

/// Crawls `feeds` one after another
///
/// This is the main entry point for a crawl. For every feed it:
/// 1. Runs one session bounded by the feed's session limit
/// 2. Records the outcome; a failed feed does not stop the others
/// 3. Pauses for the configured inter-feed delay
///
/// Storage failures and shutdown end the crawl early.
///
/// # Arguments
///
/// * `config` - The crawler configuration
/// * `feeds` - Feeds to crawl, in order
/// * `client` - Remote feed API
/// * `storage` - Storage backend
/// * `shutdown` - Cancellation signal
/// * `config_hash` - Recorded with every session
pub async fn run_crawl<C, S>(
    config: &Config,
    feeds: &[FeedEntry],
    client: &C,
    storage: &mut S,
    shutdown: Shutdown,
    config_hash: &str,
) -> Vec<FeedOutcome>
where
    C: FeedClient + ?Sized,
    S: Storage,
{
    let feed_delay = DelayRange::between_feeds(&config.crawler);
    let mut outcomes = Vec::with_capacity(feeds.len());

    for (index, feed) in feeds.iter().enumerate() {
        if index > 0 && pause(&feed_delay, &shutdown).await.is_err() {
            tracing::info!("Shutdown requested, skipping remaining feeds");
            break;
        }
        if shutdown.is_triggered() {
            break;
        }

        let limit = config.session_limit_for(feed);
        let result = Coordinator::new(client, storage, config, shutdown.clone(), config_hash)
            .run(&feed.name, limit)
            .await;

        let stop = match &result {
            Ok(report) => {
                tracing::info!(
                    feed = %feed.name,
                    "Processed {} items, stored {} replies",
                    report.items_processed,
                    report.written.replies_written
                );
                false
            }
            Err(ThreadlineError::Storage(e)) => {
                tracing::error!(feed = %feed.name, "Storage failure, aborting crawl: {}", e);
                true
            }
            Err(e) => {
                tracing::error!(feed = %feed.name, "Session failed: {}", e);
                false
            }
        };

        outcomes.push(FeedOutcome {
            feed: feed.name.clone(),
            result,
        });

        if stop {
            break;
        }
    }

    outcomes
}
