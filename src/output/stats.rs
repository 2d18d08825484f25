//! Statistics generation from the crawl database
//!
//! This module provides functionality for extracting and displaying
//! crawl statistics from the storage layer.

use crate::model::Checkpoint;
use crate::storage::{FeedSummary, SessionRecord, Storage};
use crate::ThreadlineError;
use std::fmt::Write;

/// Number of sessions listed by default
pub const RECENT_SESSIONS: usize = 10;

/// Crawl statistics summary
#[derive(Debug, Clone)]
pub struct CrawlStatistics {
    /// Total number of stored items
    pub total_items: u64,

    /// Total number of stored replies
    pub total_replies: u64,

    /// Item and reply counts per feed
    pub feeds: Vec<FeedSummary>,

    /// Resume boundaries per feed
    pub checkpoints: Vec<Checkpoint>,

    /// Latest sessions, newest first
    pub recent_sessions: Vec<SessionRecord>,
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
/// * `recent` - How many of the latest sessions to include
///
/// # Returns
///
/// * `Ok(CrawlStatistics)` - Successfully loaded statistics
/// * `Err(ThreadlineError)` - Failed to query statistics
pub fn load_statistics(
    storage: &dyn Storage,
    recent: usize,
) -> Result<CrawlStatistics, ThreadlineError> {
    Ok(CrawlStatistics {
        total_items: storage.count_items()?,
        total_replies: storage.count_replies()?,
        feeds: storage.feed_summaries()?,
        checkpoints: storage.list_checkpoints()?,
        recent_sessions: storage.recent_sessions(recent)?,
    })
}

/// Describes a checkpoint in one line
pub fn describe_checkpoint(checkpoint: &Checkpoint) -> String {
    if checkpoint.is_initial() {
        return "never crawled".to_string();
    }

    let mut line = format!("newest processed {}", checkpoint.newest_processed_at);
    if let Some(backlog) = checkpoint.backlog {
        match backlog.floor {
            Some(floor) => {
                let _ = write!(line, ", backlog between {} and {}", floor, backlog.ceiling);
            }
            None => {
                let _ = write!(line, ", backlog before {}", backlog.ceiling);
            }
        }
    }
    line
}

/// Renders statistics as plain text
pub fn format_statistics(stats: &CrawlStatistics) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "=== Crawl Statistics ===\n");
    let _ = writeln!(out, "Overview:");
    let _ = writeln!(out, "  Items stored: {}", stats.total_items);
    let _ = writeln!(out, "  Replies stored: {}", stats.total_replies);
    let _ = writeln!(out);

    if !stats.feeds.is_empty() {
        let _ = writeln!(out, "Feeds:");
        for feed in &stats.feeds {
            let _ = writeln!(
                out,
                "  {}: {} items, {} replies",
                feed.feed, feed.items, feed.replies
            );
        }
        let _ = writeln!(out);
    }

    if !stats.checkpoints.is_empty() {
        let _ = writeln!(out, "Checkpoints:");
        for checkpoint in &stats.checkpoints {
            let _ = writeln!(
                out,
                "  {}: {}",
                checkpoint.feed,
                describe_checkpoint(checkpoint)
            );
        }
        let _ = writeln!(out);
    }

    if !stats.recent_sessions.is_empty() {
        let _ = writeln!(out, "Recent Sessions:");
        for session in &stats.recent_sessions {
            let _ = writeln!(
                out,
                "  #{} {} [{}] started {}: {} items, {} replies, {} failed",
                session.id,
                session.feed,
                session.status.to_db_string(),
                session.started_at,
                session.counts.items_processed,
                session.counts.replies_persisted,
                session.counts.items_failed
            );
        }
    }

    out
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &CrawlStatistics) {
    print!("{}", format_statistics(stats));
}
