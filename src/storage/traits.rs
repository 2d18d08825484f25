//! Storage traits and error types
//!
//! The crawler depends on three capabilities, each its own trait:
//! - [`ContentStore`]: buffered, idempotent item and reply writes
//! - [`CheckpointStore`]: per-feed resume boundaries
//! - [`SessionLog`]: one row per crawl session
//!
//! [`Statistics`] backs the `--stats` report. [`Storage`] bundles everything.

use crate::model::{Checkpoint, Item, Reply};
use crate::storage::{FeedSummary, FlushReport, SessionCounts, SessionRecord, SessionStatus};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Session not found: {0}")]
    SessionNotFound(i64),

    #[error("Corrupt value in column {column}: {value}")]
    Corrupt { column: &'static str, value: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Buffered writes of crawled content
///
/// Upserts only queue work; nothing is durable until [`ContentStore::flush`]
/// succeeds. Writing a key that already exists is a no-op.
pub trait ContentStore {
    /// Queues an item for insertion
    fn upsert_item(&mut self, item: &Item) -> StorageResult<()>;

    /// Queues a reply for insertion
    ///
    /// Replies whose item is not stored by the time of the flush are dropped.
    fn upsert_reply(&mut self, reply: &Reply) -> StorageResult<()>;

    /// Number of queued writes
    fn pending_writes(&self) -> usize;

    /// Returns true if an item with this id was flushed
    fn has_item(&self, item_id: &str) -> StorageResult<bool>;

    /// Returns true once the queue reached the batch size
    fn needs_flush(&self) -> bool;

    /// Writes all queued records in one transaction
    ///
    /// On failure nothing is written and the queue is kept, so the flush can be
    /// attempted again. Flushing an empty queue does nothing.
    fn flush(&mut self) -> StorageResult<FlushReport>;
}

/// Per-feed resume boundaries
pub trait CheckpointStore {
    /// Loads the checkpoint of `feed`, or the initial checkpoint if none exists
    fn get_checkpoint(&self, feed: &str) -> StorageResult<Checkpoint>;

    /// Atomically replaces the checkpoint of `checkpoint.feed`
    fn set_checkpoint(&mut self, checkpoint: &Checkpoint) -> StorageResult<()>;

    /// Lists every stored checkpoint, ordered by feed
    fn list_checkpoints(&self) -> StorageResult<Vec<Checkpoint>>;
}

/// Record of crawl sessions
pub trait SessionLog {
    /// Opens a session in the running state and returns its id
    fn create_session(&mut self, feed: &str, config_hash: &str) -> StorageResult<i64>;

    /// Closes a session with its final status and counters
    fn finish_session(
        &mut self,
        session_id: i64,
        status: SessionStatus,
        counts: &SessionCounts,
    ) -> StorageResult<()>;

    /// Gets a session by ID
    fn get_session(&self, session_id: i64) -> StorageResult<SessionRecord>;

    /// Most recent sessions first
    fn recent_sessions(&self, limit: usize) -> StorageResult<Vec<SessionRecord>>;
}

/// Aggregate queries over stored content
pub trait Statistics {
    /// Total number of stored items
    fn count_items(&self) -> StorageResult<u64>;

    /// Total number of stored replies
    fn count_replies(&self) -> StorageResult<u64>;

    /// Item and reply counts per feed, ordered by feed
    fn feed_summaries(&self) -> StorageResult<Vec<FeedSummary>>;
}

/// Everything the crawler and the CLI need from a backend
pub trait Storage: ContentStore + CheckpointStore + SessionLog + Statistics {}

impl<T: ContentStore + CheckpointStore + SessionLog + Statistics> Storage for T {}
