//! Storage module for persisting crawl data
//!
//! This module handles all database operations for the crawler, including:
//! - SQLite database initialization and schema management
//! - Buffered, idempotent item and reply writes
//! - Per-feed checkpoints
//! - Session tracking

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{
    CheckpointStore, ContentStore, SessionLog, Statistics, Storage, StorageError, StorageResult,
};

use crate::ThreadlineError;
use std::path::Path;

/// Default number of queued writes before a flush is requested
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Initializes or opens a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
/// * `batch_size` - Queued writes after which the store asks for a flush
///
/// # Returns
///
/// * `Ok(SqliteStorage)` - Successfully initialized storage
/// * `Err(ThreadlineError)` - Failed to initialize storage
pub fn open_storage(path: &Path, batch_size: usize) -> Result<SqliteStorage, ThreadlineError> {
    Ok(SqliteStorage::new(path)?.with_batch_size(batch_size))
}

/// Outcome of a successful flush
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Items newly inserted
    pub items_written: usize,

    /// Replies newly inserted
    pub replies_written: usize,

    /// Records that already existed
    pub duplicates: usize,

    /// Replies dropped because their item is not stored
    pub orphans_dropped: usize,
}

impl FlushReport {
    pub fn merge(&mut self, other: FlushReport) {
        self.items_written += other.items_written;
        self.replies_written += other.replies_written;
        self.duplicates += other.duplicates;
        self.orphans_dropped += other.orphans_dropped;
    }
}

/// Counters recorded when a session finishes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionCounts {
    pub items_processed: u64,
    pub replies_persisted: u64,
    pub items_failed: u64,
}

/// Represents a crawl session
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub id: i64,
    pub feed: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: SessionStatus,
    pub counts: SessionCounts,
}

/// Status of a crawl session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Running,
    Completed,
    Interrupted,
    Failed,
}

impl SessionStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "interrupted" => Some(Self::Interrupted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Stored content of one feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedSummary {
    pub feed: String,
    pub items: u64,
    pub replies: u64,
}
