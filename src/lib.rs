//! Threadline: an incremental, checkpointed feed crawler
//!
//! This crate walks paginated, newest-first feeds of content items, resolves
//! each item's full reply tree (including lazily-loaded branches), and stores
//! everything idempotently in SQLite. A per-feed checkpoint lets later runs
//! resume without re-processing what is already stored.

pub mod client;
pub mod config;
pub mod crawler;
pub mod model;
pub mod output;
pub mod storage;

use thiserror::Error;

/// Main error type for Threadline operations
#[derive(Debug, Error)]
pub enum ThreadlineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Remote error: {0}")]
    Remote(#[from] client::RemoteError),

    #[error("Failed to fetch page of feed {feed}: {source}")]
    FeedPage {
        feed: String,
        source: crawler::RetryError<client::RemoteError>,
    },

    #[error("Item {item_id} failed: {source}")]
    ItemFailed {
        item_id: String,
        source: crawler::RetryError<client::RemoteError>,
    },

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Crawl cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for Threadline operations
pub type Result<T> = std::result::Result<T, ThreadlineError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use model::{Checkpoint, Item, Reply};
