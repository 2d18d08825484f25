/// Top-level content items of a feed
use chrono::{DateTime, Utc};

/// Author recorded when the feed no longer knows who wrote something
pub const DELETED_AUTHOR: &str = "[deleted]";

/// A top-level content unit of a feed
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    /// Globally unique, stable identifier
    pub id: String,

    /// Name of the feed this item was listed in
    pub feed: String,

    /// Author name, or [`DELETED_AUTHOR`]
    pub author: String,

    pub title: String,

    pub created_at: DateTime<Utc>,

    /// Self text of the item; empty for link/media items
    pub body: String,

    /// Reply count as reported by the feed
    pub reply_count: u32,

    pub score: i64,

    pub metadata: ItemMetadata,
}

/// Feed-specific scalar fields stored alongside an item
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemMetadata {
    /// Fraction of votes that were positive
    pub upvote_ratio: Option<f64>,

    /// Whether the item is flagged as not safe for work
    pub over_18: bool,
}

impl Item {
    /// Returns true if the item carries no text worth storing
    ///
    /// Such items still advance the checkpoint; they are just never persisted.
    pub fn has_empty_body(&self) -> bool {
        self.body.trim().is_empty()
    }

    /// Returns true if `author` is a known author equal to this item's author
    pub fn is_written_by(&self, author: &str) -> bool {
        author != DELETED_AUTHOR && author == self.author
    }
}
