//! Feed API client
//!
//! The crawler only talks to the remote API through the [`FeedClient`] trait:
//! - listing pages of a feed, newest first
//! - fetching the initial reply tree of an item
//! - expanding "load more" stubs inside a reply tree
//!
//! [`RedditClient`] implements it against the public Reddit JSON API.

mod reddit;
mod wire;

pub use reddit::RedditClient;

use crate::crawler::{Classify, FailureClass};
use crate::model::Item;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors raised by remote calls
#[derive(Debug, Clone, Error)]
pub enum RemoteError {
    #[error("Rate limited by {url}")]
    RateLimited { url: String },

    #[error("Server error {status} from {url}")]
    Server { url: String, status: u16 },

    #[error("Request timeout for {url}")]
    Timeout { url: String },

    #[error("Transport error for {url}: {message}")]
    Transport { url: String, message: String },

    #[error("Access denied ({status}) for {url}")]
    Unauthorized { url: String, status: u16 },

    #[error("Unexpected status {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl Classify for RemoteError {
    fn classify(&self) -> FailureClass {
        match self {
            Self::RateLimited { .. }
            | Self::Server { .. }
            | Self::Timeout { .. }
            | Self::Transport { .. } => FailureClass::Transient,
            Self::Unauthorized { .. } | Self::Status { .. } | Self::Malformed(_) => {
                FailureClass::Fatal
            }
        }
    }
}

/// One page of a feed listing
#[derive(Debug, Clone, Default)]
pub struct FeedPage {
    /// Items in the order the feed returned them (newest first)
    pub items: Vec<Item>,

    /// Cursor of the following page, `None` when the feed is exhausted
    pub next_cursor: Option<String>,
}

/// A node of a reply tree as returned by the API
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyNode {
    Reply(RawReply),
    Stub(StubRef),
}

/// A real reply, possibly carrying already-loaded children
#[derive(Debug, Clone, PartialEq)]
pub struct RawReply {
    pub id: String,
    /// Item id or reply id, without any API type prefix
    pub parent_id: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub body: String,
    pub score: i64,
    pub children: Vec<ReplyNode>,
}

/// Placeholder standing in for replies that were not loaded yet
#[derive(Debug, Clone, PartialEq)]
pub struct StubRef {
    pub id: String,
    /// Item the stub belongs to
    pub item_id: String,
    /// Node under which the hidden replies hang
    pub parent_id: String,
    /// Ids of the hidden replies; empty for "continue this thread" stubs
    pub children: Vec<String>,
    /// Number of hidden replies as reported by the API
    pub count: u32,
}

/// Remote capability the crawler consumes
#[async_trait]
pub trait FeedClient: Send + Sync {
    /// Fetches one page of `feed`, starting after `cursor`
    async fn fetch_page(&self, feed: &str, cursor: Option<&str>) -> Result<FeedPage, RemoteError>;

    /// Fetches the top-level reply nodes of an item
    async fn fetch_replies(&self, item: &Item) -> Result<Vec<ReplyNode>, RemoteError>;

    /// Expands a stub into the nodes it stood for
    ///
    /// The result may contain further stubs.
    async fn expand_stub(&self, stub: &StubRef) -> Result<Vec<ReplyNode>, RemoteError>;
}
