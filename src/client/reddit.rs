//! Reddit implementation of the feed client
//!
//! Uses the public JSON endpoints:
//! - `GET /r/{feed}/new.json` for newest-first listings
//! - `GET /comments/{item}.json` for the initial reply tree
//! - `GET /api/morechildren.json` to expand "load more" stubs
//! - `GET /comments/{item}/_/{parent}.json` for "continue this thread" stubs

use crate::client::wire::{self, Listing, MoreChildrenResponse};
use crate::client::{FeedClient, FeedPage, RemoteError, ReplyNode, StubRef};
use crate::config::ClientConfig;
use crate::model::Item;
use crate::{ConfigError, ThreadlineError};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

/// Maximum number of ids `/api/morechildren` accepts per request
const MORE_CHILDREN_CHUNK: usize = 100;

/// Feed client for the Reddit JSON API
pub struct RedditClient {
    http: Client,
    base_url: Url,
    page_size: u32,
}

impl RedditClient {
    /// Builds a client from configuration
    ///
    /// # Returns
    ///
    /// * `Ok(RedditClient)` - Client ready to issue requests
    /// * `Err(ThreadlineError)` - Invalid base URL or HTTP client setup failure
    pub fn new(config: &ClientConfig) -> Result<Self, ThreadlineError> {
        // A trailing slash makes relative joins append instead of replacing
        let mut base = config.base_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base_url: {}", e)))?;

        let http = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout))
            .connect_timeout(Duration::from_secs(10))
            .gzip(true)
            .brotli(true)
            .build()?;

        Ok(Self {
            http,
            base_url,
            page_size: config.page_size,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, RemoteError> {
        self.base_url
            .join(path)
            .map_err(|e| RemoteError::Malformed(format!("cannot build URL for {}: {}", path, e)))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, RemoteError> {
        let url_str = url.to_string();
        tracing::trace!("GET {}", url_str);

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| transport_error(&url_str, e))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(RemoteError::RateLimited { url: url_str });
        }
        if status.is_server_error() {
            return Err(RemoteError::Server {
                url: url_str,
                status: status.as_u16(),
            });
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(RemoteError::Unauthorized {
                url: url_str,
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            return Err(RemoteError::Status {
                url: url_str,
                status: status.as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| transport_error(&url_str, e))?;

        serde_json::from_str(&body)
            .map_err(|e| RemoteError::Malformed(format!("{}: {}", url_str, e)))
    }

    /// Expands a "continue this thread" stub by loading the parent's subtree
    async fn continue_thread(&self, stub: &StubRef) -> Result<Vec<ReplyNode>, RemoteError> {
        let mut url = self.endpoint(&format!(
            "comments/{}/_/{}.json",
            stub.item_id, stub.parent_id
        ))?;
        url.query_pairs_mut().append_pair("raw_json", "1");

        let listings: Vec<Listing> = self.get_json(url).await?;
        let comments = listings
            .into_iter()
            .nth(1)
            .ok_or_else(|| RemoteError::Malformed("comment page without replies".to_string()))?;

        let nodes = wire::nodes_from_things(comments.data.children, &stub.item_id)?;

        // The page is rooted at the stub's parent; its children are what the stub hid
        let children = nodes
            .into_iter()
            .find_map(|node| match node {
                ReplyNode::Reply(reply) if reply.id == stub.parent_id => Some(reply.children),
                _ => None,
            })
            .unwrap_or_default();

        Ok(children)
    }

    /// Expands a "load more" stub through `/api/morechildren`
    async fn more_children(&self, stub: &StubRef) -> Result<Vec<ReplyNode>, RemoteError> {
        let (chunk, rest) = stub
            .children
            .split_at(stub.children.len().min(MORE_CHILDREN_CHUNK));

        let mut url = self.endpoint("api/morechildren.json")?;
        url.query_pairs_mut()
            .append_pair("api_type", "json")
            .append_pair("raw_json", "1")
            .append_pair("link_id", &format!("t3_{}", stub.item_id))
            .append_pair("children", &chunk.join(","));

        let response: MoreChildrenResponse = self.get_json(url).await?;
        if !response.json.errors.is_empty() {
            return Err(RemoteError::Malformed(format!(
                "morechildren errors: {:?}",
                response.json.errors
            )));
        }

        let things = response.json.data.map(|d| d.things).unwrap_or_default();
        let mut nodes = wire::nodes_from_things(things, &stub.item_id)?;

        if !rest.is_empty() {
            nodes.push(ReplyNode::Stub(StubRef {
                id: stub.id.clone(),
                item_id: stub.item_id.clone(),
                parent_id: stub.parent_id.clone(),
                children: rest.to_vec(),
                count: rest.len() as u32,
            }));
        }

        Ok(nodes)
    }
}

#[async_trait]
impl FeedClient for RedditClient {
    async fn fetch_page(&self, feed: &str, cursor: Option<&str>) -> Result<FeedPage, RemoteError> {
        let mut url = self.endpoint(&format!("r/{}/new.json", feed))?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("limit", &self.page_size.to_string())
                .append_pair("raw_json", "1");
            if let Some(after) = cursor {
                query.append_pair("after", after);
            }
        }

        let listing: Listing = self.get_json(url).await?;

        let mut items = Vec::with_capacity(listing.data.children.len());
        for thing in listing.data.children {
            if let Some(item) = wire::item_from_thing(thing, feed)? {
                items.push(item);
            }
        }

        Ok(FeedPage {
            items,
            next_cursor: listing.data.after.filter(|a| !a.is_empty()),
        })
    }

    async fn fetch_replies(&self, item: &Item) -> Result<Vec<ReplyNode>, RemoteError> {
        let mut url = self.endpoint(&format!("comments/{}.json", item.id))?;
        url.query_pairs_mut()
            .append_pair("raw_json", "1")
            .append_pair("limit", "500");

        let listings: Vec<Listing> = self.get_json(url).await?;
        let comments = listings
            .into_iter()
            .nth(1)
            .ok_or_else(|| RemoteError::Malformed(format!("item {} has no reply listing", item.id)))?;

        wire::nodes_from_things(comments.data.children, &item.id)
    }

    async fn expand_stub(&self, stub: &StubRef) -> Result<Vec<ReplyNode>, RemoteError> {
        if stub.children.is_empty() {
            self.continue_thread(stub).await
        } else {
            self.more_children(stub).await
        }
    }
}

/// Maps a transport-level failure onto a remote error
fn transport_error(url: &str, error: reqwest::Error) -> RemoteError {
    if error.is_timeout() {
        RemoteError::Timeout {
            url: url.to_string(),
        }
    } else if error.is_decode() {
        RemoteError::Malformed(format!("{}: {}", url, error))
    } else {
        RemoteError::Transport {
            url: url.to_string(),
            message: error.to_string(),
        }
    }
}
