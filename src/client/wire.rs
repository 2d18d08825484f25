//! JSON shapes of the Reddit listing API
//!
//! Only the fields the crawler stores are declared; everything else is ignored.

use crate::client::{RawReply, RemoteError, ReplyNode, StubRef};
use crate::model::{Item, ItemMetadata, DELETED_AUTHOR};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
pub struct Listing {
    pub data: ListingData,
}

#[derive(Debug, Deserialize)]
pub struct ListingData {
    #[serde(default)]
    pub after: Option<String>,
    #[serde(default)]
    pub children: Vec<Thing>,
}

/// A `{kind, data}` envelope; `data` is decoded once the kind is known
#[derive(Debug, Deserialize)]
pub struct Thing {
    pub kind: String,
    pub data: Value,
}

#[derive(Debug, Deserialize)]
pub struct LinkData {
    pub id: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub title: String,
    pub created_utc: f64,
    #[serde(default)]
    pub selftext: String,
    #[serde(default)]
    pub num_comments: u32,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub upvote_ratio: Option<f64>,
    #[serde(default)]
    pub over_18: bool,
}

#[derive(Debug, Deserialize)]
pub struct CommentData {
    pub id: String,
    pub parent_id: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub body: String,
    pub created_utc: f64,
    #[serde(default)]
    pub score: i64,
    /// Either an empty string or a nested listing
    #[serde(default)]
    pub replies: Value,
}

#[derive(Debug, Deserialize)]
pub struct MoreData {
    pub id: String,
    pub parent_id: String,
    #[serde(default)]
    pub children: Vec<String>,
    #[serde(default)]
    pub count: u32,
}

/// Envelope of `/api/morechildren`
#[derive(Debug, Deserialize)]
pub struct MoreChildrenResponse {
    pub json: MoreChildrenJson,
}

#[derive(Debug, Deserialize)]
pub struct MoreChildrenJson {
    #[serde(default)]
    pub errors: Vec<Value>,
    #[serde(default)]
    pub data: Option<MoreChildrenData>,
}

#[derive(Debug, Deserialize)]
pub struct MoreChildrenData {
    #[serde(default)]
    pub things: Vec<Thing>,
}

/// Strips the `t1_`/`t3_` type prefix from a fullname
pub fn strip_kind(fullname: &str) -> &str {
    match fullname.split_once('_') {
        Some((kind, id)) if kind.len() == 2 && kind.starts_with('t') => id,
        _ => fullname,
    }
}

fn timestamp(created_utc: f64) -> Result<DateTime<Utc>, RemoteError> {
    let secs = created_utc.trunc() as i64;
    let nanos = ((created_utc.fract() * 1e9).round() as u32).min(999_999_999);
    DateTime::from_timestamp(secs, nanos)
        .ok_or_else(|| RemoteError::Malformed(format!("timestamp out of range: {}", created_utc)))
}

fn author_or_deleted(author: Option<String>) -> String {
    author
        .filter(|a| !a.is_empty())
        .unwrap_or_else(|| DELETED_AUTHOR.to_string())
}

fn decode<T: serde::de::DeserializeOwned>(thing: Thing) -> Result<T, RemoteError> {
    serde_json::from_value(thing.data)
        .map_err(|e| RemoteError::Malformed(format!("bad '{}' object: {}", thing.kind, e)))
}

/// Converts a `t3` thing into an item of `feed`
///
/// The item is filed under the configured feed name, whatever spelling the
/// API reports for the subreddit.
pub fn item_from_thing(thing: Thing, feed: &str) -> Result<Option<Item>, RemoteError> {
    if thing.kind != "t3" {
        return Ok(None);
    }

    let link: LinkData = decode(thing)?;

    Ok(Some(Item {
        id: link.id,
        feed: feed.to_string(),
        author: author_or_deleted(link.author),
        title: link.title,
        created_at: timestamp(link.created_utc)?,
        body: link.selftext,
        reply_count: link.num_comments,
        score: link.score,
        metadata: ItemMetadata {
            upvote_ratio: link.upvote_ratio,
            over_18: link.over_18,
        },
    }))
}

/// A decoded thing whose nested replies are still undecoded
enum Decoded {
    Reply(RawReply, Vec<Thing>),
    Stub(StubRef),
}

fn decode_node(thing: Thing, item_id: &str) -> Result<Option<Decoded>, RemoteError> {
    match thing.kind.as_str() {
        "t1" => {
            let comment: CommentData = decode(thing)?;
            let nested = match comment.replies {
                Value::Object(_) => {
                    let listing: Listing = serde_json::from_value(comment.replies)
                        .map_err(|e| RemoteError::Malformed(format!("bad replies: {}", e)))?;
                    listing.data.children
                }
                _ => Vec::new(),
            };

            let reply = RawReply {
                parent_id: strip_kind(&comment.parent_id).to_string(),
                id: comment.id,
                author: author_or_deleted(comment.author),
                created_at: timestamp(comment.created_utc)?,
                body: comment.body,
                score: comment.score,
                children: Vec::new(),
            };
            Ok(Some(Decoded::Reply(reply, nested)))
        }
        "more" => {
            let more: MoreData = decode(thing)?;
            Ok(Some(Decoded::Stub(StubRef {
                parent_id: strip_kind(&more.parent_id).to_string(),
                id: more.id,
                item_id: item_id.to_string(),
                children: more.children,
                count: more.count,
            })))
        }
        _ => Ok(None),
    }
}

/// Converts a `t1` or `more` thing into a reply node, including loaded replies
pub fn node_from_thing(thing: Thing, item_id: &str) -> Result<Option<ReplyNode>, RemoteError> {
    Ok(nodes_from_things(vec![thing], item_id)?.pop())
}

/// Converts a list of things into reply nodes, dropping unknown kinds
///
/// Nested listings are walked with an explicit stack of open replies; a reply
/// is attached to its parent once all of its own replies are converted.
pub fn nodes_from_things(things: Vec<Thing>, item_id: &str) -> Result<Vec<ReplyNode>, RemoteError> {
    let mut roots = Vec::with_capacity(things.len());
    let mut top = things.into_iter();
    let mut open: Vec<(RawReply, std::vec::IntoIter<Thing>)> = Vec::new();

    loop {
        let next = match open.last_mut() {
            Some((_, pending)) => pending.next(),
            None => top.next(),
        };

        let node = match next {
            Some(thing) => match decode_node(thing, item_id)? {
                Some(Decoded::Reply(reply, nested)) => {
                    open.push((reply, nested.into_iter()));
                    continue;
                }
                Some(Decoded::Stub(stub)) => ReplyNode::Stub(stub),
                None => continue,
            },
            None => match open.pop() {
                Some((reply, _)) => ReplyNode::Reply(reply),
                None => break,
            },
        };

        match open.last_mut() {
            Some((parent, _)) => parent.children.push(node),
            None => roots.push(node),
        }
    }

    Ok(roots)
}
