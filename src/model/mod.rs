//! Domain model for crawled content
//!
//! This module defines the records the crawler produces and stores:
//! - Items: top-level entries of a feed
//! - Replies: nodes of an item's reply tree, flattened with parent/depth metadata
//! - Checkpoints: the per-feed resume boundary

mod checkpoint;
mod item;
mod reply;

pub use checkpoint::{Backlog, Checkpoint, Region, WalkSpan};
pub use item::{Item, ItemMetadata, DELETED_AUTHOR};
pub use reply::Reply;
