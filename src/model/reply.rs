use chrono::{DateTime, Utc};

/// A node of an item's reply tree, flattened for storage
///
/// Parent/child relationships are reconstructible from `parent_id` alone:
/// root replies point at the owning item, everything else at another reply.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub id: String,

    /// Owning item
    pub item_id: String,

    /// Either `item_id` or the id of another reply in the same tree
    pub parent_id: String,

    pub author: String,

    pub created_at: DateTime<Utc>,

    pub body: String,

    /// Distance from the item root; root replies have depth 0
    pub depth: u32,

    /// Number of real replies directly below this one
    pub child_count: u32,

    pub score: i64,
}

impl Reply {
    /// Returns true if this reply hangs directly off the item
    pub fn is_root(&self) -> bool {
        self.parent_id == self.item_id
    }
}
