//! Reply tree resolution
//!
//! The API returns reply trees in which some branches are only placeholders
//! ("load more replies"). The resolver keeps expanding placeholders until none
//! are left, splicing every expansion in at the placeholder's position, then
//! flattens the tree in pre-order with depth and parent information.
//!
//! Pending placeholders live on an explicit work stack, so deep threads never
//! turn into deep recursion.

use crate::client::{FeedClient, RawReply, RemoteError, ReplyNode, StubRef};
use crate::model::{Item, Reply};
use std::collections::HashMap;

/// Position in a parent's child list
#[derive(Debug, Clone, PartialEq, Eq)]
enum Slot {
    Reply(String),
    Stub(usize),
}

/// Mutable reply tree built from API nodes
struct ReplyTree {
    item_id: String,
    replies: HashMap<String, RawReply>,
    children: HashMap<String, Vec<Slot>>,
    /// Parent of every stub, by stub key
    stub_parents: HashMap<usize, String>,
    next_stub: usize,
}

impl ReplyTree {
    fn new(item_id: &str) -> Self {
        Self {
            item_id: item_id.to_string(),
            replies: HashMap::new(),
            children: HashMap::new(),
            stub_parents: HashMap::new(),
            next_stub: 0,
        }
    }

    fn contains(&self, node_id: &str) -> bool {
        node_id == self.item_id || self.replies.contains_key(node_id)
    }

    /// Registers `node` under `parent` and returns the slot it occupies
    ///
    /// Nested children are registered too. Returns `None` for replies that are
    /// already part of the tree.
    fn register(
        &mut self,
        parent: &str,
        node: ReplyNode,
        pending: &mut Vec<(usize, StubRef)>,
    ) -> Option<Slot> {
        let mut first = None;
        let mut stack = vec![(parent.to_string(), node, true)];

        while let Some((parent, node, top)) = stack.pop() {
            let slot = match node {
                ReplyNode::Stub(stub) => {
                    let key = self.next_stub;
                    self.next_stub += 1;
                    self.stub_parents.insert(key, parent.clone());
                    pending.push((key, stub));
                    Slot::Stub(key)
                }
                ReplyNode::Reply(mut reply) => {
                    if self.replies.contains_key(&reply.id) {
                        tracing::trace!("Ignoring duplicate reply {}", reply.id);
                        continue;
                    }
                    let children = std::mem::take(&mut reply.children);
                    let id = reply.id.clone();
                    reply.parent_id = parent.clone();
                    self.replies.insert(id.clone(), reply);
                    self.children.entry(id.clone()).or_default();

                    // Reversed so that popping keeps the API order
                    for child in children.into_iter().rev() {
                        stack.push((id.clone(), child, false));
                    }
                    Slot::Reply(id)
                }
            };

            if top {
                first = Some(slot);
            } else {
                // Children pushed in reverse and popped in order: plain append keeps order
                self.children.entry(parent).or_default().push(slot);
            }
        }

        first
    }

    /// Adds the top-level nodes of an item
    fn graft_roots(&mut self, nodes: Vec<ReplyNode>, pending: &mut Vec<(usize, StubRef)>) {
        let root = self.item_id.clone();
        for node in nodes {
            if let Some(slot) = self.register(&root, node, pending) {
                self.children.entry(root.clone()).or_default().push(slot);
            }
        }
    }

    /// Replaces stub `key` with the nodes its expansion returned
    ///
    /// Nodes addressed to the stub's parent take the stub's place, in order.
    /// Nodes addressed to other replies are appended to those replies.
    fn graft_expansion(
        &mut self,
        key: usize,
        nodes: Vec<ReplyNode>,
        pending: &mut Vec<(usize, StubRef)>,
    ) -> Result<(), RemoteError> {
        let parent = self
            .stub_parents
            .remove(&key)
            .ok_or_else(|| RemoteError::Malformed(format!("unknown stub {}", key)))?;

        let mut replacement = Vec::new();
        let mut deferred: Vec<ReplyNode> = Vec::new();

        for node in nodes {
            let target = node_parent(&node).to_string();
            if target == parent {
                if let Some(slot) = self.register(&parent, node, pending) {
                    replacement.push(slot);
                }
            } else if self.contains(&target) {
                self.attach(&target, node, pending);
            } else {
                deferred.push(node);
            }
        }

        // Flat expansions may list a child before its parent
        while !deferred.is_empty() {
            let before = deferred.len();
            let mut still_missing = Vec::new();
            for node in deferred {
                let target = node_parent(&node).to_string();
                if self.contains(&target) {
                    self.attach(&target, node, pending);
                } else {
                    still_missing.push(node);
                }
            }
            if still_missing.len() == before {
                let orphan = &still_missing[0];
                return Err(RemoteError::Malformed(format!(
                    "expanded reply {} references unknown parent {}",
                    node_id(orphan),
                    node_parent(orphan)
                )));
            }
            deferred = still_missing;
        }

        let siblings = self.children.entry(parent).or_default();
        match siblings.iter().position(|slot| *slot == Slot::Stub(key)) {
            Some(index) => {
                siblings.splice(index..=index, replacement);
            }
            None => siblings.extend(replacement),
        }

        Ok(())
    }

    fn attach(&mut self, parent: &str, node: ReplyNode, pending: &mut Vec<(usize, StubRef)>) {
        if let Some(slot) = self.register(parent, node, pending) {
            self.children
                .entry(parent.to_string())
                .or_default()
                .push(slot);
        }
    }

    /// Flattens the tree in pre-order
    fn flatten(mut self) -> Vec<Reply> {
        let mut flat = Vec::with_capacity(self.replies.len());
        let mut stack: Vec<(String, u32)> = Vec::new();

        push_children(&self.children, &self.item_id, 0, &mut stack);

        while let Some((id, depth)) = stack.pop() {
            let Some(raw) = self.replies.remove(&id) else {
                continue;
            };

            let child_count = self
                .children
                .get(&id)
                .map(|slots| slots.iter().filter(|s| matches!(s, Slot::Reply(_))).count())
                .unwrap_or(0) as u32;

            push_children(&self.children, &id, depth + 1, &mut stack);

            flat.push(Reply {
                id: raw.id,
                item_id: self.item_id.clone(),
                parent_id: raw.parent_id,
                author: raw.author,
                created_at: raw.created_at,
                body: raw.body,
                depth,
                child_count,
                score: raw.score,
            });
        }

        flat
    }
}

fn push_children(
    children: &HashMap<String, Vec<Slot>>,
    parent: &str,
    depth: u32,
    stack: &mut Vec<(String, u32)>,
) {
    if let Some(slots) = children.get(parent) {
        for slot in slots.iter().rev() {
            if let Slot::Reply(id) = slot {
                stack.push((id.clone(), depth));
            }
        }
    }
}

fn node_parent(node: &ReplyNode) -> &str {
    match node {
        ReplyNode::Reply(reply) => &reply.parent_id,
        ReplyNode::Stub(stub) => &stub.parent_id,
    }
}

fn node_id(node: &ReplyNode) -> &str {
    match node {
        ReplyNode::Reply(reply) => &reply.id,
        ReplyNode::Stub(stub) => &stub.id,
    }
}

/// Resolves complete reply trees through a [`FeedClient`]
pub struct ReplyResolver<'c, C: FeedClient + ?Sized> {
    client: &'c C,
}

impl<'c, C: FeedClient + ?Sized> ReplyResolver<'c, C> {
    pub fn new(client: &'c C) -> Self {
        Self { client }
    }

    /// Fetches and fully expands the reply tree of `item`
    ///
    /// Returns every real reply exactly once, in pre-order. Any remote failure
    /// aborts the whole resolution; callers retry it as a unit.
    pub async fn resolve(&self, item: &Item) -> Result<Vec<Reply>, RemoteError> {
        let roots = self.client.fetch_replies(item).await?;

        let mut tree = ReplyTree::new(&item.id);
        let mut pending = Vec::new();
        tree.graft_roots(roots, &mut pending);

        let mut expansions = 0usize;
        while let Some((key, stub)) = pending.pop() {
            let nodes = self.client.expand_stub(&stub).await?;
            expansions += 1;
            tree.graft_expansion(key, nodes, &mut pending)?;
        }

        let replies = tree.flatten();
        tracing::debug!(
            "Resolved {} replies for item {} ({} stub expansions)",
            replies.len(),
            item.id,
            expansions
        );
        Ok(replies)
    }
}
