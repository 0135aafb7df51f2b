//! The adjacency graph's node type and the arena it lives in.
//!
//! Per Design Notes §9, nodes are stored in a flat arena and referred to by
//! index rather than by pointer, so the graph/builder/node cycle the source
//! system represents as mutable object references becomes a `Vec` plus a
//! `HashMap<NodeKey, usize>` lookup.

use std::collections::HashMap;

use mcsd_client::HistoryMethod;
use mcsd_core::{DirectoryResourceType, DomainResource};

use crate::hash::ContentHash;

/// `(resource_type, upstream_resource_id)` — never id alone, since two
/// directories can coincidentally reuse the same upstream id.
pub type NodeKey = (DirectoryResourceType, String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeContent {
    /// A node that came from the history page being processed.
    History {
        method: HistoryMethod,
        resource: Option<DomainResource>,
    },
    /// A node pulled in only to close a reference — fetched fresh from
    /// upstream or served from this pass's node cache. Classified the same
    /// way a non-`DELETE` history entry would be.
    Dependency(DomainResource),
    /// A reference upstream could not resolve even after a retry. Any node
    /// whose closure includes one of these classifies as `ignore`.
    UnresolvedMarker,
}

#[derive(Debug, Clone)]
pub struct Node {
    pub key: NodeKey,
    pub content: NodeContent,
    /// `HashUpstream`: set by the classifier once it knows which directory
    /// namespace to rewrite references into before hashing. `None` until
    /// then, and always `None` for `DELETE` entries.
    pub upstream_hash: Option<ContentHash>,
    pub local_resource_id: Option<String>,
    pub local_hash: Option<String>,
    pub has_resource_map: bool,
    /// Set by the closure's propagation pass: true if this node or anything
    /// in its reference closure is an `UnresolvedMarker`.
    pub unresolved: bool,
}

impl Node {
    #[must_use]
    pub fn is_delete(&self) -> bool {
        matches!(
            &self.content,
            NodeContent::History {
                method: HistoryMethod::Delete,
                ..
            }
        )
    }

    #[must_use]
    pub fn upstream_resource(&self) -> Option<&DomainResource> {
        match &self.content {
            NodeContent::History { resource, .. } => resource.as_ref(),
            NodeContent::Dependency(resource) => Some(resource),
            NodeContent::UnresolvedMarker => None,
        }
    }
}

/// The arena: nodes addressed by index, looked up by key.
#[derive(Debug, Default)]
pub struct NodeArena {
    nodes: Vec<Node>,
    index: HashMap<NodeKey, usize>,
}

impl NodeArena {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn contains(&self, key: &NodeKey) -> bool {
        self.index.contains_key(key)
    }

    #[must_use]
    pub fn get(&self, key: &NodeKey) -> Option<&Node> {
        self.index.get(key).map(|&i| &self.nodes[i])
    }

    pub fn get_mut(&mut self, key: &NodeKey) -> Option<&mut Node> {
        let i = *self.index.get(key)?;
        Some(&mut self.nodes[i])
    }

    /// Inserts a node if its key is not already present (each node created
    /// at most once). Returns `false` if the key was already in the arena.
    pub fn insert(&mut self, node: Node) -> bool {
        if self.index.contains_key(&node.key) {
            return false;
        }
        let idx = self.nodes.len();
        self.index.insert(node.key.clone(), idx);
        self.nodes.push(node);
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Node> {
        self.nodes.iter_mut()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn into_nodes(self) -> Vec<Node> {
        self.nodes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(id: &str) -> NodeKey {
        (DirectoryResourceType::Organization, id.to_string())
    }

    fn marker(id: &str) -> Node {
        Node {
            key: key(id),
            content: NodeContent::UnresolvedMarker,
            upstream_hash: None,
            local_resource_id: None,
            local_hash: None,
            has_resource_map: false,
            unresolved: true,
        }
    }

    #[test]
    fn insert_rejects_duplicate_keys() {
        let mut arena = NodeArena::new();
        assert!(arena.insert(marker("O1")));
        assert!(!arena.insert(marker("O1")));
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn contains_and_get_use_type_and_id() {
        let mut arena = NodeArena::new();
        arena.insert(marker("O1"));
        assert!(arena.contains(&key("O1")));
        assert!(!arena.contains(&(DirectoryResourceType::Endpoint, "O1".to_string())));
        assert!(arena.get(&key("O1")).is_some());
    }
}
