//! Node Classifier (C5): turns each closed node into a verb by combining
//! its upstream method, content hashes on both sides, and resource-map
//! presence.

use mcsd_client::HistoryMethod;
use mcsd_core::{CoreError, namespace_resource};
use tracing::warn;

use crate::hash::hash_namespaced_resource;
use crate::node::{Node, NodeArena, NodeContent, NodeKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
    New,
    Update,
    Delete,
    Equal,
    Ignore,
}

#[derive(Debug, Clone)]
pub struct Classification {
    pub key: NodeKey,
    pub status: NodeStatus,
}

/// Classifies every real node in the arena (skips synthetic
/// `UnresolvedMarker` nodes, which never produce a transaction entry).
///
/// `directory_id` is the namespace `HashUpstream` rewrites references
/// into before hashing, so the result is comparable against `local_hash`
/// (recorded from an already-namespaced local resource).
pub fn classify_nodes(
    arena: &NodeArena,
    directory_id: &str,
) -> Result<Vec<Classification>, CoreError> {
    let mut out = Vec::with_capacity(arena.len());
    for node in arena.iter() {
        if let Some(status) = classify_one(node, directory_id)? {
            out.push(Classification {
                key: node.key.clone(),
                status,
            });
        }
    }
    Ok(out)
}

fn classify_one(node: &Node, directory_id: &str) -> Result<Option<NodeStatus>, CoreError> {
    if matches!(node.content, NodeContent::UnresolvedMarker) {
        return Ok(None);
    }

    if node.unresolved {
        warn!(node = ?node.key, "ignoring node: unresolved reference in its closure");
        return Ok(Some(NodeStatus::Ignore));
    }

    if node.is_delete() {
        return Ok(Some(classify_delete(node)?));
    }

    let Some(resource) = node.upstream_resource() else {
        warn!(node = ?node.key, "ignoring non-delete node with no upstream resource");
        return Ok(Some(NodeStatus::Ignore));
    };

    let mut namespaced = resource.raw.clone();
    namespace_resource(&mut namespaced, directory_id);
    let upstream_hash = hash_namespaced_resource(&namespaced);

    if node.has_resource_map {
        let equal = node.local_hash.as_deref() == Some(upstream_hash.as_str());
        Ok(Some(if equal { NodeStatus::Equal } else { NodeStatus::Update }))
    } else {
        Ok(Some(NodeStatus::New))
    }
}

fn classify_delete(node: &Node) -> Result<NodeStatus, CoreError> {
    if node.local_hash.is_none() {
        return Ok(NodeStatus::Ignore);
    }
    if !node.has_resource_map {
        return Err(CoreError::InvalidNodeState {
            resource_type: node.key.0.to_string(),
            id: node.key.1.clone(),
            reason: "delete classified with a local hash but no resource map row".to_string(),
        });
    }
    Ok(NodeStatus::Delete)
}
