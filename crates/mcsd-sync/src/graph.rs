//! Adjacency Graph Builder (C4): closes a history page into a graph of
//! every resource that must exist locally to keep referential integrity,
//! batching upstream fetches one request per loop iteration.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use mcsd_client::{FhirClient, HistoryEntry, HistoryMethod};
use mcsd_core::{CoreError, DomainResource, NodeReference, extract_references};
use mcsd_storage::{ResourceMapKey, ResourceMapStore, StorageError};
use serde_json::json;
use tracing::warn;

use crate::node::{Node, NodeArena, NodeContent, NodeKey};

fn node_key(r: &NodeReference) -> NodeKey {
    (r.resource_type, r.resource_id.clone())
}

/// Fetches the current state of a batch of references from upstream in a
/// single round trip. `mcsd-client`'s transport concerns (retries,
/// correlation ids) live underneath; this trait exists so the closure
/// algorithm can be tested without real HTTP.
#[async_trait]
pub trait UpstreamFetcher: Send + Sync {
    async fn fetch_many(&self, wanted: &[NodeReference]) -> Result<Vec<DomainResource>, CoreError>;
}

/// Batches `wanted` into one FHIR `Bundle.type = batch` request — the
/// "single batched request" §4.4 requires, rather than one GET per ref.
pub struct ClientUpstreamFetcher<'a> {
    pub client: &'a FhirClient,
}

#[async_trait]
impl UpstreamFetcher for ClientUpstreamFetcher<'_> {
    async fn fetch_many(&self, wanted: &[NodeReference]) -> Result<Vec<DomainResource>, CoreError> {
        if wanted.is_empty() {
            return Ok(Vec::new());
        }
        let entries: Vec<_> = wanted
            .iter()
            .map(|r| {
                json!({
                    "request": {
                        "method": "GET",
                        "url": format!("{}/{}", r.resource_type, r.resource_id),
                    }
                })
            })
            .collect();
        let bundle = json!({"resourceType": "Bundle", "type": "batch", "entry": entries});
        let (response, _entry_errors) = self.client.post_bundle(&bundle).await?;
        let resources = response
            .get("entry")
            .and_then(serde_json::Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|entry| entry.get("resource").cloned())
            .filter_map(DomainResource::from_value)
            .collect();
        Ok(resources)
    }
}

/// A cache of nodes resolved earlier in the same sync pass (e.g. while
/// closing a prior resource type's history page), consulted before going
/// back to upstream for a reference this page doesn't already carry.
#[derive(Debug, Default)]
pub struct NodeCache {
    resources: HashMap<NodeKey, DomainResource>,
}

impl NodeCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, key: &NodeKey) -> Option<&DomainResource> {
        self.resources.get(key)
    }

    pub fn insert(&mut self, resource: DomainResource) {
        if let Some(id) = resource.id.clone() {
            self.resources.insert((resource.resource_type, id), resource);
        }
    }
}

// `upstream_hash` is left unset here: `HashUpstream` needs the resource
// namespaced for a specific directory first (§4.3), and the graph builder
// doesn't carry a directory id. The classifier computes and fills it in.
fn dependency_node(resource: DomainResource) -> Node {
    let key = (resource.resource_type, resource.id.clone().unwrap_or_default());
    Node {
        key,
        content: NodeContent::Dependency(resource),
        upstream_hash: None,
        local_resource_id: None,
        local_hash: None,
        has_resource_map: false,
        unresolved: false,
    }
}

fn unresolved_marker_node(key: NodeKey) -> Node {
    Node {
        key,
        content: NodeContent::UnresolvedMarker,
        upstream_hash: None,
        local_resource_id: None,
        local_hash: None,
        has_resource_map: false,
        unresolved: true,
    }
}

fn history_node(entry: HistoryEntry) -> Node {
    let key = (entry.resource_type, entry.upstream_id);
    Node {
        key,
        content: NodeContent::History {
            method: entry.method,
            resource: entry.resource,
        },
        upstream_hash: None,
        local_resource_id: None,
        local_hash: None,
        has_resource_map: false,
        unresolved: false,
    }
}

/// Every reference reachable from nodes already in the arena that points
/// outside it. As a side effect, marks any node whose own reference set
/// fails to parse as `unresolved` (§7's `InvalidReference`: that node is
/// aborted, the rest of the pass continues).
fn collect_missing(arena: &mut NodeArena, base_url: &str) -> Vec<NodeReference> {
    let mut missing = Vec::new();
    let mut seen = HashSet::new();
    let mut invalid_keys = Vec::new();

    for node in arena.iter() {
        let Some(resource) = node.upstream_resource() else {
            continue;
        };
        match extract_references(&resource.raw, base_url) {
            Ok(refs) => {
                for r in refs {
                    let key = node_key(&r);
                    if !arena.contains(&key) && seen.insert(key) {
                        missing.push(r);
                    }
                }
            }
            Err(e) => {
                warn!(node = ?node.key, error = %e, "node has an invalid reference, aborting it for this pass");
                invalid_keys.push(node.key.clone());
            }
        }
    }

    for key in invalid_keys {
        if let Some(node) = arena.get_mut(&key) {
            node.unresolved = true;
        }
    }

    missing
}

/// Builds the closed adjacency graph for one page of history entries.
pub async fn build_adjacency_graph(
    history_entries: Vec<HistoryEntry>,
    base_url: &str,
    fetcher: &dyn UpstreamFetcher,
    cache: &mut NodeCache,
) -> Result<NodeArena, CoreError> {
    let mut arena = NodeArena::new();
    for entry in history_entries {
        if let Some(resource) = &entry.resource {
            cache.insert(resource.clone());
        }
        arena.insert(history_node(entry));
    }

    let mut attempted: HashSet<NodeKey> = HashSet::new();

    loop {
        let missing = collect_missing(&mut arena, base_url);
        if missing.is_empty() {
            break;
        }

        let unresolved: Vec<NodeReference> = missing
            .iter()
            .filter(|r| !attempted.contains(&node_key(r)))
            .cloned()
            .collect();

        if unresolved.is_empty() {
            for r in missing {
                arena.insert(unresolved_marker_node(node_key(&r)));
            }
            continue;
        }

        for r in &unresolved {
            let key = node_key(r);
            if let Some(cached) = cache.get(&key).cloned() {
                arena.insert(dependency_node(cached));
            }
        }

        let still_unresolved: Vec<NodeReference> = unresolved
            .into_iter()
            .filter(|r| !arena.contains(&node_key(r)))
            .collect();

        if !still_unresolved.is_empty() {
            let fetched = fetcher.fetch_many(&still_unresolved).await?;
            for resource in fetched {
                cache.insert(resource.clone());
                arena.insert(dependency_node(resource));
            }
            for r in &still_unresolved {
                attempted.insert(node_key(r));
            }
        }
    }

    propagate_unresolved(&mut arena, base_url);
    Ok(arena)
}

/// Fixpoint pass: a node becomes `unresolved` if any resource it directly
/// references is itself unresolved (a marker, or transitively unresolved).
fn propagate_unresolved(arena: &mut NodeArena, base_url: &str) {
    loop {
        let snapshot: Vec<(NodeKey, Vec<NodeKey>)> = arena
            .iter()
            .filter_map(|node| {
                let resource = node.upstream_resource()?;
                let refs = extract_references(&resource.raw, base_url).ok()?;
                Some((node.key.clone(), refs.iter().map(node_key).collect()))
            })
            .collect();

        let mut changed = false;
        for (key, refs) in snapshot {
            let any_unresolved = refs
                .iter()
                .any(|k| arena.get(k).is_none_or(|n| n.unresolved));
            if any_unresolved {
                if let Some(node) = arena.get_mut(&key) {
                    if !node.unresolved {
                        node.unresolved = true;
                        changed = true;
                    }
                }
            }
        }
        if !changed {
            break;
        }
    }
}

/// After the graph closes, asks the local store for the namespaced
/// counterpart of every node in one batched request and attaches the local
/// hash/id/resource-map presence to each hit.
pub async fn attach_local_state(
    arena: &mut NodeArena,
    directory_id: &str,
    store: &dyn ResourceMapStore,
) -> Result<(), StorageError> {
    let keys: Vec<ResourceMapKey> = arena
        .iter()
        .map(|n| ResourceMapKey {
            directory_id: directory_id.to_string(),
            resource_type: n.key.0,
            upstream_resource_id: n.key.1.clone(),
        })
        .collect();
    if keys.is_empty() {
        return Ok(());
    }

    let rows = store.get_many(&keys).await?;
    for row in rows {
        let key = (row.resource_type, row.upstream_resource_id.clone());
        if let Some(node) = arena.get_mut(&key) {
            node.local_resource_id = Some(row.local_resource_id);
            node.local_hash = Some(row.content_hash);
            node.has_resource_map = true;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcsd_core::DirectoryResourceType;
    use serde_json::json;
    use std::sync::Mutex;

    struct StubFetcher {
        responses: Mutex<Vec<Vec<DomainResource>>>,
    }

    #[async_trait]
    impl UpstreamFetcher for StubFetcher {
        async fn fetch_many(&self, _wanted: &[NodeReference]) -> Result<Vec<DomainResource>, CoreError> {
            Ok(self.responses.lock().unwrap().pop().unwrap_or_default())
        }
    }

    fn org(id: &str, part_of: Option<&str>) -> DomainResource {
        let mut value = json!({"resourceType": "Organization", "id": id, "name": id});
        if let Some(parent) = part_of {
            value["partOf"] = json!({"reference": format!("Organization/{parent}")});
        }
        DomainResource::from_value(value).unwrap()
    }

    fn history_entry(resource: DomainResource) -> HistoryEntry {
        HistoryEntry {
            method: HistoryMethod::Put,
            resource_type: resource.resource_type,
            upstream_id: resource.id.clone().unwrap(),
            resource: Some(resource),
        }
    }

    #[tokio::test]
    async fn closes_graph_by_fetching_missing_reference() {
        let entries = vec![history_entry(org("O1", Some("O2")))];
        let fetcher = StubFetcher {
            responses: Mutex::new(vec![vec![org("O2", None)]]),
        };
        let mut cache = NodeCache::new();
        let arena = build_adjacency_graph(entries, "http://dir.test/fhir", &fetcher, &mut cache)
            .await
            .unwrap();

        assert_eq!(arena.len(), 2);
        assert!(arena.contains(&(DirectoryResourceType::Organization, "O2".to_string())));
    }

    #[tokio::test]
    async fn reuses_node_cache_instead_of_refetching() {
        let entries = vec![history_entry(org("O1", Some("O2")))];
        let fetcher = StubFetcher {
            responses: Mutex::new(vec![]),
        };
        let mut cache = NodeCache::new();
        cache.insert(org("O2", None));

        let arena = build_adjacency_graph(entries, "http://dir.test/fhir", &fetcher, &mut cache)
            .await
            .unwrap();
        assert_eq!(arena.len(), 2);
    }

    #[tokio::test]
    async fn marks_unresolved_marker_when_upstream_never_returns_it() {
        let entries = vec![history_entry(org("O1", Some("O2")))];
        let fetcher = StubFetcher {
            responses: Mutex::new(vec![vec![]]),
        };
        let mut cache = NodeCache::new();
        let arena = build_adjacency_graph(entries, "http://dir.test/fhir", &fetcher, &mut cache)
            .await
            .unwrap();

        let marker = arena
            .get(&(DirectoryResourceType::Organization, "O2".to_string()))
            .unwrap();
        assert!(matches!(marker.content, NodeContent::UnresolvedMarker));

        let dependent = arena
            .get(&(DirectoryResourceType::Organization, "O1".to_string()))
            .unwrap();
        assert!(dependent.unresolved);
    }

    #[tokio::test]
    async fn deletes_have_no_references_to_follow() {
        let entries = vec![HistoryEntry {
            method: HistoryMethod::Delete,
            resource_type: DirectoryResourceType::Organization,
            upstream_id: "O1".into(),
            resource: None,
        }];
        let fetcher = StubFetcher {
            responses: Mutex::new(vec![]),
        };
        let mut cache = NodeCache::new();
        let arena = build_adjacency_graph(entries, "http://dir.test/fhir", &fetcher, &mut cache)
            .await
            .unwrap();
        assert_eq!(arena.len(), 1);
        assert!(arena.iter().next().unwrap().is_delete());
    }
}
