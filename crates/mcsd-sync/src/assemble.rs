//! Transaction Assembler (C6): turns a classified graph into a single
//! local FHIR transaction Bundle plus the resource-map writes that must
//! commit alongside it.

use mcsd_core::{DomainResource, namespace_id, namespace_resource, now_utc};
use mcsd_storage::{ResourceMapKey, ResourceMapRow};
use serde_json::{Value, json};

use crate::classify::{Classification, NodeStatus};
use crate::hash::hash_namespaced_resource;
use crate::node::NodeArena;

/// A pending write to the resource map, applied only once the bundle this
/// pass produced has been acknowledged by the local FHIR server. Kept as
/// separate `Insert`/`Update` variants (rather than a generic upsert) so the
/// committing step can call the matching `ResourceMapStore` method directly.
#[derive(Debug, Clone)]
pub enum ResourceMapWrite {
    Insert(ResourceMapRow),
    Update(ResourceMapRow),
    Delete(ResourceMapKey),
}

/// One pass's output: the transaction Bundle to POST locally, and the
/// resource-map mutations to commit transactionally with its success.
#[derive(Debug, Clone)]
pub struct AssembledTransaction {
    pub bundle: Value,
    pub resource_map_writes: Vec<ResourceMapWrite>,
}

/// Builds the transaction Bundle and resource-map writes for one classified
/// graph. Nodes classified `equal`/`ignore` (and markers, already excluded
/// by the classifier) contribute nothing.
#[must_use]
pub fn assemble_transaction(
    arena: &NodeArena,
    classifications: &[Classification],
    directory_id: &str,
) -> AssembledTransaction {
    let now = now_utc();
    let mut entries = Vec::new();
    let mut writes = Vec::new();

    for c in classifications {
        let Some(node) = arena.get(&c.key) else { continue };
        let (resource_type, upstream_id) = &c.key;
        let local_id = namespace_id(directory_id, upstream_id);
        let url = format!("{resource_type}/{local_id}");

        match c.status {
            NodeStatus::New | NodeStatus::Update => {
                let Some(resource) = node.upstream_resource() else {
                    continue;
                };
                let body = build_local_body(resource, directory_id, &local_id);
                let content_hash = hash_namespaced_resource(&strip_for_hash(&body));
                entries.push(json!({
                    "request": {"method": "PUT", "url": url},
                    "resource": body,
                }));
                let row = ResourceMapRow {
                    directory_id: directory_id.to_string(),
                    resource_type: *resource_type,
                    upstream_resource_id: upstream_id.clone(),
                    local_resource_id: local_id,
                    content_hash,
                    created_at: now.clone(),
                    updated_at: now.clone(),
                };
                writes.push(if c.status == NodeStatus::New {
                    ResourceMapWrite::Insert(row)
                } else {
                    ResourceMapWrite::Update(row)
                });
            }
            NodeStatus::Delete => {
                entries.push(json!({
                    "request": {"method": "DELETE", "url": url},
                }));
                writes.push(ResourceMapWrite::Delete(ResourceMapKey {
                    directory_id: directory_id.to_string(),
                    resource_type: *resource_type,
                    upstream_resource_id: upstream_id.clone(),
                }));
            }
            NodeStatus::Equal | NodeStatus::Ignore => {}
        }
    }

    let bundle = json!({
        "resourceType": "Bundle",
        "type": "transaction",
        "entry": entries,
    });
    AssembledTransaction {
        bundle,
        resource_map_writes: writes,
    }
}

/// Deep-copies the upstream resource, namespaces its references, sets its
/// local id, and clears server-set metadata — §4.6 steps 1 and 3.
fn build_local_body(resource: &DomainResource, directory_id: &str, local_id: &str) -> Value {
    let mut local = resource.clone();
    namespace_resource(&mut local.raw, directory_id);
    local.set_id(local_id);
    local.clear_server_meta();
    local.raw
}

fn strip_for_hash(body: &Value) -> Value {
    let mut copy = body.clone();
    if let Some(obj) = copy.as_object_mut() {
        obj.insert("id".to_string(), Value::Null);
        obj.insert("meta".to_string(), Value::Null);
    }
    copy
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{Node, NodeContent};
    use mcsd_client::HistoryMethod;
    use mcsd_core::DirectoryResourceType;
    use serde_json::json;

    fn org(id: &str) -> DomainResource {
        DomainResource::from_value(json!({"resourceType": "Organization", "id": id, "name": id})).unwrap()
    }

    fn key(id: &str) -> (DirectoryResourceType, String) {
        (DirectoryResourceType::Organization, id.to_string())
    }

    #[test]
    fn new_node_emits_put_and_resource_map_insert() {
        let mut arena = NodeArena::new();
        arena.insert(Node {
            key: key("O1"),
            content: NodeContent::Dependency(org("O1")),
            upstream_hash: None,
            local_resource_id: None,
            local_hash: None,
            has_resource_map: false,
            unresolved: false,
        });
        let classifications = vec![Classification {
            key: key("O1"),
            status: NodeStatus::New,
        }];
        let assembled = assemble_transaction(&arena, &classifications, "dir1");

        let entries = assembled.bundle["entry"].as_array().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["request"]["method"], "PUT");
        assert_eq!(entries[0]["request"]["url"], "Organization/dir1-O1");
        assert_eq!(entries[0]["resource"]["id"], "dir1-O1");
        assert_eq!(assembled.resource_map_writes.len(), 1);
        assert!(matches!(assembled.resource_map_writes[0], ResourceMapWrite::Insert(_)));
    }

    #[test]
    fn delete_node_emits_delete_and_tombstone() {
        let mut arena = NodeArena::new();
        arena.insert(Node {
            key: key("O1"),
            content: NodeContent::History {
                method: HistoryMethod::Delete,
                resource: None,
            },
            upstream_hash: None,
            local_resource_id: None,
            local_hash: Some("abc".into()),
            has_resource_map: true,
            unresolved: false,
        });
        let classifications = vec![Classification {
            key: key("O1"),
            status: NodeStatus::Delete,
        }];
        let assembled = assemble_transaction(&arena, &classifications, "dir1");

        let entries = assembled.bundle["entry"].as_array().unwrap();
        assert_eq!(entries[0]["request"]["method"], "DELETE");
        assert!(entries[0].get("resource").is_none());
        assert!(matches!(assembled.resource_map_writes[0], ResourceMapWrite::Delete(_)));
    }

    #[test]
    fn equal_and_ignore_emit_nothing() {
        let mut arena = NodeArena::new();
        arena.insert(Node {
            key: key("O1"),
            content: NodeContent::Dependency(org("O1")),
            upstream_hash: None,
            local_resource_id: None,
            local_hash: None,
            has_resource_map: true,
            unresolved: false,
        });
        let classifications = vec![Classification {
            key: key("O1"),
            status: NodeStatus::Equal,
        }];
        let assembled = assemble_transaction(&arena, &classifications, "dir1");
        assert!(assembled.bundle["entry"].as_array().unwrap().is_empty());
        assert!(assembled.resource_map_writes.is_empty());
    }
}
