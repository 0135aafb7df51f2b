//! Content Hasher (C3): deep-copy, null out `id`/`meta`, canonical
//! serialize, fingerprint. `serde_json::Value` objects parsed from JSON
//! text already sort their keys (this workspace doesn't enable
//! `preserve_order`), so `to_vec` on a parsed `Value` is canonical for
//! free — no extra key-sorting pass is needed.

use mcsd_core::DomainResource;
use sha2::{Digest, Sha256};

pub type ContentHash = String;

/// `Hash(resource)`: the resource with `id`/`meta` nulled out, fingerprinted.
#[must_use]
pub fn hash_resource(resource: &DomainResource) -> ContentHash {
    let stripped = resource.strip_identity();
    fingerprint(&stripped)
}

/// `HashUpstream(entry)`: hashes the resource after namespacing its
/// references, so it compares against the local namespaced form. Takes an
/// already-namespaced copy — namespacing happens once, in the adjacency
/// builder, and is reused for both the hash and (if classified `new`/
/// `update`) the transaction entry body.
#[must_use]
pub fn hash_namespaced_resource(namespaced_raw: &serde_json::Value) -> ContentHash {
    let mut copy = namespaced_raw.clone();
    if let Some(obj) = copy.as_object_mut() {
        obj.insert("id".to_string(), serde_json::Value::Null);
        obj.insert("meta".to_string(), serde_json::Value::Null);
    }
    fingerprint(&copy)
}

/// `HashLocal(entry)`: hashes the resource as-is — no namespacing, it's
/// already in local form.
#[must_use]
pub fn hash_local_resource(resource: &DomainResource) -> ContentHash {
    hash_resource(resource)
}

fn fingerprint(value: &serde_json::Value) -> ContentHash {
    let bytes = serde_json::to_vec(value).expect("Value serialization cannot fail");
    let digest = Sha256::digest(&bytes);
    hex::encode(digest)
}
