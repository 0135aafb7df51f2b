//! Canonical id namespacing: the single rule, used for both manual-directory
//! id derivation and reference rewriting, that keeps every upstream
//! directory's resources in one conflict-free local namespace.
//!
//! `namespace_id(directory_id, upstream_id)` is `{directory_id}-{upstream_id}`
//! when that's a valid, reasonably short FHIR id; otherwise it falls back to
//! the lowercase hex SHA-256 digest of `{directory_id}|{upstream_id}`, so the
//! result always fits FHIR's 64-character, `[A-Za-z0-9\-\.]` id grammar.

use sha2::{Digest, Sha256};

const MAX_FHIR_ID_LEN: usize = 64;

fn is_valid_fhir_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_FHIR_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
}

/// Derives the canonical local id for an upstream resource id within a
/// directory's namespace.
#[must_use]
pub fn namespace_id(directory_id: &str, upstream_id: &str) -> String {
    let combined = format!("{directory_id}-{upstream_id}");
    if is_valid_fhir_id(&combined) {
        return combined;
    }
    hash_namespaced_id(directory_id, upstream_id)
}

fn hash_namespaced_id(directory_id: &str, upstream_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(directory_id.as_bytes());
    hasher.update(b"|");
    hasher.update(upstream_id.as_bytes());
    hex::encode(hasher.finalize())
}

/// Whether `id` could plausibly be a local, already-namespaced id (used by
/// diagnostics and tests, never to reverse a hash back to its inputs).
#[must_use]
pub fn is_valid_local_id(id: &str) -> bool {
    is_valid_fhir_id(id)
}

/// Derives a deterministic directory id for a manually-added directory from
/// its endpoint URL, using the same hex-SHA-256 digest `namespace_id` falls
/// back to, so one rule governs every id this core ever mints.
#[must_use]
pub fn manual_directory_id(endpoint: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(endpoint.as_bytes());
    hex::encode(hasher.finalize())
}
