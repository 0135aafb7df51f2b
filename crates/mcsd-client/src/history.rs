//! Shapes specific to `_history` bundles: the write method each entry
//! represents, and the dedup rule C1 applies across a page.

use std::collections::HashSet;

use mcsd_core::{CoreError, DirectoryResourceType, DomainResource};
use serde_json::Value;

/// The write method a history entry's `request.method` encodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryMethod {
    Put,
    Post,
    Delete,
}

impl HistoryMethod {
    fn parse(method: &str) -> Option<Self> {
        match method.to_ascii_uppercase().as_str() {
            "PUT" => Some(Self::Put),
            "POST" => Some(Self::Post),
            "DELETE" => Some(Self::Delete),
            _ => None,
        }
    }
}

/// One entry of a `_history` page: the write method, and the resource body
/// (absent for `DELETE`, where only the id survives in the entry).
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub method: HistoryMethod,
    pub resource_type: DirectoryResourceType,
    pub upstream_id: String,
    pub resource: Option<DomainResource>,
}

/// Parses a single `Bundle.entry` from a `_history` response.
pub fn parse_history_entry(entry: &Value) -> Result<Option<HistoryEntry>, CoreError> {
    let method_str = entry
        .pointer("/request/method")
        .and_then(Value::as_str)
        .ok_or_else(|| CoreError::invalid_reference("(history entry)", "missing request.method"))?;
    let Some(method) = HistoryMethod::parse(method_str) else {
        return Ok(None);
    };

    let resource = entry.get("resource").cloned().and_then(|v| {
        if v.is_null() {
            None
        } else {
            DomainResource::from_value(v)
        }
    });

    let (resource_type, upstream_id) = match &resource {
        Some(res) => (
            res.resource_type,
            res.id.clone().ok_or_else(|| {
                CoreError::invalid_reference("(history entry)", "resource body missing id")
            })?,
        ),
        None => parse_entry_url(entry)?,
    };

    Ok(Some(HistoryEntry {
        method,
        resource_type,
        upstream_id,
        resource,
    }))
}

/// Recovers `(type, id)` from `fullUrl` or `request.url` when the entry
/// carries no resource body (a `DELETE`).
fn parse_entry_url(entry: &Value) -> Result<(DirectoryResourceType, String), CoreError> {
    let url = entry
        .get("fullUrl")
        .and_then(Value::as_str)
        .or_else(|| entry.pointer("/request/url").and_then(Value::as_str))
        .ok_or_else(|| {
            CoreError::invalid_reference("(history entry)", "no fullUrl or request.url to derive id from")
        })?;
    let segments: Vec<&str> = url.trim_end_matches('/').rsplit('/').take(2).collect();
    match segments.as_slice() {
        [id, type_str] => {
            let resource_type = type_str.parse()?;
            Ok((resource_type, (*id).to_string()))
        }
        _ => Err(CoreError::invalid_reference(url, "cannot derive type/id")),
    }
}

/// Deduplicates a page of history entries: when the same `(type, id)`
/// appears more than once, keeps only the first occurrence — the upstream
/// orders pages newest-first, so first-seen is the most recent version.
pub fn dedup_newest_first(entries: Vec<HistoryEntry>) -> Vec<HistoryEntry> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(entries.len());
    for entry in entries {
        let key = (entry.resource_type, entry.upstream_id.clone());
        if seen.insert(key) {
            out.push(entry);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_put_entry_with_resource() {
        let entry = json!({
            "fullUrl": "https://upstream.test/fhir/Organization/O1",
            "request": {"method": "PUT", "url": "Organization/O1"},
            "resource": {"resourceType": "Organization", "id": "O1", "name": "Acme"}
        });
        let parsed = parse_history_entry(&entry).unwrap().unwrap();
        assert_eq!(parsed.method, HistoryMethod::Put);
        assert_eq!(parsed.upstream_id, "O1");
        assert!(parsed.resource.is_some());
    }

    #[test]
    fn parses_delete_entry_without_resource() {
        let entry = json!({
            "fullUrl": "https://upstream.test/fhir/Organization/O1",
            "request": {"method": "DELETE", "url": "Organization/O1"}
        });
        let parsed = parse_history_entry(&entry).unwrap().unwrap();
        assert_eq!(parsed.method, HistoryMethod::Delete);
        assert_eq!(parsed.resource_type, DirectoryResourceType::Organization);
        assert_eq!(parsed.upstream_id, "O1");
        assert!(parsed.resource.is_none());
    }

    #[test]
    fn ignores_unrecognized_methods() {
        let entry = json!({
            "request": {"method": "PATCH", "url": "Organization/O1"}
        });
        assert!(parse_history_entry(&entry).unwrap().is_none());
    }

    #[test]
    fn dedup_keeps_first_seen_per_type_and_id() {
        let newer = HistoryEntry {
            method: HistoryMethod::Put,
            resource_type: DirectoryResourceType::Organization,
            upstream_id: "O1".into(),
            resource: None,
        };
        let older = HistoryEntry {
            method: HistoryMethod::Delete,
            resource_type: DirectoryResourceType::Organization,
            upstream_id: "O1".into(),
            resource: None,
        };
        let deduped = dedup_newest_first(vec![newer, older]);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].method, HistoryMethod::Put);
    }
}
