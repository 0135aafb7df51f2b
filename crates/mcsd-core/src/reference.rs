//! Reference Resolver (C2): parses and normalizes FHIR reference strings
//! against a directory's base URL, and namespaces ids and references with a
//! per-directory prefix.

use crate::error::CoreError;
use crate::fhir::DirectoryResourceType;
use crate::id;
use serde_json::Value;

/// A reference to a node in the adjacency graph, keyed the same way nodes
/// are: `(resource_type, resource_id)`, never id alone.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeReference {
    pub resource_type: DirectoryResourceType,
    pub resource_id: String,
}

impl NodeReference {
    pub fn new(resource_type: DirectoryResourceType, resource_id: impl Into<String>) -> Self {
        Self {
            resource_type,
            resource_id: resource_id.into(),
        }
    }
}

/// The structural result of parsing a reference string, before the
/// caller has decided whether an absolute reference belongs to this
/// directory. Kept separate from `NodeReference` because base-url policy
/// is the caller's job, not the parser's (§4.2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedReference {
    pub resource_type: String,
    pub resource_id: String,
    pub absolute_origin_and_prefix: Option<String>,
}

/// Parses a reference string per §4.2 steps 1–3. Does not check the
/// absolute origin against a directory base — see `resolve_reference`.
pub fn parse_reference(reference: &str) -> Result<ParsedReference, CoreError> {
    let reference = reference.trim();
    if reference.is_empty() {
        return Err(CoreError::invalid_reference(reference, "empty reference"));
    }

    if reference.starts_with('#') || reference.starts_with("urn:") {
        return Err(CoreError::invalid_reference(
            reference,
            "contained or URN references are not resolvable",
        ));
    }

    if reference.contains("://") {
        return parse_absolute(reference);
    }

    let parts: Vec<&str> = reference.split('/').collect();
    if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
        return Err(CoreError::invalid_reference(
            reference,
            "relative reference must be exactly Type/id",
        ));
    }
    Ok(ParsedReference {
        resource_type: parts[0].to_string(),
        resource_id: parts[1].to_string(),
        absolute_origin_and_prefix: None,
    })
}

fn parse_absolute(reference: &str) -> Result<ParsedReference, CoreError> {
    let scheme_split = reference
        .splitn(2, "://")
        .nth(1)
        .ok_or_else(|| CoreError::invalid_reference(reference, "malformed URL"))?;
    let (origin, path) = scheme_split
        .split_once('/')
        .ok_or_else(|| CoreError::invalid_reference(reference, "URL has no path"))?;
    let scheme = reference.split("://").next().unwrap_or("http");
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    let (type_seg, id_seg, prefix_len) = if let Some(hist_idx) =
        segments.iter().position(|s| *s == "_history")
    {
        if hist_idx < 2 {
            return Err(CoreError::invalid_reference(
                reference,
                "too few segments before _history",
            ));
        }
        (segments[hist_idx - 2], segments[hist_idx - 1], hist_idx)
    } else {
        if segments.len() < 2 {
            return Err(CoreError::invalid_reference(
                reference,
                "fewer than two path segments",
            ));
        }
        let n = segments.len();
        (segments[n - 2], segments[n - 1], n)
    };

    let prefix = segments[..prefix_len - 2].join("/");
    let origin_and_prefix = if prefix.is_empty() {
        format!("{scheme}://{origin}")
    } else {
        format!("{scheme}://{origin}/{prefix}")
    };

    Ok(ParsedReference {
        resource_type: type_seg.to_string(),
        resource_id: id_seg.to_string(),
        absolute_origin_and_prefix: Some(origin_and_prefix),
    })
}

/// Resolves a reference string against a directory's base URL, applying
/// the policy ParseReference itself does not: an absolute reference whose
/// origin+path-prefix differs from `base_url` belongs to a different
/// directory and is rejected.
///
/// Returns `Ok(None)` for references to resource types outside the seven
/// this core understands (e.g. a stray `Patient/123`) — those are simply
/// not part of the adjacency graph, not an error.
pub fn resolve_reference(
    reference: &str,
    base_url: &str,
) -> Result<Option<NodeReference>, CoreError> {
    let parsed = parse_reference(reference)?;

    if let Some(origin_and_prefix) = &parsed.absolute_origin_and_prefix {
        let normalized_base = base_url.trim_end_matches('/');
        if origin_and_prefix.trim_end_matches('/') != normalized_base {
            return Err(CoreError::invalid_reference(
                reference,
                format!("origin/path-prefix does not match directory base {base_url}"),
            ));
        }
    }

    match parsed.resource_type.parse::<DirectoryResourceType>() {
        Ok(rt) => Ok(Some(NodeReference::new(rt, parsed.resource_id))),
        Err(_) => Ok(None),
    }
}

/// Recursively walks a resource's JSON payload collecting every reference
/// that resolves to a directory node (C4's adjacency expansion step).
/// References to resource types outside the seven mCSD types are skipped,
/// as are references this directory's base URL rejects outright.
pub fn extract_references(
    resource: &Value,
    base_url: &str,
) -> Result<Vec<NodeReference>, CoreError> {
    let mut out = Vec::new();
    walk_extract(resource, base_url, &mut out)?;
    Ok(out)
}

fn walk_extract(
    value: &Value,
    base_url: &str,
    out: &mut Vec<NodeReference>,
) -> Result<(), CoreError> {
    match value {
        Value::Object(map) => {
            if let Some(Value::String(r)) = map.get("reference") {
                if !r.trim().starts_with('#') {
                    if let Some(node_ref) = resolve_reference(r, base_url)? {
                        out.push(node_ref);
                    }
                }
            }
            for v in map.values() {
                walk_extract(v, base_url, out)?;
            }
        }
        Value::Array(items) => {
            for item in items {
                walk_extract(item, base_url, out)?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// Recursively walks a resource's JSON payload, rewriting every
/// `Reference.reference` string of the plain `Type/id` form to
/// `Type/{namespace}-{id}` (or the hashed form when too long). Contained
/// references (`#local`) are left untouched because they never match the
/// `Type/id` shape.
pub fn namespace_resource(resource: &mut Value, namespace: &str) {
    walk_namespace(resource, namespace);
}

fn walk_namespace(value: &mut Value, namespace: &str) {
    match value {
        Value::Object(map) => {
            if let Some(Value::String(r)) = map.get("reference").cloned() {
                if let Some(rewritten) = rewrite_plain_reference(&r, namespace) {
                    map.insert("reference".to_string(), Value::String(rewritten));
                }
            }
            for v in map.values_mut() {
                walk_namespace(v, namespace);
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                walk_namespace(item, namespace);
            }
        }
        _ => {}
    }
}

fn rewrite_plain_reference(reference: &str, namespace: &str) -> Option<String> {
    let (ty, rid) = reference.split_once('/')?;
    if ty.is_empty() || rid.is_empty() || rid.contains('/') {
        return None;
    }
    if !ty.chars().next()?.is_ascii_uppercase() {
        return None;
    }
    Some(format!("{ty}/{}", id::namespace_id(namespace, rid)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_relative_reference() {
        let r = parse_reference("Organization/O1").unwrap();
        assert_eq!(r.resource_type, "Organization");
        assert_eq!(r.resource_id, "O1");
        assert!(r.absolute_origin_and_prefix.is_none());
    }

    #[test]
    fn rejects_empty_reference() {
        assert!(parse_reference("   ").is_err());
    }

    #[test]
    fn rejects_contained_and_urn() {
        assert!(parse_reference("#local1").is_err());
        assert!(parse_reference("urn:uuid:abc").is_err());
    }

    #[test]
    fn parses_absolute_with_history() {
        let r = parse_reference("http://dir.example.org/fhir/Endpoint/E1/_history/3").unwrap();
        assert_eq!(r.resource_type, "Endpoint");
        assert_eq!(r.resource_id, "E1");
        assert_eq!(
            r.absolute_origin_and_prefix.as_deref(),
            Some("http://dir.example.org/fhir")
        );
    }

    #[test]
    fn parses_absolute_without_history() {
        let r = parse_reference("http://dir.example.org/fhir/Endpoint/E1").unwrap();
        assert_eq!(r.resource_type, "Endpoint");
        assert_eq!(r.resource_id, "E1");
    }

    #[test]
    fn resolve_rejects_mismatched_origin() {
        let err = resolve_reference(
            "http://other.example.org/fhir/Endpoint/E1",
            "http://dir.example.org/fhir",
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::InvalidReference { .. }));
    }

    #[test]
    fn resolve_accepts_matching_origin() {
        let r = resolve_reference(
            "http://dir.example.org/fhir/Endpoint/E1",
            "http://dir.example.org/fhir",
        )
        .unwrap()
        .unwrap();
        assert_eq!(r.resource_type, DirectoryResourceType::Endpoint);
        assert_eq!(r.resource_id, "E1");
    }

    #[test]
    fn resolve_skips_non_directory_resource_types() {
        let r = resolve_reference("Patient/123", "http://dir.example.org/fhir").unwrap();
        assert!(r.is_none());
    }

    #[test]
    fn extract_references_collects_non_contained_directory_refs() {
        let resource = json!({
            "resourceType": "Organization",
            "partOf": {"reference": "Organization/O2"},
            "endpoint": [
                {"reference": "Endpoint/E1"},
                {"reference": "#contained1"}
            ],
            "managingOrganization": {"reference": "Patient/P1"}
        });
        let refs = extract_references(&resource, "http://dir.example.org/fhir").unwrap();
        assert_eq!(refs.len(), 2);
        assert!(refs.contains(&NodeReference::new(DirectoryResourceType::Organization, "O2")));
        assert!(refs.contains(&NodeReference::new(DirectoryResourceType::Endpoint, "E1")));
    }

    #[test]
    fn namespace_rewrites_plain_references_only() {
        let mut resource = json!({
            "resourceType": "Organization",
            "endpoint": [
                {"reference": "Endpoint/E1"},
                {"reference": "#contained1"}
            ]
        });
        namespace_resource(&mut resource, "d");
        assert_eq!(resource["endpoint"][0]["reference"], "Endpoint/d-E1");
        assert_eq!(resource["endpoint"][1]["reference"], "#contained1");
    }
}
