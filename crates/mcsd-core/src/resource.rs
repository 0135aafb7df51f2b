//! The `DomainResource` view: the narrow slice of a FHIR resource the core
//! needs (identity, meta, JSON payload), independent of its concrete shape.

use crate::fhir::DirectoryResourceType;
use serde_json::Value;

/// A FHIR resource reduced to what the sync engine and capability mapper
/// actually touch: its type tag, its id, and the raw JSON payload.
///
/// Everything else (search, validation, profile conformance) is out of
/// scope for this core — see spec.md §1 Non-goals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainResource {
    pub resource_type: DirectoryResourceType,
    pub id: Option<String>,
    pub raw: Value,
}

impl DomainResource {
    pub fn from_value(raw: Value) -> Option<Self> {
        let resource_type: DirectoryResourceType = raw
            .get("resourceType")
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok())?;
        let id = raw.get("id").and_then(Value::as_str).map(str::to_owned);
        Some(Self {
            resource_type,
            id,
            raw,
        })
    }

    /// Returns a copy of the resource with `id` and `meta` set to null, the
    /// first step of content hashing (C3) and of preparing an upstream
    /// resource for namespacing (C2).
    #[must_use]
    pub fn strip_identity(&self) -> Value {
        let mut copy = self.raw.clone();
        if let Some(obj) = copy.as_object_mut() {
            obj.insert("id".to_string(), Value::Null);
            obj.insert("meta".to_string(), Value::Null);
        }
        copy
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        let id = id.into();
        if let Some(obj) = self.raw.as_object_mut() {
            obj.insert("id".to_string(), Value::String(id.clone()));
        }
        self.id = Some(id);
    }

    /// Clears server-set metadata (`meta.versionId`, `meta.lastUpdated`)
    /// before a resource is placed in an outbound transaction entry — the
    /// local FHIR server is the one authoritative for those fields.
    pub fn clear_server_meta(&mut self) {
        if let Some(meta) = self.raw.get_mut("meta").and_then(Value::as_object_mut) {
            meta.remove("versionId");
            meta.remove("lastUpdated");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strip_identity_nulls_id_and_meta() {
        let res = DomainResource::from_value(json!({
            "resourceType": "Organization",
            "id": "O1",
            "meta": {"versionId": "3"},
            "name": "Acme Clinic"
        }))
        .unwrap();

        let stripped = res.strip_identity();
        assert!(stripped["id"].is_null());
        assert!(stripped["meta"].is_null());
        assert_eq!(stripped["name"], "Acme Clinic");
    }

    #[test]
    fn from_value_rejects_unknown_resource_type() {
        assert!(DomainResource::from_value(json!({"resourceType": "Patient", "id": "1"})).is_none());
    }

    #[test]
    fn set_id_updates_both_payload_and_field() {
        let mut res = DomainResource::from_value(json!({
            "resourceType": "Endpoint",
            "id": "old"
        }))
        .unwrap();
        res.set_id("d-E1");
        assert_eq!(res.id.as_deref(), Some("d-E1"));
        assert_eq!(res.raw["id"], "d-E1");
    }
}
