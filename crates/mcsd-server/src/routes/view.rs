//! Shapes a local-store resource and its resolved endpoints into the
//! `{resourceType, id, name?, identifier[], type[], endpoints[]}` item the
//! downstream routing API returns (§6).

use mcsd_client::FhirClient;
use mcsd_core::{DirectoryResourceType, DomainResource, parse_reference};
use serde_json::{Value, json};

pub struct TechnicalEndpoint {
    pub id: String,
    pub address: Option<String>,
    pub payload_type_codes: Vec<String>,
}

/// Dereferences every `endpoint[]` entry on `resource` against the local
/// store. A reference that doesn't resolve is dropped rather than failing
/// the whole item — a dangling endpoint reference shouldn't hide an
/// otherwise-valid organization from the listing.
pub async fn resolve_endpoints(client: &FhirClient, resource: &Value) -> Vec<TechnicalEndpoint> {
    let mut out = Vec::new();
    for entry in resource.get("endpoint").and_then(Value::as_array).into_iter().flatten() {
        let Some(reference) = entry.get("reference").and_then(Value::as_str) else { continue };
        let Ok(parsed) = parse_reference(reference) else { continue };
        let Ok(resource_type) = parsed.resource_type.parse::<DirectoryResourceType>() else { continue };
        let Ok(endpoint) = client.get_resource_by_id(resource_type, &parsed.resource_id).await else { continue };
        out.push(technical_endpoint(&endpoint));
    }
    out
}

fn technical_endpoint(endpoint: &DomainResource) -> TechnicalEndpoint {
    TechnicalEndpoint {
        id: endpoint.id.clone().unwrap_or_default(),
        address: endpoint.raw.get("address").and_then(Value::as_str).map(str::to_string),
        payload_type_codes: endpoint
            .raw
            .pointer("/payloadType")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|payload_type| payload_type.get("coding"))
            .filter_map(Value::as_array)
            .flatten()
            .filter_map(|coding| coding.get("code"))
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
    }
}

pub fn directory_item(resource_type: DirectoryResourceType, resource: &Value, endpoints: &[TechnicalEndpoint]) -> Value {
    json!({
        "resourceType": resource_type.as_str(),
        "id": resource.get("id").cloned().unwrap_or(Value::Null),
        "name": resource.get("name").cloned(),
        "identifier": resource.get("identifier").cloned().unwrap_or_else(|| json!([])),
        "type": resource.get("type").cloned().unwrap_or_else(|| json!([])),
        "endpoints": endpoints
            .iter()
            .map(|e| json!({ "id": e.id, "address": e.address, "payloadType": e.payload_type_codes }))
            .collect::<Vec<_>>(),
    })
}
