//! `POST /capability-mapping` (§6): runs the Capability Mapper (C9) against
//! the local store and returns the decision-tree result plus a
//! human-readable explanation of which endpoint(s) were picked and why.

use axum::Json;
use axum::extract::State;
use mcsd_core::DirectoryResourceType;
use mcsd_routing::{CapabilityMapper, CapabilityRequest, ClientResourceFetcher, SelectionSource};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::app::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct CapabilityMappingBody {
    pub target_type: String,
    pub target_id: String,
    pub organization_hint: Option<String>,
    pub required_capability_codes: Vec<String>,
    pub caller_endpoint_id: Option<String>,
}

pub async fn resolve_capability(
    State(state): State<AppState>,
    Json(body): Json<CapabilityMappingBody>,
) -> Result<Json<Value>, ApiError> {
    let target_type = body
        .target_type
        .parse::<DirectoryResourceType>()
        .map_err(|_| ApiError::BadRequest(format!("unknown target_type: {}", body.target_type)))?;

    let request = CapabilityRequest {
        target_type,
        target_id: body.target_id,
        organization_hint: body.organization_hint,
        required_capability_codes: body.required_capability_codes,
        caller_endpoint_id: body.caller_endpoint_id,
    };

    let fetcher = ClientResourceFetcher { client: &state.local_client };
    let mapper = CapabilityMapper::new(&fetcher);
    let resolved = mapper.map(&request).await?;

    let explanation = match resolved.source {
        SelectionSource::Target => "every required capability is covered by the target's own endpoints",
        SelectionSource::Organization => {
            "no single target endpoint covers all required capabilities; the owning organization's endpoints cover them instead"
        }
        SelectionSource::Mixed => {
            "required capabilities are split across the target's and the owning organization's endpoints"
        }
    };

    Ok(Json(json!({
        "source": format!("{:?}", resolved.source),
        "endpointsByCapability": resolved.endpoints_by_capability,
        "primaryEndpointId": resolved.primary_endpoint_id(),
        "owningOrganizationId": resolved.owning_organization_id,
        "receiverUra": resolved.receiver_ura,
        "explanation": explanation,
    })))
}
