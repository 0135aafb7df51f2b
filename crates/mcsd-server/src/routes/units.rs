//! `GET /directories/organization-units` (§6): aggregates up to three
//! upstream paged queries — Location, HealthcareService, and child
//! Organization — scoped to one owning organization, into a single cursor.

use axum::Json;
use axum::extract::{Query, State};
use mcsd_core::DirectoryResourceType;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::app::AppState;
use crate::cursor;
use crate::error::ApiError;
use crate::routes::view;

const DEFAULT_COUNT: u32 = 20;

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub organization_id: Option<String>,
    pub count: Option<u32>,
    pub cursor: Option<String>,
}

/// Per-type continuation state: a type not yet queried this cursor's
/// lifetime, one with more pages, or one fully drained.
#[derive(Debug, Clone, Serialize, Deserialize)]
enum TypeCursor {
    Pending,
    Next(String),
    Done,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct UnitsCursor {
    organization_id: String,
    location: TypeCursor,
    healthcare_service: TypeCursor,
    child_organization: TypeCursor,
}

impl UnitsCursor {
    fn start(organization_id: String) -> Self {
        Self {
            organization_id,
            location: TypeCursor::Pending,
            healthcare_service: TypeCursor::Pending,
            child_organization: TypeCursor::Pending,
        }
    }
}

pub async fn list_organization_units(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Value>, ApiError> {
    let mut cursor_state = match &params.cursor {
        Some(token) => {
            let decoded: UnitsCursor = cursor::decode(token)?;
            for slot in [&decoded.location, &decoded.healthcare_service, &decoded.child_organization] {
                if let TypeCursor::Next(url) = slot {
                    cursor::validate_origin(url, state.local_client.base_url())?;
                }
            }
            decoded
        }
        None => {
            let organization_id = params
                .organization_id
                .clone()
                .ok_or_else(|| ApiError::BadRequest("organization_id is required".into()))?;
            UnitsCursor::start(organization_id)
        }
    };

    let count = params.count.unwrap_or(DEFAULT_COUNT).to_string();
    let organization_reference = format!("Organization/{}", cursor_state.organization_id);

    let mut items = Vec::new();

    advance(
        &state,
        &mut cursor_state.location,
        DirectoryResourceType::Location,
        &[("organization", organization_reference.as_str()), ("_count", count.as_str())],
        &mut items,
    )
    .await?;

    advance(
        &state,
        &mut cursor_state.healthcare_service,
        DirectoryResourceType::HealthcareService,
        &[("organization", organization_reference.as_str()), ("_count", count.as_str())],
        &mut items,
    )
    .await?;

    advance(
        &state,
        &mut cursor_state.child_organization,
        DirectoryResourceType::Organization,
        &[("partof", organization_reference.as_str()), ("_count", count.as_str())],
        &mut items,
    )
    .await?;

    let exhausted = matches!(cursor_state.location, TypeCursor::Done)
        && matches!(cursor_state.healthcare_service, TypeCursor::Done)
        && matches!(cursor_state.child_organization, TypeCursor::Done);

    let next = if exhausted { None } else { Some(cursor::encode(&cursor_state)) };

    Ok(Json(json!({ "count": items.len(), "items": items, "next": next })))
}

async fn advance(
    state: &AppState,
    slot: &mut TypeCursor,
    resource_type: DirectoryResourceType,
    params: &[(&str, &str)],
    items: &mut Vec<Value>,
) -> Result<(), ApiError> {
    let page = match slot {
        TypeCursor::Done => return Ok(()),
        TypeCursor::Pending => state.local_client.search_resource(resource_type, params).await?,
        TypeCursor::Next(url) => state.local_client.search_resource_next(url).await?,
    };

    for resource in &page.entries {
        let endpoints = view::resolve_endpoints(&state.local_client, &resource.raw).await;
        items.push(view::directory_item(resource_type, &resource.raw, &endpoints));
    }

    *slot = match page.next_url {
        Some(next_url) => TypeCursor::Next(next_url),
        None => TypeCursor::Done,
    };
    Ok(())
}
