//! `GET /directories/organizations` (§6): a paged query over the local
//! store's Organization resources, opaque-cursor continued.

use axum::extract::{Query, State};
use axum::Json;
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
    pub count: Option<u32>,
    pub cursor: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OrganizationsCursor {
    next_url: String,
}

pub async fn list_organizations(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Value>, ApiError> {
    let page = match &params.cursor {
        Some(token) => {
            let cursor: OrganizationsCursor = cursor::decode(token)?;
            cursor::validate_origin(&cursor.next_url, state.local_client.base_url())?;
            state.local_client.search_resource_next(&cursor.next_url).await?
        }
        None => {
            let count = params.count.unwrap_or(DEFAULT_COUNT).to_string();
            state
                .local_client
                .search_resource(DirectoryResourceType::Organization, &[("_count", count.as_str())])
                .await?
        }
    };

    let mut items = Vec::with_capacity(page.entries.len());
    for resource in &page.entries {
        let endpoints = view::resolve_endpoints(&state.local_client, &resource.raw).await;
        items.push(view::directory_item(DirectoryResourceType::Organization, &resource.raw, &endpoints));
    }

    let next = page.next_url.map(|next_url| cursor::encode(&OrganizationsCursor { next_url }));

    Ok(Json(json!({ "count": items.len(), "items": items, "next": next })))
}
