//! The minimal downstream router (§6, §13): read-only directory-organization
//! and organization-unit queries plus the capability-mapping endpoint. No
//! auth, CORS, or rate limiting — that is the façade's job.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use mcsd_client::FhirClient;
use tower_http::trace::TraceLayer;

use crate::routes;

#[derive(Clone)]
pub struct AppState {
    pub local_client: Arc<FhirClient>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/directories/organizations", get(routes::organizations::list_organizations))
        .route("/directories/organization-units", get(routes::units::list_organization_units))
        .route("/capability-mapping", post(routes::capability::resolve_capability))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
