//! Maps the typed errors of the routing/registry crates onto HTTP status
//! codes and `OperationOutcome` bodies for the downstream API.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use mcsd_core::CoreError;
use mcsd_registry::RegistryError;
use mcsd_routing::RoutingError;
use mcsd_storage::StorageError;
use serde_json::{Value, json};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Fetch(#[from] CoreError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Routing(#[from] RoutingError),

    #[error("{0}")]
    BadCursor(String),

    #[error("{0}")]
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        (status, Json(operation_outcome(code, self.to_string()))).into_response()
    }
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Storage(StorageError::NotFound { .. }) => (StatusCode::NOT_FOUND, "not-found"),
            Self::Storage(StorageError::Conflict { .. }) => (StatusCode::CONFLICT, "conflict"),
            Self::Storage(_) => (StatusCode::BAD_GATEWAY, "transient"),
            Self::Fetch(CoreError::StaleEndpointResolution { .. }) => (StatusCode::CONFLICT, "stale-endpoint"),
            Self::Fetch(CoreError::Gone { .. }) => (StatusCode::GONE, "deleted"),
            Self::Fetch(_) => (StatusCode::BAD_GATEWAY, "transient"),
            Self::Registry(RegistryError::ProviderNotFound(_)) => (StatusCode::NOT_FOUND, "not-found"),
            Self::Registry(_) => (StatusCode::BAD_GATEWAY, "transient"),
            Self::Routing(RoutingError::MissingCapabilities(_)) => (StatusCode::NOT_FOUND, "not-supported"),
            Self::Routing(RoutingError::UnresolvedOwningOrganization(_))
            | Self::Routing(RoutingError::MissingUra(_)) => (StatusCode::UNPROCESSABLE_ENTITY, "invalid"),
            Self::Routing(RoutingError::UnsafeNotificationAddress { .. }) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "invalid")
            }
            Self::Routing(RoutingError::Fetch(_)) => (StatusCode::BAD_GATEWAY, "transient"),
            Self::BadCursor(_) => (StatusCode::BAD_REQUEST, "invalid-cursor"),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "invalid"),
        }
    }
}

fn operation_outcome(code: &str, diagnostics: String) -> Value {
    json!({
        "resourceType": "OperationOutcome",
        "issue": [{ "severity": "error", "code": code, "diagnostics": diagnostics }]
    })
}
