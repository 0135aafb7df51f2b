//! Errors raised while resolving a notification receiver or delivering a
//! notification.

use mcsd_core::CoreError;

#[derive(Debug, thiserror::Error)]
pub enum RoutingError {
    #[error(transparent)]
    Fetch(#[from] CoreError),

    /// Decision D of §4.9: at least one required capability code is not
    /// covered by either the target's or the owning organization's endpoints.
    #[error("missing capabilities: {0:?}")]
    MissingCapabilities(Vec<String>),

    /// The target is not an Organization/Location/HealthcareService, or its
    /// owning organization could not be determined from the resource and no
    /// hint was supplied.
    #[error("cannot determine owning organization for target: {0}")]
    UnresolvedOwningOrganization(String),

    /// The owning organization carries no URA identifier.
    #[error("owning organization {0} has no URA identifier")]
    MissingUra(String),

    /// The selected endpoint's address is not a safe absolute http(s) URL.
    #[error("endpoint {endpoint_id} has an unsafe or invalid notification address: {reason}")]
    UnsafeNotificationAddress { endpoint_id: String, reason: String },
}
