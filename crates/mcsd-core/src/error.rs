//! Error taxonomy shared by every component of the directory synchronizer.
//!
//! Every kind here corresponds 1:1 to a row in the error taxonomy: `Gone`,
//! `UpstreamHttp`, transport classifications, `UnresolvedReference`,
//! `InvalidReference`, `InvalidNodeState`, `StaleEndpointResolution`,
//! `MisconfiguredSender`, `ReceiverHttp`. Downstream crates wrap this type
//! rather than re-deriving their own transport/reference error kinds.

use thiserror::Error;

/// Errors raised while talking to an upstream or downstream FHIR server.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Upstream returned 410 for a resource; this is a tombstone, not a failure.
    #[error("resource gone: {resource_type}/{id}")]
    Gone { resource_type: String, id: String },

    /// Any other non-2xx HTTP status from an upstream or downstream FHIR server.
    #[error("upstream HTTP {status}: {message}")]
    UpstreamHttp { status: u16, message: String },

    /// The connect or read deadline elapsed before a response arrived.
    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// DNS resolution failed. Terminal for the pass — never retried.
    #[error("DNS resolution failed: {0}")]
    Dns(String),

    /// TLS handshake or certificate validation failed. Terminal for the pass.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Any other transport-level failure (connection refused, reset, etc).
    #[error("network error: {0}")]
    Network(String),

    /// A reference string could not be parsed or normalized.
    #[error("invalid reference '{reference}': {reason}")]
    InvalidReference { reference: String, reason: String },

    /// The adjacency closure could not be completed after retrying upstream.
    #[error("unresolved reference: {resource_type}/{id}")]
    UnresolvedReference { resource_type: String, id: String },

    /// The classifier needed a resource-map row that did not exist.
    #[error("invalid node state for {resource_type}/{id}: {reason}")]
    InvalidNodeState {
        resource_type: String,
        id: String,
        reason: String,
    },

    /// A caller-supplied endpoint id no longer matches the freshly resolved one.
    #[error("stale endpoint resolution: expected {expected}, resolved {resolved}")]
    StaleEndpointResolution { expected: String, resolved: String },

    /// Required sender identity/base-url configuration is missing. Fatal at startup.
    #[error("misconfigured sender: {0}")]
    MisconfiguredSender(String),

    /// The notification receiver rejected the Task.
    #[error("receiver HTTP {status}: {message}")]
    ReceiverHttp { status: u16, message: String },

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// A timestamp field (e.g. `last_success_sync`) failed to parse as RFC3339.
    #[error("invalid date/time: {0}")]
    InvalidDateTime(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    pub fn gone(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::Gone {
            resource_type: resource_type.into(),
            id: id.into(),
        }
    }

    pub fn upstream_http(status: u16, message: impl Into<String>) -> Self {
        Self::UpstreamHttp {
            status,
            message: message.into(),
        }
    }

    pub fn invalid_reference(reference: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidReference {
            reference: reference.into(),
            reason: reason.into(),
        }
    }

    pub fn unresolved_reference(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::UnresolvedReference {
            resource_type: resource_type.into(),
            id: id.into(),
        }
    }

    pub fn invalid_date_time(message: impl Into<String>) -> Self {
        Self::InvalidDateTime(message.into())
    }

    pub fn invalid_node_state(
        resource_type: impl Into<String>,
        id: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidNodeState {
            resource_type: resource_type.into(),
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Whether the retry policy of C1 should retry a request that failed with this error.
    ///
    /// DNS and TLS errors are terminal for the pass; timeouts, network errors,
    /// 429 and 5xx upstream statuses are retried with backoff.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Network(_) => true,
            Self::UpstreamHttp { status, .. } => *status == 429 || *status >= 500,
            Self::Dns(_) | Self::Tls(_) => false,
            _ => false,
        }
    }

    /// Whether this failure should be classified as "offline" for directory
    /// lifecycle purposes (§4.8: DNS/TLS/timeout/connection failures).
    #[must_use]
    pub fn is_offline(&self) -> bool {
        matches!(
            self,
            Self::Dns(_) | Self::Tls(_) | Self::Timeout(_) | Self::Network(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_policy_excludes_dns_and_tls() {
        assert!(!CoreError::Dns("nxdomain".into()).is_retryable());
        assert!(!CoreError::Tls("bad cert".into()).is_retryable());
        assert!(CoreError::Network("reset".into()).is_retryable());
        assert!(CoreError::Timeout(std::time::Duration::from_secs(1)).is_retryable());
    }

    #[test]
    fn retry_policy_covers_429_and_5xx() {
        assert!(CoreError::upstream_http(429, "slow down").is_retryable());
        assert!(CoreError::upstream_http(503, "unavailable").is_retryable());
        assert!(!CoreError::upstream_http(404, "not found").is_retryable());
    }

    #[test]
    fn offline_classification() {
        assert!(CoreError::Dns("x".into()).is_offline());
        assert!(CoreError::Tls("x".into()).is_offline());
        assert!(CoreError::Timeout(std::time::Duration::from_secs(1)).is_offline());
        assert!(CoreError::Network("x".into()).is_offline());
        assert!(!CoreError::gone("Organization", "O1").is_offline());
    }
}
