//! Opaque pagination cursors for the downstream routing API (§6).
//!
//! A cursor is base64-encoded JSON carrying the upstream page-continuation
//! URL (plus, for the aggregating units endpoint, per-type continuation
//! state). Readers must refuse a cursor whose embedded URL's origin or path
//! prefix differs from the configured local base — the SSRF guard.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::ApiError;

pub fn encode<T: Serialize>(cursor: &T) -> String {
    let json = serde_json::to_vec(cursor).expect("cursor always serializes");
    URL_SAFE_NO_PAD.encode(json)
}

pub fn decode<T: DeserializeOwned>(token: &str) -> Result<T, ApiError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(token)
        .map_err(|e| ApiError::BadCursor(format!("cursor is not valid base64: {e}")))?;
    serde_json::from_slice(&bytes).map_err(|e| ApiError::BadCursor(format!("cursor is not valid JSON: {e}")))
}

/// Refuses a cursor whose embedded upstream URL's origin or path prefix
/// differs from the configured local base.
pub fn validate_origin(embedded_url: &str, configured_base: &str) -> Result<(), ApiError> {
    let embedded =
        url::Url::parse(embedded_url).map_err(|_| ApiError::BadCursor("cursor URL is not absolute".into()))?;
    let configured = url::Url::parse(configured_base)
        .map_err(|_| ApiError::BadRequest("configured local FHIR base URL is invalid".into()))?;

    if embedded.origin() != configured.origin() {
        return Err(ApiError::BadCursor("cursor origin does not match the configured base".into()));
    }
    if !embedded.path().starts_with(configured.path()) {
        return Err(ApiError::BadCursor("cursor path does not match the configured base".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Sample {
        next_url: String,
    }

    #[test]
    fn round_trips_through_base64_json() {
        let cursor = Sample { next_url: "https://local.test/fhir/Organization?_count=20".to_string() };
        let token = encode(&cursor);
        let decoded: Sample = decode(&token).unwrap();
        assert_eq!(cursor, decoded);
    }

    #[test]
    fn rejects_malformed_base64() {
        let err = decode::<Sample>("not-base64!!!").unwrap_err();
        assert!(matches!(err, ApiError::BadCursor(_)));
    }

    #[test]
    fn accepts_matching_origin_and_path_prefix() {
        assert!(validate_origin("https://local.test/fhir/Organization?_count=20", "https://local.test/fhir").is_ok());
    }

    #[test]
    fn rejects_mismatched_origin() {
        let err = validate_origin("https://evil.test/fhir/Organization", "https://local.test/fhir").unwrap_err();
        assert!(matches!(err, ApiError::BadCursor(_)));
    }

    #[test]
    fn rejects_mismatched_path_prefix() {
        let err = validate_origin("https://local.test/other/Organization", "https://local.test/fhir").unwrap_err();
        assert!(matches!(err, ApiError::BadCursor(_)));
    }
}
