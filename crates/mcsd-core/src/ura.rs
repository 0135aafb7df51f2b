//! URA extraction: the 8-digit Dutch healthcare organization identifier
//! carried in `Organization.identifier[]`, read by the registry (C7) to
//! catalog a directory and by the capability mapper (C9) to resolve a
//! notification receiver.

use serde_json::Value;

/// The naming system the Twiin/BgZ ecosystem uses to tag a URA identifier.
pub const URA_NAMING_SYSTEM: &str = "https://fhir.nl/fhir/NamingSystem/ura";

/// Finds the URA value in a resource's `identifier[]`, matching on
/// [`URA_NAMING_SYSTEM`]. Returns `None` if absent — callers treat that as
/// a hard failure per their own error taxonomy.
#[must_use]
pub fn find_ura(resource: &Value) -> Option<String> {
    resource
        .get("identifier")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .find(|identifier| identifier.get("system").and_then(Value::as_str) == Some(URA_NAMING_SYSTEM))
        .and_then(|identifier| identifier.get("value").and_then(Value::as_str))
        .map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn finds_ura_by_naming_system() {
        let org = json!({
            "resourceType": "Organization",
            "identifier": [
                {"system": "http://other.example.org/ids", "value": "not-ura"},
                {"system": URA_NAMING_SYSTEM, "value": "12345678"}
            ]
        });
        assert_eq!(find_ura(&org).as_deref(), Some("12345678"));
    }

    #[test]
    fn missing_identifier_is_none() {
        assert!(find_ura(&json!({"resourceType": "Organization"})).is_none());
    }
}
