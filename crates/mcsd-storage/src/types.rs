//! Rows persisted across sync passes: directories, their providers, and the
//! per-resource namespacing map that tells the classifier new from update.

use mcsd_core::{DirectoryResourceType, FhirDateTime};
use serde::{Deserialize, Serialize};

/// Where a directory row came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DirectoryOrigin {
    /// Discovered via a provider catalog refresh.
    Provider,
    /// Added directly by an operator and never downgraded by a refresh.
    Manual,
}

/// One upstream mCSD directory server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Directory {
    pub id: String,
    pub ura: String,
    pub endpoint: String,
    pub origin: DirectoryOrigin,
    pub failed_attempts: i32,
    pub failed_sync_count: i32,
    pub last_success_sync: Option<FhirDateTime>,
    pub is_ignored: bool,
    pub reason_ignored: Option<String>,
    pub deleted_at: Option<FhirDateTime>,
    pub created_at: FhirDateTime,
    pub modified_at: FhirDateTime,
}

impl Directory {
    /// Whether this directory should still receive sync attempts.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.is_ignored && self.deleted_at.is_none()
    }
}

/// A catalog URL that lists directories for a provider to refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provider {
    pub id: String,
    pub url: String,
    pub enabled: bool,
    pub last_refresh_at: Option<FhirDateTime>,
}

/// A many-to-many link between a provider and a directory it has listed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderDirectoryLink {
    pub provider_id: String,
    pub directory_id: String,
    pub first_seen_at: FhirDateTime,
    pub last_seen_at: FhirDateTime,
    pub removed_at: Option<FhirDateTime>,
}

/// The persisted mapping from an upstream resource to its local,
/// namespaced counterpart, plus the content hash recorded at last write.
///
/// Exactly one row exists per `(directory_id, resource_type,
/// upstream_resource_id)` — enforced by a unique constraint at the
/// persistence layer, not in this type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceMapRow {
    pub directory_id: String,
    pub resource_type: DirectoryResourceType,
    pub upstream_resource_id: String,
    pub local_resource_id: String,
    pub content_hash: String,
    pub created_at: FhirDateTime,
    pub updated_at: FhirDateTime,
}

/// A single-resource key used to batch-fetch resource-map rows, mirroring
/// the adjacency graph's node cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceMapKey {
    pub directory_id: String,
    pub resource_type: DirectoryResourceType,
    pub upstream_resource_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_is_active_respects_ignored_and_deleted() {
        let base = Directory {
            id: "d1".into(),
            ura: "URA1".into(),
            endpoint: "http://dir.example.org/fhir".into(),
            origin: DirectoryOrigin::Provider,
            failed_attempts: 0,
            failed_sync_count: 0,
            last_success_sync: None,
            is_ignored: false,
            reason_ignored: None,
            deleted_at: None,
            created_at: mcsd_core::now_utc(),
            modified_at: mcsd_core::now_utc(),
        };
        assert!(base.is_active());

        let mut ignored = base.clone();
        ignored.is_ignored = true;
        assert!(!ignored.is_active());

        let mut deleted = base;
        deleted.deleted_at = Some(mcsd_core::now_utc());
        assert!(!deleted.is_active());
    }
}
