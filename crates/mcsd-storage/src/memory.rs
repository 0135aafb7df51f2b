//! In-memory `DirectoryStore`/`ResourceMapStore` implementations, used by
//! the scheduler and registry test suites in place of a live Postgres.

use async_trait::async_trait;
use dashmap::DashMap;
use mcsd_core::FhirDateTime;

use crate::error::StorageError;
use crate::traits::{DirectoryStore, ResourceMapStore};
use crate::types::{Directory, Provider, ProviderDirectoryLink, ResourceMapKey, ResourceMapRow};

#[derive(Default)]
pub struct InMemoryDirectoryStore {
    directories: DashMap<String, Directory>,
    providers: DashMap<String, Provider>,
    links: DashMap<(String, String), ProviderDirectoryLink>,
}

impl InMemoryDirectoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DirectoryStore for InMemoryDirectoryStore {
    async fn get_directory(&self, id: &str) -> Result<Option<Directory>, StorageError> {
        Ok(self.directories.get(id).map(|d| d.clone()))
    }

    async fn find_directory_by_endpoint(
        &self,
        endpoint: &str,
    ) -> Result<Option<Directory>, StorageError> {
        Ok(self
            .directories
            .iter()
            .find(|d| d.endpoint == endpoint)
            .map(|d| d.clone()))
    }

    async fn upsert_directory(&self, directory: Directory) -> Result<Directory, StorageError> {
        self.directories
            .insert(directory.id.clone(), directory.clone());
        Ok(directory)
    }

    async fn list_active_directories(&self) -> Result<Vec<Directory>, StorageError> {
        Ok(self
            .directories
            .iter()
            .filter(|d| d.is_active())
            .map(|d| d.clone())
            .collect())
    }

    async fn soft_delete_directory(
        &self,
        id: &str,
        deleted_at: FhirDateTime,
    ) -> Result<(), StorageError> {
        let mut entry = self
            .directories
            .get_mut(id)
            .ok_or_else(|| StorageError::not_found("Directory", id))?;
        entry.deleted_at = Some(deleted_at);
        Ok(())
    }

    async fn list_deleted_directories(&self) -> Result<Vec<Directory>, StorageError> {
        Ok(self
            .directories
            .iter()
            .filter(|d| d.deleted_at.is_some())
            .map(|d| d.clone())
            .collect())
    }

    async fn hard_delete_directory(&self, id: &str) -> Result<(), StorageError> {
        self.directories
            .remove(id)
            .ok_or_else(|| StorageError::not_found("Directory", id))?;
        Ok(())
    }

    async fn record_sync_attempt(
        &self,
        id: &str,
        success: bool,
        at: FhirDateTime,
    ) -> Result<Directory, StorageError> {
        let mut entry = self
            .directories
            .get_mut(id)
            .ok_or_else(|| StorageError::not_found("Directory", id))?;
        if success {
            entry.failed_attempts = 0;
            entry.last_success_sync = Some(at.clone());
            entry.is_ignored = false;
            entry.reason_ignored = None;
        } else {
            entry.failed_attempts += 1;
            entry.failed_sync_count += 1;
        }
        entry.modified_at = at;
        Ok(entry.clone())
    }

    async fn mark_ignored(
        &self,
        id: &str,
        reason: String,
        at: FhirDateTime,
    ) -> Result<Directory, StorageError> {
        let mut entry = self
            .directories
            .get_mut(id)
            .ok_or_else(|| StorageError::not_found("Directory", id))?;
        entry.is_ignored = true;
        entry.reason_ignored = Some(reason);
        entry.modified_at = at;
        Ok(entry.clone())
    }

    async fn get_provider(&self, id: &str) -> Result<Option<Provider>, StorageError> {
        Ok(self.providers.get(id).map(|p| p.clone()))
    }

    async fn upsert_provider(&self, provider: Provider) -> Result<Provider, StorageError> {
        self.providers.insert(provider.id.clone(), provider.clone());
        Ok(provider)
    }

    async fn list_enabled_providers(&self) -> Result<Vec<Provider>, StorageError> {
        Ok(self
            .providers
            .iter()
            .filter(|p| p.enabled)
            .map(|p| p.clone())
            .collect())
    }

    async fn set_provider_last_refresh(
        &self,
        id: &str,
        at: FhirDateTime,
    ) -> Result<(), StorageError> {
        let mut entry = self
            .providers
            .get_mut(id)
            .ok_or_else(|| StorageError::not_found("Provider", id))?;
        entry.last_refresh_at = Some(at);
        Ok(())
    }

    async fn upsert_provider_link(
        &self,
        link: ProviderDirectoryLink,
    ) -> Result<ProviderDirectoryLink, StorageError> {
        let key = (link.provider_id.clone(), link.directory_id.clone());
        let merged = match self.links.get(&key) {
            Some(existing) => ProviderDirectoryLink {
                first_seen_at: existing.first_seen_at.clone(),
                removed_at: None,
                ..link
            },
            None => link,
        };
        self.links.insert(key, merged.clone());
        Ok(merged)
    }

    async fn list_linked_directory_ids(
        &self,
        provider_id: &str,
    ) -> Result<Vec<String>, StorageError> {
        Ok(self
            .links
            .iter()
            .filter(|e| e.provider_id == provider_id && e.removed_at.is_none())
            .map(|e| e.directory_id.clone())
            .collect())
    }

    async fn mark_unseen_links_removed(
        &self,
        provider_id: &str,
        seen_directory_ids: &[String],
        at: FhirDateTime,
    ) -> Result<Vec<ProviderDirectoryLink>, StorageError> {
        let mut removed = Vec::new();
        for mut entry in self.links.iter_mut() {
            if entry.provider_id == provider_id
                && entry.removed_at.is_none()
                && !seen_directory_ids.contains(&entry.directory_id)
            {
                entry.removed_at = Some(at.clone());
                removed.push(entry.clone());
            }
        }
        Ok(removed)
    }

    async fn count_other_active_links(
        &self,
        directory_id: &str,
        excluding_provider_id: &str,
    ) -> Result<i64, StorageError> {
        let count = self
            .links
            .iter()
            .filter(|e| {
                e.directory_id == directory_id
                    && e.provider_id != excluding_provider_id
                    && e.removed_at.is_none()
            })
            .count();
        Ok(count as i64)
    }
}

#[derive(Default)]
pub struct InMemoryResourceMapStore {
    rows: DashMap<ResourceMapKey, ResourceMapRow>,
}

impl InMemoryResourceMapStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn key_of(row: &ResourceMapRow) -> ResourceMapKey {
        ResourceMapKey {
            directory_id: row.directory_id.clone(),
            resource_type: row.resource_type,
            upstream_resource_id: row.upstream_resource_id.clone(),
        }
    }
}

#[async_trait]
impl ResourceMapStore for InMemoryResourceMapStore {
    async fn get_many(&self, keys: &[ResourceMapKey]) -> Result<Vec<ResourceMapRow>, StorageError> {
        Ok(keys
            .iter()
            .filter_map(|k| self.rows.get(k).map(|r| r.clone()))
            .collect())
    }

    async fn insert(&self, row: ResourceMapRow) -> Result<(), StorageError> {
        let key = Self::key_of(&row);
        if self.rows.contains_key(&key) {
            return Err(StorageError::conflict(format!(
                "resource map row already exists for {}/{}",
                row.resource_type, row.upstream_resource_id
            )));
        }
        self.rows.insert(key, row);
        Ok(())
    }

    async fn update(&self, row: ResourceMapRow) -> Result<(), StorageError> {
        let key = Self::key_of(&row);
        self.rows.insert(key, row);
        Ok(())
    }

    async fn delete(&self, key: &ResourceMapKey) -> Result<(), StorageError> {
        self.rows.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcsd_core::DirectoryResourceType;

    fn sample_directory(id: &str) -> Directory {
        Directory {
            id: id.to_string(),
            ura: "URA1".into(),
            endpoint: format!("http://{id}.example.org/fhir"),
            origin: crate::types::DirectoryOrigin::Provider,
            failed_attempts: 0,
            failed_sync_count: 0,
            last_success_sync: None,
            is_ignored: false,
            reason_ignored: None,
            deleted_at: None,
            created_at: mcsd_core::now_utc(),
            modified_at: mcsd_core::now_utc(),
        }
    }

    #[tokio::test]
    async fn record_sync_attempt_resets_on_success() {
        let store = InMemoryDirectoryStore::new();
        store.upsert_directory(sample_directory("d1")).await.unwrap();
        store
            .record_sync_attempt("d1", false, mcsd_core::now_utc())
            .await
            .unwrap();
        let after_fail = store.get_directory("d1").await.unwrap().unwrap();
        assert_eq!(after_fail.failed_attempts, 1);

        let after_success = store
            .record_sync_attempt("d1", true, mcsd_core::now_utc())
            .await
            .unwrap();
        assert_eq!(after_success.failed_attempts, 0);
        assert!(after_success.last_success_sync.is_some());
    }

    #[tokio::test]
    async fn resource_map_insert_conflicts_on_duplicate_key() {
        let store = InMemoryResourceMapStore::new();
        let row = ResourceMapRow {
            directory_id: "d1".into(),
            resource_type: DirectoryResourceType::Organization,
            upstream_resource_id: "O1".into(),
            local_resource_id: "d1-O1".into(),
            content_hash: "abc".into(),
            created_at: mcsd_core::now_utc(),
            updated_at: mcsd_core::now_utc(),
        };
        store.insert(row.clone()).await.unwrap();
        let err = store.insert(row).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn mark_unseen_links_removed_only_touches_missing_directories() {
        let store = InMemoryDirectoryStore::new();
        let now = mcsd_core::now_utc();
        store
            .upsert_provider_link(ProviderDirectoryLink {
                provider_id: "p1".into(),
                directory_id: "d1".into(),
                first_seen_at: now.clone(),
                last_seen_at: now.clone(),
                removed_at: None,
            })
            .await
            .unwrap();
        store
            .upsert_provider_link(ProviderDirectoryLink {
                provider_id: "p1".into(),
                directory_id: "d2".into(),
                first_seen_at: now.clone(),
                last_seen_at: now.clone(),
                removed_at: None,
            })
            .await
            .unwrap();

        let removed = store
            .mark_unseen_links_removed("p1", &["d1".to_string()], now)
            .await
            .unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].directory_id, "d2");
    }

    #[tokio::test]
    async fn mark_ignored_then_success_clears_it() {
        let store = InMemoryDirectoryStore::new();
        store.upsert_directory(sample_directory("d1")).await.unwrap();
        store
            .mark_ignored("d1", "stale beyond threshold".into(), mcsd_core::now_utc())
            .await
            .unwrap();
        let ignored = store.get_directory("d1").await.unwrap().unwrap();
        assert!(ignored.is_ignored);
        assert!(!ignored.is_active());

        let recovered = store
            .record_sync_attempt("d1", true, mcsd_core::now_utc())
            .await
            .unwrap();
        assert!(!recovered.is_ignored);
        assert!(recovered.reason_ignored.is_none());
    }

    #[tokio::test]
    async fn deleted_directories_are_listed_and_hard_deletable() {
        let store = InMemoryDirectoryStore::new();
        store.upsert_directory(sample_directory("d1")).await.unwrap();
        store
            .soft_delete_directory("d1", mcsd_core::now_utc())
            .await
            .unwrap();
        let deleted = store.list_deleted_directories().await.unwrap();
        assert_eq!(deleted.len(), 1);

        store.hard_delete_directory("d1").await.unwrap();
        assert!(store.get_directory("d1").await.unwrap().is_none());
    }
}
