//! Directory Registry (C7): provider/manual directory bookkeeping and the
//! refresh algorithm of spec §4.7.

use async_trait::async_trait;
use mcsd_core::{CoreError, manual_directory_id, now_utc};
use mcsd_storage::{Directory, DirectoryOrigin, DirectoryStore, Provider, ProviderDirectoryLink};
use tracing::warn;

use crate::catalog::ProviderCatalogFetcher;
use crate::error::RegistryError;

/// Invoked to remove a directory's locally namespaced resources once it is
/// no longer tracked — shared with the scheduler's cleanup tick (C8), which
/// calls it again after the mark-deleted grace period elapses.
#[async_trait]
pub trait DirectoryCleanupHook: Send + Sync {
    async fn cleanup(&self, directory_id: &str) -> Result<(), CoreError>;
}

/// A hook that does nothing, for deployments with no local FHIR store to
/// clean up (and for tests that only care about registry bookkeeping).
pub struct NoopCleanupHook;

#[async_trait]
impl DirectoryCleanupHook for NoopCleanupHook {
    async fn cleanup(&self, _directory_id: &str) -> Result<(), CoreError> {
        Ok(())
    }
}

/// Outcome of one `RefreshProvider` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshOutcome {
    pub fetched: usize,
    pub removed: usize,
    pub archived: usize,
}

pub struct DirectoryRegistry<'a> {
    store: &'a dyn DirectoryStore,
    cleanup_hook: &'a dyn DirectoryCleanupHook,
    archive_on_provider_delete: bool,
}

impl<'a> DirectoryRegistry<'a> {
    pub fn new(
        store: &'a dyn DirectoryStore,
        cleanup_hook: &'a dyn DirectoryCleanupHook,
        archive_on_provider_delete: bool,
    ) -> Self {
        Self {
            store,
            cleanup_hook,
            archive_on_provider_delete,
        }
    }

    pub async fn add_provider(&self, url: String, enabled: bool) -> Result<Provider, RegistryError> {
        let id = manual_directory_id(&url);
        Ok(self
            .store
            .upsert_provider(Provider {
                id,
                url,
                enabled,
                last_refresh_at: None,
            })
            .await?)
    }

    /// `id.unwrap_or_else(...)` derives a deterministic id from the endpoint
    /// (§12.1): the same hex-SHA-256 rule `namespace_id` falls back to.
    pub async fn add_manual_directory(
        &self,
        endpoint: String,
        id: Option<String>,
        ura: String,
    ) -> Result<Directory, RegistryError> {
        let id = id.unwrap_or_else(|| manual_directory_id(&endpoint));
        let now = now_utc();
        let directory = Directory {
            id,
            ura,
            endpoint,
            origin: DirectoryOrigin::Manual,
            failed_attempts: 0,
            failed_sync_count: 0,
            last_success_sync: None,
            is_ignored: false,
            reason_ignored: None,
            deleted_at: None,
            created_at: now.clone(),
            modified_at: now,
        };
        Ok(self.store.upsert_directory(directory).await?)
    }

    /// Idempotent upsert of provider URLs named in configuration: adding a
    /// provider twice (e.g. on every process restart) must not create
    /// duplicate rows or disturb an existing `enabled`/`last_refresh_at`.
    pub async fn ensure_config_providers(&self, urls: &[String]) -> Result<(), RegistryError> {
        for url in urls {
            let id = manual_directory_id(url);
            if self.store.get_provider(&id).await?.is_none() {
                self.store
                    .upsert_provider(Provider {
                        id,
                        url: url.clone(),
                        enabled: true,
                        last_refresh_at: None,
                    })
                    .await?;
            }
        }
        Ok(())
    }

    /// Runs the five-step refresh algorithm of §4.7 for one provider.
    pub async fn refresh_provider(
        &self,
        provider_id: &str,
        fetcher: &dyn ProviderCatalogFetcher,
    ) -> Result<RefreshOutcome, RegistryError> {
        let provider = self
            .store
            .get_provider(provider_id)
            .await?
            .ok_or_else(|| RegistryError::ProviderNotFound(provider_id.to_string()))?;

        let now = now_utc();
        self.store
            .set_provider_last_refresh(provider_id, now.clone())
            .await?;

        let entries = fetcher.fetch_directories(&provider.url).await?;
        let mut seen_directory_ids = Vec::with_capacity(entries.len());

        for entry in &entries {
            let existing = self.store.find_directory_by_endpoint(&entry.endpoint).await?;
            let directory = match existing {
                // A manual directory is never re-classified as `provider`.
                Some(mut found) if found.origin == DirectoryOrigin::Manual => {
                    found.ura = entry.ura.clone();
                    found.modified_at = now.clone();
                    found
                }
                Some(mut found) => {
                    found.origin = DirectoryOrigin::Provider;
                    found.ura = entry.ura.clone();
                    found.modified_at = now.clone();
                    found
                }
                None => Directory {
                    id: manual_directory_id(&entry.endpoint),
                    ura: entry.ura.clone(),
                    endpoint: entry.endpoint.clone(),
                    origin: DirectoryOrigin::Provider,
                    failed_attempts: 0,
                    failed_sync_count: 0,
                    last_success_sync: None,
                    is_ignored: false,
                    reason_ignored: None,
                    deleted_at: None,
                    created_at: now.clone(),
                    modified_at: now.clone(),
                },
            };
            let directory_id = directory.id.clone();
            self.store.upsert_directory(directory).await?;
            self.store
                .upsert_provider_link(ProviderDirectoryLink {
                    provider_id: provider_id.to_string(),
                    directory_id: directory_id.clone(),
                    first_seen_at: now.clone(),
                    last_seen_at: now.clone(),
                    removed_at: None,
                })
                .await?;
            seen_directory_ids.push(directory_id);
        }

        let removed_links = self
            .store
            .mark_unseen_links_removed(provider_id, &seen_directory_ids, now.clone())
            .await?;

        let mut archived = 0;
        for link in &removed_links {
            let Some(directory) = self.store.get_directory(&link.directory_id).await? else {
                continue;
            };
            if directory.origin != DirectoryOrigin::Provider || !self.archive_on_provider_delete {
                continue;
            }
            let other_active = self
                .store
                .count_other_active_links(&directory.id, provider_id)
                .await?;
            if other_active > 0 {
                continue;
            }
            self.store
                .soft_delete_directory(&directory.id, now.clone())
                .await?;
            if let Err(e) = self.cleanup_hook.cleanup(&directory.id).await {
                warn!(directory_id = %directory.id, error = %e, "best-effort cleanup after archive-on-delete failed");
            }
            archived += 1;
        }

        Ok(RefreshOutcome {
            fetched: entries.len(),
            removed: removed_links.len(),
            archived,
        })
    }

    /// Refreshes every enabled provider; one provider's failure is logged
    /// and does not stop the others.
    pub async fn refresh_all_enabled(
        &self,
        fetcher: &dyn ProviderCatalogFetcher,
    ) -> Result<Vec<(String, Result<RefreshOutcome, RegistryError>)>, RegistryError> {
        let providers = self.store.list_enabled_providers().await?;
        let mut results = Vec::with_capacity(providers.len());
        for provider in providers {
            let outcome = self.refresh_provider(&provider.id, fetcher).await;
            if let Err(e) = &outcome {
                warn!(provider_id = %provider.id, error = %e, "provider refresh failed");
            }
            results.push((provider.id, outcome));
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcsd_storage::memory::InMemoryDirectoryStore;

    struct StubFetcher(Vec<crate::catalog::CatalogEntry>);

    #[async_trait]
    impl ProviderCatalogFetcher for StubFetcher {
        async fn fetch_directories(
            &self,
            _provider_url: &str,
        ) -> Result<Vec<crate::catalog::CatalogEntry>, CoreError> {
            Ok(self.0.clone())
        }
    }

    async fn seeded(store: &InMemoryDirectoryStore) -> String {
        let registry = DirectoryRegistry::new(store, &NoopCleanupHook, true);
        registry
            .add_provider("https://catalog.example.org/fhir".into(), true)
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn refresh_adds_new_directories_and_links() {
        let store = InMemoryDirectoryStore::new();
        let provider_id = seeded(&store).await;
        let registry = DirectoryRegistry::new(&store, &NoopCleanupHook, true);

        let fetcher = StubFetcher(vec![crate::catalog::CatalogEntry {
            endpoint: "https://dir-a.example.org/fhir".into(),
            ura: "11112222".into(),
        }]);
        let outcome = registry.refresh_provider(&provider_id, &fetcher).await.unwrap();
        assert_eq!(outcome.fetched, 1);
        assert_eq!(outcome.removed, 0);

        let directory = store
            .find_directory_by_endpoint("https://dir-a.example.org/fhir")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(directory.origin, DirectoryOrigin::Provider);
    }

    #[tokio::test]
    async fn refresh_never_downgrades_manual_origin() {
        let store = InMemoryDirectoryStore::new();
        let provider_id = seeded(&store).await;
        let registry = DirectoryRegistry::new(&store, &NoopCleanupHook, true);

        registry
            .add_manual_directory(
                "https://dir-a.example.org/fhir".into(),
                Some("manual-dir".into()),
                "11112222".into(),
            )
            .await
            .unwrap();

        let fetcher = StubFetcher(vec![crate::catalog::CatalogEntry {
            endpoint: "https://dir-a.example.org/fhir".into(),
            ura: "11112222".into(),
        }]);
        registry.refresh_provider(&provider_id, &fetcher).await.unwrap();

        let directory = store.get_directory("manual-dir").await.unwrap().unwrap();
        assert_eq!(directory.origin, DirectoryOrigin::Manual);
    }

    #[tokio::test]
    async fn unlisted_provider_directory_is_archived_when_policy_enabled() {
        let store = InMemoryDirectoryStore::new();
        let provider_id = seeded(&store).await;
        let registry = DirectoryRegistry::new(&store, &NoopCleanupHook, true);

        let fetcher = StubFetcher(vec![crate::catalog::CatalogEntry {
            endpoint: "https://dir-a.example.org/fhir".into(),
            ura: "11112222".into(),
        }]);
        registry.refresh_provider(&provider_id, &fetcher).await.unwrap();

        let empty_fetcher = StubFetcher(vec![]);
        let outcome = registry
            .refresh_provider(&provider_id, &empty_fetcher)
            .await
            .unwrap();
        assert_eq!(outcome.removed, 1);
        assert_eq!(outcome.archived, 1);

        let directory = store
            .find_directory_by_endpoint("https://dir-a.example.org/fhir")
            .await
            .unwrap()
            .unwrap();
        assert!(directory.deleted_at.is_some());
    }

    #[tokio::test]
    async fn directory_still_linked_by_another_provider_is_not_archived() {
        let store = InMemoryDirectoryStore::new();
        let registry = DirectoryRegistry::new(&store, &NoopCleanupHook, true);
        let provider_a = registry
            .add_provider("https://catalog-a.example.org".into(), true)
            .await
            .unwrap()
            .id;
        let provider_b = registry
            .add_provider("https://catalog-b.example.org".into(), true)
            .await
            .unwrap()
            .id;

        let fetcher = StubFetcher(vec![crate::catalog::CatalogEntry {
            endpoint: "https://dir-a.example.org/fhir".into(),
            ura: "11112222".into(),
        }]);
        registry.refresh_provider(&provider_a, &fetcher).await.unwrap();
        registry.refresh_provider(&provider_b, &fetcher).await.unwrap();

        let empty_fetcher = StubFetcher(vec![]);
        let outcome = registry
            .refresh_provider(&provider_a, &empty_fetcher)
            .await
            .unwrap();
        assert_eq!(outcome.archived, 0);

        let directory = store
            .find_directory_by_endpoint("https://dir-a.example.org/fhir")
            .await
            .unwrap()
            .unwrap();
        assert!(directory.deleted_at.is_none());
    }

    #[tokio::test]
    async fn ensure_config_providers_is_idempotent() {
        let store = InMemoryDirectoryStore::new();
        let registry = DirectoryRegistry::new(&store, &NoopCleanupHook, true);
        let urls = vec!["https://catalog.example.org/fhir".to_string()];
        registry.ensure_config_providers(&urls).await.unwrap();
        registry.ensure_config_providers(&urls).await.unwrap();
        let providers = store.list_enabled_providers().await.unwrap();
        assert_eq!(providers.len(), 1);
    }
}
