//! Persistence traits for directory registry state (C7) and the
//! resource-namespacing map the adjacency builder and transaction
//! assembler depend on (C4/C6).

use async_trait::async_trait;
use mcsd_core::FhirDateTime;

use crate::error::StorageError;
use crate::types::{Directory, Provider, ProviderDirectoryLink, ResourceMapKey, ResourceMapRow};

/// Directory and provider persistence — the backing store for C7.
#[async_trait]
pub trait DirectoryStore: Send + Sync {
    async fn get_directory(&self, id: &str) -> Result<Option<Directory>, StorageError>;

    async fn find_directory_by_endpoint(
        &self,
        endpoint: &str,
    ) -> Result<Option<Directory>, StorageError>;

    /// Inserts or fully replaces a directory row, keyed by `id`.
    async fn upsert_directory(&self, directory: Directory) -> Result<Directory, StorageError>;

    /// All directories eligible for a sync attempt: not ignored, not deleted.
    async fn list_active_directories(&self) -> Result<Vec<Directory>, StorageError>;

    async fn soft_delete_directory(
        &self,
        id: &str,
        deleted_at: FhirDateTime,
    ) -> Result<(), StorageError>;

    /// All directories with `deleted_at` set, regardless of how long ago —
    /// the cleanup tick filters by grace period itself.
    async fn list_deleted_directories(&self) -> Result<Vec<Directory>, StorageError>;

    /// Permanently removes a directory row once its mark-deleted grace
    /// period has elapsed and its locally namespaced resources have been
    /// cleaned up.
    async fn hard_delete_directory(&self, id: &str) -> Result<(), StorageError>;

    /// Records the outcome of a sync attempt: on success resets
    /// `failed_attempts` to zero, advances `last_success_sync`, and clears
    /// any `is_ignored`/`reason_ignored` set by a prior cleanup tick; on
    /// failure increments both `failed_attempts` and `failed_sync_count`.
    async fn record_sync_attempt(
        &self,
        id: &str,
        success: bool,
        at: FhirDateTime,
    ) -> Result<Directory, StorageError>;

    /// Marks a directory ignored with a stable reason — the cleanup tick's
    /// staleness/failure-threshold action (§4.8).
    async fn mark_ignored(
        &self,
        id: &str,
        reason: String,
        at: FhirDateTime,
    ) -> Result<Directory, StorageError>;

    async fn get_provider(&self, id: &str) -> Result<Option<Provider>, StorageError>;

    async fn upsert_provider(&self, provider: Provider) -> Result<Provider, StorageError>;

    async fn list_enabled_providers(&self) -> Result<Vec<Provider>, StorageError>;

    async fn set_provider_last_refresh(
        &self,
        id: &str,
        at: FhirDateTime,
    ) -> Result<(), StorageError>;

    /// Inserts the link if absent, otherwise advances `last_seen_at` and
    /// clears `removed_at` (a directory that reappears in a catalog is live
    /// again).
    async fn upsert_provider_link(
        &self,
        link: ProviderDirectoryLink,
    ) -> Result<ProviderDirectoryLink, StorageError>;

    /// All directory ids a provider currently links to (`removed_at` null).
    async fn list_linked_directory_ids(&self, provider_id: &str) -> Result<Vec<String>, StorageError>;

    /// Sets `removed_at = at` for every link of `provider_id` whose
    /// directory id is not in `seen_directory_ids`.
    async fn mark_unseen_links_removed(
        &self,
        provider_id: &str,
        seen_directory_ids: &[String],
        at: FhirDateTime,
    ) -> Result<Vec<ProviderDirectoryLink>, StorageError>;

    /// Number of *other* enabled providers whose non-removed link still
    /// points at this directory — used by C7's archive-on-delete rule.
    async fn count_other_active_links(
        &self,
        directory_id: &str,
        excluding_provider_id: &str,
    ) -> Result<i64, StorageError>;
}

/// Resource-map persistence — the backing store for C4's local-hash lookup
/// and C6's transactional resource-map writes.
#[async_trait]
pub trait ResourceMapStore: Send + Sync {
    /// Batched lookup, one round trip for an entire adjacency graph.
    async fn get_many(&self, keys: &[ResourceMapKey]) -> Result<Vec<ResourceMapRow>, StorageError>;

    /// Inserts a new row. Returns `StorageError::Conflict` if a row for the
    /// same key already exists (a concurrent insert raced this one); the
    /// caller retries per the policy in C7/C4's concurrency notes.
    async fn insert(&self, row: ResourceMapRow) -> Result<(), StorageError>;

    async fn update(&self, row: ResourceMapRow) -> Result<(), StorageError>;

    async fn delete(&self, key: &ResourceMapKey) -> Result<(), StorageError>;
}
