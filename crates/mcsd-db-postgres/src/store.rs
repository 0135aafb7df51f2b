//! `PgDirectoryStore` / `PgResourceMapStore`: the Postgres-backed
//! implementations of `mcsd_storage`'s traits, built on the hand-written
//! queries in `crate::queries`.

use async_trait::async_trait;
use mcsd_core::FhirDateTime;
use mcsd_storage::{
    Directory, DirectoryStore, Provider, ProviderDirectoryLink, ResourceMapKey, ResourceMapRow,
    ResourceMapStore, StorageError,
};
use sqlx_postgres::PgPool;

use crate::bridge::to_chrono;
use crate::queries::{directory, resource_map};

pub struct PgDirectoryStore {
    pool: PgPool,
}

impl PgDirectoryStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DirectoryStore for PgDirectoryStore {
    async fn get_directory(&self, id: &str) -> Result<Option<Directory>, StorageError> {
        directory::get_directory(&self.pool, id).await
    }

    async fn find_directory_by_endpoint(
        &self,
        endpoint: &str,
    ) -> Result<Option<Directory>, StorageError> {
        directory::find_directory_by_endpoint(&self.pool, endpoint).await
    }

    async fn upsert_directory(&self, d: Directory) -> Result<Directory, StorageError> {
        directory::upsert_directory(&self.pool, d).await
    }

    async fn list_active_directories(&self) -> Result<Vec<Directory>, StorageError> {
        directory::list_active_directories(&self.pool).await
    }

    async fn soft_delete_directory(
        &self,
        id: &str,
        deleted_at: FhirDateTime,
    ) -> Result<(), StorageError> {
        directory::soft_delete_directory(&self.pool, id, to_chrono(&deleted_at)).await
    }

    async fn list_deleted_directories(&self) -> Result<Vec<Directory>, StorageError> {
        directory::list_deleted_directories(&self.pool).await
    }

    async fn hard_delete_directory(&self, id: &str) -> Result<(), StorageError> {
        directory::hard_delete_directory(&self.pool, id).await
    }

    async fn record_sync_attempt(
        &self,
        id: &str,
        success: bool,
        at: FhirDateTime,
    ) -> Result<Directory, StorageError> {
        directory::record_sync_attempt(&self.pool, id, success, to_chrono(&at)).await
    }

    async fn mark_ignored(
        &self,
        id: &str,
        reason: String,
        at: FhirDateTime,
    ) -> Result<Directory, StorageError> {
        directory::mark_ignored(&self.pool, id, reason, to_chrono(&at)).await
    }

    async fn get_provider(&self, id: &str) -> Result<Option<Provider>, StorageError> {
        directory::get_provider(&self.pool, id).await
    }

    async fn upsert_provider(&self, p: Provider) -> Result<Provider, StorageError> {
        directory::upsert_provider(&self.pool, p).await
    }

    async fn list_enabled_providers(&self) -> Result<Vec<Provider>, StorageError> {
        directory::list_enabled_providers(&self.pool).await
    }

    async fn set_provider_last_refresh(
        &self,
        id: &str,
        at: FhirDateTime,
    ) -> Result<(), StorageError> {
        directory::set_provider_last_refresh(&self.pool, id, to_chrono(&at)).await
    }

    async fn upsert_provider_link(
        &self,
        link: ProviderDirectoryLink,
    ) -> Result<ProviderDirectoryLink, StorageError> {
        directory::upsert_provider_link(&self.pool, link).await
    }

    async fn list_linked_directory_ids(
        &self,
        provider_id: &str,
    ) -> Result<Vec<String>, StorageError> {
        directory::list_linked_directory_ids(&self.pool, provider_id).await
    }

    async fn mark_unseen_links_removed(
        &self,
        provider_id: &str,
        seen_directory_ids: &[String],
        at: FhirDateTime,
    ) -> Result<Vec<ProviderDirectoryLink>, StorageError> {
        directory::mark_unseen_links_removed(
            &self.pool,
            provider_id,
            seen_directory_ids,
            to_chrono(&at),
        )
        .await
    }

    async fn count_other_active_links(
        &self,
        directory_id: &str,
        excluding_provider_id: &str,
    ) -> Result<i64, StorageError> {
        directory::count_other_active_links(&self.pool, directory_id, excluding_provider_id).await
    }
}

pub struct PgResourceMapStore {
    pool: PgPool,
}

impl PgResourceMapStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResourceMapStore for PgResourceMapStore {
    async fn get_many(&self, keys: &[ResourceMapKey]) -> Result<Vec<ResourceMapRow>, StorageError> {
        resource_map::get_many(&self.pool, keys).await
    }

    async fn insert(&self, row: ResourceMapRow) -> Result<(), StorageError> {
        resource_map::insert(&self.pool, row).await
    }

    async fn update(&self, row: ResourceMapRow) -> Result<(), StorageError> {
        resource_map::update(&self.pool, row).await
    }

    async fn delete(&self, key: &ResourceMapKey) -> Result<(), StorageError> {
        resource_map::delete(&self.pool, key).await
    }
}
