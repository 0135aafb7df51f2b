//! The cleanup tick (§4.8): marks stale or repeatedly-failing directories
//! ignored, and hard-deletes soft-deleted directories past their grace
//! period.

use std::sync::Arc;

use mcsd_core::now_utc;
use mcsd_registry::DirectoryCleanupHook;
use mcsd_storage::{Directory, DirectoryStore};
use tracing::{info, warn};

use crate::config::SchedulerConfig;

pub struct CleanupTick {
    config: SchedulerConfig,
    store: Arc<dyn DirectoryStore>,
    cleanup_hook: Arc<dyn DirectoryCleanupHook>,
}

impl CleanupTick {
    pub fn new(
        config: SchedulerConfig,
        store: Arc<dyn DirectoryStore>,
        cleanup_hook: Arc<dyn DirectoryCleanupHook>,
    ) -> Self {
        Self {
            config,
            store,
            cleanup_hook,
        }
    }

    pub async fn run(&self) {
        self.mark_stale_ignored().await;
        self.hard_delete_expired().await;
    }

    async fn mark_stale_ignored(&self) {
        let directories = match self.store.list_active_directories().await {
            Ok(directories) => directories,
            Err(e) => {
                warn!(error = %e, "failed to load active directories for cleanup tick");
                return;
            }
        };

        let now = now_utc();
        for directory in directories {
            let Some(reason) = self.ignore_reason(&directory, now.timestamp()) else {
                continue;
            };
            info!(directory_id = %directory.id, reason = %reason, "marking directory ignored");
            if let Err(e) = self.store.mark_ignored(&directory.id, reason, now.clone()).await {
                warn!(directory_id = %directory.id, error = %e, "failed to mark directory ignored");
            }
        }
    }

    fn ignore_reason(&self, directory: &Directory, now_ts: i64) -> Option<String> {
        if directory.failed_attempts >= self.config.ignore_after_failed_attempts_threshold {
            return Some(format!(
                "failed_attempts reached {} without a successful sync",
                directory.failed_attempts
            ));
        }
        let stale_since = directory
            .last_success_sync
            .as_ref()
            .map(|t| now_ts - t.timestamp())
            .unwrap_or_else(|| now_ts - directory.created_at.timestamp());
        if stale_since >= self.config.ignore_after_success_timeout_seconds {
            return Some(format!(
                "no successful sync in {stale_since} seconds (threshold {})",
                self.config.ignore_after_success_timeout_seconds
            ));
        }
        None
    }

    async fn hard_delete_expired(&self) {
        let deleted = match self.store.list_deleted_directories().await {
            Ok(deleted) => deleted,
            Err(e) => {
                warn!(error = %e, "failed to load soft-deleted directories for cleanup tick");
                return;
            }
        };

        let now_ts = now_utc().timestamp();
        for directory in deleted {
            let Some(deleted_at) = &directory.deleted_at else {
                continue;
            };
            if now_ts - deleted_at.timestamp() < self.config.mark_deleted_after_grace_seconds {
                continue;
            }
            if let Err(e) = self.cleanup_hook.cleanup(&directory.id).await {
                warn!(directory_id = %directory.id, error = %e, "cleanup hook failed, deferring hard delete to next tick");
                continue;
            }
            if let Err(e) = self.store.hard_delete_directory(&directory.id).await {
                warn!(directory_id = %directory.id, error = %e, "failed to hard-delete directory");
                continue;
            }
            info!(directory_id = %directory.id, "hard-deleted directory past grace period");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mcsd_core::{CoreError, FhirDateTime};
    use mcsd_storage::memory::InMemoryDirectoryStore;
    use mcsd_storage::DirectoryOrigin;

    struct NoopHook;

    #[async_trait]
    impl DirectoryCleanupHook for NoopHook {
        async fn cleanup(&self, _directory_id: &str) -> Result<(), CoreError> {
            Ok(())
        }
    }

    fn old_timestamp(seconds_ago: i64) -> FhirDateTime {
        mcsd_core::time::from_unix_timestamp(now_utc().timestamp() - seconds_ago).unwrap()
    }

    fn directory(id: &str) -> Directory {
        let now = now_utc();
        Directory {
            id: id.to_string(),
            ura: "11112222".into(),
            endpoint: format!("https://{id}.example.org/fhir"),
            origin: DirectoryOrigin::Provider,
            failed_attempts: 0,
            failed_sync_count: 0,
            last_success_sync: None,
            is_ignored: false,
            reason_ignored: None,
            deleted_at: None,
            created_at: now.clone(),
            modified_at: now,
        }
    }

    #[tokio::test]
    async fn stale_directory_gets_ignored() {
        let store = Arc::new(InMemoryDirectoryStore::new());
        let mut dir = directory("d1");
        dir.last_success_sync = Some(old_timestamp(1_000_000));
        store.upsert_directory(dir).await.unwrap();

        let mut config = SchedulerConfig::default();
        config.ignore_after_success_timeout_seconds = 100;
        let cleanup = CleanupTick::new(config, store.clone(), Arc::new(NoopHook));
        cleanup.run().await;

        let directory = store.get_directory("d1").await.unwrap().unwrap();
        assert!(directory.is_ignored);
        assert!(directory.reason_ignored.is_some());
    }

    #[tokio::test]
    async fn failed_attempts_threshold_ignores_regardless_of_last_success() {
        let store = Arc::new(InMemoryDirectoryStore::new());
        let mut dir = directory("d1");
        dir.last_success_sync = Some(now_utc());
        dir.failed_attempts = 10;
        store.upsert_directory(dir).await.unwrap();

        let mut config = SchedulerConfig::default();
        config.ignore_after_failed_attempts_threshold = 10;
        let cleanup = CleanupTick::new(config, store.clone(), Arc::new(NoopHook));
        cleanup.run().await;

        let directory = store.get_directory("d1").await.unwrap().unwrap();
        assert!(directory.is_ignored);
    }

    #[tokio::test]
    async fn hard_deletes_only_past_grace_period() {
        let store = Arc::new(InMemoryDirectoryStore::new());
        let mut fresh = directory("fresh");
        fresh.deleted_at = Some(old_timestamp(10));
        store.upsert_directory(fresh).await.unwrap();

        let mut expired = directory("expired");
        expired.deleted_at = Some(old_timestamp(1_000_000));
        store.upsert_directory(expired).await.unwrap();

        let mut config = SchedulerConfig::default();
        config.mark_deleted_after_grace_seconds = 1000;
        let cleanup = CleanupTick::new(config, store.clone(), Arc::new(NoopHook));
        cleanup.run().await;

        assert!(store.get_directory("fresh").await.unwrap().is_some());
        assert!(store.get_directory("expired").await.unwrap().is_none());
    }
}
