//! The periodic sync tick (§4.8): loads active directories, skips any
//! still mid-pass, and fans the rest out across a bounded pool.

use std::sync::Arc;

use dashmap::DashSet;
use futures_util::stream::{self, StreamExt};
use mcsd_core::{CoreError, now_utc};
use mcsd_storage::DirectoryStore;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::SchedulerConfig;
use crate::runner::DirectorySyncRunner;

pub struct MassSyncScheduler {
    config: SchedulerConfig,
    store: Arc<dyn DirectoryStore>,
    runner: Arc<dyn DirectorySyncRunner>,
    in_flight: Arc<DashSet<String>>,
}

impl MassSyncScheduler {
    pub fn new(
        config: SchedulerConfig,
        store: Arc<dyn DirectoryStore>,
        runner: Arc<dyn DirectorySyncRunner>,
    ) -> Self {
        Self {
            config,
            store,
            runner,
            in_flight: Arc::new(DashSet::new()),
        }
    }

    /// Spawns the periodic tick loop and returns the shutdown handle:
    /// sending `true` lets the in-flight tick finish, then the loop exits.
    pub fn start(self: Arc<Self>) -> watch::Sender<bool> {
        let (tx, mut shutdown_rx) = watch::channel(false);
        let scheduler = self;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(scheduler.config.tick_interval);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        scheduler.run_tick().await;
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            info!("mass sync scheduler shutting down");
                            break;
                        }
                    }
                }
            }
        });
        tx
    }

    /// Runs one tick. Loading the directory list or recording an outcome
    /// failing does not abort the rest of the batch (§4.8).
    pub async fn run_tick(&self) {
        let directories = match self.store.list_active_directories().await {
            Ok(directories) => directories,
            Err(e) => {
                warn!(error = %e, "failed to load active directories for sync tick");
                return;
            }
        };

        let runnable: Vec<_> = directories
            .into_iter()
            .filter(|directory| {
                if self.in_flight.insert(directory.id.clone()) {
                    true
                } else {
                    info!(directory_id = %directory.id, "previous sync pass still running, dropping this tick's job");
                    false
                }
            })
            .collect();

        stream::iter(runnable)
            .for_each_concurrent(self.config.max_concurrent_directory_updates, |directory| async move {
                let result = self.runner.sync(&directory).await;
                record_outcome(self.store.as_ref(), &directory.id, result).await;
                self.in_flight.remove(&directory.id);
            })
            .await;
    }
}

async fn record_outcome(store: &dyn DirectoryStore, directory_id: &str, result: Result<mcsd_sync::PassOutcome, CoreError>) {
    let now = now_utc();
    match result {
        Ok(outcome) => {
            info!(directory_id, new = outcome.counts.new, update = outcome.counts.update, delete = outcome.counts.delete, "sync pass succeeded");
            if let Err(e) = store.record_sync_attempt(directory_id, true, now).await {
                warn!(directory_id, error = %e, "failed to record successful sync attempt");
            }
        }
        Err(e) if e.is_offline() => {
            warn!(directory_id, error = %e, status = "offline", "sync pass failed: directory unreachable");
            if let Err(e) = store.record_sync_attempt(directory_id, false, now).await {
                warn!(directory_id, error = %e, "failed to record failed sync attempt");
            }
        }
        Err(e) => {
            warn!(directory_id, error = %e, status = "error", "sync pass failed with an unhandled error");
            if let Err(e) = store.record_sync_attempt(directory_id, false, now).await {
                warn!(directory_id, error = %e, "failed to record failed sync attempt");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mcsd_storage::memory::InMemoryDirectoryStore;
    use mcsd_storage::{Directory, DirectoryOrigin};
    use mcsd_sync::PassCounts;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct CountingRunner {
        calls: AtomicUsize,
        concurrent: AtomicUsize,
        max_observed_concurrent: Mutex<usize>,
        fail_for: Option<String>,
    }

    #[async_trait]
    impl DirectorySyncRunner for CountingRunner {
        async fn sync(&self, directory: &Directory) -> Result<mcsd_sync::PassOutcome, CoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let current = self.concurrent.fetch_add(1, Ordering::SeqCst) + 1;
            {
                let mut max = self.max_observed_concurrent.lock().unwrap();
                *max = (*max).max(current);
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            self.concurrent.fetch_sub(1, Ordering::SeqCst);

            if self.fail_for.as_deref() == Some(directory.id.as_str()) {
                return Err(CoreError::Network("simulated offline".into()));
            }
            Ok(mcsd_sync::PassOutcome {
                counts: PassCounts::default(),
            })
        }
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

    async fn seeded_store(ids: &[&str]) -> Arc<InMemoryDirectoryStore> {
        let store = Arc::new(InMemoryDirectoryStore::new());
        for id in ids {
            store.upsert_directory(directory(id)).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn tick_syncs_every_active_directory() {
        let store = seeded_store(&["d1", "d2", "d3"]).await;
        let runner = Arc::new(CountingRunner {
            calls: AtomicUsize::new(0),
            concurrent: AtomicUsize::new(0),
            max_observed_concurrent: Mutex::new(0),
            fail_for: None,
        });
        let scheduler = MassSyncScheduler::new(SchedulerConfig::default(), store.clone(), runner.clone());
        scheduler.run_tick().await;
        assert_eq!(runner.calls.load(Ordering::SeqCst), 3);

        for id in ["d1", "d2", "d3"] {
            let directory = store.get_directory(id).await.unwrap().unwrap();
            assert!(directory.last_success_sync.is_some());
        }
    }

    #[tokio::test]
    async fn tick_respects_concurrency_bound() {
        let ids: Vec<String> = (0..8).map(|i| format!("d{i}")).collect();
        let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        let store = seeded_store(&id_refs).await;
        let runner = Arc::new(CountingRunner {
            calls: AtomicUsize::new(0),
            concurrent: AtomicUsize::new(0),
            max_observed_concurrent: Mutex::new(0),
            fail_for: None,
        });
        let mut config = SchedulerConfig::default();
        config.max_concurrent_directory_updates = 2;
        let scheduler = MassSyncScheduler::new(config, store, runner.clone());
        scheduler.run_tick().await;

        assert!(*runner.max_observed_concurrent.lock().unwrap() <= 2);
    }

    #[tokio::test]
    async fn offline_failure_increments_failed_attempts() {
        let store = seeded_store(&["d1"]).await;
        let runner = Arc::new(CountingRunner {
            calls: AtomicUsize::new(0),
            concurrent: AtomicUsize::new(0),
            max_observed_concurrent: Mutex::new(0),
            fail_for: Some("d1".into()),
        });
        let scheduler = MassSyncScheduler::new(SchedulerConfig::default(), store.clone(), runner);
        scheduler.run_tick().await;

        let directory = store.get_directory("d1").await.unwrap().unwrap();
        assert_eq!(directory.failed_attempts, 1);
        assert!(directory.last_success_sync.is_none());
    }
}
