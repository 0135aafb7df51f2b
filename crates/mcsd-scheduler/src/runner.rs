//! The seam between one scheduler tick and the sync engine (C4-C6): kept
//! behind a trait so the tick's concurrency and bookkeeping are tested
//! without real HTTP, mirroring `mcsd-sync::UpstreamFetcher`.

use std::sync::Arc;

use async_trait::async_trait;
use mcsd_client::{ClientConfig, FhirClient};
use mcsd_core::{CoreError, DirectoryResourceType};
use mcsd_storage::{Directory, ResourceMapStore};
use mcsd_sync::{ClientUpstreamFetcher, NodeCache, PassCounts, PassOutcome, run_sync_pass};

#[async_trait]
pub trait DirectorySyncRunner: Send + Sync {
    async fn sync(&self, directory: &Directory) -> Result<PassOutcome, CoreError>;
}

/// Pages every mCSD resource type's `_history` from the directory's own
/// endpoint and runs one sync pass per page against the local FHIR server.
/// Holds its resource map store behind an `Arc` so one runner instance can
/// outlive a single tick — the scheduler keeps it for the process lifetime.
pub struct ClientDirectorySyncRunner {
    pub local_base_url: String,
    pub resource_map_store: Arc<dyn ResourceMapStore>,
}

#[async_trait]
impl DirectorySyncRunner for ClientDirectorySyncRunner {
    async fn sync(&self, directory: &Directory) -> Result<PassOutcome, CoreError> {
        let upstream_client = FhirClient::new(ClientConfig::new(directory.endpoint.clone()))?;
        let local_client = FhirClient::new(ClientConfig::new(self.local_base_url.clone()))?;
        let fetcher = ClientUpstreamFetcher {
            client: &upstream_client,
        };
        let mut cache = NodeCache::new();
        let mut totals = PassCounts::default();

        for resource_type in DirectoryResourceType::ALL {
            let mut page = upstream_client.get_history_batch(resource_type, &[]).await?;
            loop {
                if !page.entries.is_empty() {
                    let outcome = run_sync_pass(
                        page.entries,
                        &directory.id,
                        &directory.endpoint,
                        &fetcher,
                        &local_client,
                        self.resource_map_store.as_ref(),
                        &mut cache,
                    )
                    .await?;
                    totals = add_counts(totals, outcome.counts);
                }
                let Some(next) = page.next_url else { break };
                page = upstream_client.get_history_batch_next(&next).await?;
            }
        }

        Ok(PassOutcome { counts: totals })
    }
}

fn add_counts(a: PassCounts, b: PassCounts) -> PassCounts {
    PassCounts {
        new: a.new + b.new,
        update: a.update + b.update,
        delete: a.delete + b.delete,
        equal: a.equal + b.equal,
        ignore: a.ignore + b.ignore,
    }
}
