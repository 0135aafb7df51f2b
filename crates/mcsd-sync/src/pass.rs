//! Orchestrates one sync pass: C4 closes the graph, C5 classifies it, C6
//! assembles the transaction, and — only once the local FHIR server
//! acknowledges it — the resource map advances in one commit.

use mcsd_client::{FhirClient, HistoryEntry};
use mcsd_core::CoreError;
use mcsd_storage::ResourceMapStore;
use tracing::{info, warn};

use crate::assemble::{ResourceMapWrite, assemble_transaction};
use crate::classify::{NodeStatus, classify_nodes};
use crate::graph::{NodeCache, UpstreamFetcher, attach_local_state, build_adjacency_graph};

/// Per-status counts for one pass, used by the scheduler (C8) for metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassCounts {
    pub new: usize,
    pub update: usize,
    pub delete: usize,
    pub equal: usize,
    pub ignore: usize,
}

#[derive(Debug, Clone)]
pub struct PassOutcome {
    pub counts: PassCounts,
}

/// Runs one page's worth of sync: close the graph against `upstream_base_url`
/// using `upstream_fetcher`, diff against `resource_map_store`, and POST the
/// resulting transaction to `local_client`. Resource-map writes commit only
/// if the POST succeeds.
pub async fn run_sync_pass(
    history_entries: Vec<HistoryEntry>,
    directory_id: &str,
    upstream_base_url: &str,
    upstream_fetcher: &dyn UpstreamFetcher,
    local_client: &FhirClient,
    resource_map_store: &dyn ResourceMapStore,
    cache: &mut NodeCache,
) -> Result<PassOutcome, CoreError> {
    let mut arena =
        build_adjacency_graph(history_entries, upstream_base_url, upstream_fetcher, cache).await?;

    attach_local_state(&mut arena, directory_id, resource_map_store)
        .await
        .map_err(|e| CoreError::InvalidNodeState {
            resource_type: "(resource map lookup)".to_string(),
            id: directory_id.to_string(),
            reason: e.to_string(),
        })?;

    let classifications = classify_nodes(&arena, directory_id)?;
    let counts = count_by_status(&classifications);
    let assembled = assemble_transaction(&arena, &classifications, directory_id);

    if assembled.resource_map_writes.is_empty() {
        info!(directory_id, ?counts, "sync pass produced no changes");
        return Ok(PassOutcome { counts });
    }

    let (_, entry_errors) = local_client.post_bundle(&assembled.bundle).await?;
    for err in &entry_errors {
        warn!(directory_id, entry_index = err.entry_index, diagnostics = %err.diagnostics, "transaction entry reported an error");
    }

    commit_resource_map_writes(resource_map_store, assembled.resource_map_writes).await?;
    info!(directory_id, ?counts, "sync pass committed");
    Ok(PassOutcome { counts })
}

async fn commit_resource_map_writes(
    store: &dyn ResourceMapStore,
    writes: Vec<ResourceMapWrite>,
) -> Result<(), CoreError> {
    for write in writes {
        let result = match write {
            ResourceMapWrite::Insert(row) => store.insert(row).await,
            ResourceMapWrite::Update(row) => store.update(row).await,
            ResourceMapWrite::Delete(key) => store.delete(&key).await,
        };
        result.map_err(|e| CoreError::InvalidNodeState {
            resource_type: "(resource map commit)".to_string(),
            id: String::new(),
            reason: e.to_string(),
        })?;
    }
    Ok(())
}

fn count_by_status(classifications: &[crate::classify::Classification]) -> PassCounts {
    let mut counts = PassCounts::default();
    for c in classifications {
        match c.status {
            NodeStatus::New => counts.new += 1,
            NodeStatus::Update => counts.update += 1,
            NodeStatus::Delete => counts.delete += 1,
            NodeStatus::Equal => counts.equal += 1,
            NodeStatus::Ignore => counts.ignore += 1,
        }
    }
    counts
}
