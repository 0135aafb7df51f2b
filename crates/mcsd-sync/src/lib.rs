//! # mcsd-sync
//!
//! One directory's incremental sync pass: close a `_history` page into an
//! adjacency graph (C4), classify every node (C5), and assemble the
//! resulting local transaction (C6).

mod assemble;
mod classify;
mod graph;
mod hash;
mod node;
mod pass;

pub use assemble::{AssembledTransaction, ResourceMapWrite, assemble_transaction};
pub use classify::{Classification, NodeStatus, classify_nodes};
pub use graph::{ClientUpstreamFetcher, NodeCache, UpstreamFetcher, attach_local_state, build_adjacency_graph};
pub use hash::{ContentHash, hash_local_resource, hash_namespaced_resource, hash_resource};
pub use node::{Node, NodeArena, NodeContent, NodeKey};
pub use pass::{PassCounts, PassOutcome, run_sync_pass};
