//! # mcsd-client
//!
//! The FHIR Client (C1): typed GET/search/history/transaction-POST and
//! capability-probe operations against an upstream mCSD directory, with
//! retries, correlation ids, and startup-validated mTLS.

mod client;
mod config;
mod history;

pub use client::{FhirClient, Page, TransactionEntryError, WriteOutcome};
pub use config::{ClientConfig, RetryConfig, TlsIdentityConfig};
pub use history::{HistoryEntry, HistoryMethod, dedup_newest_first, parse_history_entry};
